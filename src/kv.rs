//! Facade over the ordered key/value engine (LMDB via `heed3`).
//!
//! Every store is a named sub-database with raw byte keys and values; key
//! encodings (big-endian fixed-width ids) are owned by the callers so that
//! range scans observe the intended order.

use std::fs;
use std::ops::Bound;
use std::path::{Path, PathBuf};

use heed3::types::Bytes as RawBytes;
use heed3::{Database, DatabaseFlags, Env, EnvOpenOptions, RoTxn, RwTxn, WithoutTls};

use crate::error::{Result, TenebraError};

pub(crate) type Store = Database<RawBytes, RawBytes>;

/// Physical layout of a store.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub(crate) enum StoreKind {
    /// One value per key.
    Plain,
    /// Multiple ordered values per key.
    Multi,
    /// Multiple ordered fixed-width values per key.
    MultiFixed,
}

impl StoreKind {
    fn flags(self) -> DatabaseFlags {
        match self {
            StoreKind::Plain => DatabaseFlags::empty(),
            StoreKind::Multi => DatabaseFlags::DUP_SORT,
            StoreKind::MultiFixed => DatabaseFlags::DUP_SORT | DatabaseFlags::DUP_FIXED,
        }
    }
}

/// Process-wide handle of one database environment.
pub(crate) struct KvEnv {
    env: Env,
    path: PathBuf,
}

impl KvEnv {
    pub(crate) fn open(path: &Path, max_databases: u32, map_size: u64) -> Result<Self> {
        fs::create_dir_all(path)?;
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size as usize)
                .max_dbs(max_databases)
                .open(path)?
        };
        Ok(Self {
            env,
            path: path.to_path_buf(),
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn read_txn(&self) -> Result<RoTxn<'_, WithTls>> {
        Ok(self.env.read_txn()?)
    }

    pub(crate) fn write_txn(&self) -> Result<RwTxn<'_>> {
        Ok(self.env.write_txn()?)
    }

    /// Opens a named store, creating it when absent. Creation participates
    /// in the supplied write transaction.
    pub(crate) fn create_store(
        &self,
        wtxn: &mut RwTxn,
        name: &str,
        kind: StoreKind,
    ) -> Result<Store> {
        Ok(self
            .env
            .database_options()
            .types::<RawBytes, RawBytes>()
            .flags(kind.flags())
            .name(name)
            .create(wtxn)?)
    }

    /// Opens an existing named store, or `None` when it was never created.
    pub(crate) fn open_store(
        &self,
        rtxn: &RoTxn<'_>,
        name: &str,
        kind: StoreKind,
    ) -> Result<Option<Store>> {
        Ok(self
            .env
            .database_options()
            .types::<RawBytes, RawBytes>()
            .flags(kind.flags())
            .name(name)
            .open(rtxn)?)
    }
}

/// A transaction over the key/value engine, read-only or read-write.
/// Readers observe the snapshot taken at begin; the single writer reads its
/// own uncommitted changes.
pub(crate) enum KvTxn<'env> {
    ReadOnly(RoTxn<'env, WithTls>),
    ReadWrite(RwTxn<'env>),
}

impl<'env> KvTxn<'env> {
    pub(crate) fn is_writable(&self) -> bool {
        matches!(self, KvTxn::ReadWrite(_))
    }

    /// Read view of the transaction, valid in both modes.
    pub(crate) fn read(&self) -> &RoTxn<'env> {
        match self {
            KvTxn::ReadOnly(txn) => txn,
            KvTxn::ReadWrite(txn) => txn,
        }
    }

    /// Write view; fails on a read-only transaction.
    pub(crate) fn write(&mut self) -> Result<&mut RwTxn<'env>> {
        match self {
            KvTxn::ReadOnly(_) => Err(TenebraError::TxnInvalidMode),
            KvTxn::ReadWrite(txn) => Ok(txn),
        }
    }

    pub(crate) fn commit(self) -> Result<()> {
        match self {
            // A reader holds no dirty state; dropping releases its snapshot.
            KvTxn::ReadOnly(_) => Ok(()),
            KvTxn::ReadWrite(txn) => Ok(txn.commit()?),
        }
    }
}

/// Walks every `(key, value)` pair whose key starts with `prefix`, in key
/// order (duplicates of one key are visited in value order). The callback
/// returns `false` to stop early.
pub(crate) fn scan_prefix<F>(db: Store, rtxn: &RoTxn<'_>, prefix: &[u8], mut visit: F) -> Result<()>
where
    F: FnMut(&[u8], &[u8]) -> Result<bool>,
{
    for entry in db.prefix_iter(rtxn, prefix)? {
        let (key, value) = entry?;
        if !visit(key, value)? {
            break;
        }
    }
    Ok(())
}

/// Forward range scan over `[lower, upper]` bounds.
pub(crate) fn scan_range<F>(
    db: Store,
    rtxn: &RoTxn<'_>,
    lower: Bound<&[u8]>,
    upper: Bound<&[u8]>,
    mut visit: F,
) -> Result<()>
where
    F: FnMut(&[u8], &[u8]) -> Result<bool>,
{
    for entry in db.range(rtxn, &(lower, upper))? {
        let (key, value) = entry?;
        if !visit(key, value)? {
            break;
        }
    }
    Ok(())
}
