//! Transaction core: modes, lifecycle, and the catalog view carried by
//! every transaction.

use std::sync::Arc;

use heed3::{RoTxn, RwTxn};
use parking_lot::MutexGuard;
use tracing::{debug, info, warn};

use crate::db::Context;
use crate::error::{Result, TenebraError};
use crate::kv::KvTxn;
use crate::model::DbInfo;
use crate::schema::Catalog;

/// Transaction mode. Any number of read-only transactions may run
/// concurrently; read-write transactions are serialised.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum TxnMode {
    ReadOnly,
    ReadWrite,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum TxnState {
    Active,
    Committed,
    RolledBack,
}

/// The catalog as seen by one transaction: readers share the snapshot
/// taken at begin, the writer owns a shadow copy that is swapped into the
/// context on commit.
pub(crate) enum CatalogView {
    Snapshot(Arc<Catalog>),
    Shadow(Box<Catalog>),
}

impl CatalogView {
    pub(crate) fn get(&self) -> &Catalog {
        match self {
            CatalogView::Snapshot(catalog) => catalog,
            CatalogView::Shadow(catalog) => catalog,
        }
    }

    pub(crate) fn shadow_mut(&mut self) -> Result<&mut Catalog> {
        match self {
            CatalogView::Snapshot(_) => Err(TenebraError::TxnInvalidMode),
            CatalogView::Shadow(catalog) => Ok(catalog),
        }
    }
}

/// Unit of atomicity. Obtained from [`Context::begin`]; every schema, data,
/// query and traversal operation goes through one. Consumed by
/// [`commit`](Transaction::commit) or [`rollback`](Transaction::rollback);
/// dropping an active transaction aborts it.
pub struct Transaction<'ctx> {
    pub(crate) ctx: &'ctx Context,
    pub(crate) kv: Option<KvTxn<'ctx>>,
    pub(crate) catalog: CatalogView,
    mode: TxnMode,
    state: TxnState,
    _writer: Option<MutexGuard<'ctx, ()>>,
}

/// Split borrows handed to read-side operations.
pub(crate) struct ReadParts<'t, 'ctx> {
    pub ctx: &'ctx Context,
    pub rtxn: &'t RoTxn<'ctx>,
    pub catalog: &'t Catalog,
}

/// Split borrows handed to write-side operations. The write transaction
/// derefs to a read transaction, so reads stay available.
pub(crate) struct WriteParts<'t, 'ctx> {
    pub ctx: &'ctx Context,
    pub wtxn: &'t mut RwTxn<'ctx>,
    pub catalog: &'t mut Catalog,
}

impl<'ctx> Transaction<'ctx> {
    pub(crate) fn begin(ctx: &'ctx Context, mode: TxnMode) -> Result<Self> {
        let (kv, catalog, writer) = match mode {
            TxnMode::ReadOnly => {
                let kv = KvTxn::ReadOnly(ctx.kv.read_txn()?);
                let snapshot = Arc::clone(&ctx.catalog.read());
                (kv, CatalogView::Snapshot(snapshot), None)
            }
            TxnMode::ReadWrite => {
                let guard = ctx.writer.lock();
                let kv = KvTxn::ReadWrite(ctx.kv.write_txn()?);
                let shadow = Box::new((**ctx.catalog.read()).clone());
                (kv, CatalogView::Shadow(shadow), Some(guard))
            }
        };
        debug!(?mode, "transaction started");
        Ok(Self {
            ctx,
            kv: Some(kv),
            catalog,
            mode,
            state: TxnState::Active,
            _writer: writer,
        })
    }

    pub fn mode(&self) -> TxnMode {
        self.mode
    }

    pub fn state(&self) -> TxnState {
        self.state
    }

    /// Summary of the database as seen by this transaction's snapshot.
    pub fn db_info(&self) -> DbInfo {
        let catalog = self.catalog.get();
        DbInfo {
            path: self.ctx.kv.path().to_path_buf(),
            max_databases: self.ctx.options.max_databases,
            max_size: self.ctx.options.max_size,
            num_classes: catalog.class_count(),
            num_properties: catalog.property_count(),
            num_indexes: catalog.index_count(),
        }
    }

    pub(crate) fn ensure_active(&self) -> Result<()> {
        match self.state {
            TxnState::Active => Ok(()),
            _ => Err(TenebraError::TxnRolledBack),
        }
    }

    pub(crate) fn read_parts(&self) -> Result<ReadParts<'_, 'ctx>> {
        self.ensure_active()?;
        let kv = self.kv.as_ref().expect("kv transaction present while active");
        Ok(ReadParts {
            ctx: self.ctx,
            rtxn: kv.read(),
            catalog: self.catalog.get(),
        })
    }

    pub(crate) fn write_parts(&mut self) -> Result<WriteParts<'_, 'ctx>> {
        self.ensure_active()?;
        let kv = self.kv.as_mut().expect("kv transaction present while active");
        let wtxn = kv.write()?;
        let catalog = self.catalog.shadow_mut()?;
        Ok(WriteParts {
            ctx: self.ctx,
            wtxn,
            catalog,
        })
    }

    /// Routes an operation result through the poisoning rule: a storage
    /// failure leaves the transaction unusable, every later call fails with
    /// `TxnRolledBack`.
    pub(crate) fn guard<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(error) = &result {
            if error.is_storage() {
                warn!(%error, "storage failure, transaction poisoned");
                self.state = TxnState::RolledBack;
            }
        }
        result
    }

    /// Commits the transaction. For a writer this makes every change
    /// durable and publishes the shadow catalog; a reader just releases its
    /// snapshot.
    pub fn commit(mut self) -> Result<()> {
        self.ensure_active()?;
        let kv = self.kv.take().expect("kv transaction present while active");
        match kv.commit() {
            Ok(()) => {
                let view = std::mem::replace(
                    &mut self.catalog,
                    CatalogView::Snapshot(Arc::new(Catalog::default())),
                );
                if let CatalogView::Shadow(shadow) = view {
                    *self.ctx.catalog.write() = Arc::new(*shadow);
                }
                self.state = TxnState::Committed;
                if self.mode == TxnMode::ReadWrite {
                    info!("transaction committed");
                }
                Ok(())
            }
            Err(error) => {
                self.state = TxnState::RolledBack;
                warn!(%error, "commit failed, transaction rolled back");
                Err(error)
            }
        }
    }

    /// Discards every change of the transaction.
    pub fn rollback(mut self) -> Result<()> {
        self.ensure_active()?;
        drop(self.kv.take());
        self.state = TxnState::RolledBack;
        if self.mode == TxnMode::ReadWrite {
            warn!("transaction rolled back");
        }
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        // Dropping the inner kv transaction aborts it; leaked readers must
        // not wedge writers, so release is best-effort rather than a panic.
        if self.state == TxnState::Active {
            warn!(mode = ?self.mode, "transaction dropped while active, aborting");
        }
    }
}
