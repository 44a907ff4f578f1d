//! Database context: owns the storage environment, the fixed stores and
//! the shared catalog snapshot, and hands out transactions.

mod cursor;
mod data_ops;
mod query_ops;
mod schema_ops;
mod transaction;
mod traverse_ops;

pub use cursor::ResultCursor;
pub use transaction::{Transaction, TxnMode, TxnState};

use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::info;

use crate::error::Result;
use crate::kv::KvEnv;
use crate::schema::{Catalog, CatalogStores};
use crate::storage::graph::RelationStores;

/// Environment sizing knobs of [`Context::open`].
#[derive(Clone, Copy, Debug)]
pub struct ContextOptions {
    /// Maximum number of named sub-databases. Every class costs one and
    /// every index two.
    pub max_databases: u32,
    /// Maximum size of the database file in bytes.
    pub max_size: u64,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            max_databases: 1024,
            max_size: 1 << 30,
        }
    }
}

/// An open database. All reads and writes go through transactions obtained
/// from [`Context::begin`]; any number of readers may run concurrently with
/// at most one writer.
pub struct Context {
    pub(crate) kv: KvEnv,
    pub(crate) catalog_stores: CatalogStores,
    pub(crate) relations: RelationStores,
    pub(crate) catalog: RwLock<Arc<Catalog>>,
    pub(crate) writer: Mutex<()>,
    pub(crate) options: ContextOptions,
}

impl Context {
    /// Opens or creates the database at `path`, creating the fixed stores
    /// and loading the schema catalog.
    pub fn open(path: impl AsRef<Path>, options: ContextOptions) -> Result<Self> {
        let kv = KvEnv::open(path.as_ref(), options.max_databases, options.max_size)?;

        let mut wtxn = kv.write_txn()?;
        let catalog_stores = CatalogStores::create(&kv, &mut wtxn)?;
        let relations = RelationStores::create(&kv, &mut wtxn)?;
        wtxn.commit()?;

        let rtxn = kv.read_txn()?;
        let catalog = Catalog::load(&catalog_stores, &rtxn)?;
        drop(rtxn);

        info!(
            path = %path.as_ref().display(),
            classes = catalog.class_count(),
            indexes = catalog.index_count(),
            "database opened"
        );

        Ok(Self {
            kv,
            catalog_stores,
            relations,
            catalog: RwLock::new(Arc::new(catalog)),
            writer: Mutex::new(()),
            options,
        })
    }

    /// Starts a transaction. Read-write transactions serialise on a
    /// process-local writer lock held for the transaction's lifetime.
    pub fn begin(&self, mode: TxnMode) -> Result<Transaction<'_>> {
        Transaction::begin(self, mode)
    }
}
