use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TenebraError>;

/// Engine error taxonomy. Every validation failure aborts the current call
/// without mutating state; storage-level failures poison the enclosing
/// transaction (see [`crate::db::Transaction`]).
#[derive(Debug, Error)]
pub enum TenebraError {
    // schema
    #[error("class `{0}` already exists")]
    DuplicateClass(String),
    #[error("class `{0}` does not exist")]
    NoSuchClass(String),
    #[error("property `{0}` already exists in the class hierarchy")]
    DuplicateProperty(String),
    #[error("property `{0}` does not exist")]
    NoSuchProperty(String),
    #[error("invalid class name `{0}`")]
    InvalidClassName(String),
    #[error("invalid property name `{0}`")]
    InvalidPropertyName(String),
    #[error("class `{0}` has the wrong kind for this operation")]
    MismatchClassKind(String),
    #[error("property type of `{0}` conflicts with this operation")]
    ConflictPropertyType(String),
    #[error("property `{0}` is referenced by an index")]
    PropertyInUse(String),
    #[error("class `{0}` has subclasses")]
    ClassInUse(String),

    // data
    #[error("record {0} does not exist")]
    NoSuchRecord(String),
    #[error("invalid record id {0}")]
    InvalidRid(String),

    // graph
    #[error("vertex {0} does not exist")]
    NoSuchVertex(String),
    #[error("source vertex {0} does not exist")]
    NoSuchSrcVertex(String),
    #[error("destination vertex {0} does not exist")]
    NoSuchDstVertex(String),
    #[error("edge {0} does not exist")]
    NoSuchEdge(String),
    #[error("graph invariant violated: {0}")]
    GraphInternal(String),

    // index
    #[error("index on `{0}` already exists")]
    DuplicateIndex(String),
    #[error("no index on `{0}`")]
    NoSuchIndex(String),
    #[error("unique index constraint violated on `{0}`")]
    IndexConstraint(String),
    #[error("comparator not supported by the index engine")]
    InvalidComparator,

    // transaction
    #[error("operation not permitted in this transaction mode")]
    TxnInvalidMode,
    #[error("transaction has been rolled back")]
    TxnRolledBack,
    #[error("record version limit reached")]
    TxnVersionLimit,

    // values
    #[error("value conversion failed: {0}")]
    Conversion(String),
    #[error("corruption detected: {0}")]
    Corruption(String),

    // storage
    #[error("storage error: {0}")]
    Storage(#[from] heed3::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl TenebraError {
    /// True when the underlying storage engine failed; such an error leaves
    /// the enclosing write transaction unusable.
    pub fn is_storage(&self) -> bool {
        matches!(self, TenebraError::Storage(_) | TenebraError::Io(_))
    }
}
