//! Embedded property-graph database engine.
//!
//! A single-process library offering durable, transactional storage for a
//! typed schema of vertex and edge classes with single inheritance,
//! secondary indexes, compound boolean queries, and graph traversal, on top
//! of an ordered key/value store (LMDB).

pub mod db;
pub mod error;
pub mod model;
pub mod query;
pub mod traverse;

mod codec;
mod kv;
mod schema;
mod storage;

pub use crate::db::{Context, ContextOptions, ResultCursor, Transaction, TxnMode, TxnState};
pub use crate::error::{Result, TenebraError};
pub use crate::model::{
    Bytes, ClassDescriptor, ClassId, ClassKind, DbInfo, IndexDescriptor, IndexId,
    PositionId, PropertyDescriptor, PropertyId, PropertyType, Record, RecordDescriptor,
    RecordId, RecordResult, ResultSet,
};
pub use crate::query::{Condition, GraphFilter, MultiCondition, Selector};
pub use crate::traverse::{Direction, TraverseOptions};
