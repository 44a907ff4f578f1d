//! Per-class record stores: one sub-database per class, keyed by position.
//!
//! Key 0 inside every class store is reserved for the next-position counter;
//! live records start at position 1.

use heed3::{RoTxn, RwTxn};

use crate::error::{Result, TenebraError};
use crate::kv::{self, KvEnv, Store, StoreKind};
use crate::model::{ClassId, PositionId};

const COUNTER_KEY: [u8; 4] = [0, 0, 0, 0];
const FIRST_POSITION: u32 = 1;

pub(crate) fn store_name(class_id: ClassId) -> String {
    class_id.0.to_string()
}

pub(crate) fn position_key(position: PositionId) -> [u8; 4] {
    position.0.to_be_bytes()
}

fn decode_position(key: &[u8]) -> Result<PositionId> {
    key.try_into()
        .map(|bytes| PositionId(u32::from_be_bytes(bytes)))
        .map_err(|_| TenebraError::Corruption("record key malformed".into()))
}

/// Creates the store of a freshly created class and seeds its counter.
pub(crate) fn create_store(env: &KvEnv, wtxn: &mut RwTxn, class_id: ClassId) -> Result<Store> {
    let store = env.create_store(wtxn, &store_name(class_id), StoreKind::Plain)?;
    store.put(wtxn, &COUNTER_KEY, &FIRST_POSITION.to_le_bytes())?;
    Ok(store)
}

/// Opens the store of an existing class. Absence means the catalog and the
/// data stores disagree.
pub(crate) fn open_store(env: &KvEnv, rtxn: &RoTxn<'_>, class_id: ClassId) -> Result<Store> {
    env.open_store(rtxn, &store_name(class_id), StoreKind::Plain)?
        .ok_or_else(|| {
            TenebraError::Corruption(format!("record store for class {class_id} is missing"))
        })
}

/// Fetch-add on the reserved counter key.
pub(crate) fn next_position(store: Store, wtxn: &mut RwTxn) -> Result<PositionId> {
    let next = match store.get(wtxn, &COUNTER_KEY)? {
        Some(raw) => u32::from_le_bytes(
            raw.try_into()
                .map_err(|_| TenebraError::Corruption("position counter malformed".into()))?,
        ),
        None => FIRST_POSITION,
    };
    if next == u32::MAX {
        return Err(TenebraError::Corruption("position space exhausted".into()));
    }
    store.put(wtxn, &COUNTER_KEY, &(next + 1).to_le_bytes())?;
    Ok(PositionId(next))
}

pub(crate) fn put(
    store: Store,
    wtxn: &mut RwTxn,
    position: PositionId,
    payload: &[u8],
) -> Result<()> {
    store.put(wtxn, &position_key(position), payload)?;
    Ok(())
}

pub(crate) fn get(store: Store, rtxn: &RoTxn<'_>, position: PositionId) -> Result<Option<Vec<u8>>> {
    Ok(store
        .get(rtxn, &position_key(position))?
        .map(<[u8]>::to_vec))
}

pub(crate) fn exists(store: Store, rtxn: &RoTxn<'_>, position: PositionId) -> Result<bool> {
    Ok(store.get(rtxn, &position_key(position))?.is_some())
}

pub(crate) fn delete(store: Store, wtxn: &mut RwTxn, position: PositionId) -> Result<bool> {
    Ok(store.delete(wtxn, &position_key(position))?)
}

/// Forward scan over live records, skipping the reserved counter key. The
/// callback returns `false` to stop early.
pub(crate) fn scan<F>(store: Store, rtxn: &RoTxn<'_>, mut visit: F) -> Result<()>
where
    F: FnMut(PositionId, &[u8]) -> Result<bool>,
{
    kv::scan_range(
        store,
        rtxn,
        std::ops::Bound::Included(FIRST_POSITION.to_be_bytes().as_slice()),
        std::ops::Bound::Unbounded,
        |key, value| visit(decode_position(key)?, value),
    )
}

/// Materialises every live position of the store.
pub(crate) fn positions(store: Store, rtxn: &RoTxn<'_>) -> Result<Vec<PositionId>> {
    let mut result = Vec::new();
    scan(store, rtxn, |position, _| {
        result.push(position);
        Ok(true)
    })?;
    Ok(result)
}
