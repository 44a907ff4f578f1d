//! Secondary index engine.
//!
//! Every index owns two stores, `.index_<id>_positive` and
//! `.index_<id>_negative`. Signed integer keys are split by sign: negative
//! values live in the negative store keyed by magnitude (so magnitude order
//! walked backward yields ascending values), non-negative values in the
//! positive store. Unsigned, real and text keys use the positive store
//! only; reals are remapped to order-preserving bits first. Entry values
//! carry `(classId, positionId)` so an index created on a superclass can
//! hold the records of every subclass without ambiguity.

use std::ops::Bound;

use heed3::{MdbError, PutFlags, RoTxn, RwTxn};
use tracing::trace;

use crate::error::{Result, TenebraError};
use crate::kv::{self, KvEnv, Store, StoreKind};
use crate::model::{Bytes, ClassId, IndexDescriptor, PositionId, PropertyType, RecordId};

const ENTRY_LEN: usize = 6;
const SIGN_BIT: u64 = 1 << 63;

pub(crate) fn positive_store_name(descriptor: &IndexDescriptor) -> String {
    format!(".index_{}_positive", descriptor.id.0)
}

pub(crate) fn negative_store_name(descriptor: &IndexDescriptor) -> String {
    format!(".index_{}_negative", descriptor.id.0)
}

fn store_kind(descriptor: &IndexDescriptor) -> StoreKind {
    if descriptor.unique {
        StoreKind::Plain
    } else {
        StoreKind::Multi
    }
}

/// The two ordered sub-trees of one index.
#[derive(Copy, Clone)]
pub(crate) struct IndexStores {
    positive: Store,
    negative: Store,
}

pub(crate) fn create_stores(
    env: &KvEnv,
    wtxn: &mut RwTxn,
    descriptor: &IndexDescriptor,
) -> Result<IndexStores> {
    Ok(IndexStores {
        positive: env.create_store(wtxn, &positive_store_name(descriptor), store_kind(descriptor))?,
        negative: env.create_store(wtxn, &negative_store_name(descriptor), store_kind(descriptor))?,
    })
}

pub(crate) fn open_stores(
    env: &KvEnv,
    rtxn: &RoTxn<'_>,
    descriptor: &IndexDescriptor,
) -> Result<IndexStores> {
    let positive = env
        .open_store(rtxn, &positive_store_name(descriptor), store_kind(descriptor))?
        .ok_or_else(|| {
            TenebraError::Corruption(format!("index store {} is missing", descriptor.id.0))
        })?;
    let negative = env
        .open_store(rtxn, &negative_store_name(descriptor), store_kind(descriptor))?
        .ok_or_else(|| {
            TenebraError::Corruption(format!("index store {} is missing", descriptor.id.0))
        })?;
    Ok(IndexStores { positive, negative })
}

/// Empties both sub-trees of a dropped index.
pub(crate) fn clear_stores(stores: IndexStores, wtxn: &mut RwTxn) -> Result<()> {
    stores.positive.clear(wtxn)?;
    stores.negative.clear(wtxn)?;
    Ok(())
}

/// A normalised index key, routed to its sub-tree.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub(crate) enum IndexKey {
    Positive(Vec<u8>),
    Negative(Vec<u8>),
}

fn ordered_real_bits(value: f64) -> u64 {
    let bits = value.to_bits();
    if bits & SIGN_BIT != 0 {
        !bits
    } else {
        bits | SIGN_BIT
    }
}

fn signed_value(value: &Bytes, prop_type: PropertyType) -> Result<i64> {
    Ok(match prop_type {
        PropertyType::TinyInt => i64::from(value.to_i8()?),
        PropertyType::SmallInt => i64::from(value.to_i16()?),
        PropertyType::Integer => i64::from(value.to_i32()?),
        PropertyType::BigInt => value.to_i64()?,
        _ => unreachable!("caller checked the type family"),
    })
}

fn unsigned_value(value: &Bytes, prop_type: PropertyType) -> Result<u64> {
    Ok(match prop_type {
        PropertyType::UnsignedTinyInt => u64::from(value.to_u8()?),
        PropertyType::UnsignedSmallInt => u64::from(value.to_u16()?),
        PropertyType::UnsignedInteger => u64::from(value.to_u32()?),
        PropertyType::UnsignedBigInt => value.to_u64()?,
        _ => unreachable!("caller checked the type family"),
    })
}

/// Normalises a property value into its index key. Fails on blob
/// properties and on payloads whose width does not match the declared type.
pub(crate) fn normalise_key(value: &Bytes, prop_type: PropertyType) -> Result<IndexKey> {
    if prop_type.is_signed_integer() {
        let v = signed_value(value, prop_type)?;
        return Ok(if v < 0 {
            IndexKey::Negative(v.unsigned_abs().to_be_bytes().to_vec())
        } else {
            IndexKey::Positive((v as u64).to_be_bytes().to_vec())
        });
    }
    if prop_type.is_unsigned_integer() {
        return Ok(IndexKey::Positive(
            unsigned_value(value, prop_type)?.to_be_bytes().to_vec(),
        ));
    }
    match prop_type {
        PropertyType::Real => Ok(IndexKey::Positive(
            ordered_real_bits(value.to_f64()?).to_be_bytes().to_vec(),
        )),
        PropertyType::Text => Ok(IndexKey::Positive(value.as_slice().to_vec())),
        PropertyType::Blob => Err(TenebraError::ConflictPropertyType(
            "blob properties cannot be indexed".into(),
        )),
        _ => unreachable!("integer families handled above"),
    }
}

fn entry_value(rid: RecordId) -> [u8; ENTRY_LEN] {
    let mut value = [0u8; ENTRY_LEN];
    value[0..2].copy_from_slice(&rid.class_id.0.to_be_bytes());
    value[2..6].copy_from_slice(&rid.position.0.to_be_bytes());
    value
}

fn decode_entry(raw: &[u8]) -> Result<RecordId> {
    if raw.len() != ENTRY_LEN {
        return Err(TenebraError::Corruption("index entry malformed".into()));
    }
    let class = u16::from_be_bytes(raw[0..2].try_into().expect("slice has exactly 2 bytes"));
    let position = u32::from_be_bytes(raw[2..6].try_into().expect("slice has exactly 4 bytes"));
    Ok(RecordId::new(ClassId(class), PositionId(position)))
}

impl IndexStores {
    fn select(&self, key: &IndexKey) -> (Store, Vec<u8>) {
        match key {
            IndexKey::Positive(raw) => (self.positive, raw.clone()),
            IndexKey::Negative(raw) => (self.negative, raw.clone()),
        }
    }

    pub(crate) fn insert(
        &self,
        wtxn: &mut RwTxn,
        descriptor: &IndexDescriptor,
        key: &IndexKey,
        rid: RecordId,
        detail: &str,
    ) -> Result<()> {
        let (store, raw) = self.select(key);
        let value = entry_value(rid);
        trace!(index = descriptor.id.0, rid = %rid, "index insert");
        if descriptor.unique {
            match store.put_with_flags(wtxn, PutFlags::NO_OVERWRITE, &raw, &value) {
                Err(heed3::Error::Mdb(MdbError::KeyExist)) => {
                    Err(TenebraError::IndexConstraint(detail.to_string()))
                }
                other => {
                    other?;
                    Ok(())
                }
            }
        } else {
            store.put(wtxn, &raw, &value)?;
            Ok(())
        }
    }

    pub(crate) fn remove(
        &self,
        wtxn: &mut RwTxn,
        descriptor: &IndexDescriptor,
        key: &IndexKey,
        rid: RecordId,
    ) -> Result<()> {
        let (store, raw) = self.select(key);
        trace!(index = descriptor.id.0, rid = %rid, "index remove");
        if descriptor.unique {
            store.delete(wtxn, &raw)?;
        } else {
            store.delete_one_duplicate(wtxn, &raw, &entry_value(rid))?;
        }
        Ok(())
    }

    /// The record currently bound to `key` in a unique index, if any.
    pub(crate) fn lookup_unique(&self, rtxn: &RoTxn<'_>, key: &IndexKey) -> Result<Option<RecordId>> {
        let (store, raw) = self.select(key);
        match store.get(rtxn, &raw)? {
            Some(entry) => Ok(Some(decode_entry(entry)?)),
            None => Ok(None),
        }
    }
}

/// One index lookup compiled from a condition by the planner.
#[derive(Clone, Debug)]
pub(crate) enum IndexProbe<'c> {
    Equal(&'c Bytes),
    Less { value: &'c Bytes, or_eq: bool },
    Greater { value: &'c Bytes, or_eq: bool },
    Between {
        lower: &'c Bytes,
        upper: &'c Bytes,
        include: (bool, bool),
    },
    In(&'c [Bytes]),
}

/// Runs a probe against one index; at most two unidirectional cursor walks.
pub(crate) fn execute(
    env: &KvEnv,
    rtxn: &RoTxn<'_>,
    descriptor: &IndexDescriptor,
    prop_type: PropertyType,
    probe: &IndexProbe<'_>,
) -> Result<Vec<RecordId>> {
    let stores = open_stores(env, rtxn, descriptor)?;
    match probe {
        IndexProbe::Equal(value) => equal(&stores, rtxn, descriptor, prop_type, value),
        IndexProbe::Less { value, or_eq } => less(&stores, rtxn, prop_type, value, *or_eq),
        IndexProbe::Greater { value, or_eq } => greater(&stores, rtxn, prop_type, value, *or_eq),
        IndexProbe::Between {
            lower,
            upper,
            include,
        } => between(&stores, rtxn, prop_type, lower, upper, *include),
        IndexProbe::In(values) => {
            let mut seen = std::collections::HashSet::new();
            let mut result = Vec::new();
            for value in values.iter() {
                let key = normalise_key(value, prop_type)?;
                if !seen.insert(key.clone()) {
                    continue;
                }
                result.extend(equal(&stores, rtxn, descriptor, prop_type, value)?);
            }
            Ok(result)
        }
    }
}

fn equal(
    stores: &IndexStores,
    rtxn: &RoTxn<'_>,
    descriptor: &IndexDescriptor,
    prop_type: PropertyType,
    value: &Bytes,
) -> Result<Vec<RecordId>> {
    let key = normalise_key(value, prop_type)?;
    let (store, raw) = stores.select(&key);
    if descriptor.unique {
        return Ok(match store.get(rtxn, &raw)? {
            Some(entry) => vec![decode_entry(entry)?],
            None => Vec::new(),
        });
    }
    let mut result = Vec::new();
    kv::scan_prefix(store, rtxn, &raw, |entry_key, entry| {
        if entry_key != raw.as_slice() {
            return Ok(false);
        }
        result.push(decode_entry(entry)?);
        Ok(true)
    })?;
    Ok(result)
}

fn collect_range(
    store: Store,
    rtxn: &RoTxn<'_>,
    lower: Bound<&[u8]>,
    upper: Bound<&[u8]>,
) -> Result<Vec<RecordId>> {
    let mut result = Vec::new();
    kv::scan_range(store, rtxn, lower, upper, |_, entry| {
        result.push(decode_entry(entry)?);
        Ok(true)
    })?;
    Ok(result)
}

fn collect_all(store: Store, rtxn: &RoTxn<'_>) -> Result<Vec<RecordId>> {
    collect_range(store, rtxn, Bound::Unbounded, Bound::Unbounded)
}

fn bound(raw: &[u8], include: bool) -> Bound<&[u8]> {
    if include {
        Bound::Included(raw)
    } else {
        Bound::Excluded(raw)
    }
}

fn less(
    stores: &IndexStores,
    rtxn: &RoTxn<'_>,
    prop_type: PropertyType,
    value: &Bytes,
    or_eq: bool,
) -> Result<Vec<RecordId>> {
    if prop_type.is_signed_integer() {
        let v = signed_value(value, prop_type)?;
        if v < 0 {
            // strictly smaller negatives have strictly larger magnitudes
            let magnitude = v.unsigned_abs().to_be_bytes();
            return collect_range(
                stores.negative,
                rtxn,
                bound(&magnitude, or_eq),
                Bound::Unbounded,
            );
        }
        let key = (v as u64).to_be_bytes();
        let mut result = collect_all(stores.negative, rtxn)?;
        result.extend(collect_range(
            stores.positive,
            rtxn,
            Bound::Unbounded,
            bound(&key, or_eq),
        )?);
        return Ok(result);
    }
    let key = match normalise_key(value, prop_type)? {
        IndexKey::Positive(raw) => raw,
        IndexKey::Negative(_) => unreachable!("only signed integers split by sign"),
    };
    collect_range(stores.positive, rtxn, Bound::Unbounded, bound(&key, or_eq))
}

fn greater(
    stores: &IndexStores,
    rtxn: &RoTxn<'_>,
    prop_type: PropertyType,
    value: &Bytes,
    or_eq: bool,
) -> Result<Vec<RecordId>> {
    if prop_type.is_signed_integer() {
        let v = signed_value(value, prop_type)?;
        if v < 0 {
            // strictly larger negatives have strictly smaller magnitudes
            let magnitude = v.unsigned_abs().to_be_bytes();
            let mut result = collect_range(
                stores.negative,
                rtxn,
                Bound::Unbounded,
                bound(&magnitude, or_eq),
            )?;
            result.extend(collect_all(stores.positive, rtxn)?);
            return Ok(result);
        }
        let key = (v as u64).to_be_bytes();
        return collect_range(stores.positive, rtxn, bound(&key, or_eq), Bound::Unbounded);
    }
    let key = match normalise_key(value, prop_type)? {
        IndexKey::Positive(raw) => raw,
        IndexKey::Negative(_) => unreachable!("only signed integers split by sign"),
    };
    collect_range(stores.positive, rtxn, bound(&key, or_eq), Bound::Unbounded)
}

fn between(
    stores: &IndexStores,
    rtxn: &RoTxn<'_>,
    prop_type: PropertyType,
    lower: &Bytes,
    upper: &Bytes,
    include: (bool, bool),
) -> Result<Vec<RecordId>> {
    if prop_type.is_signed_integer() {
        let lo = signed_value(lower, prop_type)?;
        let hi = signed_value(upper, prop_type)?;
        if hi < lo {
            return Ok(Vec::new());
        }
        if hi < 0 {
            // both bounds negative: the magnitude order reverses the bounds
            let lo_mag = lo.unsigned_abs().to_be_bytes();
            let hi_mag = hi.unsigned_abs().to_be_bytes();
            return collect_range(
                stores.negative,
                rtxn,
                bound(&hi_mag, include.1),
                bound(&lo_mag, include.0),
            );
        }
        if lo < 0 {
            let lo_mag = lo.unsigned_abs().to_be_bytes();
            let hi_key = (hi as u64).to_be_bytes();
            let mut result = collect_range(
                stores.negative,
                rtxn,
                Bound::Unbounded,
                bound(&lo_mag, include.0),
            )?;
            result.extend(collect_range(
                stores.positive,
                rtxn,
                Bound::Unbounded,
                bound(&hi_key, include.1),
            )?);
            return Ok(result);
        }
        let lo_key = (lo as u64).to_be_bytes();
        let hi_key = (hi as u64).to_be_bytes();
        return collect_range(
            stores.positive,
            rtxn,
            bound(&lo_key, include.0),
            bound(&hi_key, include.1),
        );
    }
    let lo_key = match normalise_key(lower, prop_type)? {
        IndexKey::Positive(raw) => raw,
        IndexKey::Negative(_) => unreachable!("only signed integers split by sign"),
    };
    let hi_key = match normalise_key(upper, prop_type)? {
        IndexKey::Positive(raw) => raw,
        IndexKey::Negative(_) => unreachable!("only signed integers split by sign"),
    };
    collect_range(
        stores.positive,
        rtxn,
        bound(&lo_key, include.0),
        bound(&hi_key, include.1),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_bits_preserve_order() {
        let values = [-1000.5, -1.0, -0.25, 0.0, 0.25, 1.0, 24.5, 1000.5];
        for window in values.windows(2) {
            assert!(ordered_real_bits(window[0]) < ordered_real_bits(window[1]));
        }
    }

    #[test]
    fn signed_keys_split_by_sign() {
        let negative = normalise_key(&Bytes::from(-5i32), PropertyType::Integer).unwrap();
        assert_eq!(negative, IndexKey::Negative(5u64.to_be_bytes().to_vec()));
        let positive = normalise_key(&Bytes::from(5i32), PropertyType::Integer).unwrap();
        assert_eq!(positive, IndexKey::Positive(5u64.to_be_bytes().to_vec()));
    }

    #[test]
    fn blob_is_not_indexable() {
        let err = normalise_key(&Bytes::from(vec![1u8, 2]), PropertyType::Blob).unwrap_err();
        assert!(matches!(err, TenebraError::ConflictPropertyType(_)));
    }

    #[test]
    fn width_mismatch_is_a_conversion_error() {
        let err = normalise_key(&Bytes::from(5i64), PropertyType::Integer).unwrap_err();
        assert!(matches!(err, TenebraError::Conversion(_)));
    }
}
