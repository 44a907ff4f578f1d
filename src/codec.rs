//! Per-record binary layout: property-id framed blocks, preceded for edges
//! by a fixed vertex-endpoint prefix.
//!
//! Each block is `propertyId (u16 LE)` followed by a 1- or 4-byte size tag
//! and the raw value. When the low bit of the first size byte is 0 the
//! remaining 7 bits hold the length (0..=127); otherwise the four bytes form
//! a `u32 LE` word whose upper 31 bits hold the length.

use std::collections::{BTreeMap, HashMap};

use crate::error::{Result, TenebraError};
use crate::model::{
    Bytes, ClassId, PositionId, PropertyDescriptor, PropertyId, Record, RecordId,
};

/// Length of the `(src classId, src position, dst classId, dst position)`
/// prefix stored at the head of every edge payload.
pub(crate) const ENDPOINT_PREFIX_LEN: usize = 16;

const SHORT_VALUE_MAX: usize = 0x7F;
const LONG_VALUE_MAX: usize = (u32::MAX >> 1) as usize;

/// Encodes the user properties of `record` into a property-block payload.
/// Property names are resolved against `properties` (the class's full name
/// map, inherited properties included); unknown names are rejected.
pub(crate) fn encode_record(
    record: &Record,
    properties: &BTreeMap<String, PropertyDescriptor>,
) -> Result<Vec<u8>> {
    let mut payload = Vec::new();
    for (name, value) in record.user_properties() {
        let descriptor = properties
            .get(name)
            .ok_or_else(|| TenebraError::NoSuchProperty(name.clone()))?;
        append_block(&mut payload, descriptor.id, value.as_slice())?;
    }
    Ok(payload)
}

fn append_block(payload: &mut Vec<u8>, id: PropertyId, value: &[u8]) -> Result<()> {
    payload.extend_from_slice(&id.0.to_le_bytes());
    if value.len() <= SHORT_VALUE_MAX {
        payload.push((value.len() as u8) << 1);
    } else if value.len() <= LONG_VALUE_MAX {
        let word = ((value.len() as u32) << 1) | 0x1;
        payload.extend_from_slice(&word.to_le_bytes());
    } else {
        return Err(TenebraError::Conversion(format!(
            "property value of {} bytes exceeds the block size limit",
            value.len()
        )));
    }
    payload.extend_from_slice(value);
    Ok(())
}

/// Decodes a property-block payload back into a record. Blocks whose
/// property id is no longer declared are skipped, which keeps rows written
/// before a property drop readable.
pub(crate) fn parse_record(
    raw: &[u8],
    properties: &HashMap<PropertyId, PropertyDescriptor>,
    is_edge: bool,
) -> Result<Record> {
    let mut record = Record::new();
    let mut offset = if is_edge { ENDPOINT_PREFIX_LEN } else { 0 };
    if is_edge && raw.len() < ENDPOINT_PREFIX_LEN {
        return Err(TenebraError::Corruption(
            "edge payload shorter than the endpoint prefix".into(),
        ));
    }
    while offset < raw.len() {
        let id = PropertyId(read_u16(raw, &mut offset)?);
        let tag = *raw
            .get(offset)
            .ok_or_else(|| TenebraError::Corruption("property block truncated".into()))?;
        let size = if tag & 0x1 == 0 {
            offset += 1;
            (tag >> 1) as usize
        } else {
            (read_u32(raw, &mut offset)? >> 1) as usize
        };
        if offset + size > raw.len() {
            return Err(TenebraError::Corruption("property value truncated".into()));
        }
        if let Some(descriptor) = properties.get(&id) {
            record.set(
                descriptor.name.clone(),
                Bytes::from_raw(&raw[offset..offset + size]),
            );
        }
        offset += size;
    }
    Ok(record)
}

/// Builds the 16-byte endpoint prefix of an edge payload.
pub(crate) fn encode_endpoints(src: RecordId, dst: RecordId) -> [u8; ENDPOINT_PREFIX_LEN] {
    let mut prefix = [0u8; ENDPOINT_PREFIX_LEN];
    prefix[0..4].copy_from_slice(&u32::from(src.class_id.0).to_le_bytes());
    prefix[4..8].copy_from_slice(&src.position.0.to_le_bytes());
    prefix[8..12].copy_from_slice(&u32::from(dst.class_id.0).to_le_bytes());
    prefix[12..16].copy_from_slice(&dst.position.0.to_le_bytes());
    prefix
}

/// Decodes the endpoint prefix in declaration order: source class id,
/// source position, destination class id, destination position.
pub(crate) fn decode_endpoints(raw: &[u8]) -> Result<(RecordId, RecordId)> {
    if raw.len() < ENDPOINT_PREFIX_LEN {
        return Err(TenebraError::Corruption(
            "edge payload shorter than the endpoint prefix".into(),
        ));
    }
    let mut offset = 0usize;
    let src_class = read_u32(raw, &mut offset)?;
    let src_position = read_u32(raw, &mut offset)?;
    let dst_class = read_u32(raw, &mut offset)?;
    let dst_position = read_u32(raw, &mut offset)?;
    let narrow = |value: u32| -> Result<ClassId> {
        u16::try_from(value)
            .map(ClassId)
            .map_err(|_| TenebraError::Corruption("endpoint class id out of range".into()))
    };
    Ok((
        RecordId::new(narrow(src_class)?, PositionId(src_position)),
        RecordId::new(narrow(dst_class)?, PositionId(dst_position)),
    ))
}

fn read_u16(raw: &[u8], offset: &mut usize) -> Result<u16> {
    let end = *offset + 2;
    let bytes = raw
        .get(*offset..end)
        .ok_or_else(|| TenebraError::Corruption("property block truncated".into()))?;
    *offset = end;
    Ok(u16::from_le_bytes(bytes.try_into().expect("slice has exactly 2 bytes")))
}

fn read_u32(raw: &[u8], offset: &mut usize) -> Result<u32> {
    let end = *offset + 4;
    let bytes = raw
        .get(*offset..end)
        .ok_or_else(|| TenebraError::Corruption("payload truncated".into()))?;
    *offset = end;
    Ok(u32::from_le_bytes(bytes.try_into().expect("slice has exactly 4 bytes")))
}
