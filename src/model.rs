use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Result, TenebraError};

/// Stable identifier of a class within one database.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct ClassId(pub u16);
/// Identifier of a property, unique within a class's inheritance chain.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct PropertyId(pub u16);
/// Identifier of a secondary index.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct IndexId(pub u32);
/// Position of a record inside its class store. Position 0 is reserved for
/// the allocation counter and never addresses a live record.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct PositionId(pub u32);

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Address of a record: `(classId, positionId)`.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct RecordId {
    pub class_id: ClassId,
    pub position: PositionId,
}

impl RecordId {
    pub fn new(class_id: ClassId, position: PositionId) -> Self {
        Self { class_id, position }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.class_id.0, self.position.0)
    }
}

/// A record address plus the traversal depth at which it was reached.
/// Depth is 0 outside traversal results.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct RecordDescriptor {
    pub rid: RecordId,
    pub depth: u32,
}

impl RecordDescriptor {
    pub fn new(rid: RecordId) -> Self {
        Self { rid, depth: 0 }
    }

    pub(crate) fn at_depth(rid: RecordId, depth: u32) -> Self {
        Self { rid, depth }
    }
}

impl From<RecordId> for RecordDescriptor {
    fn from(rid: RecordId) -> Self {
        Self::new(rid)
    }
}

/// Kind of a class: vertex classes hold graph nodes, edge classes hold
/// endpoint-carrying relations.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ClassKind {
    Vertex,
    Edge,
}

impl ClassKind {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            ClassKind::Vertex => 1,
            ClassKind::Edge => 2,
        }
    }

    pub(crate) fn from_u8(byte: u8) -> Result<Self> {
        match byte {
            1 => Ok(ClassKind::Vertex),
            2 => Ok(ClassKind::Edge),
            other => Err(TenebraError::Corruption(format!(
                "unknown class kind: 0x{other:02X}"
            ))),
        }
    }
}

/// Declared type of a property value. Encodings are fixed-width
/// little-endian for numerics, IEEE-754 for `Real`, raw UTF-8 for `Text`
/// and opaque bytes for `Blob`.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum PropertyType {
    TinyInt,
    UnsignedTinyInt,
    SmallInt,
    UnsignedSmallInt,
    Integer,
    UnsignedInteger,
    BigInt,
    UnsignedBigInt,
    Real,
    Text,
    Blob,
}

impl PropertyType {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            PropertyType::TinyInt => 1,
            PropertyType::UnsignedTinyInt => 2,
            PropertyType::SmallInt => 3,
            PropertyType::UnsignedSmallInt => 4,
            PropertyType::Integer => 5,
            PropertyType::UnsignedInteger => 6,
            PropertyType::BigInt => 7,
            PropertyType::UnsignedBigInt => 8,
            PropertyType::Real => 9,
            PropertyType::Text => 10,
            PropertyType::Blob => 11,
        }
    }

    pub(crate) fn from_u8(byte: u8) -> Result<Self> {
        Ok(match byte {
            1 => PropertyType::TinyInt,
            2 => PropertyType::UnsignedTinyInt,
            3 => PropertyType::SmallInt,
            4 => PropertyType::UnsignedSmallInt,
            5 => PropertyType::Integer,
            6 => PropertyType::UnsignedInteger,
            7 => PropertyType::BigInt,
            8 => PropertyType::UnsignedBigInt,
            9 => PropertyType::Real,
            10 => PropertyType::Text,
            11 => PropertyType::Blob,
            other => {
                return Err(TenebraError::Corruption(format!(
                    "unknown property type: 0x{other:02X}"
                )))
            }
        })
    }

    /// True for the signed integer family.
    pub fn is_signed_integer(self) -> bool {
        matches!(
            self,
            PropertyType::TinyInt
                | PropertyType::SmallInt
                | PropertyType::Integer
                | PropertyType::BigInt
        )
    }

    /// True for the unsigned integer family.
    pub fn is_unsigned_integer(self) -> bool {
        matches!(
            self,
            PropertyType::UnsignedTinyInt
                | PropertyType::UnsignedSmallInt
                | PropertyType::UnsignedInteger
                | PropertyType::UnsignedBigInt
        )
    }
}

/// Schema descriptor of a class.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ClassDescriptor {
    pub id: ClassId,
    pub name: String,
    pub kind: ClassKind,
    pub super_class: Option<ClassId>,
}

/// Schema descriptor of a property.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct PropertyDescriptor {
    pub id: PropertyId,
    pub class_id: ClassId,
    pub name: String,
    pub prop_type: PropertyType,
}

/// Schema descriptor of a secondary index on one `(class, property)` pair.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct IndexDescriptor {
    pub id: IndexId,
    pub class_id: ClassId,
    pub property_id: PropertyId,
    pub unique: bool,
}

/// Summary of an open database.
#[derive(Clone, Debug)]
pub struct DbInfo {
    pub path: std::path::PathBuf,
    pub max_databases: u32,
    pub max_size: u64,
    pub num_classes: usize,
    pub num_properties: usize,
    pub num_indexes: usize,
}

/// Derived field carrying the class name of a fetched record.
pub const CLASS_NAME_FIELD: &str = "@className";
/// Derived field carrying the string form of the record id.
pub const RECORD_ID_FIELD: &str = "@recordId";
/// Derived field carrying the traversal depth of a fetched record.
pub const DEPTH_FIELD: &str = "@depth";

/// A typed property value as raw bytes. Empty bytes denote null.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default, Debug)]
pub struct Bytes(Vec<u8>);

macro_rules! bytes_from_le {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Bytes {
            fn from(value: $ty) -> Self {
                Bytes(value.to_le_bytes().to_vec())
            }
        })*
    };
}

bytes_from_le!(i8, u8, i16, u16, i32, u32, i64, u64, f64);

impl From<&str> for Bytes {
    fn from(value: &str) -> Self {
        Bytes(value.as_bytes().to_vec())
    }
}

impl From<String> for Bytes {
    fn from(value: String) -> Self {
        Bytes(value.into_bytes())
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(value: Vec<u8>) -> Self {
        Bytes(value)
    }
}

macro_rules! bytes_to_le {
    ($($name:ident -> $ty:ty),*) => {
        $(pub fn $name(&self) -> Result<$ty> {
            let width = std::mem::size_of::<$ty>();
            let bytes: [u8; std::mem::size_of::<$ty>()] =
                self.0.as_slice().try_into().map_err(|_| {
                    TenebraError::Conversion(format!(
                        "expected {width} bytes, found {}",
                        self.0.len()
                    ))
                })?;
            Ok(<$ty>::from_le_bytes(bytes))
        })*
    };
}

impl Bytes {
    pub fn empty() -> Self {
        Bytes(Vec::new())
    }

    pub(crate) fn from_raw(raw: &[u8]) -> Self {
        Bytes(raw.to_vec())
    }

    pub fn is_null(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    bytes_to_le!(
        to_i8 -> i8,
        to_u8 -> u8,
        to_i16 -> i16,
        to_u16 -> u16,
        to_i32 -> i32,
        to_u32 -> u32,
        to_i64 -> i64,
        to_u64 -> u64,
        to_f64 -> f64
    );

    /// Interprets the payload as UTF-8 text. Null yields the empty string.
    pub fn to_text(&self) -> Result<String> {
        String::from_utf8(self.0.clone())
            .map_err(|_| TenebraError::Conversion("payload is not valid UTF-8".into()))
    }

    pub fn to_blob(&self) -> Vec<u8> {
        self.0.clone()
    }
}

/// An instance of a class: an ordered mapping from property name to typed
/// value. Names beginning with `@` are derived basic fields materialised at
/// read time and are never written to disk.
#[derive(Clone, PartialEq, Default, Debug)]
pub struct Record {
    properties: BTreeMap<String, Bytes>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style property assignment.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Bytes>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Bytes>) -> &mut Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn unset(&mut self, name: &str) -> Option<Bytes> {
        self.properties.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Bytes> {
        self.properties.get(name)
    }

    /// True when the property is absent or holds an explicit null.
    pub fn is_null(&self, name: &str) -> bool {
        self.properties.get(name).map_or(true, Bytes::is_null)
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Bytes)> {
        self.properties.iter()
    }

    /// Iterates user properties only, skipping derived `@` fields.
    pub fn user_properties(&self) -> impl Iterator<Item = (&String, &Bytes)> {
        self.properties
            .iter()
            .filter(|(name, _)| !name.starts_with('@'))
    }

    pub(crate) fn set_basic(&mut self, name: &str, value: Bytes) {
        self.properties.insert(name.to_string(), value);
    }

    /// Class name injected at read time, if present.
    pub fn class_name(&self) -> Option<String> {
        self.properties
            .get(CLASS_NAME_FIELD)
            .and_then(|b| b.to_text().ok())
    }

    /// String form of the record id injected at read time, if present.
    pub fn record_id(&self) -> Option<String> {
        self.properties
            .get(RECORD_ID_FIELD)
            .and_then(|b| b.to_text().ok())
    }

    /// Traversal depth injected by the traversal operations, if present.
    pub fn depth(&self) -> Option<u32> {
        self.properties.get(DEPTH_FIELD).and_then(|b| b.to_u32().ok())
    }
}

/// One query result: the record address plus its materialised record.
#[derive(Clone, PartialEq, Debug)]
pub struct RecordResult {
    pub descriptor: RecordDescriptor,
    pub record: Record,
}

/// Materialised query result set.
pub type ResultSet = Vec<RecordResult>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_numeric_round_trip() {
        assert_eq!(Bytes::from(42i32).to_i32().unwrap(), 42);
        assert_eq!(Bytes::from(-7i8).to_i8().unwrap(), -7);
        assert_eq!(Bytes::from(u64::MAX).to_u64().unwrap(), u64::MAX);
        assert_eq!(Bytes::from(24.5f64).to_f64().unwrap(), 24.5);
    }

    #[test]
    fn bytes_size_mismatch_fails() {
        assert!(Bytes::from(1i16).to_i64().is_err());
        assert!(Bytes::empty().to_i32().is_err());
    }

    #[test]
    fn null_text_is_empty_string() {
        assert_eq!(Bytes::empty().to_text().unwrap(), "");
    }

    #[test]
    fn record_skips_derived_fields() {
        let mut record = Record::new().with("title", "HP");
        record.set_basic(CLASS_NAME_FIELD, Bytes::from("books"));
        let user: Vec<_> = record.user_properties().map(|(n, _)| n.clone()).collect();
        assert_eq!(user, vec!["title".to_string()]);
        assert_eq!(record.class_name().as_deref(), Some("books"));
    }

    #[test]
    fn rid_display() {
        let rid = RecordId::new(ClassId(3), PositionId(12));
        assert_eq!(rid.to_string(), "3:12");
    }
}
