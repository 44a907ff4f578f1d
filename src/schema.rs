//! Schema catalog: class, property and index descriptors.
//!
//! The catalog lives in two places that are kept in lockstep: the
//! `.classes` / `.properties` / `.indexes` stores inside the key/value
//! environment, and an in-memory [`Catalog`] loaded at context open. Readers
//! borrow an immutable snapshot; the single writer mutates a shadow copy and
//! writes every change through to the stores inside its own transaction, so
//! an abort discards both sides at once.

use std::collections::{BTreeMap, HashMap, HashSet};

use heed3::{RoTxn, RwTxn};

use crate::error::{Result, TenebraError};
use crate::kv::{KvEnv, Store, StoreKind};
use crate::model::{
    ClassDescriptor, ClassId, ClassKind, IndexDescriptor, IndexId, PropertyDescriptor,
    PropertyId, PropertyType,
};

pub(crate) const CLASSES_STORE: &str = ".classes";
pub(crate) const PROPERTIES_STORE: &str = ".properties";
pub(crate) const INDEXES_STORE: &str = ".indexes";

/// Property ids 0 and 1 are reserved for the implicit `@className` and
/// `@recordId` fields; declared properties start here.
const FIRST_PROPERTY_ID: u16 = 2;

const CLASS_COUNTER_KEY: [u8; 2] = [0, 0];
const INDEX_COUNTER_KEY: [u8; 4] = [0, 0, 0, 0];

/// Handles of the three fixed catalog stores.
#[derive(Copy, Clone)]
pub(crate) struct CatalogStores {
    pub classes: Store,
    pub properties: Store,
    pub indexes: Store,
}

impl CatalogStores {
    pub(crate) fn create(env: &KvEnv, wtxn: &mut RwTxn) -> Result<Self> {
        Ok(Self {
            classes: env.create_store(wtxn, CLASSES_STORE, StoreKind::Plain)?,
            properties: env.create_store(wtxn, PROPERTIES_STORE, StoreKind::Plain)?,
            indexes: env.create_store(wtxn, INDEXES_STORE, StoreKind::Plain)?,
        })
    }

    pub(crate) fn put_class(&self, wtxn: &mut RwTxn, descriptor: &ClassDescriptor) -> Result<()> {
        self.classes.put(
            wtxn,
            &descriptor.id.0.to_be_bytes(),
            &encode_class_row(descriptor),
        )?;
        Ok(())
    }

    pub(crate) fn delete_class(&self, wtxn: &mut RwTxn, id: ClassId) -> Result<()> {
        self.classes.delete(wtxn, &id.0.to_be_bytes())?;
        Ok(())
    }

    pub(crate) fn put_property(
        &self,
        wtxn: &mut RwTxn,
        descriptor: &PropertyDescriptor,
    ) -> Result<()> {
        self.properties.put(
            wtxn,
            &property_key(descriptor.class_id, descriptor.id),
            &encode_property_row(descriptor),
        )?;
        Ok(())
    }

    pub(crate) fn delete_property(
        &self,
        wtxn: &mut RwTxn,
        class_id: ClassId,
        id: PropertyId,
    ) -> Result<()> {
        self.properties.delete(wtxn, &property_key(class_id, id))?;
        Ok(())
    }

    pub(crate) fn put_index(&self, wtxn: &mut RwTxn, descriptor: &IndexDescriptor) -> Result<()> {
        self.indexes.put(
            wtxn,
            &descriptor.id.0.to_be_bytes(),
            &encode_index_row(descriptor),
        )?;
        Ok(())
    }

    pub(crate) fn delete_index(&self, wtxn: &mut RwTxn, id: IndexId) -> Result<()> {
        self.indexes.delete(wtxn, &id.0.to_be_bytes())?;
        Ok(())
    }

    pub(crate) fn put_counters(&self, wtxn: &mut RwTxn, catalog: &Catalog) -> Result<()> {
        self.classes.put(
            wtxn,
            &CLASS_COUNTER_KEY,
            &catalog.next_class_id.to_le_bytes(),
        )?;
        self.indexes.put(
            wtxn,
            &INDEX_COUNTER_KEY,
            &catalog.next_index_id.to_le_bytes(),
        )?;
        Ok(())
    }
}

/// In-memory image of the schema, cheap to clone for shadow mutation.
#[derive(Clone, Debug)]
pub(crate) struct Catalog {
    classes: BTreeMap<ClassId, ClassDescriptor>,
    by_name: HashMap<String, ClassId>,
    properties: BTreeMap<ClassId, BTreeMap<PropertyId, PropertyDescriptor>>,
    indexes: BTreeMap<IndexId, IndexDescriptor>,
    index_by_target: HashMap<(ClassId, PropertyId), IndexId>,
    next_class_id: u16,
    next_index_id: u32,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            classes: BTreeMap::new(),
            by_name: HashMap::new(),
            properties: BTreeMap::new(),
            indexes: BTreeMap::new(),
            index_by_target: HashMap::new(),
            next_class_id: 1,
            next_index_id: 1,
        }
    }
}

impl Catalog {
    /// Rebuilds the catalog from the fixed stores.
    pub(crate) fn load(stores: &CatalogStores, rtxn: &RoTxn<'_>) -> Result<Self> {
        let mut catalog = Catalog::default();

        for entry in stores.classes.iter(rtxn)? {
            let (key, value) = entry?;
            if key == CLASS_COUNTER_KEY {
                catalog.next_class_id = decode_u16_le(value)?;
                continue;
            }
            let id = ClassId(decode_u16_be(key)?);
            catalog.insert_class(decode_class_row(id, value)?);
        }

        for entry in stores.properties.iter(rtxn)? {
            let (key, value) = entry?;
            let (class_id, id) = decode_property_key(key)?;
            catalog.insert_property(decode_property_row(class_id, id, value)?);
        }

        for entry in stores.indexes.iter(rtxn)? {
            let (key, value) = entry?;
            if key == INDEX_COUNTER_KEY {
                catalog.next_index_id = decode_u32_le(value)?;
                continue;
            }
            let id = IndexId(decode_u32_be(key)?);
            catalog.insert_index(decode_index_row(id, value)?);
        }

        Ok(catalog)
    }

    // ---- id allocation -------------------------------------------------

    pub(crate) fn alloc_class_id(&mut self) -> Result<ClassId> {
        if self.next_class_id == u16::MAX {
            return Err(TenebraError::Corruption("class id space exhausted".into()));
        }
        let id = ClassId(self.next_class_id);
        self.next_class_id += 1;
        Ok(id)
    }

    pub(crate) fn alloc_index_id(&mut self) -> Result<IndexId> {
        if self.next_index_id == u32::MAX {
            return Err(TenebraError::Corruption("index id space exhausted".into()));
        }
        let id = IndexId(self.next_index_id);
        self.next_index_id += 1;
        Ok(id)
    }

    /// Allocates a property id that is fresh across the whole inheritance
    /// chain of `class_id` — ancestors and subtree alike — so that inherited
    /// id spaces never collide.
    pub(crate) fn alloc_property_id(&self, class_id: ClassId) -> PropertyId {
        let mut max_seen = FIRST_PROPERTY_ID - 1;
        let mut related: Vec<ClassId> = self.resolve_subclasses(class_id);
        let mut cursor = self.classes.get(&class_id).and_then(|c| c.super_class);
        while let Some(ancestor) = cursor {
            related.push(ancestor);
            cursor = self.classes.get(&ancestor).and_then(|c| c.super_class);
        }
        for cid in related {
            if let Some(declared) = self.properties.get(&cid) {
                for id in declared.keys() {
                    max_seen = max_seen.max(id.0);
                }
            }
        }
        PropertyId(max_seen + 1)
    }

    // ---- class lookups -------------------------------------------------

    pub(crate) fn class(&self, id: ClassId) -> Option<&ClassDescriptor> {
        self.classes.get(&id)
    }

    pub(crate) fn class_by_name(&self, name: &str) -> Option<&ClassDescriptor> {
        self.by_name.get(name).and_then(|id| self.classes.get(id))
    }

    pub(crate) fn classes(&self) -> impl Iterator<Item = &ClassDescriptor> {
        self.classes.values()
    }

    pub(crate) fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub(crate) fn property_count(&self) -> usize {
        self.properties.values().map(BTreeMap::len).sum()
    }

    pub(crate) fn index_count(&self) -> usize {
        self.indexes.len()
    }

    pub(crate) fn direct_subclasses(&self, id: ClassId) -> Vec<ClassId> {
        self.classes
            .values()
            .filter(|c| c.super_class == Some(id))
            .map(|c| c.id)
            .collect()
    }

    /// The class itself plus every transitive subclass.
    pub(crate) fn resolve_subclasses(&self, id: ClassId) -> Vec<ClassId> {
        let mut extent = vec![id];
        let mut cursor = 0;
        while cursor < extent.len() {
            let current = extent[cursor];
            cursor += 1;
            extent.extend(self.direct_subclasses(current));
        }
        extent
    }

    // ---- property lookups ----------------------------------------------

    /// Full property table of a class, inherited properties included.
    /// Resolution is bottom-up: a subclass declaration wins over an
    /// ancestor's property of the same name.
    pub(crate) fn property_name_map(
        &self,
        class_id: ClassId,
    ) -> BTreeMap<String, PropertyDescriptor> {
        let mut map = BTreeMap::new();
        let mut cursor = Some(class_id);
        while let Some(cid) = cursor {
            if let Some(declared) = self.properties.get(&cid) {
                for descriptor in declared.values() {
                    map.entry(descriptor.name.clone())
                        .or_insert_with(|| descriptor.clone());
                }
            }
            cursor = self.classes.get(&cid).and_then(|c| c.super_class);
        }
        map
    }

    /// Property table keyed by id, for payload decoding.
    pub(crate) fn property_id_map(
        &self,
        class_id: ClassId,
    ) -> HashMap<PropertyId, PropertyDescriptor> {
        let mut map = HashMap::new();
        let mut cursor = Some(class_id);
        while let Some(cid) = cursor {
            if let Some(declared) = self.properties.get(&cid) {
                for descriptor in declared.values() {
                    map.entry(descriptor.id)
                        .or_insert_with(|| descriptor.clone());
                }
            }
            cursor = self.classes.get(&cid).and_then(|c| c.super_class);
        }
        map
    }

    /// Resolves a property name through the inheritance chain, nearest
    /// declaration first.
    pub(crate) fn resolve_property(
        &self,
        class_id: ClassId,
        name: &str,
    ) -> Option<&PropertyDescriptor> {
        let mut cursor = Some(class_id);
        while let Some(cid) = cursor {
            if let Some(found) = self
                .properties
                .get(&cid)
                .and_then(|declared| declared.values().find(|p| p.name == name))
            {
                return Some(found);
            }
            cursor = self.classes.get(&cid).and_then(|c| c.super_class);
        }
        None
    }

    pub(crate) fn declared_properties(&self, class_id: ClassId) -> Vec<PropertyDescriptor> {
        self.properties
            .get(&class_id)
            .map(|declared| declared.values().cloned().collect())
            .unwrap_or_default()
    }

    // ---- index lookups -------------------------------------------------

    /// Looks up the index serving `property_id` for `class_id`, walking the
    /// ancestor chain: an index created on a superclass also covers the
    /// records of its subclasses.
    pub(crate) fn index_for(
        &self,
        class_id: ClassId,
        property_id: PropertyId,
    ) -> Option<&IndexDescriptor> {
        let mut cursor = Some(class_id);
        while let Some(cid) = cursor {
            if let Some(index_id) = self.index_by_target.get(&(cid, property_id)) {
                return self.indexes.get(index_id);
            }
            cursor = self.classes.get(&cid).and_then(|c| c.super_class);
        }
        None
    }

    /// Indexes declared directly on `class_id`.
    pub(crate) fn indexes_of(&self, class_id: ClassId) -> Vec<IndexDescriptor> {
        self.indexes
            .values()
            .filter(|i| i.class_id == class_id)
            .cloned()
            .collect()
    }

    /// Every index that applies to records of `class_id`, paired with the
    /// indexed property. Includes indexes inherited from ancestors.
    pub(crate) fn applicable_indexes(
        &self,
        class_id: ClassId,
    ) -> Vec<(IndexDescriptor, PropertyDescriptor)> {
        let ids = self.property_id_map(class_id);
        let mut result = Vec::new();
        for (property_id, property) in &ids {
            if let Some(index) = self.index_for(class_id, *property_id) {
                result.push((index.clone(), property.clone()));
            }
        }
        result
    }

    /// True when any index in the subtree of `class_id` references the
    /// property. Guards property removal.
    pub(crate) fn property_is_indexed(&self, class_id: ClassId, property_id: PropertyId) -> bool {
        let subtree: HashSet<ClassId> = self.resolve_subclasses(class_id).into_iter().collect();
        self.indexes
            .values()
            .any(|i| i.property_id == property_id && subtree.contains(&i.class_id))
    }

    // ---- mutation ------------------------------------------------------

    pub(crate) fn insert_class(&mut self, descriptor: ClassDescriptor) {
        self.by_name.insert(descriptor.name.clone(), descriptor.id);
        self.classes.insert(descriptor.id, descriptor);
    }

    pub(crate) fn rename_class(&mut self, id: ClassId, new_name: &str) {
        if let Some(descriptor) = self.classes.get_mut(&id) {
            self.by_name.remove(&descriptor.name);
            descriptor.name = new_name.to_string();
            self.by_name.insert(new_name.to_string(), id);
        }
    }

    pub(crate) fn remove_class(&mut self, id: ClassId) {
        if let Some(descriptor) = self.classes.remove(&id) {
            self.by_name.remove(&descriptor.name);
        }
        self.properties.remove(&id);
        let removed: Vec<IndexId> = self
            .indexes
            .values()
            .filter(|i| i.class_id == id)
            .map(|i| i.id)
            .collect();
        for index_id in removed {
            self.remove_index(index_id);
        }
    }

    pub(crate) fn insert_property(&mut self, descriptor: PropertyDescriptor) {
        self.properties
            .entry(descriptor.class_id)
            .or_default()
            .insert(descriptor.id, descriptor);
    }

    pub(crate) fn rename_property(&mut self, class_id: ClassId, id: PropertyId, new_name: &str) {
        if let Some(descriptor) = self
            .properties
            .get_mut(&class_id)
            .and_then(|declared| declared.get_mut(&id))
        {
            descriptor.name = new_name.to_string();
        }
    }

    pub(crate) fn remove_property(&mut self, class_id: ClassId, id: PropertyId) {
        if let Some(declared) = self.properties.get_mut(&class_id) {
            declared.remove(&id);
        }
    }

    pub(crate) fn insert_index(&mut self, descriptor: IndexDescriptor) {
        self.index_by_target
            .insert((descriptor.class_id, descriptor.property_id), descriptor.id);
        self.indexes.insert(descriptor.id, descriptor);
    }

    pub(crate) fn remove_index(&mut self, id: IndexId) {
        if let Some(descriptor) = self.indexes.remove(&id) {
            self.index_by_target
                .remove(&(descriptor.class_id, descriptor.property_id));
        }
    }
}

// ---- row codecs --------------------------------------------------------

fn encode_class_row(descriptor: &ClassDescriptor) -> Vec<u8> {
    let mut row = Vec::with_capacity(3 + descriptor.name.len());
    row.push(descriptor.kind.as_u8());
    let super_id = descriptor.super_class.map_or(0, |c| c.0);
    row.extend_from_slice(&super_id.to_le_bytes());
    row.extend_from_slice(descriptor.name.as_bytes());
    row
}

fn decode_class_row(id: ClassId, row: &[u8]) -> Result<ClassDescriptor> {
    if row.len() < 3 {
        return Err(TenebraError::Corruption("class row truncated".into()));
    }
    let kind = ClassKind::from_u8(row[0])?;
    let super_raw = u16::from_le_bytes(row[1..3].try_into().expect("slice has exactly 2 bytes"));
    let name = String::from_utf8(row[3..].to_vec())
        .map_err(|_| TenebraError::Corruption("class name is not valid UTF-8".into()))?;
    Ok(ClassDescriptor {
        id,
        name,
        kind,
        super_class: (super_raw != 0).then_some(ClassId(super_raw)),
    })
}

fn property_key(class_id: ClassId, id: PropertyId) -> [u8; 4] {
    let mut key = [0u8; 4];
    key[0..2].copy_from_slice(&class_id.0.to_be_bytes());
    key[2..4].copy_from_slice(&id.0.to_be_bytes());
    key
}

fn decode_property_key(key: &[u8]) -> Result<(ClassId, PropertyId)> {
    if key.len() != 4 {
        return Err(TenebraError::Corruption("property key malformed".into()));
    }
    Ok((
        ClassId(decode_u16_be(&key[0..2])?),
        PropertyId(decode_u16_be(&key[2..4])?),
    ))
}

fn encode_property_row(descriptor: &PropertyDescriptor) -> Vec<u8> {
    let mut row = Vec::with_capacity(1 + descriptor.name.len());
    row.push(descriptor.prop_type.as_u8());
    row.extend_from_slice(descriptor.name.as_bytes());
    row
}

fn decode_property_row(class_id: ClassId, id: PropertyId, row: &[u8]) -> Result<PropertyDescriptor> {
    if row.is_empty() {
        return Err(TenebraError::Corruption("property row truncated".into()));
    }
    let prop_type = PropertyType::from_u8(row[0])?;
    let name = String::from_utf8(row[1..].to_vec())
        .map_err(|_| TenebraError::Corruption("property name is not valid UTF-8".into()))?;
    Ok(PropertyDescriptor {
        id,
        class_id,
        name,
        prop_type,
    })
}

fn encode_index_row(descriptor: &IndexDescriptor) -> Vec<u8> {
    let mut row = Vec::with_capacity(5);
    row.extend_from_slice(&descriptor.class_id.0.to_le_bytes());
    row.extend_from_slice(&descriptor.property_id.0.to_le_bytes());
    row.push(u8::from(descriptor.unique));
    row
}

fn decode_index_row(id: IndexId, row: &[u8]) -> Result<IndexDescriptor> {
    if row.len() != 5 {
        return Err(TenebraError::Corruption("index row truncated".into()));
    }
    Ok(IndexDescriptor {
        id,
        class_id: ClassId(u16::from_le_bytes(
            row[0..2].try_into().expect("slice has exactly 2 bytes"),
        )),
        property_id: PropertyId(u16::from_le_bytes(
            row[2..4].try_into().expect("slice has exactly 2 bytes"),
        )),
        unique: row[4] != 0,
    })
}

fn decode_u16_be(raw: &[u8]) -> Result<u16> {
    raw.try_into()
        .map(u16::from_be_bytes)
        .map_err(|_| TenebraError::Corruption("expected a 2-byte key".into()))
}

fn decode_u16_le(raw: &[u8]) -> Result<u16> {
    raw.try_into()
        .map(u16::from_le_bytes)
        .map_err(|_| TenebraError::Corruption("expected a 2-byte counter".into()))
}

fn decode_u32_be(raw: &[u8]) -> Result<u32> {
    raw.try_into()
        .map(u32::from_be_bytes)
        .map_err(|_| TenebraError::Corruption("expected a 4-byte key".into()))
}

fn decode_u32_le(raw: &[u8]) -> Result<u32> {
    raw.try_into()
        .map(u32::from_le_bytes)
        .map_err(|_| TenebraError::Corruption("expected a 4-byte counter".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(id: u16, name: &str, kind: ClassKind, super_class: Option<u16>) -> ClassDescriptor {
        ClassDescriptor {
            id: ClassId(id),
            name: name.to_string(),
            kind,
            super_class: super_class.map(ClassId),
        }
    }

    fn property(class_id: u16, id: u16, name: &str, ty: PropertyType) -> PropertyDescriptor {
        PropertyDescriptor {
            id: PropertyId(id),
            class_id: ClassId(class_id),
            name: name.to_string(),
            prop_type: ty,
        }
    }

    fn sample_catalog() -> Catalog {
        let mut catalog = Catalog::default();
        catalog.insert_class(class(1, "media", ClassKind::Vertex, None));
        catalog.insert_class(class(2, "books", ClassKind::Vertex, Some(1)));
        catalog.insert_class(class(3, "ebooks", ClassKind::Vertex, Some(2)));
        catalog.insert_property(property(1, 2, "title", PropertyType::Text));
        catalog.insert_property(property(2, 3, "pages", PropertyType::Integer));
        catalog.insert_property(property(3, 4, "format", PropertyType::Text));
        catalog
    }

    #[test]
    fn class_row_round_trip() {
        let descriptor = class(7, "books", ClassKind::Vertex, Some(3));
        let row = encode_class_row(&descriptor);
        assert_eq!(decode_class_row(ClassId(7), &row).unwrap(), descriptor);

        let root = class(7, "books", ClassKind::Edge, None);
        let row = encode_class_row(&root);
        assert_eq!(decode_class_row(ClassId(7), &row).unwrap(), root);
    }

    #[test]
    fn property_row_round_trip() {
        let descriptor = property(3, 5, "pages", PropertyType::Integer);
        let row = encode_property_row(&descriptor);
        assert_eq!(
            decode_property_row(ClassId(3), PropertyId(5), &row).unwrap(),
            descriptor
        );
    }

    #[test]
    fn index_row_round_trip() {
        let descriptor = IndexDescriptor {
            id: IndexId(9),
            class_id: ClassId(3),
            property_id: PropertyId(5),
            unique: true,
        };
        let row = encode_index_row(&descriptor);
        assert_eq!(decode_index_row(IndexId(9), &row).unwrap(), descriptor);
    }

    #[test]
    fn subclass_resolution_is_transitive() {
        let catalog = sample_catalog();
        let mut extent = catalog.resolve_subclasses(ClassId(1));
        extent.sort();
        assert_eq!(extent, vec![ClassId(1), ClassId(2), ClassId(3)]);
        assert_eq!(catalog.resolve_subclasses(ClassId(3)), vec![ClassId(3)]);
    }

    #[test]
    fn property_resolution_walks_the_chain() {
        let catalog = sample_catalog();
        let found = catalog.resolve_property(ClassId(3), "title").unwrap();
        assert_eq!(found.class_id, ClassId(1));
        assert!(catalog.resolve_property(ClassId(1), "pages").is_none());

        let map = catalog.property_name_map(ClassId(3));
        assert_eq!(map.len(), 3);
        assert!(map.contains_key("format"));
        assert!(map.contains_key("pages"));
        assert!(map.contains_key("title"));
    }

    #[test]
    fn property_ids_are_fresh_across_the_chain() {
        let catalog = sample_catalog();
        // ids 2, 3 and 4 are taken across the chain, wherever we extend it.
        assert_eq!(catalog.alloc_property_id(ClassId(1)), PropertyId(5));
        assert_eq!(catalog.alloc_property_id(ClassId(3)), PropertyId(5));
    }

    #[test]
    fn inherited_index_covers_subclasses() {
        let mut catalog = sample_catalog();
        catalog.insert_index(IndexDescriptor {
            id: IndexId(1),
            class_id: ClassId(1),
            property_id: PropertyId(2),
            unique: false,
        });
        assert!(catalog.index_for(ClassId(3), PropertyId(2)).is_some());
        assert!(catalog.index_for(ClassId(1), PropertyId(3)).is_none());
        assert!(catalog.property_is_indexed(ClassId(1), PropertyId(2)));
    }
}
