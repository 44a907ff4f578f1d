//! Schema evolution: class, property and index DDL, plus the catalog
//! getters. Every mutation writes through to the catalog stores inside the
//! enclosing transaction and updates the shadow catalog.

use std::collections::HashSet;

use tracing::debug;

use crate::codec;
use crate::db::data_ops::{destroy_edge, destroy_vertex};
use crate::db::transaction::{Transaction, WriteParts};
use crate::error::{Result, TenebraError};
use crate::model::{
    ClassDescriptor, ClassId, ClassKind, IndexDescriptor, PropertyDescriptor, PropertyType,
    RecordId,
};
use crate::schema::Catalog;
use crate::storage::{index, records};

fn validate_class_name(name: &str) -> Result<()> {
    if name.is_empty() || name.starts_with('@') || name.starts_with('.') {
        return Err(TenebraError::InvalidClassName(name.to_string()));
    }
    Ok(())
}

fn validate_property_name(name: &str) -> Result<()> {
    if name.is_empty() || name.starts_with('@') || name.starts_with('.') {
        return Err(TenebraError::InvalidPropertyName(name.to_string()));
    }
    Ok(())
}

/// True when `name` is already bound somewhere in the chain or subtree of
/// `class_id`; a new declaration would shadow or be shadowed.
fn property_name_taken(catalog: &Catalog, class_id: ClassId, name: &str) -> bool {
    if catalog.resolve_property(class_id, name).is_some() {
        return true;
    }
    catalog
        .resolve_subclasses(class_id)
        .into_iter()
        .any(|cid| {
            catalog
                .declared_properties(cid)
                .iter()
                .any(|p| p.name == name)
        })
}

impl<'ctx> Transaction<'ctx> {
    /// Creates a root class of the given kind.
    pub fn create_class(&mut self, name: &str, kind: ClassKind) -> Result<ClassDescriptor> {
        let result = self.create_class_inner(name, kind, None);
        self.guard(result)
    }

    /// Creates a class extending `super_class`; the kind is inherited.
    pub fn create_subclass(&mut self, name: &str, super_class: &str) -> Result<ClassDescriptor> {
        let result = self.create_subclass_inner(name, super_class);
        self.guard(result)
    }

    fn create_subclass_inner(&mut self, name: &str, super_class: &str) -> Result<ClassDescriptor> {
        let (super_id, kind) = {
            let parts = self.read_parts()?;
            let parent = parts
                .catalog
                .class_by_name(super_class)
                .ok_or_else(|| TenebraError::NoSuchClass(super_class.to_string()))?;
            (parent.id, parent.kind)
        };
        self.create_class_inner(name, kind, Some(super_id))
    }

    fn create_class_inner(
        &mut self,
        name: &str,
        kind: ClassKind,
        super_class: Option<ClassId>,
    ) -> Result<ClassDescriptor> {
        validate_class_name(name)?;
        let WriteParts { ctx, wtxn, catalog } = self.write_parts()?;
        if catalog.class_by_name(name).is_some() {
            return Err(TenebraError::DuplicateClass(name.to_string()));
        }
        let id = catalog.alloc_class_id()?;
        let descriptor = ClassDescriptor {
            id,
            name: name.to_string(),
            kind,
            super_class,
        };
        catalog.insert_class(descriptor.clone());
        ctx.catalog_stores.put_class(wtxn, &descriptor)?;
        ctx.catalog_stores.put_counters(wtxn, catalog)?;
        records::create_store(&ctx.kv, wtxn, id)?;
        debug!(class = name, id = id.0, "class created");
        Ok(descriptor)
    }

    /// Drops a class, destroying its records (with edge cascades) and its
    /// indexes. Refused while subclasses exist.
    pub fn drop_class(&mut self, name: &str) -> Result<()> {
        let result = self.drop_class_inner(name);
        self.guard(result)
    }

    fn drop_class_inner(&mut self, name: &str) -> Result<()> {
        let WriteParts { ctx, wtxn, catalog } = self.write_parts()?;
        let class = catalog
            .class_by_name(name)
            .ok_or_else(|| TenebraError::NoSuchClass(name.to_string()))?
            .clone();
        if !catalog.direct_subclasses(class.id).is_empty() {
            return Err(TenebraError::ClassInUse(name.to_string()));
        }

        // records first (vertex destruction cascades to incident edges,
        // which may live in other classes)
        let store = records::open_store(&ctx.kv, wtxn, class.id)?;
        for position in records::positions(store, wtxn)? {
            if !records::exists(store, wtxn, position)? {
                continue;
            }
            let rid = RecordId::new(class.id, position);
            match class.kind {
                ClassKind::Vertex => destroy_vertex(ctx, wtxn, catalog, rid)?,
                ClassKind::Edge => destroy_edge(ctx, wtxn, catalog, rid)?,
            }
        }

        for descriptor in catalog.indexes_of(class.id) {
            let stores = index::open_stores(&ctx.kv, wtxn, &descriptor)?;
            index::clear_stores(stores, wtxn)?;
            ctx.catalog_stores.delete_index(wtxn, descriptor.id)?;
        }
        for property in catalog.declared_properties(class.id) {
            ctx.catalog_stores
                .delete_property(wtxn, class.id, property.id)?;
        }
        ctx.catalog_stores.delete_class(wtxn, class.id)?;
        catalog.remove_class(class.id);
        debug!(class = name, "class dropped");
        Ok(())
    }

    /// Renames a class; the id and every record are preserved.
    pub fn rename_class(&mut self, old_name: &str, new_name: &str) -> Result<()> {
        let result = self.rename_class_inner(old_name, new_name);
        self.guard(result)
    }

    fn rename_class_inner(&mut self, old_name: &str, new_name: &str) -> Result<()> {
        validate_class_name(new_name)?;
        let WriteParts { ctx, wtxn, catalog } = self.write_parts()?;
        let class = catalog
            .class_by_name(old_name)
            .ok_or_else(|| TenebraError::NoSuchClass(old_name.to_string()))?
            .clone();
        if catalog.class_by_name(new_name).is_some() {
            return Err(TenebraError::DuplicateClass(new_name.to_string()));
        }
        catalog.rename_class(class.id, new_name);
        let renamed = catalog
            .class(class.id)
            .expect("class present after rename")
            .clone();
        ctx.catalog_stores.put_class(wtxn, &renamed)?;
        debug!(old = old_name, new = new_name, "class renamed");
        Ok(())
    }

    /// Declares a property on a class.
    pub fn add_property(
        &mut self,
        class_name: &str,
        property_name: &str,
        prop_type: PropertyType,
    ) -> Result<PropertyDescriptor> {
        let result = self.add_property_inner(class_name, property_name, prop_type);
        self.guard(result)
    }

    fn add_property_inner(
        &mut self,
        class_name: &str,
        property_name: &str,
        prop_type: PropertyType,
    ) -> Result<PropertyDescriptor> {
        validate_property_name(property_name)?;
        let WriteParts { ctx, wtxn, catalog } = self.write_parts()?;
        let class = catalog
            .class_by_name(class_name)
            .ok_or_else(|| TenebraError::NoSuchClass(class_name.to_string()))?
            .clone();
        if property_name_taken(catalog, class.id, property_name) {
            return Err(TenebraError::DuplicateProperty(property_name.to_string()));
        }
        let id = catalog.alloc_property_id(class.id);
        let descriptor = PropertyDescriptor {
            id,
            class_id: class.id,
            name: property_name.to_string(),
            prop_type,
        };
        catalog.insert_property(descriptor.clone());
        ctx.catalog_stores.put_property(wtxn, &descriptor)?;
        debug!(class = class_name, property = property_name, id = id.0, "property added");
        Ok(descriptor)
    }

    /// Renames a property declared on the class; the id is preserved, so
    /// existing rows stay readable.
    pub fn rename_property(
        &mut self,
        class_name: &str,
        old_name: &str,
        new_name: &str,
    ) -> Result<()> {
        let result = self.rename_property_inner(class_name, old_name, new_name);
        self.guard(result)
    }

    fn rename_property_inner(
        &mut self,
        class_name: &str,
        old_name: &str,
        new_name: &str,
    ) -> Result<()> {
        validate_property_name(new_name)?;
        let WriteParts { ctx, wtxn, catalog } = self.write_parts()?;
        let class = catalog
            .class_by_name(class_name)
            .ok_or_else(|| TenebraError::NoSuchClass(class_name.to_string()))?
            .clone();
        let property = catalog
            .declared_properties(class.id)
            .into_iter()
            .find(|p| p.name == old_name)
            .ok_or_else(|| TenebraError::NoSuchProperty(old_name.to_string()))?;
        if property_name_taken(catalog, class.id, new_name) {
            return Err(TenebraError::DuplicateProperty(new_name.to_string()));
        }
        catalog.rename_property(class.id, property.id, new_name);
        let renamed = PropertyDescriptor {
            name: new_name.to_string(),
            ..property
        };
        ctx.catalog_stores.put_property(wtxn, &renamed)?;
        debug!(class = class_name, old = old_name, new = new_name, "property renamed");
        Ok(())
    }

    /// Removes a property declared on the class. Refused while an index
    /// references it.
    pub fn drop_property(&mut self, class_name: &str, property_name: &str) -> Result<()> {
        let result = self.drop_property_inner(class_name, property_name);
        self.guard(result)
    }

    fn drop_property_inner(&mut self, class_name: &str, property_name: &str) -> Result<()> {
        let WriteParts { ctx, wtxn, catalog } = self.write_parts()?;
        let class = catalog
            .class_by_name(class_name)
            .ok_or_else(|| TenebraError::NoSuchClass(class_name.to_string()))?
            .clone();
        let property = catalog
            .declared_properties(class.id)
            .into_iter()
            .find(|p| p.name == property_name)
            .ok_or_else(|| TenebraError::NoSuchProperty(property_name.to_string()))?;
        if catalog.property_is_indexed(class.id, property.id) {
            return Err(TenebraError::PropertyInUse(property_name.to_string()));
        }
        catalog.remove_property(class.id, property.id);
        ctx.catalog_stores
            .delete_property(wtxn, class.id, property.id)?;
        debug!(class = class_name, property = property_name, "property dropped");
        Ok(())
    }

    /// Creates an index on `(class, property)` and populates it from the
    /// live records of the class and its subclasses. A uniqueness violation
    /// found during the populating scan aborts the creation with no partial
    /// index left behind.
    pub fn create_index(
        &mut self,
        class_name: &str,
        property_name: &str,
        unique: bool,
    ) -> Result<IndexDescriptor> {
        let result = self.create_index_inner(class_name, property_name, unique);
        self.guard(result)
    }

    fn create_index_inner(
        &mut self,
        class_name: &str,
        property_name: &str,
        unique: bool,
    ) -> Result<IndexDescriptor> {
        let WriteParts { ctx, wtxn, catalog } = self.write_parts()?;
        let class = catalog
            .class_by_name(class_name)
            .ok_or_else(|| TenebraError::NoSuchClass(class_name.to_string()))?
            .clone();
        let property = catalog
            .resolve_property(class.id, property_name)
            .ok_or_else(|| TenebraError::NoSuchProperty(property_name.to_string()))?
            .clone();
        if property.prop_type == PropertyType::Blob {
            return Err(TenebraError::ConflictPropertyType(property_name.to_string()));
        }
        if catalog.index_for(class.id, property.id).is_some() {
            return Err(TenebraError::DuplicateIndex(format!(
                "{class_name}.{property_name}"
            )));
        }

        // validating pass: collect every entry, reject unique violations
        // before anything is written
        let mut entries: Vec<(index::IndexKey, RecordId)> = Vec::new();
        let mut seen: HashSet<index::IndexKey> = HashSet::new();
        for class_id in catalog.resolve_subclasses(class.id) {
            let is_edge = class.kind == ClassKind::Edge;
            let ids = catalog.property_id_map(class_id);
            let store = records::open_store(&ctx.kv, wtxn, class_id)?;
            let mut scan_result: Result<()> = Ok(());
            records::scan(store, wtxn, |position, raw| {
                let record = codec::parse_record(raw, &ids, is_edge)?;
                if let Some(value) = record.get(&property.name).filter(|v| !v.is_null()) {
                    let key = index::normalise_key(value, property.prop_type)?;
                    if unique && !seen.insert(key.clone()) {
                        scan_result = Err(TenebraError::IndexConstraint(format!(
                            "{class_name}.{property_name}"
                        )));
                        return Ok(false);
                    }
                    entries.push((key, RecordId::new(class_id, position)));
                }
                Ok(true)
            })?;
            scan_result?;
        }

        let id = catalog.alloc_index_id()?;
        let descriptor = IndexDescriptor {
            id,
            class_id: class.id,
            property_id: property.id,
            unique,
        };
        catalog.insert_index(descriptor.clone());
        ctx.catalog_stores.put_index(wtxn, &descriptor)?;
        ctx.catalog_stores.put_counters(wtxn, catalog)?;
        let stores = index::create_stores(&ctx.kv, wtxn, &descriptor)?;
        let count = entries.len();
        for (key, rid) in entries {
            stores.insert(wtxn, &descriptor, &key, rid, &property.name)?;
        }
        debug!(
            class = class_name,
            property = property_name,
            unique,
            entries = count,
            "index created"
        );
        Ok(descriptor)
    }

    /// Drops the index on `(class, property)` and empties its stores.
    pub fn drop_index(&mut self, class_name: &str, property_name: &str) -> Result<()> {
        let result = self.drop_index_inner(class_name, property_name);
        self.guard(result)
    }

    fn drop_index_inner(&mut self, class_name: &str, property_name: &str) -> Result<()> {
        let WriteParts { ctx, wtxn, catalog } = self.write_parts()?;
        let class = catalog
            .class_by_name(class_name)
            .ok_or_else(|| TenebraError::NoSuchClass(class_name.to_string()))?
            .clone();
        let property = catalog
            .resolve_property(class.id, property_name)
            .ok_or_else(|| TenebraError::NoSuchProperty(property_name.to_string()))?
            .clone();
        let descriptor = catalog
            .indexes_of(class.id)
            .into_iter()
            .find(|i| i.property_id == property.id)
            .ok_or_else(|| {
                TenebraError::NoSuchIndex(format!("{class_name}.{property_name}"))
            })?;
        let stores = index::open_stores(&ctx.kv, wtxn, &descriptor)?;
        index::clear_stores(stores, wtxn)?;
        ctx.catalog_stores.delete_index(wtxn, descriptor.id)?;
        catalog.remove_index(descriptor.id);
        debug!(class = class_name, property = property_name, "index dropped");
        Ok(())
    }

    // ---- catalog getters ----------------------------------------------

    /// Class descriptor by name.
    pub fn get_class(&self, name: &str) -> Result<ClassDescriptor> {
        let parts = self.read_parts()?;
        parts
            .catalog
            .class_by_name(name)
            .cloned()
            .ok_or_else(|| TenebraError::NoSuchClass(name.to_string()))
    }

    /// Class descriptor by id.
    pub fn get_class_by_id(&self, id: ClassId) -> Result<ClassDescriptor> {
        let parts = self.read_parts()?;
        parts
            .catalog
            .class(id)
            .cloned()
            .ok_or_else(|| TenebraError::NoSuchClass(id.to_string()))
    }

    /// Every class of the database.
    pub fn get_classes(&self) -> Result<Vec<ClassDescriptor>> {
        let parts = self.read_parts()?;
        Ok(parts.catalog.classes().cloned().collect())
    }

    /// Properties visible on a class, inherited ones included.
    pub fn get_properties(&self, class_name: &str) -> Result<Vec<PropertyDescriptor>> {
        let parts = self.read_parts()?;
        let class = parts
            .catalog
            .class_by_name(class_name)
            .ok_or_else(|| TenebraError::NoSuchClass(class_name.to_string()))?;
        Ok(parts
            .catalog
            .property_name_map(class.id)
            .into_values()
            .collect())
    }

    /// One property resolved through the inheritance chain.
    pub fn get_property(
        &self,
        class_name: &str,
        property_name: &str,
    ) -> Result<PropertyDescriptor> {
        let parts = self.read_parts()?;
        let class = parts
            .catalog
            .class_by_name(class_name)
            .ok_or_else(|| TenebraError::NoSuchClass(class_name.to_string()))?;
        parts
            .catalog
            .resolve_property(class.id, property_name)
            .cloned()
            .ok_or_else(|| TenebraError::NoSuchProperty(property_name.to_string()))
    }

    /// Indexes declared on a class.
    pub fn get_indexes(&self, class_name: &str) -> Result<Vec<IndexDescriptor>> {
        let parts = self.read_parts()?;
        let class = parts
            .catalog
            .class_by_name(class_name)
            .ok_or_else(|| TenebraError::NoSuchClass(class_name.to_string()))?;
        Ok(parts.catalog.indexes_of(class.id))
    }

    /// The index serving `(class, property)`, inherited indexes included.
    pub fn get_index(&self, class_name: &str, property_name: &str) -> Result<IndexDescriptor> {
        let parts = self.read_parts()?;
        let class = parts
            .catalog
            .class_by_name(class_name)
            .ok_or_else(|| TenebraError::NoSuchClass(class_name.to_string()))?;
        let property = parts
            .catalog
            .resolve_property(class.id, property_name)
            .ok_or_else(|| TenebraError::NoSuchProperty(property_name.to_string()))?;
        parts
            .catalog
            .index_for(class.id, property.id)
            .cloned()
            .ok_or_else(|| TenebraError::NoSuchIndex(format!("{class_name}.{property_name}")))
    }
}
