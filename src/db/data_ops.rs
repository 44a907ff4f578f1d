//! Record and edge CRUD. Every mutation keeps the record rows, the graph
//! adjacency image and the index entries consistent within the enclosing
//! transaction.

use heed3::RwTxn;
use tracing::debug;

use crate::codec;
use crate::db::transaction::{Transaction, WriteParts};
use crate::db::Context;
use crate::error::{Result, TenebraError};
use crate::model::{
    ClassDescriptor, ClassId, ClassKind, Record, RecordDescriptor, RecordId, RecordResult,
};
use crate::query::planner;
use crate::schema::Catalog;
use crate::storage::{index, records};

impl<'ctx> Transaction<'ctx> {
    /// Creates a vertex record and returns its descriptor.
    pub fn create_vertex(&mut self, class_name: &str, record: &Record) -> Result<RecordDescriptor> {
        let result = self.create_vertex_inner(class_name, record);
        self.guard(result)
    }

    fn create_vertex_inner(&mut self, class_name: &str, record: &Record) -> Result<RecordDescriptor> {
        let WriteParts { ctx, wtxn, catalog } = self.write_parts()?;
        let class = expect_class_of_kind(catalog, class_name, ClassKind::Vertex)?;
        let properties = catalog.property_name_map(class.id);
        let payload = codec::encode_record(record, &properties)?;
        ensure_unique_constraints(ctx, wtxn, catalog, class.id, record, None)?;

        let store = records::open_store(&ctx.kv, wtxn, class.id)?;
        let position = records::next_position(store, wtxn)?;
        let rid = RecordId::new(class.id, position);
        records::put(store, wtxn, position, &payload)?;
        insert_index_entries(ctx, wtxn, catalog, rid, record)?;

        debug!(class = class_name, rid = %rid, "vertex created");
        Ok(RecordDescriptor::new(rid))
    }

    /// Creates an edge from `src` to `dst` and returns its descriptor.
    pub fn create_edge(
        &mut self,
        class_name: &str,
        src: &RecordDescriptor,
        dst: &RecordDescriptor,
        record: &Record,
    ) -> Result<RecordDescriptor> {
        let result = self.create_edge_inner(class_name, src, dst, record);
        self.guard(result)
    }

    fn create_edge_inner(
        &mut self,
        class_name: &str,
        src: &RecordDescriptor,
        dst: &RecordDescriptor,
        record: &Record,
    ) -> Result<RecordDescriptor> {
        let WriteParts { ctx, wtxn, catalog } = self.write_parts()?;
        let class = expect_class_of_kind(catalog, class_name, ClassKind::Edge)?;
        if !vertex_exists(ctx, wtxn, catalog, src.rid)? {
            return Err(TenebraError::NoSuchSrcVertex(src.rid.to_string()));
        }
        if !vertex_exists(ctx, wtxn, catalog, dst.rid)? {
            return Err(TenebraError::NoSuchDstVertex(dst.rid.to_string()));
        }

        let properties = catalog.property_name_map(class.id);
        let mut payload = codec::encode_endpoints(src.rid, dst.rid).to_vec();
        payload.extend(codec::encode_record(record, &properties)?);
        ensure_unique_constraints(ctx, wtxn, catalog, class.id, record, None)?;

        let store = records::open_store(&ctx.kv, wtxn, class.id)?;
        let position = records::next_position(store, wtxn)?;
        let rid = RecordId::new(class.id, position);
        records::put(store, wtxn, position, &payload)?;
        ctx.relations.add_edge(wtxn, rid, src.rid, dst.rid)?;
        insert_index_entries(ctx, wtxn, catalog, rid, record)?;

        debug!(class = class_name, rid = %rid, src = %src.rid, dst = %dst.rid, "edge created");
        Ok(RecordDescriptor::new(rid))
    }

    /// Fetches a record with its derived basic fields. A destroyed or
    /// never-created position yields an empty record.
    pub fn fetch_record(&self, descriptor: &RecordDescriptor) -> Result<Record> {
        let parts = self.read_parts()?;
        Ok(planner::read_record_with_basic_info(
            &parts.ctx.kv,
            parts.rtxn,
            parts.catalog,
            descriptor,
        )?
        .unwrap_or_default())
    }

    /// Merges the supplied properties over the stored record; properties
    /// not mentioned keep their value. Index entries follow the changes.
    pub fn update(&mut self, descriptor: &RecordDescriptor, record: &Record) -> Result<()> {
        let result = self.update_inner(descriptor, record);
        self.guard(result)
    }

    fn update_inner(&mut self, descriptor: &RecordDescriptor, record: &Record) -> Result<()> {
        let WriteParts { ctx, wtxn, catalog } = self.write_parts()?;
        let rid = descriptor.rid;
        let class = catalog
            .class(rid.class_id)
            .ok_or_else(|| TenebraError::NoSuchClass(rid.class_id.to_string()))?
            .clone();
        let store = records::open_store(&ctx.kv, wtxn, rid.class_id)?;
        let old_raw = records::get(store, wtxn, rid.position)?
            .ok_or_else(|| TenebraError::NoSuchRecord(rid.to_string()))?;

        let is_edge = class.kind == ClassKind::Edge;
        let ids = catalog.property_id_map(rid.class_id);
        let old_record = codec::parse_record(&old_raw, &ids, is_edge)?;

        let mut merged = old_record.clone();
        for (name, value) in record.user_properties() {
            merged.set(name.clone(), value.clone());
        }

        ensure_unique_constraints(ctx, wtxn, catalog, rid.class_id, &merged, Some(rid))?;

        let properties = catalog.property_name_map(rid.class_id);
        let mut payload = if is_edge {
            old_raw[..codec::ENDPOINT_PREFIX_LEN].to_vec()
        } else {
            Vec::new()
        };
        payload.extend(codec::encode_record(&merged, &properties)?);
        records::put(store, wtxn, rid.position, &payload)?;

        // reindex only the properties whose value actually changed
        for (idx, property) in catalog.applicable_indexes(rid.class_id) {
            let old_value = old_record.get(&property.name);
            let new_value = merged.get(&property.name);
            if old_value == new_value {
                continue;
            }
            let stores = index::open_stores(&ctx.kv, wtxn, &idx)?;
            if let Some(value) = old_value.filter(|v| !v.is_null()) {
                let key = index::normalise_key(value, property.prop_type)?;
                stores.remove(wtxn, &idx, &key, rid)?;
            }
            if let Some(value) = new_value.filter(|v| !v.is_null()) {
                let key = index::normalise_key(value, property.prop_type)?;
                stores.insert(wtxn, &idx, &key, rid, &property.name)?;
            }
        }

        debug!(rid = %rid, "record updated");
        Ok(())
    }

    /// Rewires an edge to a new source vertex.
    pub fn update_edge_src(
        &mut self,
        descriptor: &RecordDescriptor,
        new_src: &RecordDescriptor,
    ) -> Result<()> {
        let result = self.update_endpoint_inner(descriptor, new_src, true);
        self.guard(result)
    }

    /// Rewires an edge to a new destination vertex.
    pub fn update_edge_dst(
        &mut self,
        descriptor: &RecordDescriptor,
        new_dst: &RecordDescriptor,
    ) -> Result<()> {
        let result = self.update_endpoint_inner(descriptor, new_dst, false);
        self.guard(result)
    }

    fn update_endpoint_inner(
        &mut self,
        descriptor: &RecordDescriptor,
        new_vertex: &RecordDescriptor,
        is_src: bool,
    ) -> Result<()> {
        let WriteParts { ctx, wtxn, catalog } = self.write_parts()?;
        let rid = descriptor.rid;
        expect_edge_class(catalog, rid)?;
        let (src, dst) = ctx
            .relations
            .endpoints(wtxn, rid)?
            .ok_or_else(|| TenebraError::NoSuchEdge(rid.to_string()))?;
        if !vertex_exists(ctx, wtxn, catalog, new_vertex.rid)? {
            return Err(if is_src {
                TenebraError::NoSuchSrcVertex(new_vertex.rid.to_string())
            } else {
                TenebraError::NoSuchDstVertex(new_vertex.rid.to_string())
            });
        }

        let (new_src, new_dst) = if is_src {
            ctx.relations
                .update_src(wtxn, rid, src, new_vertex.rid, dst)?;
            (new_vertex.rid, dst)
        } else {
            ctx.relations
                .update_dst(wtxn, rid, src, dst, new_vertex.rid)?;
            (src, new_vertex.rid)
        };

        let store = records::open_store(&ctx.kv, wtxn, rid.class_id)?;
        let mut raw = records::get(store, wtxn, rid.position)?.ok_or_else(|| {
            TenebraError::GraphInternal(format!("edge row missing for {rid}"))
        })?;
        raw[..codec::ENDPOINT_PREFIX_LEN]
            .copy_from_slice(&codec::encode_endpoints(new_src, new_dst));
        records::put(store, wtxn, rid.position, &raw)?;

        debug!(rid = %rid, src = %new_src, dst = %new_dst, "edge endpoints updated");
        Ok(())
    }

    /// Source vertex of an edge.
    pub fn get_src(&self, descriptor: &RecordDescriptor) -> Result<RecordResult> {
        let (src, _) = self.edge_endpoints(descriptor)?;
        self.vertex_result(src)
    }

    /// Destination vertex of an edge.
    pub fn get_dst(&self, descriptor: &RecordDescriptor) -> Result<RecordResult> {
        let (_, dst) = self.edge_endpoints(descriptor)?;
        self.vertex_result(dst)
    }

    /// Both endpoints of an edge, source first.
    pub fn get_src_dst(&self, descriptor: &RecordDescriptor) -> Result<(RecordResult, RecordResult)> {
        let (src, dst) = self.edge_endpoints(descriptor)?;
        Ok((self.vertex_result(src)?, self.vertex_result(dst)?))
    }

    pub(crate) fn edge_endpoints(&self, descriptor: &RecordDescriptor) -> Result<(RecordId, RecordId)> {
        let parts = self.read_parts()?;
        parts
            .ctx
            .relations
            .endpoints(parts.rtxn, descriptor.rid)?
            .ok_or_else(|| TenebraError::NoSuchEdge(descriptor.rid.to_string()))
    }

    fn vertex_result(&self, rid: RecordId) -> Result<RecordResult> {
        let parts = self.read_parts()?;
        let descriptor = RecordDescriptor::new(rid);
        let record =
            planner::read_record_with_basic_info(&parts.ctx.kv, parts.rtxn, parts.catalog, &descriptor)?
                .ok_or_else(|| {
                    TenebraError::GraphInternal(format!("endpoint vertex {rid} is missing"))
                })?;
        Ok(RecordResult { descriptor, record })
    }

    /// Destroys a record. Destroying a vertex cascades to its incident
    /// edges; destroying an edge removes it from both adjacency sets.
    pub fn delete(&mut self, descriptor: &RecordDescriptor) -> Result<()> {
        let result = self.delete_inner(descriptor);
        self.guard(result)
    }

    fn delete_inner(&mut self, descriptor: &RecordDescriptor) -> Result<()> {
        let WriteParts { ctx, wtxn, catalog } = self.write_parts()?;
        let rid = descriptor.rid;
        let class = catalog
            .class(rid.class_id)
            .ok_or_else(|| TenebraError::NoSuchClass(rid.class_id.to_string()))?;
        match class.kind {
            ClassKind::Vertex => destroy_vertex(ctx, wtxn, catalog, rid),
            ClassKind::Edge => destroy_edge(ctx, wtxn, catalog, rid),
        }
    }

    /// Destroys every record of the class and its subclasses.
    pub fn truncate(&mut self, class_name: &str) -> Result<()> {
        let result = self.truncate_inner(class_name);
        self.guard(result)
    }

    fn truncate_inner(&mut self, class_name: &str) -> Result<()> {
        let WriteParts { ctx, wtxn, catalog } = self.write_parts()?;
        let class = catalog
            .class_by_name(class_name)
            .ok_or_else(|| TenebraError::NoSuchClass(class_name.to_string()))?
            .clone();
        for class_id in catalog.resolve_subclasses(class.id) {
            truncate_class(ctx, wtxn, catalog, class_id)?;
        }
        debug!(class = class_name, "class truncated");
        Ok(())
    }
}

// ---- shared internals (also used by the schema operations) -------------

pub(crate) fn expect_class_of_kind<'c>(
    catalog: &'c Catalog,
    class_name: &str,
    kind: ClassKind,
) -> Result<&'c ClassDescriptor> {
    let class = catalog
        .class_by_name(class_name)
        .ok_or_else(|| TenebraError::NoSuchClass(class_name.to_string()))?;
    if class.kind != kind {
        return Err(TenebraError::MismatchClassKind(class_name.to_string()));
    }
    Ok(class)
}

fn expect_edge_class(catalog: &Catalog, rid: RecordId) -> Result<()> {
    let class = catalog
        .class(rid.class_id)
        .ok_or_else(|| TenebraError::NoSuchClass(rid.class_id.to_string()))?;
    if class.kind != ClassKind::Edge {
        return Err(TenebraError::MismatchClassKind(class.name.clone()));
    }
    Ok(())
}

pub(crate) fn vertex_exists(
    ctx: &Context,
    wtxn: &RwTxn,
    catalog: &Catalog,
    rid: RecordId,
) -> Result<bool> {
    let Some(class) = catalog.class(rid.class_id) else {
        return Ok(false);
    };
    if class.kind != ClassKind::Vertex {
        return Ok(false);
    }
    let store = records::open_store(&ctx.kv, wtxn, rid.class_id)?;
    records::exists(store, wtxn, rid.position)
}

/// Rejects unique-index violations before any row or index entry is
/// written, so a failed call leaves no partial state behind. `exclude`
/// names the record being updated, whose own entries do not conflict.
fn ensure_unique_constraints(
    ctx: &Context,
    wtxn: &RwTxn,
    catalog: &Catalog,
    class_id: ClassId,
    record: &Record,
    exclude: Option<RecordId>,
) -> Result<()> {
    for (idx, property) in catalog.applicable_indexes(class_id) {
        if !idx.unique {
            continue;
        }
        let Some(value) = record.get(&property.name).filter(|v| !v.is_null()) else {
            continue;
        };
        let key = index::normalise_key(value, property.prop_type)?;
        let stores = index::open_stores(&ctx.kv, wtxn, &idx)?;
        if let Some(existing) = stores.lookup_unique(wtxn, &key)? {
            if Some(existing) != exclude {
                return Err(TenebraError::IndexConstraint(property.name.clone()));
            }
        }
    }
    Ok(())
}

pub(crate) fn insert_index_entries(
    ctx: &Context,
    wtxn: &mut RwTxn,
    catalog: &Catalog,
    rid: RecordId,
    record: &Record,
) -> Result<()> {
    for (idx, property) in catalog.applicable_indexes(rid.class_id) {
        if let Some(value) = record.get(&property.name).filter(|v| !v.is_null()) {
            let key = index::normalise_key(value, property.prop_type)?;
            let stores = index::open_stores(&ctx.kv, wtxn, &idx)?;
            stores.insert(wtxn, &idx, &key, rid, &property.name)?;
        }
    }
    Ok(())
}

pub(crate) fn remove_index_entries(
    ctx: &Context,
    wtxn: &mut RwTxn,
    catalog: &Catalog,
    rid: RecordId,
    record: &Record,
) -> Result<()> {
    for (idx, property) in catalog.applicable_indexes(rid.class_id) {
        if let Some(value) = record.get(&property.name).filter(|v| !v.is_null()) {
            let key = index::normalise_key(value, property.prop_type)?;
            let stores = index::open_stores(&ctx.kv, wtxn, &idx)?;
            stores.remove(wtxn, &idx, &key, rid)?;
        }
    }
    Ok(())
}

pub(crate) fn destroy_vertex(
    ctx: &Context,
    wtxn: &mut RwTxn,
    catalog: &Catalog,
    rid: RecordId,
) -> Result<()> {
    let store = records::open_store(&ctx.kv, wtxn, rid.class_id)?;
    let raw = records::get(store, wtxn, rid.position)?
        .ok_or_else(|| TenebraError::NoSuchRecord(rid.to_string()))?;
    let ids = catalog.property_id_map(rid.class_id);
    let record = codec::parse_record(&raw, &ids, false)?;

    let mut incident: std::collections::HashSet<RecordId> = std::collections::HashSet::new();
    for inc in ctx.relations.in_edges(wtxn, rid, None)? {
        incident.insert(inc.edge);
    }
    for inc in ctx.relations.out_edges(wtxn, rid, None)? {
        incident.insert(inc.edge);
    }
    for edge in incident {
        destroy_edge(ctx, wtxn, catalog, edge)?;
    }

    records::delete(store, wtxn, rid.position)?;
    remove_index_entries(ctx, wtxn, catalog, rid, &record)?;
    debug!(rid = %rid, "vertex destroyed");
    Ok(())
}

pub(crate) fn destroy_edge(
    ctx: &Context,
    wtxn: &mut RwTxn,
    catalog: &Catalog,
    rid: RecordId,
) -> Result<()> {
    let store = records::open_store(&ctx.kv, wtxn, rid.class_id)?;
    let raw = records::get(store, wtxn, rid.position)?
        .ok_or_else(|| TenebraError::NoSuchRecord(rid.to_string()))?;
    let (src, dst) = ctx.relations.endpoints(wtxn, rid)?.ok_or_else(|| {
        TenebraError::GraphInternal(format!("endpoints missing for edge {rid}"))
    })?;
    let ids = catalog.property_id_map(rid.class_id);
    let record = codec::parse_record(&raw, &ids, true)?;

    ctx.relations.remove_edge(wtxn, rid, src, dst)?;
    records::delete(store, wtxn, rid.position)?;
    remove_index_entries(ctx, wtxn, catalog, rid, &record)?;
    debug!(rid = %rid, "edge destroyed");
    Ok(())
}

fn truncate_class(
    ctx: &Context,
    wtxn: &mut RwTxn,
    catalog: &Catalog,
    class_id: ClassId,
) -> Result<()> {
    let class = catalog
        .class(class_id)
        .ok_or_else(|| TenebraError::NoSuchClass(class_id.to_string()))?;
    let store = records::open_store(&ctx.kv, wtxn, class_id)?;
    let positions = records::positions(store, wtxn)?;
    for position in positions {
        let rid = RecordId::new(class_id, position);
        // cascades from earlier deletions may already have removed the row
        if !records::exists(store, wtxn, position)? {
            continue;
        }
        match class.kind {
            ClassKind::Vertex => destroy_vertex(ctx, wtxn, catalog, rid)?,
            ClassKind::Edge => destroy_edge(ctx, wtxn, catalog, rid)?,
        }
    }
    Ok(())
}
