//! Query surface: class queries (materialised and cursor forms, with and
//! without subclass expansion, index-only variants) and the filtered edge
//! getters of a vertex.

use crate::db::cursor::ResultCursor;
use crate::db::transaction::Transaction;
use crate::error::{Result, TenebraError};
use crate::model::{
    ClassDescriptor, ClassKind, RecordDescriptor, RecordId, RecordResult, ResultSet,
};
use crate::query::compare;
use crate::query::filter::{ClassFilter, FilterPredicate, GraphFilter};
use crate::query::planner::{self, Selector};
use crate::storage::records;
use crate::traverse::Direction;

impl<'ctx> Transaction<'ctx> {
    /// Records of a class matching the selector.
    pub fn find(&self, class_name: &str, selector: impl Into<Selector>) -> Result<ResultSet> {
        let descriptors = self.find_impl(class_name, false, &selector.into(), false)?;
        self.materialise(descriptors)
    }

    /// Records of a class and its subclasses matching the selector.
    pub fn find_extend(&self, class_name: &str, selector: impl Into<Selector>) -> Result<ResultSet> {
        let descriptors = self.find_impl(class_name, true, &selector.into(), false)?;
        self.materialise(descriptors)
    }

    /// Like [`find`](Transaction::find) but only classes servable from an
    /// index contribute results.
    pub fn find_index(&self, class_name: &str, selector: impl Into<Selector>) -> Result<ResultSet> {
        let descriptors = self.find_impl(class_name, false, &selector.into(), true)?;
        self.materialise(descriptors)
    }

    /// Index-only variant with subclass expansion.
    pub fn find_extend_index(
        &self,
        class_name: &str,
        selector: impl Into<Selector>,
    ) -> Result<ResultSet> {
        let descriptors = self.find_impl(class_name, true, &selector.into(), true)?;
        self.materialise(descriptors)
    }

    /// Cursor form of [`find`](Transaction::find).
    pub fn find_cursor(
        &self,
        class_name: &str,
        selector: impl Into<Selector>,
    ) -> Result<ResultCursor<'_, 'ctx>> {
        let descriptors = self.find_impl(class_name, false, &selector.into(), false)?;
        Ok(ResultCursor::new(self, descriptors))
    }

    /// Cursor form of [`find_extend`](Transaction::find_extend).
    pub fn find_extend_cursor(
        &self,
        class_name: &str,
        selector: impl Into<Selector>,
    ) -> Result<ResultCursor<'_, 'ctx>> {
        let descriptors = self.find_impl(class_name, true, &selector.into(), false)?;
        Ok(ResultCursor::new(self, descriptors))
    }

    /// Cursor form of [`find_index`](Transaction::find_index).
    pub fn find_index_cursor(
        &self,
        class_name: &str,
        selector: impl Into<Selector>,
    ) -> Result<ResultCursor<'_, 'ctx>> {
        let descriptors = self.find_impl(class_name, false, &selector.into(), true)?;
        Ok(ResultCursor::new(self, descriptors))
    }

    /// Cursor form of [`find_extend_index`](Transaction::find_extend_index).
    pub fn find_extend_index_cursor(
        &self,
        class_name: &str,
        selector: impl Into<Selector>,
    ) -> Result<ResultCursor<'_, 'ctx>> {
        let descriptors = self.find_impl(class_name, true, &selector.into(), true)?;
        Ok(ResultCursor::new(self, descriptors))
    }

    fn find_impl(
        &self,
        class_name: &str,
        include_subclasses: bool,
        selector: &Selector,
        index_only: bool,
    ) -> Result<Vec<RecordDescriptor>> {
        let parts = self.read_parts()?;
        let class = parts
            .catalog
            .class_by_name(class_name)
            .ok_or_else(|| TenebraError::NoSuchClass(class_name.to_string()))?;
        planner::find_descriptors(
            &parts.ctx.kv,
            parts.rtxn,
            parts.catalog,
            class,
            include_subclasses,
            selector,
            index_only,
        )
    }

    pub(crate) fn materialise(&self, descriptors: Vec<RecordDescriptor>) -> Result<ResultSet> {
        let mut results = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            if let Some(result) = self.fetch_result(&descriptor)? {
                results.push(result);
            }
        }
        Ok(results)
    }

    pub(crate) fn fetch_result(
        &self,
        descriptor: &RecordDescriptor,
    ) -> Result<Option<RecordResult>> {
        let parts = self.read_parts()?;
        Ok(planner::read_record_with_basic_info(
            &parts.ctx.kv,
            parts.rtxn,
            parts.catalog,
            descriptor,
        )?
        .map(|record| RecordResult {
            descriptor: *descriptor,
            record,
        }))
    }

    /// Incoming edges of a vertex surviving the filter.
    pub fn in_edges(&self, vertex: &RecordDescriptor, filter: &GraphFilter) -> Result<ResultSet> {
        let descriptors = self.edge_descriptors(vertex, Direction::In, filter)?;
        self.materialise(descriptors)
    }

    /// Outgoing edges of a vertex surviving the filter.
    pub fn out_edges(&self, vertex: &RecordDescriptor, filter: &GraphFilter) -> Result<ResultSet> {
        let descriptors = self.edge_descriptors(vertex, Direction::Out, filter)?;
        self.materialise(descriptors)
    }

    /// Incident edges of a vertex in both directions.
    pub fn all_edges(&self, vertex: &RecordDescriptor, filter: &GraphFilter) -> Result<ResultSet> {
        let descriptors = self.edge_descriptors(vertex, Direction::All, filter)?;
        self.materialise(descriptors)
    }

    /// Cursor form of [`in_edges`](Transaction::in_edges).
    pub fn in_edges_cursor(
        &self,
        vertex: &RecordDescriptor,
        filter: &GraphFilter,
    ) -> Result<ResultCursor<'_, 'ctx>> {
        let descriptors = self.edge_descriptors(vertex, Direction::In, filter)?;
        Ok(ResultCursor::new(self, descriptors))
    }

    /// Cursor form of [`out_edges`](Transaction::out_edges).
    pub fn out_edges_cursor(
        &self,
        vertex: &RecordDescriptor,
        filter: &GraphFilter,
    ) -> Result<ResultCursor<'_, 'ctx>> {
        let descriptors = self.edge_descriptors(vertex, Direction::Out, filter)?;
        Ok(ResultCursor::new(self, descriptors))
    }

    /// Cursor form of [`all_edges`](Transaction::all_edges).
    pub fn all_edges_cursor(
        &self,
        vertex: &RecordDescriptor,
        filter: &GraphFilter,
    ) -> Result<ResultCursor<'_, 'ctx>> {
        let descriptors = self.edge_descriptors(vertex, Direction::All, filter)?;
        Ok(ResultCursor::new(self, descriptors))
    }

    /// Distinct edge classes with an incoming edge at `vertex`.
    pub fn in_edge_classes(&self, vertex: &RecordDescriptor) -> Result<Vec<ClassDescriptor>> {
        self.edge_classes(vertex, Direction::In)
    }

    /// Distinct edge classes with an outgoing edge at `vertex`.
    pub fn out_edge_classes(&self, vertex: &RecordDescriptor) -> Result<Vec<ClassDescriptor>> {
        self.edge_classes(vertex, Direction::Out)
    }

    fn edge_classes(
        &self,
        vertex: &RecordDescriptor,
        direction: Direction,
    ) -> Result<Vec<ClassDescriptor>> {
        let parts = self.read_parts()?;
        self.require_vertex(vertex.rid)?;
        let class_ids = match direction {
            Direction::In => parts.ctx.relations.in_edge_classes(parts.rtxn, vertex.rid)?,
            _ => parts.ctx.relations.out_edge_classes(parts.rtxn, vertex.rid)?,
        };
        let mut classes = Vec::with_capacity(class_ids.len());
        for class_id in class_ids {
            let class = parts
                .catalog
                .class(class_id)
                .ok_or_else(|| TenebraError::NoSuchClass(class_id.to_string()))?;
            classes.push(class.clone());
        }
        Ok(classes)
    }

    fn edge_descriptors(
        &self,
        vertex: &RecordDescriptor,
        direction: Direction,
        filter: &GraphFilter,
    ) -> Result<Vec<RecordDescriptor>> {
        let parts = self.read_parts()?;
        self.require_vertex(vertex.rid)?;

        let mut incidences = match direction {
            Direction::In => parts.ctx.relations.in_edges(parts.rtxn, vertex.rid, None)?,
            Direction::Out => parts.ctx.relations.out_edges(parts.rtxn, vertex.rid, None)?,
            Direction::All => {
                let mut all = parts.ctx.relations.in_edges(parts.rtxn, vertex.rid, None)?;
                all.extend(parts.ctx.relations.out_edges(parts.rtxn, vertex.rid, None)?);
                all
            }
        };

        if filter.has_class_filter() {
            let classes = ClassFilter::expand(parts.catalog, filter);
            incidences.retain(|inc| classes.allows(inc.edge.class_id));
        }

        let mut descriptors = Vec::with_capacity(incidences.len());
        for inc in incidences {
            let descriptor = RecordDescriptor::new(inc.edge);
            if filter.has_predicate() {
                let Some(result) = self.fetch_result(&descriptor)? else {
                    return Err(TenebraError::GraphInternal(format!(
                        "adjacency references missing edge {}",
                        inc.edge
                    )));
                };
                let properties = parts.catalog.property_name_map(inc.edge.class_id);
                let matched = match &filter.predicate {
                    FilterPredicate::None => true,
                    FilterPredicate::Condition(condition) => {
                        compare::eval_condition(&result.record, &properties, condition)
                    }
                    FilterPredicate::Multi(multi) => {
                        compare::eval_multi(&result.record, &properties, multi)
                    }
                    FilterPredicate::Function(function) => function(&result.record),
                };
                if !matched {
                    continue;
                }
            }
            descriptors.push(descriptor);
        }
        Ok(descriptors)
    }

    pub(crate) fn require_vertex(&self, rid: RecordId) -> Result<()> {
        let parts = self.read_parts()?;
        let class = parts
            .catalog
            .class(rid.class_id)
            .ok_or_else(|| TenebraError::NoSuchVertex(rid.to_string()))?;
        if class.kind != ClassKind::Vertex {
            return Err(TenebraError::NoSuchVertex(rid.to_string()));
        }
        let store = records::open_store(&parts.ctx.kv, parts.rtxn, rid.class_id)?;
        if !records::exists(store, parts.rtxn, rid.position)? {
            return Err(TenebraError::NoSuchVertex(rid.to_string()));
        }
        Ok(())
    }
}
