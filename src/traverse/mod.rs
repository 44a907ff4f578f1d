//! Graph traversal: breadth- and depth-first walks with depth windows and
//! vertex/edge filters, plus unweighted and weighted shortest path.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::ops::Add;

use heed3::RoTxn;

use crate::error::{Result, TenebraError};
use crate::kv::KvEnv;
use crate::model::{ClassKind, RecordDescriptor, RecordId};
use crate::query::compare;
use crate::query::filter::{ClassFilter, FilterPredicate, GraphFilter};
use crate::query::planner;
use crate::schema::Catalog;
use crate::storage::graph::{Incidence, RelationStores};
use crate::storage::records;

/// Which incident edges a traversal follows.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Direction {
    In,
    Out,
    All,
}

/// Depth window and filters of a traversal.
#[derive(Clone, Debug)]
pub struct TraverseOptions {
    pub(crate) min_depth: u32,
    pub(crate) max_depth: u32,
    pub(crate) edge_filter: GraphFilter,
    pub(crate) vertex_filter: GraphFilter,
}

impl Default for TraverseOptions {
    fn default() -> Self {
        Self {
            min_depth: 0,
            max_depth: u32::MAX,
            edge_filter: GraphFilter::new(),
            vertex_filter: GraphFilter::new(),
        }
    }
}

impl TraverseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min_depth(mut self, depth: u32) -> Self {
        self.min_depth = depth;
        self
    }

    pub fn max_depth(mut self, depth: u32) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn edge_filter(mut self, filter: GraphFilter) -> Self {
        self.edge_filter = filter;
        self
    }

    pub fn vertex_filter(mut self, filter: GraphFilter) -> Self {
        self.vertex_filter = filter;
        self
    }
}

/// Read-side state shared by every traversal algorithm.
pub(crate) struct TraverseCtx<'a> {
    pub env: &'a KvEnv,
    pub rtxn: &'a RoTxn<'a>,
    pub catalog: &'a Catalog,
    pub relations: &'a RelationStores,
}

impl TraverseCtx<'_> {
    fn vertex_exists(&self, rid: RecordId) -> Result<bool> {
        let Some(class) = self.catalog.class(rid.class_id) else {
            return Ok(false);
        };
        if class.kind != ClassKind::Vertex {
            return Ok(false);
        }
        let store = records::open_store(self.env, self.rtxn, rid.class_id)?;
        records::exists(store, self.rtxn, rid.position)
    }

    fn require_vertex(&self, rid: RecordId, missing: fn(String) -> TenebraError) -> Result<()> {
        if self.vertex_exists(rid)? {
            Ok(())
        } else {
            Err(missing(rid.to_string()))
        }
    }

    /// Incident edges of `vertex` surviving the edge filter, paired with
    /// the vertex on the other end.
    fn incident(
        &self,
        vertex: RecordId,
        direction: Direction,
        filter: &GraphFilter,
        classes: &ClassFilter,
    ) -> Result<Vec<Incidence>> {
        let mut edges = match direction {
            Direction::In => self.relations.in_edges(self.rtxn, vertex, None)?,
            Direction::Out => self.relations.out_edges(self.rtxn, vertex, None)?,
            Direction::All => {
                let mut all = self.relations.in_edges(self.rtxn, vertex, None)?;
                all.extend(self.relations.out_edges(self.rtxn, vertex, None)?);
                all
            }
        };
        edges.retain(|inc| classes.allows(inc.edge.class_id));
        if filter.has_predicate() {
            let mut surviving = Vec::with_capacity(edges.len());
            for inc in edges {
                if self.record_matches(inc.edge, filter)? {
                    surviving.push(inc);
                }
            }
            edges = surviving;
        }
        Ok(edges)
    }

    /// Applies a filter's class lists and predicate to one vertex.
    fn vertex_allowed(
        &self,
        rid: RecordId,
        filter: &GraphFilter,
        classes: &ClassFilter,
    ) -> Result<bool> {
        if !classes.allows(rid.class_id) {
            return Ok(false);
        }
        if !filter.has_predicate() {
            return Ok(true);
        }
        self.record_matches(rid, filter)
    }

    fn record_matches(&self, rid: RecordId, filter: &GraphFilter) -> Result<bool> {
        let descriptor = RecordDescriptor::new(rid);
        let record =
            planner::read_record_with_basic_info(self.env, self.rtxn, self.catalog, &descriptor)?
                .ok_or_else(|| {
                    TenebraError::GraphInternal(format!("adjacency references missing record {rid}"))
                })?;
        let properties = self.catalog.property_name_map(rid.class_id);
        Ok(match &filter.predicate {
            FilterPredicate::None => true,
            FilterPredicate::Condition(condition) => {
                compare::eval_condition(&record, &properties, condition)
            }
            FilterPredicate::Multi(multi) => compare::eval_multi(&record, &properties, multi),
            FilterPredicate::Function(function) => function(&record),
        })
    }
}

/// Breadth-first walk. Emits the source iff `min_depth == 0`; every other
/// vertex is emitted at the level it is first discovered, provided the
/// level falls inside the depth window and the vertex passes the filter.
pub(crate) fn breadth_first(
    ctx: &TraverseCtx<'_>,
    root: RecordId,
    direction: Direction,
    opts: &TraverseOptions,
) -> Result<Vec<RecordDescriptor>> {
    ctx.require_vertex(root, TenebraError::NoSuchVertex)?;
    let edge_classes = ClassFilter::expand(ctx.catalog, &opts.edge_filter);
    let vertex_classes = ClassFilter::expand(ctx.catalog, &opts.vertex_filter);

    let mut result = Vec::new();
    let mut visited: HashSet<RecordId> = HashSet::from([root]);
    let mut queue: VecDeque<(RecordId, u32)> = VecDeque::from([(root, 0)]);

    if opts.min_depth == 0 {
        result.push(RecordDescriptor::at_depth(root, 0));
    }

    while let Some((vertex, level)) = queue.pop_front() {
        if level >= opts.max_depth {
            continue;
        }
        for inc in ctx.incident(vertex, direction, &opts.edge_filter, &edge_classes)? {
            let next = inc.neighbour;
            if visited.contains(&next) {
                continue;
            }
            if !ctx.vertex_allowed(next, &opts.vertex_filter, &vertex_classes)? {
                continue;
            }
            visited.insert(next);
            let depth = level + 1;
            if depth >= opts.min_depth && depth <= opts.max_depth {
                result.push(RecordDescriptor::at_depth(next, depth));
            }
            if depth < opts.max_depth {
                queue.push_back((next, depth));
            }
        }
    }

    Ok(result)
}

/// Depth-first walk with pre-order emission. Children are pushed in reverse
/// adjacency order so iteration order is stable. The source bypasses the
/// vertex filter, as in the breadth-first variant.
pub(crate) fn depth_first(
    ctx: &TraverseCtx<'_>,
    root: RecordId,
    direction: Direction,
    opts: &TraverseOptions,
) -> Result<Vec<RecordDescriptor>> {
    ctx.require_vertex(root, TenebraError::NoSuchVertex)?;
    let edge_classes = ClassFilter::expand(ctx.catalog, &opts.edge_filter);
    let vertex_classes = ClassFilter::expand(ctx.catalog, &opts.vertex_filter);

    let mut result = Vec::new();
    let mut visited: HashSet<RecordId> = HashSet::new();
    let mut stack: Vec<Vec<RecordId>> = vec![vec![root]];
    let mut level = 0usize;

    while let Some(vertex) = stack[level].pop() {
        if !visited.contains(&vertex) {
            let allowed =
                level == 0 || ctx.vertex_allowed(vertex, &opts.vertex_filter, &vertex_classes)?;
            if allowed {
                visited.insert(vertex);
                let depth = level as u32;
                if depth >= opts.min_depth && depth <= opts.max_depth {
                    result.push(RecordDescriptor::at_depth(vertex, depth));
                }
                if depth < opts.max_depth {
                    level += 1;
                    if stack.len() == level {
                        stack.push(Vec::new());
                    }
                    let incidences =
                        ctx.incident(vertex, direction, &opts.edge_filter, &edge_classes)?;
                    for inc in incidences.iter().rev() {
                        if !visited.contains(&inc.neighbour) {
                            stack[level].push(inc.neighbour);
                        }
                    }
                }
            }
        }
        while level > 0 && stack[level].is_empty() {
            level -= 1;
        }
    }

    Ok(result)
}

/// Unweighted shortest path over outgoing edges. Returns the vertex
/// sequence from `src` to `dst` with `depth` set to the path position, or
/// an empty sequence when `dst` is unreachable.
pub(crate) fn bfs_shortest_path(
    ctx: &TraverseCtx<'_>,
    src: RecordId,
    dst: RecordId,
    edge_filter: &GraphFilter,
    vertex_filter: &GraphFilter,
) -> Result<Vec<RecordDescriptor>> {
    ctx.require_vertex(src, TenebraError::NoSuchSrcVertex)?;
    ctx.require_vertex(dst, TenebraError::NoSuchDstVertex)?;

    if src == dst {
        return Ok(vec![RecordDescriptor::at_depth(src, 0)]);
    }

    let edge_classes = ClassFilter::expand(ctx.catalog, edge_filter);
    let vertex_classes = ClassFilter::expand(ctx.catalog, vertex_filter);

    let mut parent: HashMap<RecordId, RecordId> = HashMap::new();
    let mut visited: HashSet<RecordId> = HashSet::from([src]);
    let mut queue: VecDeque<RecordId> = VecDeque::from([src]);

    while let Some(vertex) = queue.pop_front() {
        if vertex == dst {
            break;
        }
        for inc in ctx.incident(vertex, Direction::Out, edge_filter, &edge_classes)? {
            let next = inc.neighbour;
            if visited.contains(&next) {
                continue;
            }
            if !ctx.vertex_allowed(next, vertex_filter, &vertex_classes)? {
                continue;
            }
            visited.insert(next);
            parent.insert(next, vertex);
            queue.push_back(next);
        }
    }

    if !parent.contains_key(&dst) {
        return Ok(Vec::new());
    }

    let mut path = vec![dst];
    let mut cursor = dst;
    while cursor != src {
        cursor = parent[&cursor];
        path.push(cursor);
    }
    path.reverse();
    Ok(path
        .into_iter()
        .enumerate()
        .map(|(i, rid)| RecordDescriptor::at_depth(rid, i as u32))
        .collect())
}

struct MinEntry<C> {
    cost: C,
    vertex: RecordId,
}

impl<C: PartialOrd> PartialEq for MinEntry<C> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<C: PartialOrd> Eq for MinEntry<C> {}

impl<C: PartialOrd> PartialOrd for MinEntry<C> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<C: PartialOrd> Ord for MinEntry<C> {
    // reversed so the std max-heap pops the cheapest entry first
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .partial_cmp(&self.cost)
            .unwrap_or(Ordering::Equal)
    }
}

/// Weighted shortest path over outgoing edges with a caller-supplied,
/// non-negative edge cost. Returns the total cost and the vertex sequence;
/// `(C::default(), [])` when unreachable.
pub(crate) fn dijkstra_shortest_path<C, F>(
    ctx: &TraverseCtx<'_>,
    src: RecordId,
    dst: RecordId,
    mut cost: F,
    edge_filter: &GraphFilter,
    vertex_filter: &GraphFilter,
) -> Result<(C, Vec<RecordDescriptor>)>
where
    C: PartialOrd + Add<Output = C> + Default + Copy,
    F: FnMut(&RecordDescriptor) -> Result<C>,
{
    ctx.require_vertex(src, TenebraError::NoSuchSrcVertex)?;
    ctx.require_vertex(dst, TenebraError::NoSuchDstVertex)?;

    let edge_classes = ClassFilter::expand(ctx.catalog, edge_filter);
    let vertex_classes = ClassFilter::expand(ctx.catalog, vertex_filter);

    let mut distance: HashMap<RecordId, C> = HashMap::from([(src, C::default())]);
    let mut parent: HashMap<RecordId, RecordId> = HashMap::new();
    let mut heap: BinaryHeap<MinEntry<C>> = BinaryHeap::new();
    heap.push(MinEntry {
        cost: C::default(),
        vertex: src,
    });

    while let Some(entry) = heap.pop() {
        if entry.vertex == dst {
            break;
        }
        // skip stale heap entries whose recorded distance has improved
        if distance
            .get(&entry.vertex)
            .is_some_and(|best| entry.cost.partial_cmp(best) == Some(Ordering::Greater))
        {
            continue;
        }
        for inc in ctx.incident(entry.vertex, Direction::Out, edge_filter, &edge_classes)? {
            let next = inc.neighbour;
            if !ctx.vertex_allowed(next, vertex_filter, &vertex_classes)? {
                continue;
            }
            let next_cost = entry.cost + cost(&RecordDescriptor::new(inc.edge))?;
            let improves = match distance.get(&next) {
                None => true,
                Some(best) => next_cost.partial_cmp(best) == Some(Ordering::Less),
            };
            if improves {
                distance.insert(next, next_cost);
                parent.insert(next, entry.vertex);
                heap.push(MinEntry {
                    cost: next_cost,
                    vertex: next,
                });
            }
        }
    }

    let Some(&total) = distance.get(&dst) else {
        return Ok((C::default(), Vec::new()));
    };
    if src != dst && !parent.contains_key(&dst) {
        return Ok((C::default(), Vec::new()));
    }

    let mut path = vec![dst];
    let mut cursor = dst;
    while cursor != src {
        cursor = parent[&cursor];
        path.push(cursor);
    }
    path.reverse();
    let path = path
        .into_iter()
        .enumerate()
        .map(|(i, rid)| RecordDescriptor::at_depth(rid, i as u32))
        .collect();
    Ok((total, path))
}
