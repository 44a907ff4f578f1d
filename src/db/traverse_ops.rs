//! Traversal surface: BFS/DFS walks and shortest-path queries over the
//! adjacency store, in materialised and cursor forms.

use std::ops::Add;

use crate::db::cursor::ResultCursor;
use crate::db::transaction::Transaction;
use crate::error::Result;
use crate::model::{RecordDescriptor, ResultSet};
use crate::query::filter::GraphFilter;
use crate::traverse::{self, Direction, TraverseCtx, TraverseOptions};

impl<'ctx> Transaction<'ctx> {
    /// Breadth-first traversal from `root` over the given edge direction.
    pub fn bfs(
        &self,
        root: &RecordDescriptor,
        direction: Direction,
        opts: &TraverseOptions,
    ) -> Result<ResultSet> {
        let descriptors = self.bfs_descriptors(root, direction, opts)?;
        self.materialise(descriptors)
    }

    /// Cursor form of [`bfs`](Transaction::bfs).
    pub fn bfs_cursor(
        &self,
        root: &RecordDescriptor,
        direction: Direction,
        opts: &TraverseOptions,
    ) -> Result<ResultCursor<'_, 'ctx>> {
        let descriptors = self.bfs_descriptors(root, direction, opts)?;
        Ok(ResultCursor::new(self, descriptors))
    }

    /// Depth-first traversal from `root` over the given edge direction.
    pub fn dfs(
        &self,
        root: &RecordDescriptor,
        direction: Direction,
        opts: &TraverseOptions,
    ) -> Result<ResultSet> {
        let descriptors = self.dfs_descriptors(root, direction, opts)?;
        self.materialise(descriptors)
    }

    /// Cursor form of [`dfs`](Transaction::dfs).
    pub fn dfs_cursor(
        &self,
        root: &RecordDescriptor,
        direction: Direction,
        opts: &TraverseOptions,
    ) -> Result<ResultCursor<'_, 'ctx>> {
        let descriptors = self.dfs_descriptors(root, direction, opts)?;
        Ok(ResultCursor::new(self, descriptors))
    }

    /// Unweighted shortest path from `src` to `dst` over outgoing edges.
    /// Returns the vertex sequence with `@depth` set to the path position,
    /// or an empty set when unreachable.
    pub fn shortest_path(
        &self,
        src: &RecordDescriptor,
        dst: &RecordDescriptor,
        edge_filter: &GraphFilter,
        vertex_filter: &GraphFilter,
    ) -> Result<ResultSet> {
        let descriptors = self.shortest_path_descriptors(src, dst, edge_filter, vertex_filter)?;
        self.materialise(descriptors)
    }

    /// Cursor form of [`shortest_path`](Transaction::shortest_path).
    pub fn shortest_path_cursor(
        &self,
        src: &RecordDescriptor,
        dst: &RecordDescriptor,
        edge_filter: &GraphFilter,
        vertex_filter: &GraphFilter,
    ) -> Result<ResultCursor<'_, 'ctx>> {
        let descriptors = self.shortest_path_descriptors(src, dst, edge_filter, vertex_filter)?;
        Ok(ResultCursor::new(self, descriptors))
    }

    /// Weighted shortest path with a caller-supplied non-negative edge
    /// cost. Returns the total cost and the vertex sequence; the default
    /// cost and an empty set when unreachable.
    pub fn dijkstra_shortest_path<C, F>(
        &self,
        src: &RecordDescriptor,
        dst: &RecordDescriptor,
        cost: F,
        edge_filter: &GraphFilter,
        vertex_filter: &GraphFilter,
    ) -> Result<(C, ResultSet)>
    where
        C: PartialOrd + Add<Output = C> + Default + Copy,
        F: Fn(&Transaction<'ctx>, &RecordDescriptor) -> Result<C>,
    {
        let parts = self.read_parts()?;
        let ctx = TraverseCtx {
            env: &parts.ctx.kv,
            rtxn: parts.rtxn,
            catalog: parts.catalog,
            relations: &parts.ctx.relations,
        };
        let (total, descriptors) = traverse::dijkstra_shortest_path(
            &ctx,
            src.rid,
            dst.rid,
            |edge| cost(self, edge),
            edge_filter,
            vertex_filter,
        )?;
        Ok((total, self.materialise(descriptors)?))
    }

    fn bfs_descriptors(
        &self,
        root: &RecordDescriptor,
        direction: Direction,
        opts: &TraverseOptions,
    ) -> Result<Vec<RecordDescriptor>> {
        let parts = self.read_parts()?;
        let ctx = TraverseCtx {
            env: &parts.ctx.kv,
            rtxn: parts.rtxn,
            catalog: parts.catalog,
            relations: &parts.ctx.relations,
        };
        traverse::breadth_first(&ctx, root.rid, direction, opts)
    }

    fn dfs_descriptors(
        &self,
        root: &RecordDescriptor,
        direction: Direction,
        opts: &TraverseOptions,
    ) -> Result<Vec<RecordDescriptor>> {
        let parts = self.read_parts()?;
        let ctx = TraverseCtx {
            env: &parts.ctx.kv,
            rtxn: parts.rtxn,
            catalog: parts.catalog,
            relations: &parts.ctx.relations,
        };
        traverse::depth_first(&ctx, root.rid, direction, opts)
    }

    fn shortest_path_descriptors(
        &self,
        src: &RecordDescriptor,
        dst: &RecordDescriptor,
        edge_filter: &GraphFilter,
        vertex_filter: &GraphFilter,
    ) -> Result<Vec<RecordDescriptor>> {
        let parts = self.read_parts()?;
        let ctx = TraverseCtx {
            env: &parts.ctx.kv,
            rtxn: parts.rtxn,
            catalog: parts.catalog,
            relations: &parts.ctx.relations,
        };
        traverse::bfs_shortest_path(&ctx, src.rid, dst.rid, edge_filter, vertex_filter)
    }
}
