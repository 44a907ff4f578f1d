//! Graph adjacency store: the `in`, `out` and `endpoints` relations derived
//! from live edges.
//!
//! `in` and `out` are multi-value stores keyed by `vertex rid ‖ edge class`,
//! so restricting a lookup to one edge class is a prefix scan and the
//! distinct edge classes of a vertex are read off the keys. `endpoints` maps
//! an edge rid to its `(src, dst)` pair; it is recoverable from the edge
//! rows but kept for O(1) lookup.

use heed3::{RoTxn, RwTxn};

use crate::error::{Result, TenebraError};
use crate::kv::{self, KvEnv, Store, StoreKind};
use crate::model::{ClassId, PositionId, RecordId};

pub(crate) const ENDPOINTS_STORE: &str = ".relations";
pub(crate) const IN_STORE: &str = ".relations_in";
pub(crate) const OUT_STORE: &str = ".relations_out";

const RID_LEN: usize = 8;
const ADJ_KEY_LEN: usize = 12;
const ADJ_VALUE_LEN: usize = 12;

pub(crate) fn rid_key(rid: RecordId) -> [u8; RID_LEN] {
    let mut key = [0u8; RID_LEN];
    key[0..4].copy_from_slice(&u32::from(rid.class_id.0).to_be_bytes());
    key[4..8].copy_from_slice(&rid.position.0.to_be_bytes());
    key
}

fn decode_rid(raw: &[u8]) -> Result<RecordId> {
    if raw.len() != RID_LEN {
        return Err(TenebraError::Corruption("record id key malformed".into()));
    }
    let class = u32::from_be_bytes(raw[0..4].try_into().expect("slice has exactly 4 bytes"));
    let position = u32::from_be_bytes(raw[4..8].try_into().expect("slice has exactly 4 bytes"));
    let class = u16::try_from(class)
        .map_err(|_| TenebraError::Corruption("class id out of range".into()))?;
    Ok(RecordId::new(ClassId(class), PositionId(position)))
}

fn adjacency_key(vertex: RecordId, edge_class: ClassId) -> [u8; ADJ_KEY_LEN] {
    let mut key = [0u8; ADJ_KEY_LEN];
    key[0..8].copy_from_slice(&rid_key(vertex));
    key[8..12].copy_from_slice(&u32::from(edge_class.0).to_be_bytes());
    key
}

fn adjacency_value(edge_position: PositionId, neighbour: RecordId) -> [u8; ADJ_VALUE_LEN] {
    let mut value = [0u8; ADJ_VALUE_LEN];
    value[0..4].copy_from_slice(&edge_position.0.to_be_bytes());
    value[4..12].copy_from_slice(&rid_key(neighbour));
    value
}

fn decode_adjacency(key: &[u8], value: &[u8]) -> Result<(ClassId, PositionId, RecordId)> {
    if key.len() != ADJ_KEY_LEN || value.len() != ADJ_VALUE_LEN {
        return Err(TenebraError::Corruption("adjacency entry malformed".into()));
    }
    let edge_class = u32::from_be_bytes(key[8..12].try_into().expect("slice has exactly 4 bytes"));
    let edge_class = u16::try_from(edge_class)
        .map_err(|_| TenebraError::Corruption("edge class id out of range".into()))?;
    let edge_position =
        u32::from_be_bytes(value[0..4].try_into().expect("slice has exactly 4 bytes"));
    let neighbour = decode_rid(&value[4..12])?;
    Ok((ClassId(edge_class), PositionId(edge_position), neighbour))
}

/// One incident edge of a vertex, paired with the vertex on the other end.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub(crate) struct Incidence {
    pub edge: RecordId,
    pub neighbour: RecordId,
}

/// Handles of the three fixed relation stores.
#[derive(Copy, Clone)]
pub(crate) struct RelationStores {
    endpoints: Store,
    ins: Store,
    outs: Store,
}

impl RelationStores {
    pub(crate) fn create(env: &KvEnv, wtxn: &mut RwTxn) -> Result<Self> {
        Ok(Self {
            endpoints: env.create_store(wtxn, ENDPOINTS_STORE, StoreKind::Plain)?,
            ins: env.create_store(wtxn, IN_STORE, StoreKind::MultiFixed)?,
            outs: env.create_store(wtxn, OUT_STORE, StoreKind::MultiFixed)?,
        })
    }

    /// Registers a live edge: `out(src)`, `in(dst)` and the endpoints row
    /// are written together so the derived image never drifts from the edge
    /// rows within a transaction.
    pub(crate) fn add_edge(
        &self,
        wtxn: &mut RwTxn,
        edge: RecordId,
        src: RecordId,
        dst: RecordId,
    ) -> Result<()> {
        self.outs.put(
            wtxn,
            &adjacency_key(src, edge.class_id),
            &adjacency_value(edge.position, dst),
        )?;
        self.ins.put(
            wtxn,
            &adjacency_key(dst, edge.class_id),
            &adjacency_value(edge.position, src),
        )?;
        let mut row = [0u8; 2 * RID_LEN];
        row[0..RID_LEN].copy_from_slice(&rid_key(src));
        row[RID_LEN..].copy_from_slice(&rid_key(dst));
        self.endpoints.put(wtxn, &rid_key(edge), &row)?;
        Ok(())
    }

    pub(crate) fn remove_edge(
        &self,
        wtxn: &mut RwTxn,
        edge: RecordId,
        src: RecordId,
        dst: RecordId,
    ) -> Result<()> {
        self.outs.delete_one_duplicate(
            wtxn,
            &adjacency_key(src, edge.class_id),
            &adjacency_value(edge.position, dst),
        )?;
        self.ins.delete_one_duplicate(
            wtxn,
            &adjacency_key(dst, edge.class_id),
            &adjacency_value(edge.position, src),
        )?;
        self.endpoints.delete(wtxn, &rid_key(edge))?;
        Ok(())
    }

    pub(crate) fn update_src(
        &self,
        wtxn: &mut RwTxn,
        edge: RecordId,
        old_src: RecordId,
        new_src: RecordId,
        dst: RecordId,
    ) -> Result<()> {
        self.remove_edge(wtxn, edge, old_src, dst)?;
        self.add_edge(wtxn, edge, new_src, dst)
    }

    pub(crate) fn update_dst(
        &self,
        wtxn: &mut RwTxn,
        edge: RecordId,
        src: RecordId,
        old_dst: RecordId,
        new_dst: RecordId,
    ) -> Result<()> {
        self.remove_edge(wtxn, edge, src, old_dst)?;
        self.add_edge(wtxn, edge, src, new_dst)
    }

    pub(crate) fn endpoints(
        &self,
        rtxn: &RoTxn<'_>,
        edge: RecordId,
    ) -> Result<Option<(RecordId, RecordId)>> {
        match self.endpoints.get(rtxn, &rid_key(edge))? {
            None => Ok(None),
            Some(row) => {
                if row.len() != 2 * RID_LEN {
                    return Err(TenebraError::Corruption("endpoints row malformed".into()));
                }
                Ok(Some((
                    decode_rid(&row[0..RID_LEN])?,
                    decode_rid(&row[RID_LEN..])?,
                )))
            }
        }
    }

    pub(crate) fn in_edges(
        &self,
        rtxn: &RoTxn<'_>,
        vertex: RecordId,
        edge_class: Option<ClassId>,
    ) -> Result<Vec<Incidence>> {
        scan_adjacency(self.ins, rtxn, vertex, edge_class)
    }

    pub(crate) fn out_edges(
        &self,
        rtxn: &RoTxn<'_>,
        vertex: RecordId,
        edge_class: Option<ClassId>,
    ) -> Result<Vec<Incidence>> {
        scan_adjacency(self.outs, rtxn, vertex, edge_class)
    }

    pub(crate) fn in_edge_classes(&self, rtxn: &RoTxn<'_>, vertex: RecordId) -> Result<Vec<ClassId>> {
        scan_edge_classes(self.ins, rtxn, vertex)
    }

    pub(crate) fn out_edge_classes(&self, rtxn: &RoTxn<'_>, vertex: RecordId) -> Result<Vec<ClassId>> {
        scan_edge_classes(self.outs, rtxn, vertex)
    }
}

fn scan_adjacency(
    store: Store,
    rtxn: &RoTxn<'_>,
    vertex: RecordId,
    edge_class: Option<ClassId>,
) -> Result<Vec<Incidence>> {
    let prefix: Vec<u8> = match edge_class {
        Some(class) => adjacency_key(vertex, class).to_vec(),
        None => rid_key(vertex).to_vec(),
    };
    let mut result = Vec::new();
    kv::scan_prefix(store, rtxn, &prefix, |key, value| {
        let (class, position, neighbour) = decode_adjacency(key, value)?;
        result.push(Incidence {
            edge: RecordId::new(class, position),
            neighbour,
        });
        Ok(true)
    })?;
    Ok(result)
}

fn scan_edge_classes(store: Store, rtxn: &RoTxn<'_>, vertex: RecordId) -> Result<Vec<ClassId>> {
    let prefix = rid_key(vertex);
    let mut result = Vec::new();
    kv::scan_prefix(store, rtxn, &prefix, |key, value| {
        let (class, _, _) = decode_adjacency(key, value)?;
        if result.last() != Some(&class) {
            result.push(class);
        }
        Ok(true)
    })?;
    Ok(result)
}
