//! Query planning and execution: resolves the target class extent, serves
//! each class from an index when one matches the predicate, and falls back
//! to a cursor scan otherwise.

use std::collections::{BTreeSet, HashSet};

use heed3::RoTxn;

use crate::codec;
use crate::error::{Result, TenebraError};
use crate::kv::KvEnv;
use crate::model::{
    Bytes, ClassDescriptor, ClassId, ClassKind, IndexDescriptor, PropertyType, Record,
    RecordDescriptor, RecordId, CLASS_NAME_FIELD, DEPTH_FIELD, RECORD_ID_FIELD,
};
use crate::query::compare;
use crate::query::condition::{Comparator, Condition, ConditionNode, MultiCondition};
use crate::schema::Catalog;
use crate::storage::{index, records};

/// What to match when querying a class.
#[derive(Clone, Debug, Default)]
pub enum Selector {
    /// Every record of the target extent.
    #[default]
    All,
    Condition(Condition),
    Multi(MultiCondition),
    Function(fn(&Record) -> bool),
}

impl From<Condition> for Selector {
    fn from(condition: Condition) -> Self {
        Selector::Condition(condition)
    }
}

impl From<MultiCondition> for Selector {
    fn from(multi: MultiCondition) -> Self {
        Selector::Multi(multi)
    }
}

impl From<fn(&Record) -> bool> for Selector {
    fn from(function: fn(&Record) -> bool) -> Self {
        Selector::Function(function)
    }
}

// ---- record access shared with the data and traversal layers -----------

/// Reads and decodes one record row. `None` when the row does not exist.
pub(crate) fn read_record(
    env: &KvEnv,
    rtxn: &RoTxn<'_>,
    catalog: &Catalog,
    rid: RecordId,
) -> Result<Option<Record>> {
    let class = catalog
        .class(rid.class_id)
        .ok_or_else(|| TenebraError::NoSuchClass(rid.class_id.to_string()))?;
    let store = records::open_store(env, rtxn, rid.class_id)?;
    match records::get(store, rtxn, rid.position)? {
        None => Ok(None),
        Some(raw) => {
            let ids = catalog.property_id_map(rid.class_id);
            Ok(Some(codec::parse_record(
                &raw,
                &ids,
                class.kind == ClassKind::Edge,
            )?))
        }
    }
}

/// Reads a record and injects the derived basic fields.
pub(crate) fn read_record_with_basic_info(
    env: &KvEnv,
    rtxn: &RoTxn<'_>,
    catalog: &Catalog,
    descriptor: &RecordDescriptor,
) -> Result<Option<Record>> {
    match read_record(env, rtxn, catalog, descriptor.rid)? {
        None => Ok(None),
        Some(mut record) => {
            let class = catalog
                .class(descriptor.rid.class_id)
                .ok_or_else(|| TenebraError::NoSuchClass(descriptor.rid.class_id.to_string()))?;
            record.set_basic(CLASS_NAME_FIELD, Bytes::from(class.name.as_str()));
            record.set_basic(RECORD_ID_FIELD, Bytes::from(descriptor.rid.to_string()));
            record.set_basic(DEPTH_FIELD, Bytes::from(descriptor.depth));
            Ok(Some(record))
        }
    }
}

// ---- index planning ----------------------------------------------------

enum Plan<'c> {
    Probe {
        index: IndexDescriptor,
        prop_type: PropertyType,
        probe: index::IndexProbe<'c>,
    },
    And(Box<Plan<'c>>, Box<Plan<'c>>),
    Or(Box<Plan<'c>>, Box<Plan<'c>>),
}

/// A condition is index-servable iff its comparator is in the supported
/// set and it is neither negated nor case-folded. Null tests and text
/// predicates always fall back to a scan.
fn plan_condition<'c>(
    catalog: &Catalog,
    class_id: ClassId,
    condition: &'c Condition,
) -> Option<Plan<'c>> {
    if condition.negated || condition.ignore_case {
        return None;
    }
    let property = catalog.resolve_property(class_id, &condition.prop)?;
    let index = catalog.index_for(class_id, property.id)?.clone();
    let probe = match &condition.comparator {
        Comparator::Equal(value) => index::IndexProbe::Equal(value),
        Comparator::Greater(value) => index::IndexProbe::Greater {
            value,
            or_eq: false,
        },
        Comparator::GreaterEqual(value) => index::IndexProbe::Greater { value, or_eq: true },
        Comparator::Less(value) => index::IndexProbe::Less {
            value,
            or_eq: false,
        },
        Comparator::LessEqual(value) => index::IndexProbe::Less { value, or_eq: true },
        Comparator::Between {
            lower,
            upper,
            include_lower,
            include_upper,
        } => index::IndexProbe::Between {
            lower,
            upper,
            include: (*include_lower, *include_upper),
        },
        Comparator::In(values) => index::IndexProbe::In(values),
        _ => return None,
    };
    Some(Plan::Probe {
        index,
        prop_type: property.prop_type,
        probe,
    })
}

/// A conjunction is index-servable when every leaf is; a disjunction when
/// every disjunct is (the union of the results is returned). Any negated
/// node falls the whole tree back to a scan.
fn plan_node<'c>(catalog: &Catalog, class_id: ClassId, node: &'c ConditionNode) -> Option<Plan<'c>> {
    match node {
        ConditionNode::Leaf(condition) => plan_condition(catalog, class_id, condition),
        ConditionNode::And(a, b) => Some(Plan::And(
            Box::new(plan_node(catalog, class_id, a)?),
            Box::new(plan_node(catalog, class_id, b)?),
        )),
        ConditionNode::Or(a, b) => Some(Plan::Or(
            Box::new(plan_node(catalog, class_id, a)?),
            Box::new(plan_node(catalog, class_id, b)?),
        )),
        ConditionNode::Not(_) => None,
    }
}

fn execute_plan(env: &KvEnv, rtxn: &RoTxn<'_>, plan: &Plan<'_>) -> Result<BTreeSet<RecordId>> {
    match plan {
        Plan::Probe {
            index,
            prop_type,
            probe,
        } => Ok(index::execute(env, rtxn, index, *prop_type, probe)?
            .into_iter()
            .collect()),
        Plan::And(a, b) => {
            let left = execute_plan(env, rtxn, a)?;
            let right = execute_plan(env, rtxn, b)?;
            Ok(left.intersection(&right).copied().collect())
        }
        Plan::Or(a, b) => {
            let mut left = execute_plan(env, rtxn, a)?;
            left.extend(execute_plan(env, rtxn, b)?);
            Ok(left)
        }
    }
}

// ---- execution ---------------------------------------------------------

/// Resolves `target` (optionally with its subclasses) and returns the
/// descriptors matching `selector`. With `index_only`, classes that cannot
/// be served from an index contribute nothing.
pub(crate) fn find_descriptors(
    env: &KvEnv,
    rtxn: &RoTxn<'_>,
    catalog: &Catalog,
    target: &ClassDescriptor,
    include_subclasses: bool,
    selector: &Selector,
    index_only: bool,
) -> Result<Vec<RecordDescriptor>> {
    let extent = if include_subclasses {
        catalog.resolve_subclasses(target.id)
    } else {
        vec![target.id]
    };
    let extent_set: HashSet<ClassId> = extent.iter().copied().collect();
    let mut covered: HashSet<ClassId> = HashSet::new();
    let mut result = Vec::new();

    for &class_id in &extent {
        if covered.contains(&class_id) {
            continue;
        }

        let plan = match selector {
            Selector::Condition(condition) => plan_condition(catalog, class_id, condition),
            Selector::Multi(multi) => plan_node(catalog, class_id, &multi.root),
            _ => None,
        };

        if let Some(plan) = plan {
            // The index may hold entries of the whole subtree under the
            // class it was created on; restrict to the classes this pass
            // is answering for.
            let subtree: HashSet<ClassId> = catalog
                .resolve_subclasses(class_id)
                .into_iter()
                .filter(|cid| extent_set.contains(cid))
                .collect();
            for rid in execute_plan(env, rtxn, &plan)? {
                if subtree.contains(&rid.class_id) {
                    result.push(RecordDescriptor::new(rid));
                }
            }
            covered.extend(subtree);
            continue;
        }

        if index_only {
            covered.insert(class_id);
            continue;
        }

        scan_class(env, rtxn, catalog, class_id, selector, &mut result)?;
        covered.insert(class_id);
    }

    Ok(result)
}

fn scan_class(
    env: &KvEnv,
    rtxn: &RoTxn<'_>,
    catalog: &Catalog,
    class_id: ClassId,
    selector: &Selector,
    result: &mut Vec<RecordDescriptor>,
) -> Result<()> {
    let class = catalog
        .class(class_id)
        .ok_or_else(|| TenebraError::NoSuchClass(class_id.to_string()))?;
    let store = records::open_store(env, rtxn, class_id)?;
    let is_edge = class.kind == ClassKind::Edge;
    let properties = catalog.property_name_map(class_id);
    let ids = catalog.property_id_map(class_id);

    records::scan(store, rtxn, |position, raw| {
        let rid = RecordId::new(class_id, position);
        let matched = match selector {
            Selector::All => true,
            Selector::Condition(condition) => {
                let record = codec::parse_record(raw, &ids, is_edge)?;
                compare::eval_condition(&record, &properties, condition)
            }
            Selector::Multi(multi) => {
                let record = codec::parse_record(raw, &ids, is_edge)?;
                compare::eval_multi(&record, &properties, multi)
            }
            Selector::Function(function) => {
                let mut record = codec::parse_record(raw, &ids, is_edge)?;
                record.set_basic(CLASS_NAME_FIELD, Bytes::from(class.name.as_str()));
                record.set_basic(RECORD_ID_FIELD, Bytes::from(rid.to_string()));
                function(&record)
            }
        };
        if matched {
            result.push(RecordDescriptor::new(rid));
        }
        Ok(true)
    })
}
