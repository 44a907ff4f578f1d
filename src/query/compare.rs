//! Predicate evaluation against decoded property values.
//!
//! Values are decoded according to the declared property type before
//! comparison. A record that lacks the property (or holds null) fails every
//! affirmative predicate; negation is applied as a final XOR.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use regex::Regex;

use crate::model::{Bytes, PropertyDescriptor, PropertyType, Record};
use crate::query::condition::{Comparator, Condition, ConditionNode, MultiCondition};

/// Evaluates a condition using the class's property table to resolve the
/// declared type. An undeclared property never matches affirmatively (the
/// table may legitimately lack it when filtering across heterogeneous edge
/// classes).
pub(crate) fn eval_condition(
    record: &Record,
    properties: &BTreeMap<String, PropertyDescriptor>,
    condition: &Condition,
) -> bool {
    let prop_type = properties.get(&condition.prop).map(|p| p.prop_type);
    eval_condition_typed(record, prop_type, condition)
}

pub(crate) fn eval_condition_typed(
    record: &Record,
    prop_type: Option<PropertyType>,
    condition: &Condition,
) -> bool {
    let value = record.get(&condition.prop);
    let outcome = match &condition.comparator {
        Comparator::IsNull => value.map_or(true, Bytes::is_null),
        Comparator::NotNull => value.is_some_and(|v| !v.is_null()),
        other => match (value, prop_type) {
            (Some(v), Some(ty)) if !v.is_null() => {
                compare_value(v, ty, other, condition.ignore_case)
            }
            _ => false,
        },
    };
    outcome ^ condition.negated
}

pub(crate) fn eval_multi(
    record: &Record,
    properties: &BTreeMap<String, PropertyDescriptor>,
    multi: &MultiCondition,
) -> bool {
    eval_node(record, properties, &multi.root)
}

fn eval_node(
    record: &Record,
    properties: &BTreeMap<String, PropertyDescriptor>,
    node: &ConditionNode,
) -> bool {
    match node {
        ConditionNode::Leaf(condition) => eval_condition(record, properties, condition),
        ConditionNode::And(a, b) => {
            eval_node(record, properties, a) && eval_node(record, properties, b)
        }
        ConditionNode::Or(a, b) => {
            eval_node(record, properties, a) || eval_node(record, properties, b)
        }
        ConditionNode::Not(inner) => !eval_node(record, properties, inner),
    }
}

enum Operand {
    Int(i64),
    UInt(u64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

fn decode(value: &Bytes, prop_type: PropertyType, fold_case: bool) -> Option<Operand> {
    let operand = match prop_type {
        PropertyType::TinyInt => Operand::Int(value.to_i8().ok()?.into()),
        PropertyType::SmallInt => Operand::Int(value.to_i16().ok()?.into()),
        PropertyType::Integer => Operand::Int(value.to_i32().ok()?.into()),
        PropertyType::BigInt => Operand::Int(value.to_i64().ok()?),
        PropertyType::UnsignedTinyInt => Operand::UInt(value.to_u8().ok()?.into()),
        PropertyType::UnsignedSmallInt => Operand::UInt(value.to_u16().ok()?.into()),
        PropertyType::UnsignedInteger => Operand::UInt(value.to_u32().ok()?.into()),
        PropertyType::UnsignedBigInt => Operand::UInt(value.to_u64().ok()?),
        PropertyType::Real => Operand::Real(value.to_f64().ok()?),
        PropertyType::Text => {
            let text = value.to_text().ok()?;
            Operand::Text(if fold_case { text.to_lowercase() } else { text })
        }
        PropertyType::Blob => Operand::Blob(value.to_blob()),
    };
    Some(operand)
}

fn order(a: &Operand, b: &Operand) -> Option<Ordering> {
    match (a, b) {
        (Operand::Int(x), Operand::Int(y)) => Some(x.cmp(y)),
        (Operand::UInt(x), Operand::UInt(y)) => Some(x.cmp(y)),
        (Operand::Real(x), Operand::Real(y)) => x.partial_cmp(y),
        (Operand::Text(x), Operand::Text(y)) => Some(x.cmp(y)),
        (Operand::Blob(x), Operand::Blob(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn compare_value(
    value: &Bytes,
    prop_type: PropertyType,
    comparator: &Comparator,
    ignore_case: bool,
) -> bool {
    let Some(actual) = decode(value, prop_type, ignore_case) else {
        return false;
    };
    let decode_operand = |operand: &Bytes| decode(operand, prop_type, ignore_case);

    match comparator {
        Comparator::Equal(operand) => decode_operand(operand)
            .and_then(|expected| order(&actual, &expected))
            .is_some_and(Ordering::is_eq),
        Comparator::Greater(operand) => decode_operand(operand)
            .and_then(|expected| order(&actual, &expected))
            .is_some_and(Ordering::is_gt),
        Comparator::GreaterEqual(operand) => decode_operand(operand)
            .and_then(|expected| order(&actual, &expected))
            .is_some_and(Ordering::is_ge),
        Comparator::Less(operand) => decode_operand(operand)
            .and_then(|expected| order(&actual, &expected))
            .is_some_and(Ordering::is_lt),
        Comparator::LessEqual(operand) => decode_operand(operand)
            .and_then(|expected| order(&actual, &expected))
            .is_some_and(Ordering::is_le),
        Comparator::Between {
            lower,
            upper,
            include_lower,
            include_upper,
        } => {
            let lower_ok = decode_operand(lower)
                .and_then(|bound| order(&actual, &bound))
                .is_some_and(|o| if *include_lower { o.is_ge() } else { o.is_gt() });
            let upper_ok = decode_operand(upper)
                .and_then(|bound| order(&actual, &bound))
                .is_some_and(|o| if *include_upper { o.is_le() } else { o.is_lt() });
            lower_ok && upper_ok
        }
        Comparator::In(operands) => operands.iter().any(|operand| {
            decode_operand(operand)
                .and_then(|expected| order(&actual, &expected))
                .is_some_and(Ordering::is_eq)
        }),
        Comparator::Contain(needle) => {
            text_operand(&actual).is_some_and(|t| t.contains(&fold(needle, ignore_case)))
        }
        Comparator::BeginWith(prefix) => {
            text_operand(&actual).is_some_and(|t| t.starts_with(&fold(prefix, ignore_case)))
        }
        Comparator::EndWith(suffix) => {
            text_operand(&actual).is_some_and(|t| t.ends_with(&fold(suffix, ignore_case)))
        }
        Comparator::Like(pattern) => text_operand(&actual).is_some_and(|t| {
            match_regex(&like_to_regex(pattern), ignore_case, t)
        }),
        Comparator::Regex(pattern) => {
            text_operand(&actual).is_some_and(|t| match_regex(pattern, ignore_case, t))
        }
        Comparator::IsNull | Comparator::NotNull => unreachable!("handled by the caller"),
    }
}

fn text_operand(operand: &Operand) -> Option<&str> {
    match operand {
        Operand::Text(text) => Some(text),
        _ => None,
    }
}

fn fold(text: &str, ignore_case: bool) -> String {
    if ignore_case {
        text.to_lowercase()
    } else {
        text.to_string()
    }
}

fn match_regex(pattern: &str, ignore_case: bool, text: &str) -> bool {
    let pattern = if ignore_case {
        format!("(?i){pattern}")
    } else {
        pattern.to_string()
    };
    Regex::new(&pattern).is_ok_and(|re| re.is_match(text))
}

/// Translates an SQL `LIKE` pattern into an anchored regular expression:
/// `%` matches any run of characters, `_` any single character.
pub(crate) fn like_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 2);
    out.push('^');
    for ch in pattern.chars() {
        match ch {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClassId, PropertyId};

    fn props(entries: &[(&str, PropertyType)]) -> BTreeMap<String, PropertyDescriptor> {
        entries
            .iter()
            .enumerate()
            .map(|(i, (name, ty))| {
                (
                    name.to_string(),
                    PropertyDescriptor {
                        id: PropertyId(2 + i as u16),
                        class_id: ClassId(1),
                        name: name.to_string(),
                        prop_type: *ty,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn numeric_comparisons_decode_by_type() {
        let table = props(&[("pages", PropertyType::Integer)]);
        let record = Record::new().with("pages", 456i32);
        assert!(eval_condition(&record, &table, &Condition::new("pages").eq(456i32)));
        assert!(eval_condition(&record, &table, &Condition::new("pages").gt(100i32)));
        assert!(!eval_condition(&record, &table, &Condition::new("pages").lt(100i32)));
        assert!(eval_condition(
            &record,
            &table,
            &Condition::new("pages").between(400i32, 500i32)
        ));
        assert!(!eval_condition(
            &record,
            &table,
            &Condition::new("pages").between_exclusive(456i32, 500i32)
        ));
    }

    #[test]
    fn missing_property_fails_affirmative_and_passes_negated_not_null() {
        let table = props(&[("pages", PropertyType::Integer)]);
        let record = Record::new();
        assert!(!eval_condition(&record, &table, &Condition::new("pages").eq(1i32)));
        assert!(!eval_condition(&record, &table, &Condition::new("pages")));
        assert!(eval_condition(&record, &table, &!Condition::new("pages").not_null()));
        assert!(eval_condition(&record, &table, &Condition::new("pages").is_null()));
    }

    #[test]
    fn text_predicates_respect_case_folding() {
        let table = props(&[("title", PropertyType::Text)]);
        let record = Record::new().with("title", "Harry Potter");
        assert!(eval_condition(
            &record,
            &table,
            &Condition::new("title").contains("Potter")
        ));
        assert!(!eval_condition(
            &record,
            &table,
            &Condition::new("title").contains("potter")
        ));
        assert!(eval_condition(
            &record,
            &table,
            &Condition::new("title").contains("potter").ignore_case()
        ));
        assert!(eval_condition(
            &record,
            &table,
            &Condition::new("title").begins_with("Harry")
        ));
        assert!(eval_condition(
            &record,
            &table,
            &Condition::new("title").like("Harry%")
        ));
        assert!(eval_condition(
            &record,
            &table,
            &Condition::new("title").matches("^H.*r$")
        ));
    }

    #[test]
    fn like_translation_escapes_regex_metacharacters() {
        assert_eq!(like_to_regex("a%b_c"), "^a.*b.c$");
        assert_eq!(like_to_regex("50.%"), "^50\\..*$");
    }

    #[test]
    fn multi_condition_tree_combines_leaves() {
        let table = props(&[("pages", PropertyType::Integer), ("title", PropertyType::Text)]);
        let record = Record::new().with("pages", 456i32).with("title", "HP");
        let both = Condition::new("pages").gt(100i32) & Condition::new("title").eq("HP");
        assert!(eval_multi(&record, &table, &both));
        let either = Condition::new("pages").lt(100i32) | Condition::new("title").eq("HP");
        assert!(eval_multi(&record, &table, &either));
        let negated = !(Condition::new("pages").lt(100i32) | Condition::new("title").eq("HP"));
        assert!(!eval_multi(&record, &table, &negated));
    }
}
