//! Predicate model: single-property conditions and boolean combinations.

use std::ops::{BitAnd, BitOr, Not};

use crate::model::Bytes;

/// Comparator of a [`Condition`], carrying its operand values.
#[derive(Clone, Debug)]
pub enum Comparator {
    IsNull,
    NotNull,
    Equal(Bytes),
    Greater(Bytes),
    GreaterEqual(Bytes),
    Less(Bytes),
    LessEqual(Bytes),
    Between {
        lower: Bytes,
        upper: Bytes,
        include_lower: bool,
        include_upper: bool,
    },
    In(Vec<Bytes>),
    Contain(String),
    BeginWith(String),
    EndWith(String),
    Like(String),
    Regex(String),
}

/// A predicate on one property of a record. Built fluently:
///
/// ```
/// use tenebra::query::Condition;
/// let c = Condition::new("title").eq("Harry Potter");
/// let range = Condition::new("pages").between(100i32, 500i32);
/// ```
#[derive(Clone, Debug)]
pub struct Condition {
    pub(crate) prop: String,
    pub(crate) comparator: Comparator,
    pub(crate) ignore_case: bool,
    pub(crate) negated: bool,
}

impl Condition {
    /// Starts a condition on `prop`; without a comparator call it tests
    /// `NOT_NULL`.
    pub fn new(prop: impl Into<String>) -> Self {
        Self {
            prop: prop.into(),
            comparator: Comparator::NotNull,
            ignore_case: false,
            negated: false,
        }
    }

    pub fn is_null(mut self) -> Self {
        self.comparator = Comparator::IsNull;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.comparator = Comparator::NotNull;
        self
    }

    pub fn eq(mut self, value: impl Into<Bytes>) -> Self {
        self.comparator = Comparator::Equal(value.into());
        self
    }

    pub fn gt(mut self, value: impl Into<Bytes>) -> Self {
        self.comparator = Comparator::Greater(value.into());
        self
    }

    pub fn ge(mut self, value: impl Into<Bytes>) -> Self {
        self.comparator = Comparator::GreaterEqual(value.into());
        self
    }

    pub fn lt(mut self, value: impl Into<Bytes>) -> Self {
        self.comparator = Comparator::Less(value.into());
        self
    }

    pub fn le(mut self, value: impl Into<Bytes>) -> Self {
        self.comparator = Comparator::LessEqual(value.into());
        self
    }

    /// Inclusive on both bounds.
    pub fn between(self, lower: impl Into<Bytes>, upper: impl Into<Bytes>) -> Self {
        self.between_bounds(lower, upper, true, true)
    }

    /// Inclusive lower bound, exclusive upper bound.
    pub fn between_no_upper(self, lower: impl Into<Bytes>, upper: impl Into<Bytes>) -> Self {
        self.between_bounds(lower, upper, true, false)
    }

    /// Exclusive lower bound, inclusive upper bound.
    pub fn between_no_lower(self, lower: impl Into<Bytes>, upper: impl Into<Bytes>) -> Self {
        self.between_bounds(lower, upper, false, true)
    }

    /// Exclusive on both bounds.
    pub fn between_exclusive(self, lower: impl Into<Bytes>, upper: impl Into<Bytes>) -> Self {
        self.between_bounds(lower, upper, false, false)
    }

    fn between_bounds(
        mut self,
        lower: impl Into<Bytes>,
        upper: impl Into<Bytes>,
        include_lower: bool,
        include_upper: bool,
    ) -> Self {
        self.comparator = Comparator::Between {
            lower: lower.into(),
            upper: upper.into(),
            include_lower,
            include_upper,
        };
        self
    }

    pub fn in_values<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Bytes>,
    {
        self.comparator = Comparator::In(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn contains(mut self, needle: impl Into<String>) -> Self {
        self.comparator = Comparator::Contain(needle.into());
        self
    }

    pub fn begins_with(mut self, prefix: impl Into<String>) -> Self {
        self.comparator = Comparator::BeginWith(prefix.into());
        self
    }

    pub fn ends_with(mut self, suffix: impl Into<String>) -> Self {
        self.comparator = Comparator::EndWith(suffix.into());
        self
    }

    /// SQL-style pattern with `%` (any run) and `_` (any single character).
    pub fn like(mut self, pattern: impl Into<String>) -> Self {
        self.comparator = Comparator::Like(pattern.into());
        self
    }

    /// Regular-expression match over the whole text value.
    pub fn matches(mut self, pattern: impl Into<String>) -> Self {
        self.comparator = Comparator::Regex(pattern.into());
        self
    }

    /// Case-insensitive text comparison.
    pub fn ignore_case(mut self) -> Self {
        self.ignore_case = true;
        self
    }

    pub fn property(&self) -> &str {
        &self.prop
    }
}

impl Not for Condition {
    type Output = Condition;

    fn not(mut self) -> Condition {
        self.negated = !self.negated;
        self
    }
}

/// A binary tree of conditions combined with AND / OR, with per-node
/// negation. Built with the `&`, `|` and `!` operators:
///
/// ```
/// use tenebra::query::Condition;
/// let q = Condition::new("pages").gt(100i32) & !Condition::new("title").is_null();
/// ```
#[derive(Clone, Debug)]
pub struct MultiCondition {
    pub(crate) root: ConditionNode,
}

#[derive(Clone, Debug)]
pub(crate) enum ConditionNode {
    Leaf(Condition),
    And(Box<ConditionNode>, Box<ConditionNode>),
    Or(Box<ConditionNode>, Box<ConditionNode>),
    Not(Box<ConditionNode>),
}

impl ConditionNode {
    /// Visits every leaf condition of the tree.
    pub(crate) fn leaves<'a>(&'a self, out: &mut Vec<&'a Condition>) {
        match self {
            ConditionNode::Leaf(condition) => out.push(condition),
            ConditionNode::And(a, b) | ConditionNode::Or(a, b) => {
                a.leaves(out);
                b.leaves(out);
            }
            ConditionNode::Not(inner) => inner.leaves(out),
        }
    }
}

impl MultiCondition {
    pub(crate) fn leaves(&self) -> Vec<&Condition> {
        let mut out = Vec::new();
        self.root.leaves(&mut out);
        out
    }
}

impl From<Condition> for MultiCondition {
    fn from(condition: Condition) -> Self {
        MultiCondition {
            root: ConditionNode::Leaf(condition),
        }
    }
}

macro_rules! impl_bool_ops {
    ($lhs:ty, $rhs:ty) => {
        impl BitAnd<$rhs> for $lhs {
            type Output = MultiCondition;

            fn bitand(self, rhs: $rhs) -> MultiCondition {
                MultiCondition {
                    root: ConditionNode::And(
                        Box::new(MultiCondition::from(self).root),
                        Box::new(MultiCondition::from(rhs).root),
                    ),
                }
            }
        }

        impl BitOr<$rhs> for $lhs {
            type Output = MultiCondition;

            fn bitor(self, rhs: $rhs) -> MultiCondition {
                MultiCondition {
                    root: ConditionNode::Or(
                        Box::new(MultiCondition::from(self).root),
                        Box::new(MultiCondition::from(rhs).root),
                    ),
                }
            }
        }
    };
}

impl_bool_ops!(Condition, Condition);
impl_bool_ops!(Condition, MultiCondition);
impl_bool_ops!(MultiCondition, Condition);
impl_bool_ops!(MultiCondition, MultiCondition);

impl Not for MultiCondition {
    type Output = MultiCondition;

    fn not(self) -> MultiCondition {
        MultiCondition {
            root: ConditionNode::Not(Box::new(self.root)),
        }
    }
}
