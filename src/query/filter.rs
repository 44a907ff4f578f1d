//! Class-and-predicate filters applied to candidate edges and vertices by
//! the edge getters and the traversal algorithms.

use std::collections::HashSet;

use crate::model::{ClassId, Record};
use crate::query::condition::{Condition, MultiCondition};
use crate::schema::Catalog;

/// Record-level predicate carried by a [`GraphFilter`].
#[derive(Clone, Debug, Default)]
pub(crate) enum FilterPredicate {
    #[default]
    None,
    Condition(Condition),
    Multi(MultiCondition),
    Function(fn(&Record) -> bool),
}

/// Filters candidate records by class membership and an optional predicate.
/// Class lists hold class names; the `subclasses_of` variants expand to the
/// whole subtree before matching.
#[derive(Clone, Debug, Default)]
pub struct GraphFilter {
    pub(crate) only: Vec<String>,
    pub(crate) only_sub_of: Vec<String>,
    pub(crate) exclude: Vec<String>,
    pub(crate) exclude_sub_of: Vec<String>,
    pub(crate) predicate: FilterPredicate,
}

impl GraphFilter {
    /// A filter that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// A filter whose predicate is a single condition.
    pub fn condition(condition: Condition) -> Self {
        Self {
            predicate: FilterPredicate::Condition(condition),
            ..Self::default()
        }
    }

    /// A filter whose predicate is a condition tree.
    pub fn multi(multi: MultiCondition) -> Self {
        Self {
            predicate: FilterPredicate::Multi(multi),
            ..Self::default()
        }
    }

    /// A filter whose predicate is an arbitrary function over the record.
    pub fn function(predicate: fn(&Record) -> bool) -> Self {
        Self {
            predicate: FilterPredicate::Function(predicate),
            ..Self::default()
        }
    }

    /// Restricts matches to the named classes.
    pub fn only<I, S>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.only.extend(classes.into_iter().map(Into::into));
        self
    }

    /// Restricts matches to the named classes and their subclasses.
    pub fn only_subclasses_of<I, S>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.only_sub_of
            .extend(classes.into_iter().map(Into::into));
        self
    }

    /// Rejects matches of the named classes.
    pub fn exclude<I, S>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(classes.into_iter().map(Into::into));
        self
    }

    /// Rejects matches of the named classes and their subclasses.
    pub fn exclude_subclasses_of<I, S>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_sub_of
            .extend(classes.into_iter().map(Into::into));
        self
    }

    pub(crate) fn has_predicate(&self) -> bool {
        !matches!(self.predicate, FilterPredicate::None)
    }

    pub(crate) fn has_class_filter(&self) -> bool {
        !(self.only.is_empty()
            && self.only_sub_of.is_empty()
            && self.exclude.is_empty()
            && self.exclude_sub_of.is_empty())
    }
}

impl From<Condition> for GraphFilter {
    fn from(condition: Condition) -> Self {
        GraphFilter::condition(condition)
    }
}

impl From<MultiCondition> for GraphFilter {
    fn from(multi: MultiCondition) -> Self {
        GraphFilter::multi(multi)
    }
}

/// Class lists of a [`GraphFilter`] expanded to concrete id sets. Unknown
/// class names are ignored rather than rejected, matching the permissive
/// semantics of graph-side filtering.
#[derive(Clone, Debug)]
pub(crate) struct ClassFilter {
    allow: Option<HashSet<ClassId>>,
    deny: HashSet<ClassId>,
}

impl ClassFilter {
    pub(crate) fn expand(catalog: &Catalog, filter: &GraphFilter) -> Self {
        let mut allow: Option<HashSet<ClassId>> = None;
        if !filter.only.is_empty() || !filter.only_sub_of.is_empty() {
            let mut set = HashSet::new();
            for name in &filter.only {
                if let Some(class) = catalog.class_by_name(name) {
                    set.insert(class.id);
                }
            }
            for name in &filter.only_sub_of {
                if let Some(class) = catalog.class_by_name(name) {
                    set.extend(catalog.resolve_subclasses(class.id));
                }
            }
            allow = Some(set);
        }

        let mut deny = HashSet::new();
        for name in &filter.exclude {
            if let Some(class) = catalog.class_by_name(name) {
                deny.insert(class.id);
            }
        }
        for name in &filter.exclude_sub_of {
            if let Some(class) = catalog.class_by_name(name) {
                deny.extend(catalog.resolve_subclasses(class.id));
            }
        }

        Self { allow, deny }
    }

    pub(crate) fn allows(&self, class_id: ClassId) -> bool {
        if self.deny.contains(&class_id) {
            return false;
        }
        match &self.allow {
            Some(set) => set.contains(&class_id),
            None => true,
        }
    }
}
