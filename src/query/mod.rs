pub(crate) mod compare;
pub(crate) mod condition;
pub(crate) mod filter;
pub(crate) mod planner;

pub use condition::{Comparator, Condition, MultiCondition};
pub use filter::GraphFilter;
pub use planner::Selector;
