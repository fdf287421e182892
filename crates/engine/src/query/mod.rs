//! # Query Rules
//!
//! Declarative filter, sort and pagination rules ([`RuleSet`]) and their
//! compilation against a record schema into an inspectable
//! [`CompiledQuery`] that store backends can evaluate or translate.

pub mod compile;
pub mod rules;

pub use compile::{Comparison, CompiledQuery, Predicate, Scalar, SortKey, TextMatch, Window};
pub use rules::{FilterRule, FilterType, OrderRule, RuleSet, SortDirection};
