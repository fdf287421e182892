//! Rule compilation.
//!
//! Rules are compiled against a [`RecordSchema`] so that every comparison
//! value is coerced to the declared type of the field it targets. Rules
//! naming a field the schema does not declare are dropped, as are rules
//! whose operator does not apply to the field's type.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use nodeflow_util::coerce::{is_empty, parse_bool, parse_datetime, parse_f64, parse_i64, stringify};

use super::rules::{FilterRule, FilterType, OrderRule, RuleSet, SortDirection};
use crate::{
    registry::FieldKind,
    store::{Record, RecordSchema},
};

/// A value coerced to a field's declared type.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(DateTime<Utc>),
    Json(Value),
}

impl Scalar {
    /// Coerces `value` to `kind`. Values that cannot be read become null.
    pub fn coerce(kind: &FieldKind, value: &Value) -> Scalar {
        Self::try_coerce(kind, value).unwrap_or(Scalar::Null)
    }

    /// Coerces `value` to `kind`, or `None` when a non-null value cannot be read.
    pub fn try_coerce(kind: &FieldKind, value: &Value) -> Option<Scalar> {
        if value.is_null() {
            return Some(Scalar::Null);
        }
        match kind {
            FieldKind::Text => Some(Scalar::Text(stringify(value))),
            FieldKind::Bool => parse_bool(value).map(Scalar::Bool),
            FieldKind::Int | FieldKind::Long => parse_i64(value).map(Scalar::Int),
            FieldKind::Decimal => parse_f64(value).map(Scalar::Float),
            FieldKind::Date => parse_datetime(value).map(Scalar::Date),
            FieldKind::Enum(variants) => match value {
                Value::Number(number) => number
                    .as_u64()
                    .and_then(|ordinal| variants.get(ordinal as usize))
                    .map(|variant| Scalar::Text(variant.clone())),
                other => Some(Scalar::Text(stringify(other))),
            },
            _ => Some(Scalar::Json(value.clone())),
        }
    }

    /// Ordering between two scalars of compatible kinds.
    pub fn compare(&self, other: &Scalar) -> Option<Ordering> {
        match (self, other) {
            (Scalar::Null, Scalar::Null) => Some(Ordering::Equal),
            (Scalar::Bool(left), Scalar::Bool(right)) => Some(left.cmp(right)),
            (Scalar::Int(left), Scalar::Int(right)) => Some(left.cmp(right)),
            (Scalar::Float(left), Scalar::Float(right)) => left.partial_cmp(right),
            (Scalar::Int(left), Scalar::Float(right)) => (*left as f64).partial_cmp(right),
            (Scalar::Float(left), Scalar::Int(right)) => left.partial_cmp(&(*right as f64)),
            (Scalar::Text(left), Scalar::Text(right)) => Some(left.cmp(right)),
            (Scalar::Date(left), Scalar::Date(right)) => Some(left.cmp(right)),
            (Scalar::Json(left), Scalar::Json(right)) => (left == right).then_some(Ordering::Equal),
            _ => None,
        }
    }

    fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    fn equals(&self, other: &Scalar) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }

    /// Total order used for sorting: nulls first, then by value.
    fn sort_cmp(&self, other: &Scalar) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self.compare(other).unwrap_or(Ordering::Equal),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    NotEqual,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMatch {
    Contains,
    StartsWith,
    EndsWith,
}

/// One compiled filter. A record must satisfy every predicate of a query.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        field: String,
        kind: FieldKind,
        op: Comparison,
        value: Scalar,
    },
    Text {
        field: String,
        op: TextMatch,
        needle: String,
        negated: bool,
    },
    Membership {
        field: String,
        kind: FieldKind,
        values: Vec<Scalar>,
        negated: bool,
    },
    /// A comparison whose value cannot be read as the field's type.
    Unsatisfiable { field: String },
}

impl Predicate {
    pub fn field(&self) -> &str {
        match self {
            Predicate::Compare { field, .. }
            | Predicate::Text { field, .. }
            | Predicate::Membership { field, .. }
            | Predicate::Unsatisfiable { field } => field,
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        let raw = record.get(self.field()).unwrap_or(&Value::Null);
        match self {
            Predicate::Compare { kind, op, value, .. } => {
                let actual = Scalar::coerce(kind, raw);
                match op {
                    Comparison::Equal => actual.equals(value),
                    Comparison::NotEqual => !actual.equals(value),
                    _ if actual.is_null() || value.is_null() => false,
                    Comparison::Greater => actual.compare(value).is_some_and(Ordering::is_gt),
                    Comparison::GreaterOrEqual => actual.compare(value).is_some_and(Ordering::is_ge),
                    Comparison::Less => actual.compare(value).is_some_and(Ordering::is_lt),
                    Comparison::LessOrEqual => actual.compare(value).is_some_and(Ordering::is_le),
                }
            }
            Predicate::Text { op, needle, negated, .. } => {
                let Some(text) = raw.as_str() else {
                    return false;
                };
                let found = match op {
                    TextMatch::Contains => text.contains(needle.as_str()),
                    TextMatch::StartsWith => text.starts_with(needle.as_str()),
                    TextMatch::EndsWith => text.ends_with(needle.as_str()),
                };
                found != *negated
            }
            Predicate::Membership { kind, values, negated, .. } => {
                let actual = Scalar::coerce(kind, raw);
                values.iter().any(|candidate| candidate.equals(&actual)) != *negated
            }
            Predicate::Unsatisfiable { .. } => false,
        }
    }
}

/// One sort key.
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub field: String,
    pub kind: FieldKind,
    pub direction: SortDirection,
}

/// Records to skip and keep after filtering and sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub skip: usize,
    pub take: usize,
}

impl Window {
    /// Window for a 1-based `page` of `page_size`, when both are positive.
    pub fn for_page(page: Option<i64>, page_size: Option<i64>) -> Option<Window> {
        let page = usize::try_from(page?).ok().filter(|page| *page >= 1)?;
        let take = usize::try_from(page_size?).ok().filter(|size| *size >= 1)?;
        Some(Window {
            skip: take.saturating_mul(page - 1),
            take,
        })
    }
}

/// A compiled rule set: an AND of predicates, a sort order, and a window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledQuery {
    pub filters: Vec<Predicate>,
    pub sorts: Vec<SortKey>,
    pub window: Option<Window>,
}

impl CompiledQuery {
    /// Matches every record, unsorted and unpaged.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn compile(rules: &RuleSet, schema: &RecordSchema) -> Self {
        Self {
            filters: compile_filters(&rules.filters, schema),
            sorts: compile_sorts(&rules.sorts, schema),
            window: Window::for_page(rules.page, rules.page_size),
        }
    }

    pub fn from_filters(rules: &[FilterRule], schema: &RecordSchema) -> Self {
        Self {
            filters: compile_filters(rules, schema),
            ..Self::default()
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.filters.iter().all(|predicate| predicate.matches(record))
    }

    /// Filters, sorts (stably), then windows `records`.
    pub fn apply(&self, records: impl IntoIterator<Item = Record>) -> Vec<Record> {
        let mut selected: Vec<Record> = records.into_iter().filter(|record| self.matches(record)).collect();
        if !self.sorts.is_empty() {
            selected.sort_by(|left, right| self.compare_records(left, right));
        }
        match self.window {
            Some(window) => selected.into_iter().skip(window.skip).take(window.take).collect(),
            None => selected,
        }
    }

    fn compare_records(&self, left: &Record, right: &Record) -> Ordering {
        for key in &self.sorts {
            let left_value = Scalar::coerce(&key.kind, left.get(&key.field).unwrap_or(&Value::Null));
            let right_value = Scalar::coerce(&key.kind, right.get(&key.field).unwrap_or(&Value::Null));
            let ordering = match key.direction {
                SortDirection::Ascending => left_value.sort_cmp(&right_value),
                SortDirection::Descending => right_value.sort_cmp(&left_value),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

/// Compiles each applicable filter rule.
pub fn compile_filters(rules: &[FilterRule], schema: &RecordSchema) -> Vec<Predicate> {
    rules.iter().filter_map(|rule| compile_filter(rule, schema)).collect()
}

/// Compiles one filter rule, or `None` when the rule is skipped.
pub fn compile_filter(rule: &FilterRule, schema: &RecordSchema) -> Option<Predicate> {
    let attribute = rule.attribute.as_deref().filter(|attribute| !attribute.is_empty())?;
    let filter_type = rule.filter_type?;
    if rule.ignore_if_empty && is_empty(&rule.value) {
        return None;
    }
    let Some(descriptor) = schema.field(attribute) else {
        debug!(record = %schema.name, attribute, "dropping filter on undeclared field");
        return None;
    };
    let field = descriptor.name.clone();
    let kind = descriptor.kind.clone();

    let comparison = |op: Comparison| match Scalar::try_coerce(&kind, &rule.value) {
        Some(value) => Predicate::Compare {
            field: field.clone(),
            kind: kind.clone(),
            op,
            value,
        },
        None => {
            warn!(record = %schema.name, attribute, value = %rule.value, "filter value does not fit the field type; no record matches");
            Predicate::Unsatisfiable { field: field.clone() }
        }
    };
    let text = |op: TextMatch, negated: bool| {
        if kind != FieldKind::Text || rule.value.is_null() {
            debug!(record = %schema.name, attribute, "dropping string filter on a non-string field or null value");
            return None;
        }
        Some(Predicate::Text {
            field: field.clone(),
            op,
            needle: stringify(&rule.value),
            negated,
        })
    };
    let membership = |negated: bool| Predicate::Membership {
        field: field.clone(),
        kind: kind.clone(),
        values: membership_values(&rule.value)
            .iter()
            .filter_map(|item| Scalar::try_coerce(&kind, item))
            .collect(),
        negated,
    };

    match filter_type {
        FilterType::Equal => Some(comparison(Comparison::Equal)),
        FilterType::NotEqual => Some(comparison(Comparison::NotEqual)),
        FilterType::Greater => Some(comparison(Comparison::Greater)),
        FilterType::GreaterOrEqual => Some(comparison(Comparison::GreaterOrEqual)),
        FilterType::Less => Some(comparison(Comparison::Less)),
        FilterType::LessOrEqual => Some(comparison(Comparison::LessOrEqual)),
        FilterType::Contains => text(TextMatch::Contains, false),
        FilterType::NotContains => text(TextMatch::Contains, true),
        FilterType::StartsWith => text(TextMatch::StartsWith, false),
        FilterType::NotStartsWith => text(TextMatch::StartsWith, true),
        FilterType::EndsWith => text(TextMatch::EndsWith, false),
        FilterType::NotEndsWith => text(TextMatch::EndsWith, true),
        FilterType::In => Some(membership(false)),
        FilterType::NotIn => Some(membership(true)),
    }
}

fn membership_values(value: &Value) -> Vec<Value> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.clone(),
        Value::String(text) => text.split(',').map(|item| Value::String(item.to_string())).collect(),
        other => vec![other.clone()],
    }
}

/// Compiles sort rules, skipping rules on undeclared fields.
pub fn compile_sorts(rules: &[OrderRule], schema: &RecordSchema) -> Vec<SortKey> {
    rules
        .iter()
        .filter_map(|rule| {
            let attribute = rule.attribute.as_deref()?;
            let Some(descriptor) = schema.field(attribute) else {
                debug!(record = %schema.name, attribute, "dropping sort on undeclared field");
                return None;
            };
            Some(SortKey {
                field: descriptor.name.clone(),
                kind: descriptor.kind.clone(),
                direction: rule.direction,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FieldDescriptor;
    use serde_json::json;

    fn schema() -> RecordSchema {
        RecordSchema::new("Person", "id").with_fields([
            FieldDescriptor::new("id", FieldKind::Int),
            FieldDescriptor::new("name", FieldKind::Text),
            FieldDescriptor::new("age", FieldKind::Int),
            FieldDescriptor::new("born", FieldKind::Date).nullable(),
            FieldDescriptor::new("score", FieldKind::Decimal).nullable(),
        ])
    }

    fn record(id: i64, name: &str, age: i64) -> Record {
        json!({"id": id, "name": name, "age": age}).as_object().cloned().expect("object")
    }

    fn ids(records: &[Record]) -> Vec<i64> {
        records.iter().filter_map(|record| record.get("id").and_then(Value::as_i64)).collect()
    }

    #[test]
    fn test_greater_or_equal_keeps_adults() {
        let rules = RuleSet {
            filters: vec![FilterRule::new("age", FilterType::GreaterOrEqual, 18)],
            ..RuleSet::default()
        };
        let query = CompiledQuery::compile(&rules, &schema());
        let kept = query.apply(vec![record(1, "a", 15), record(2, "b", 18), record(3, "c", 21)]);
        assert_eq!(ids(&kept), vec![2, 3]);
    }

    #[test]
    fn test_values_are_coerced_to_field_type() {
        let rules = RuleSet {
            filters: vec![FilterRule::new("age", FilterType::Equal, "21")],
            ..RuleSet::default()
        };
        let query = CompiledQuery::compile(&rules, &schema());
        assert_eq!(ids(&query.apply(vec![record(1, "a", 21), record(2, "b", 22)])), vec![1]);
    }

    #[test]
    fn test_unreadable_comparison_values_match_nothing() {
        let mut without_age = record(1, "a", 1);
        without_age.remove("age");
        let mut null_age = record(2, "b", 1);
        null_age.insert("age".into(), Value::Null);
        let records = vec![without_age, null_age, record(3, "c", 30)];

        for filter_type in [FilterType::Equal, FilterType::NotEqual, FilterType::Less] {
            let query = CompiledQuery::from_filters(&[FilterRule::new("age", filter_type, "abc")], &schema());
            assert!(query.apply(records.clone()).is_empty(), "{filter_type:?} should match nothing");
        }

        let listed = CompiledQuery::from_filters(&[FilterRule::new("age", FilterType::In, "abc,30")], &schema());
        assert_eq!(ids(&listed.apply(records)), vec![3]);
    }

    #[test]
    fn test_unknown_fields_and_empty_values_are_dropped() {
        let rules = vec![
            FilterRule::new("nope", FilterType::Equal, 1),
            FilterRule::new("name", FilterType::Equal, "").ignore_if_empty(),
            FilterRule::new("age", FilterType::Contains, "1"),
        ];
        let query = CompiledQuery::from_filters(&rules, &schema());
        assert!(query.filters.is_empty());
    }

    #[test]
    fn test_string_matches_and_negations() {
        let records = vec![record(1, "alpha", 1), record(2, "beta", 1), record(3, "alphabet", 1)];
        let starts = CompiledQuery::from_filters(&[FilterRule::new("name", FilterType::StartsWith, "alp")], &schema());
        assert_eq!(ids(&starts.apply(records.clone())), vec![1, 3]);

        let not_ends = CompiledQuery::from_filters(&[FilterRule::new("name", FilterType::NotEndsWith, "bet")], &schema());
        assert_eq!(ids(&not_ends.apply(records.clone())), vec![1, 2]);

        let not_contains = CompiledQuery::from_filters(&[FilterRule::new("name", FilterType::NotContains, "ph")], &schema());
        assert_eq!(ids(&not_contains.apply(records)), vec![2]);
    }

    #[test]
    fn test_membership_accepts_lists_and_comma_strings() {
        let records = vec![record(1, "a", 10), record(2, "b", 20), record(3, "c", 30)];
        let listed = CompiledQuery::from_filters(&[FilterRule::new("age", FilterType::In, json!([10, "30"]))], &schema());
        assert_eq!(ids(&listed.apply(records.clone())), vec![1, 3]);

        let split = CompiledQuery::from_filters(&[FilterRule::new("age", FilterType::NotIn, "10,20")], &schema());
        assert_eq!(ids(&split.apply(records)), vec![3]);
    }

    #[test]
    fn test_nullable_fields_compare_unwrapped_values() {
        let mut with_score = record(1, "a", 1);
        with_score.insert("score".into(), json!(4.5));
        let without_score = record(2, "b", 1);

        let query = CompiledQuery::from_filters(&[FilterRule::new("score", FilterType::Greater, "4")], &schema());
        assert_eq!(ids(&query.apply(vec![with_score.clone(), without_score.clone()])), vec![1]);

        let is_null = CompiledQuery::from_filters(&[FilterRule::new("score", FilterType::Equal, Value::Null)], &schema());
        assert_eq!(ids(&is_null.apply(vec![with_score, without_score])), vec![2]);
    }

    #[test]
    fn test_sorts_chain_and_skip_unknown_fields() {
        let rules = RuleSet {
            sorts: vec![
                OrderRule::new("missing", SortDirection::Ascending),
                OrderRule::new("age", SortDirection::Descending),
                OrderRule::new("name", SortDirection::Ascending),
            ],
            ..RuleSet::default()
        };
        let query = CompiledQuery::compile(&rules, &schema());
        assert_eq!(query.sorts.len(), 2);
        let sorted = query.apply(vec![record(1, "b", 20), record(2, "a", 20), record(3, "c", 30)]);
        assert_eq!(ids(&sorted), vec![3, 2, 1]);
    }

    #[test]
    fn test_pagination_windows_after_sorting() {
        let records: Vec<Record> = (1..=25).rev().map(|id| record(id, "x", id)).collect();
        let rules = RuleSet {
            sorts: vec![OrderRule::new("id", SortDirection::Ascending)],
            page: Some(2),
            page_size: Some(10),
            ..RuleSet::default()
        };
        let page = CompiledQuery::compile(&rules, &schema()).apply(records.clone());
        assert_eq!(ids(&page), (11..=20).collect::<Vec<_>>());

        let unpaged = RuleSet {
            page: Some(0),
            page_size: Some(10),
            ..RuleSet::default()
        };
        assert_eq!(CompiledQuery::compile(&unpaged, &schema()).apply(records).len(), 25);
    }

    #[test]
    fn test_date_filters() {
        let mut early = record(1, "a", 1);
        early.insert("born".into(), json!("1990-05-01"));
        let mut late = record(2, "b", 1);
        late.insert("born".into(), json!("2001-01-01T00:00:00Z"));
        let query = CompiledQuery::from_filters(&[FilterRule::new("born", FilterType::Less, "2000-01-01")], &schema());
        assert_eq!(ids(&query.apply(vec![early, late])), vec![1]);
    }
}
