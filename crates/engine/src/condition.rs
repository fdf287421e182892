//! # Conditions
//!
//! Boolean predicates used by `If` actions and endpoint access rules.
//! A condition has its own test plus optional `and` / `or` links:
//!
//! - when the test fails, the result is the `or` branch (false if absent);
//! - when it passes, the result is the `and` branch (true if absent).
//!
//! Two concrete conditions ship with the runtime: [`OperatorCondition`]
//! compares two values, [`NullOrEmpty`] checks for absence. Operands are
//! template-evaluated before the condition is built, so evaluation needs no
//! context.

use std::{cmp::Ordering, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde_json::Value;

use nodeflow_util::coerce::{is_empty, parse_bool, parse_datetime, parse_datetime_str, parse_f64, stringify};

use crate::registry::{FieldDescriptor, FieldKind, Fields, PopulateError, PopulateScope, PropertyInstance, TypeInfo};

/// A boolean predicate with optional `and` / `or` continuations.
pub trait Condition: Send + fmt::Debug {
    /// This condition's own test, ignoring links.
    fn test(&self) -> bool;

    fn links(&self) -> &ConditionLinks;

    /// Evaluates the condition together with its links.
    fn build(&self) -> bool {
        let links = self.links();
        if !self.test() {
            return links.or.as_ref().is_some_and(|next| next.build());
        }
        links.and.as_ref().is_none_or(|next| next.build())
    }
}

#[derive(Debug, Default)]
pub struct ConditionLinks {
    pub and: Option<Box<dyn Condition>>,
    pub or: Option<Box<dyn Condition>>,
}

impl ConditionLinks {
    pub fn from_fields(fields: &mut Fields) -> Self {
        Self {
            and: fields.take_property::<Box<dyn Condition>>("and"),
            or: fields.take_property::<Box<dyn Condition>>("or"),
        }
    }
}

/// Comparison operators of [`OperatorCondition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    Contains,
    NotContains,
}

impl Operator {
    pub const NAMES: [&'static str; 8] = [
        "Equal",
        "NotEqual",
        "Greater",
        "GreaterEqual",
        "Less",
        "LessEqual",
        "Contains",
        "NotContains",
    ];
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let operator = match name {
            "Equal" => Operator::Equal,
            "NotEqual" => Operator::NotEqual,
            "Greater" => Operator::Greater,
            "GreaterEqual" => Operator::GreaterEqual,
            "Less" => Operator::Less,
            "LessEqual" => Operator::LessEqual,
            "Contains" => Operator::Contains,
            "NotContains" => Operator::NotContains,
            other => return Err(format!("unknown operator '{other}'")),
        };
        Ok(operator)
    }
}

/// Compares `left` and `right` with `operator`.
#[derive(Debug)]
pub struct OperatorCondition {
    pub left: Value,
    pub operator: Option<Operator>,
    pub right: Value,
    pub links: ConditionLinks,
}

impl Condition for OperatorCondition {
    fn test(&self) -> bool {
        compare(&self.left, self.operator, &self.right)
    }

    fn links(&self) -> &ConditionLinks {
        &self.links
    }
}

/// True when `value` is null, an empty string, or an empty collection
/// (inverted by `not`).
#[derive(Debug)]
pub struct NullOrEmpty {
    pub value: Value,
    pub negate: bool,
    pub links: ConditionLinks,
}

impl Condition for NullOrEmpty {
    fn test(&self) -> bool {
        is_empty(&self.value) != self.negate
    }

    fn links(&self) -> &ConditionLinks {
        &self.links
    }
}

/// Evaluates one comparison.
///
/// Without an operator, a boolean `left` is returned as is and anything
/// else is false. Containment looks at the raw values: a list contains an
/// element equal to `right`, a map contains the key `right`. Every other
/// operator first coerces both sides to a common kind, picking the first of
/// date, decimal, bool and string that either side has. Date applies only
/// when every non-null operand parses as a date.
pub fn compare(left: &Value, operator: Option<Operator>, right: &Value) -> bool {
    let Some(operator) = operator else {
        return left.as_bool().unwrap_or(false);
    };
    match operator {
        Operator::Contains => containment(left, right).unwrap_or(false),
        Operator::NotContains => containment(left, right).map(|found| !found).unwrap_or(false),
        Operator::Equal => operands_equal(left, right),
        Operator::NotEqual => !operands_equal(left, right),
        Operator::Greater => ordering(left, right).is_some_and(Ordering::is_gt),
        Operator::GreaterEqual => ordering(left, right).is_some_and(Ordering::is_ge),
        Operator::Less => ordering(left, right).is_some_and(Ordering::is_lt),
        Operator::LessEqual => ordering(left, right).is_some_and(Ordering::is_le),
    }
}

fn containment(collection: &Value, item: &Value) -> Option<bool> {
    match collection {
        Value::Array(items) => Some(items.iter().any(|element| operands_equal(element, item))),
        Value::Object(map) => Some(!item.is_null() && map.contains_key(&stringify(item))),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Null,
    Date(DateTime<Utc>),
    Decimal(f64),
    Bool(bool),
    Text(String),
    Other(Value),
}

#[derive(Clone, Copy)]
enum OperandKind {
    Date,
    Decimal,
    Bool,
    Text,
    Other,
}

fn looks_like_date(value: &Value) -> bool {
    value.as_str().is_some_and(|text| parse_datetime_str(text).is_some())
}

fn operand_kind(left: &Value, right: &Value) -> OperandKind {
    let either = |predicate: fn(&Value) -> bool| predicate(left) || predicate(right);
    let dated = |value: &Value| value.is_null() || looks_like_date(value);
    // Dates win only when no operand is something other than a date.
    if either(looks_like_date) && dated(left) && dated(right) {
        OperandKind::Date
    } else if either(Value::is_number) {
        OperandKind::Decimal
    } else if either(Value::is_boolean) {
        OperandKind::Bool
    } else if either(Value::is_string) {
        OperandKind::Text
    } else {
        OperandKind::Other
    }
}

fn to_operand(kind: OperandKind, value: &Value) -> Operand {
    if value.is_null() {
        return Operand::Null;
    }
    let coerced = match kind {
        OperandKind::Date => parse_datetime(value).map(Operand::Date),
        OperandKind::Decimal => parse_f64(value).map(Operand::Decimal),
        OperandKind::Bool => parse_bool(value).map(Operand::Bool),
        OperandKind::Text => Some(Operand::Text(stringify(value))),
        OperandKind::Other => Some(Operand::Other(value.clone())),
    };
    coerced.unwrap_or(Operand::Null)
}

fn sanitize(left: &Value, right: &Value) -> (Operand, Operand) {
    let kind = operand_kind(left, right);
    (to_operand(kind, left), to_operand(kind, right))
}

fn operands_equal(left: &Value, right: &Value) -> bool {
    let (left, right) = sanitize(left, right);
    left == right
}

fn ordering(left: &Value, right: &Value) -> Option<Ordering> {
    match sanitize(left, right) {
        (Operand::Date(left), Operand::Date(right)) => Some(left.cmp(&right)),
        (Operand::Decimal(left), Operand::Decimal(right)) => left.partial_cmp(&right),
        (Operand::Bool(left), Operand::Bool(right)) => Some(left.cmp(&right)),
        (Operand::Text(left), Operand::Text(right)) => Some(left.cmp(&right)),
        _ => None,
    }
}

pub(crate) fn condition_info() -> TypeInfo {
    TypeInfo::new("Condition", "nodeflow::Condition")
        .abstract_type()
        .with_field(FieldDescriptor::new("and", FieldKind::capability("Condition")))
        .with_field(FieldDescriptor::new("or", FieldKind::capability("Condition")))
}

pub(crate) fn operator_condition_info() -> TypeInfo {
    TypeInfo::new("OperatorCondition", "nodeflow::OperatorCondition")
        .with_field(FieldDescriptor::new("left", FieldKind::Json))
        .with_field(FieldDescriptor::new("operator", FieldKind::enumeration(&Operator::NAMES)))
        .with_field(FieldDescriptor::new("right", FieldKind::Json))
        .extends(&condition_info())
}

pub(crate) fn null_or_empty_info() -> TypeInfo {
    TypeInfo::new("NullOrEmpty", "nodeflow::NullOrEmpty")
        .with_field(FieldDescriptor::new("value", FieldKind::Json))
        .with_field(FieldDescriptor::new("not", FieldKind::Bool).with_default(false))
        .extends(&condition_info())
}

pub(crate) fn parse_operator_condition(
    info: &TypeInfo,
    raw: &Value,
    scope: &PopulateScope<'_>,
) -> Result<PropertyInstance, PopulateError> {
    let mut fields = scope.populate_value(info, raw)?;
    let condition: Box<dyn Condition> = Box::new(OperatorCondition {
        left: fields.json("left").unwrap_or(Value::Null),
        operator: fields.variant("operator"),
        right: fields.json("right").unwrap_or(Value::Null),
        links: ConditionLinks::from_fields(&mut fields),
    });
    Ok(Box::new(condition))
}

pub(crate) fn parse_null_or_empty(info: &TypeInfo, raw: &Value, scope: &PopulateScope<'_>) -> Result<PropertyInstance, PopulateError> {
    let mut fields = scope.populate_value(info, raw)?;
    let condition: Box<dyn Condition> = Box::new(NullOrEmpty {
        value: fields.json("value").unwrap_or(Value::Null),
        negate: fields.bool("not").unwrap_or(false),
        links: ConditionLinks::from_fields(&mut fields),
    });
    Ok(Box::new(condition))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TypeRegistry;
    use nodeflow_types::Model;
    use serde_json::json;

    fn operator(left: Value, operator: Operator, right: Value) -> OperatorCondition {
        OperatorCondition {
            left,
            operator: Some(operator),
            right,
            links: ConditionLinks::default(),
        }
    }

    #[test]
    fn test_numeric_strings_compare_as_decimals() {
        assert!(compare(&json!(18), Some(Operator::Equal), &json!("18")));
        assert!(compare(&json!("20"), Some(Operator::Greater), &json!(18)));
        assert!(compare(&json!(2.5), Some(Operator::LessEqual), &json!(2.5)));
        assert!(!compare(&json!("abc"), Some(Operator::Greater), &json!(1)));
    }

    #[test]
    fn test_dates_compare_chronologically() {
        assert!(compare(&json!("2024-03-01"), Some(Operator::Less), &json!("2024-03-01T12:00:00Z")));
        assert!(compare(&json!("2024-03-01 00:00:00"), Some(Operator::Equal), &json!("2024-03-01")));
    }

    #[test]
    fn test_dates_only_compare_against_dates() {
        assert!(!compare(&json!("2024-01-01"), Some(Operator::Equal), &json!(2024)));
        assert!(compare(&json!("2024-01-01"), Some(Operator::NotEqual), &json!(2024)));
        assert!(compare(&json!("2024-01-01"), Some(Operator::Less), &json!("b")));
        assert!(compare(&json!("2024-01-01"), Some(Operator::NotEqual), &Value::Null));
        assert!(compare(&json!("2024"), Some(Operator::Equal), &json!(2024)));
    }

    #[test]
    fn test_bools_and_strings() {
        assert!(compare(&json!(true), Some(Operator::Equal), &json!("true")));
        assert!(compare(&json!("b"), Some(Operator::Greater), &json!("a")));
        assert!(compare(&json!("x"), Some(Operator::NotEqual), &json!(null)));
        assert!(compare(&json!(null), Some(Operator::Equal), &json!(null)));
    }

    #[test]
    fn test_containment_on_lists_and_maps() {
        assert!(compare(&json!(["a", 1]), Some(Operator::Contains), &json!("1")));
        assert!(compare(&json!({"id": 1}), Some(Operator::Contains), &json!("id")));
        assert!(compare(&json!(["a"]), Some(Operator::NotContains), &json!("b")));
        assert!(!compare(&json!("abc"), Some(Operator::Contains), &json!("a")));
        assert!(!compare(&json!("abc"), Some(Operator::NotContains), &json!("z")));
    }

    #[test]
    fn test_missing_operator_uses_boolean_left() {
        assert!(compare(&json!(true), None, &Value::Null));
        assert!(!compare(&json!("true"), None, &Value::Null));
    }

    #[test]
    fn test_links_follow_and_or_rules() {
        let mut condition = operator(json!(1), Operator::Equal, json!(2));
        assert!(!condition.build());

        condition.links.or = Some(Box::new(operator(json!(1), Operator::Equal, json!(1))));
        assert!(condition.build());

        let mut passing = operator(json!(1), Operator::Equal, json!(1));
        passing.links.and = Some(Box::new(operator(json!(1), Operator::Greater, json!(5))));
        assert!(!passing.build());
    }

    #[test]
    fn test_null_or_empty_with_not() {
        let empty = NullOrEmpty {
            value: json!([]),
            negate: false,
            links: ConditionLinks::default(),
        };
        assert!(empty.build());
        let negated = NullOrEmpty {
            value: json!("x"),
            negate: true,
            links: ConditionLinks::default(),
        };
        assert!(negated.build());
    }

    #[test]
    fn test_condition_values_resolve_their_subtype() {
        let registry = TypeRegistry::with_builtins();
        let model = Model::new();
        let scope = PopulateScope::new(&registry, &model);
        let raw = json!({
            "_type": "OperatorCondition",
            "left": 3,
            "operator": "Greater",
            "right": 5,
            "or": {"_type": "NullOrEmpty", "value": ""}
        });
        let instance = scope.parse_property("Condition", &raw).expect("condition parses");
        let condition = instance.downcast::<Box<dyn Condition>>().expect("boxed condition");
        assert!(condition.build());

        let abstract_only = scope.parse_property("Condition", &json!({"left": 1}));
        assert!(matches!(abstract_only, Err(PopulateError::AbstractType(_))));
    }
}
