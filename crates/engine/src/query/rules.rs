use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::registry::{FieldDescriptor, FieldKind, PopulateError, PopulateScope, PropertyInstance, TypeInfo};

/// Filter operators. Ordinals follow declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterType {
    Equal,
    NotEqual,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
    In,
    NotIn,
    NotStartsWith,
    NotEndsWith,
}

impl FilterType {
    pub const NAMES: [&'static str; 14] = [
        "Equal",
        "NotEqual",
        "Contains",
        "NotContains",
        "StartsWith",
        "EndsWith",
        "Greater",
        "GreaterOrEqual",
        "Less",
        "LessOrEqual",
        "In",
        "NotIn",
        "NotStartsWith",
        "NotEndsWith",
    ];

    const ALL: [FilterType; 14] = [
        FilterType::Equal,
        FilterType::NotEqual,
        FilterType::Contains,
        FilterType::NotContains,
        FilterType::StartsWith,
        FilterType::EndsWith,
        FilterType::Greater,
        FilterType::GreaterOrEqual,
        FilterType::Less,
        FilterType::LessOrEqual,
        FilterType::In,
        FilterType::NotIn,
        FilterType::NotStartsWith,
        FilterType::NotEndsWith,
    ];
}

impl FromStr for FilterType {
    type Err = String;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        FilterType::NAMES
            .iter()
            .position(|candidate| *candidate == name)
            .map(|index| FilterType::ALL[index])
            .ok_or_else(|| format!("unknown filter type '{name}'"))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "Ascending" => Ok(SortDirection::Ascending),
            "Descending" => Ok(SortDirection::Descending),
            other => Err(format!("unknown sort direction '{other}'")),
        }
    }
}

/// One filter: `attribute <type> value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterRule {
    pub attribute: Option<String>,
    #[serde(rename = "type")]
    pub filter_type: Option<FilterType>,
    #[serde(default)]
    pub value: Value,
    /// Skip the rule (rather than fail it) when `value` is empty.
    #[serde(default)]
    pub ignore_if_empty: bool,
}

impl FilterRule {
    pub fn new(attribute: impl Into<String>, filter_type: FilterType, value: impl Into<Value>) -> Self {
        Self {
            attribute: Some(attribute.into()),
            filter_type: Some(filter_type),
            value: value.into(),
            ignore_if_empty: false,
        }
    }

    pub fn ignore_if_empty(mut self) -> Self {
        self.ignore_if_empty = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRule {
    pub attribute: Option<String>,
    #[serde(default)]
    pub direction: SortDirection,
}

impl OrderRule {
    pub fn new(attribute: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            attribute: Some(attribute.into()),
            direction,
        }
    }
}

/// Filters, sorts and an optional 1-based page window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSet {
    #[serde(default)]
    pub filters: Vec<FilterRule>,
    #[serde(default)]
    pub sorts: Vec<OrderRule>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

pub(crate) fn filter_rule_info() -> TypeInfo {
    TypeInfo::new("FilterRule", "nodeflow::FilterRule").with_fields([
        FieldDescriptor::new("attribute", FieldKind::Text),
        FieldDescriptor::new("type", FieldKind::enumeration(&FilterType::NAMES)),
        FieldDescriptor::new("value", FieldKind::Json),
        FieldDescriptor::new("ignoreIfEmpty", FieldKind::Bool).with_default(false),
    ])
}

pub(crate) fn order_rule_info() -> TypeInfo {
    TypeInfo::new("OrderRule", "nodeflow::OrderRule").with_fields([
        FieldDescriptor::new("attribute", FieldKind::Text),
        FieldDescriptor::new("direction", FieldKind::enumeration(&["Ascending", "Descending"])).with_default("Ascending"),
    ])
}

pub(crate) fn rule_set_info() -> TypeInfo {
    TypeInfo::new("RuleSet", "nodeflow::RuleSet").with_fields([
        FieldDescriptor::new("filters", FieldKind::list(FieldKind::capability("FilterRule"))),
        FieldDescriptor::new("sorts", FieldKind::list(FieldKind::capability("OrderRule"))),
        FieldDescriptor::new("page", FieldKind::Int).nullable(),
        FieldDescriptor::new("pageSize", FieldKind::Int).nullable(),
    ])
}

pub(crate) fn parse_filter_rule(info: &TypeInfo, raw: &Value, scope: &PopulateScope<'_>) -> Result<PropertyInstance, PopulateError> {
    let fields = scope.populate_value(info, raw)?;
    Ok(Box::new(FilterRule {
        attribute: fields.text("attribute"),
        filter_type: fields.variant("type"),
        value: fields.json("value").unwrap_or(Value::Null),
        ignore_if_empty: fields.bool("ignoreIfEmpty").unwrap_or(false),
    }))
}

pub(crate) fn parse_order_rule(info: &TypeInfo, raw: &Value, scope: &PopulateScope<'_>) -> Result<PropertyInstance, PopulateError> {
    let fields = scope.populate_value(info, raw)?;
    Ok(Box::new(OrderRule {
        attribute: fields.text("attribute"),
        direction: fields.variant("direction").unwrap_or_default(),
    }))
}

pub(crate) fn parse_rule_set(info: &TypeInfo, raw: &Value, scope: &PopulateScope<'_>) -> Result<PropertyInstance, PopulateError> {
    let mut fields = scope.populate_value(info, raw)?;
    Ok(Box::new(RuleSet {
        filters: fields.take_properties::<FilterRule>("filters"),
        sorts: fields.take_properties::<OrderRule>("sorts"),
        page: fields.int("page"),
        page_size: fields.int("pageSize"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TypeRegistry;
    use nodeflow_types::Model;
    use serde_json::json;

    #[test]
    fn test_filter_types_parse_by_name_and_ordinal() {
        assert_eq!("GreaterOrEqual".parse::<FilterType>(), Ok(FilterType::GreaterOrEqual));
        assert!("greaterorequal".parse::<FilterType>().is_err());

        let registry = TypeRegistry::with_builtins();
        let model = Model::new();
        let scope = PopulateScope::new(&registry, &model);
        let instance = scope
            .parse_property("FilterRule", &json!({"attribute": "age", "type": 10, "value": "1,2"}))
            .expect("rule parses");
        let rule = instance.downcast::<FilterRule>().expect("filter rule");
        assert_eq!(rule.filter_type, Some(FilterType::In));
    }

    #[test]
    fn test_rule_set_parses_nested_rules() {
        let registry = TypeRegistry::with_builtins();
        let model = Model::new();
        let scope = PopulateScope::new(&registry, &model);
        let raw = json!({
            "filters": [
                {"attribute": "age", "type": "GreaterOrEqual", "value": 18},
                {"attribute": "name", "type": "Contains", "value": "", "ignoreIfEmpty": true}
            ],
            "sorts": [{"attribute": "age", "direction": "Descending"}],
            "page": "2",
            "pageSize": 10
        });
        let instance = scope.parse_property("RuleSet", &raw).expect("rule set parses");
        let rules = instance.downcast::<RuleSet>().expect("rule set");
        assert_eq!(rules.filters.len(), 2);
        assert!(rules.filters[1].ignore_if_empty);
        assert_eq!(rules.sorts, vec![OrderRule::new("age", SortDirection::Descending)]);
        assert_eq!(rules.page, Some(2));
        assert_eq!(rules.page_size, Some(10));
    }
}
