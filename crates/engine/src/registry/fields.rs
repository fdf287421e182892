//! Field descriptors and populated field bags.
//!
//! A [`FieldDescriptor`] declares one settable field of a registered type:
//! its model key, its [`FieldKind`], and an optional default used when a
//! present value cannot be coerced. Population turns a node's properties and
//! action slots into a [`Fields`] bag that factories read with typed getters.

use std::{any::Any, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::{Map, Value, json};

use nodeflow_types::NodeId;
use nodeflow_util::coerce::{parse_datetime, stringify};

/// A constructed property value (a rule set, a condition, an entity binding).
pub type PropertyInstance = Box<dyn Any + Send>;

/// Kind of value a field accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Text,
    Bool,
    /// 32-bit integer.
    Int,
    /// 64-bit integer.
    Long,
    Decimal,
    Date,
    /// Enumeration matched by exact variant name or integer ordinal.
    Enum(Vec<String>),
    /// Any JSON value, taken as written.
    Json,
    /// A JSON object.
    Map,
    /// A registered property type; the value is a sub-map (or scalar) parsed
    /// by that type or by the subtype its `_type` names.
    Capability(String),
    /// A single action slot.
    ChildAction,
    /// Every action slot not claimed by a [`FieldKind::ChildAction`] field.
    ActionMap,
    List(Box<FieldKind>),
}

impl FieldKind {
    pub fn enumeration(variants: &[&str]) -> Self {
        FieldKind::Enum(variants.iter().map(|variant| variant.to_string()).collect())
    }

    pub fn capability(base: &str) -> Self {
        FieldKind::Capability(base.to_string())
    }

    pub fn list(inner: FieldKind) -> Self {
        FieldKind::List(Box::new(inner))
    }

    /// Parses the short kind names used by configuration files.
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name.trim().to_ascii_lowercase().as_str() {
            "string" | "text" => FieldKind::Text,
            "bool" | "boolean" => FieldKind::Bool,
            "int" | "integer" => FieldKind::Int,
            "long" => FieldKind::Long,
            "decimal" | "double" | "number" => FieldKind::Decimal,
            "date" | "datetime" => FieldKind::Date,
            "json" | "any" => FieldKind::Json,
            "map" | "object" => FieldKind::Map,
            _ => return None,
        };
        Some(kind)
    }

    pub fn is_action_slot(&self) -> bool {
        matches!(self, FieldKind::ChildAction | FieldKind::ActionMap)
    }

    /// Short label used in error messages.
    pub fn label(&self) -> String {
        match self {
            FieldKind::Text => "string".into(),
            FieldKind::Bool => "bool".into(),
            FieldKind::Int => "int".into(),
            FieldKind::Long => "long".into(),
            FieldKind::Decimal => "decimal".into(),
            FieldKind::Date => "date".into(),
            FieldKind::Enum(_) => "enum".into(),
            FieldKind::Json => "json".into(),
            FieldKind::Map => "map".into(),
            FieldKind::Capability(base) => base.clone(),
            FieldKind::ChildAction => "action".into(),
            FieldKind::ActionMap => "action map".into(),
            FieldKind::List(inner) => format!("list of {}", inner.label()),
        }
    }

    /// JSON description used by the schema dump.
    pub fn describe(&self) -> Value {
        match self {
            FieldKind::Enum(variants) => json!({"enum": variants}),
            FieldKind::Capability(base) => json!({"type": base}),
            FieldKind::List(inner) => json!({"list": inner.describe()}),
            other => Value::String(other.label()),
        }
    }
}

/// One declared field of a registered type.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
    pub default: Option<Value>,
    pub nullable: bool,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
            nullable: false,
        }
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn describe(&self) -> Value {
        let mut description = Map::new();
        description.insert("kind".into(), self.kind.describe());
        if let Some(default) = &self.default {
            description.insert("default".into(), default.clone());
        }
        if self.nullable {
            description.insert("nullable".into(), Value::Bool(true));
        }
        Value::Object(description)
    }
}

/// A populated field value.
pub enum FieldValue {
    /// Coerced scalar, raw JSON, or map. Dates are stored as RFC 3339 text and
    /// enum values as their variant name.
    Scalar(Value),
    Action(NodeId),
    Actions(IndexMap<String, NodeId>),
    Property(PropertyInstance),
    List(Vec<FieldValue>),
}

impl fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Scalar(value) => f.debug_tuple("Scalar").field(value).finish(),
            FieldValue::Action(id) => f.debug_tuple("Action").field(id).finish(),
            FieldValue::Actions(map) => f.debug_tuple("Actions").field(map).finish(),
            FieldValue::Property(_) => f.write_str("Property(..)"),
            FieldValue::List(items) => f.debug_tuple("List").field(items).finish(),
        }
    }
}

impl FieldValue {
    fn as_json(&self) -> Option<Value> {
        match self {
            FieldValue::Scalar(value) => Some(value.clone()),
            FieldValue::List(items) => Some(Value::Array(items.iter().filter_map(FieldValue::as_json).collect())),
            _ => None,
        }
    }
}

/// The populated fields of one instance, keyed by field name.
///
/// Only fields present in the source appear here; absent fields are simply
/// missing and getters return `None` for them.
#[derive(Debug, Default)]
pub struct Fields {
    owner: String,
    values: IndexMap<String, FieldValue>,
}

impl Fields {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            values: IndexMap::new(),
        }
    }

    /// Id of the node (or description of the value) these fields came from.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        self.values.insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn scalar(&self, name: &str) -> Option<&Value> {
        match self.values.get(name) {
            Some(FieldValue::Scalar(Value::Null)) | None => None,
            Some(FieldValue::Scalar(value)) => Some(value),
            Some(_) => None,
        }
    }

    pub fn text(&self, name: &str) -> Option<String> {
        self.scalar(name).map(stringify)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.scalar(name).and_then(Value::as_bool)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.scalar(name).and_then(Value::as_i64)
    }

    pub fn decimal(&self, name: &str) -> Option<f64> {
        self.scalar(name).and_then(Value::as_f64)
    }

    pub fn date(&self, name: &str) -> Option<DateTime<Utc>> {
        self.scalar(name).and_then(parse_datetime)
    }

    /// Raw JSON of a scalar, map, or list-of-scalars field.
    pub fn json(&self, name: &str) -> Option<Value> {
        self.values.get(name).and_then(FieldValue::as_json).filter(|value| !value.is_null())
    }

    /// A map field, or an empty map when absent.
    pub fn map(&self, name: &str) -> Map<String, Value> {
        match self.scalar(name) {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        }
    }

    /// A list field as JSON values, or an empty list when absent.
    pub fn list(&self, name: &str) -> Vec<Value> {
        match self.json(name) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        }
    }

    /// An enum field parsed into `T` by variant name.
    pub fn variant<T: FromStr>(&self, name: &str) -> Option<T> {
        self.scalar(name).and_then(Value::as_str).and_then(|variant| variant.parse().ok())
    }

    pub fn take_action(&mut self, name: &str) -> Option<NodeId> {
        match self.values.shift_remove(name) {
            Some(FieldValue::Action(id)) => Some(id),
            _ => None,
        }
    }

    pub fn take_actions(&mut self, name: &str) -> IndexMap<String, NodeId> {
        match self.values.shift_remove(name) {
            Some(FieldValue::Actions(actions)) => actions,
            _ => IndexMap::new(),
        }
    }

    /// Takes a property field, downcasting it to `T`.
    pub fn take_property<T: 'static>(&mut self, name: &str) -> Option<T> {
        match self.values.shift_remove(name) {
            Some(FieldValue::Property(instance)) => instance.downcast::<T>().ok().map(|boxed| *boxed),
            _ => None,
        }
    }

    /// Takes a list-of-properties field, dropping elements of another type.
    pub fn take_properties<T: 'static>(&mut self, name: &str) -> Vec<T> {
        match self.values.shift_remove(name) {
            Some(FieldValue::List(items)) => items
                .into_iter()
                .filter_map(|item| match item {
                    FieldValue::Property(instance) => instance.downcast::<T>().ok().map(|boxed| *boxed),
                    _ => None,
                })
                .collect(),
            Some(FieldValue::Property(instance)) => instance.downcast::<T>().ok().map(|boxed| vec![*boxed]).unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// Scalar fields as a record. Action and property fields are skipped.
    pub fn into_record(self) -> Map<String, Value> {
        self.values
            .into_iter()
            .filter_map(|(name, value)| value.as_json().map(|json| (name, json)))
            .collect()
    }
}
