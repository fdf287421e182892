//! Property population.
//!
//! Turns the raw (already template-evaluated) properties and action slots of
//! a node into a [`Fields`] bag, guided by a type's field descriptors.
//! Population never fails as a whole: a field whose value cannot be read is
//! logged and left out (or set to its declared default), and the remaining
//! fields are still populated.

use indexmap::IndexMap;
use serde_json::{Map, Number, Value};
use thiserror::Error;
use tracing::{debug, warn};

use nodeflow_types::{Model, Node, NodeId};
use nodeflow_util::coerce::{parse_bool, parse_datetime, parse_f64, parse_i32, parse_i64, stringify};

use super::{
    TYPE_KEY, TypeInfo, TypeRegistry,
    fields::{FieldDescriptor, FieldKind, FieldValue, Fields, PropertyInstance},
};

/// Errors raised while populating a single field or property value.
#[derive(Debug, Error)]
pub enum PopulateError {
    #[error("cannot read {value} as {expected}")]
    Coercion { expected: String, value: String },
    #[error("unknown property type '{0}'")]
    UnknownType(String),
    #[error("property type '{0}' is abstract and the value does not name a concrete subtype")]
    AbstractType(String),
    #[error("{0} fields cannot be nested inside lists or property values")]
    UnsupportedKind(String),
    #[error("{0}")]
    Invalid(String),
}

impl PopulateError {
    pub fn invalid(message: impl Into<String>) -> Self {
        PopulateError::Invalid(message.into())
    }
}

/// What population may look at besides the value itself: the registry (for
/// property types and entities) and the model (for `types` section lookups).
#[derive(Clone, Copy)]
pub struct PopulateScope<'a> {
    registry: &'a TypeRegistry,
    model: &'a Model,
}

impl<'a> PopulateScope<'a> {
    pub fn new(registry: &'a TypeRegistry, model: &'a Model) -> Self {
        Self { registry, model }
    }

    pub fn registry(&self) -> &'a TypeRegistry {
        self.registry
    }

    pub fn model(&self) -> &'a Model {
        self.model
    }

    /// Populates `info`'s fields from a node's properties and action slots.
    pub fn populate_node(&self, info: &TypeInfo, node: &Node) -> Fields {
        self.populate(&info.fields, &node.id, &node.properties, Some(&node.actions))
    }

    /// Populates `descriptors` from a plain property map with no action slots.
    pub fn populate_map(&self, descriptors: &[FieldDescriptor], owner: &str, properties: &Map<String, Value>) -> Fields {
        self.populate(descriptors, owner, properties, None)
    }

    /// Populates `info`'s fields from a property value that must be a map.
    pub fn populate_value(&self, info: &TypeInfo, raw: &Value) -> Result<Fields, PopulateError> {
        let Value::Object(properties) = raw else {
            return Err(PopulateError::Coercion {
                expected: info.name.clone(),
                value: raw.to_string(),
            });
        };
        Ok(self.populate(&info.fields, &info.name, properties, None))
    }

    fn populate(
        &self,
        descriptors: &[FieldDescriptor],
        owner: &str,
        properties: &Map<String, Value>,
        actions: Option<&IndexMap<String, NodeId>>,
    ) -> Fields {
        let mut fields = Fields::new(owner);

        for descriptor in descriptors {
            match &descriptor.kind {
                FieldKind::ChildAction => {
                    if let Some(target) = actions.and_then(|slots| slots.get(&descriptor.name)) {
                        fields.insert(descriptor.name.clone(), FieldValue::Action(target.clone()));
                    }
                }
                FieldKind::ActionMap => {
                    // Every slot, including those a child-action field also takes.
                    let slots = actions.cloned().unwrap_or_default();
                    fields.insert(descriptor.name.clone(), FieldValue::Actions(slots));
                }
                kind => {
                    let Some(raw) = properties.get(&descriptor.name) else {
                        continue;
                    };
                    match self.coerce(kind, raw) {
                        Ok(value) => fields.insert(descriptor.name.clone(), value),
                        Err(PopulateError::Coercion { expected, value }) => {
                            debug!(owner, field = %descriptor.name, expected = %expected, value = %value, "property value could not be coerced");
                            if let Some(default) = &descriptor.default {
                                fields.insert(descriptor.name.clone(), FieldValue::Scalar(default.clone()));
                            }
                        }
                        Err(error) => {
                            warn!(owner, field = %descriptor.name, %error, "skipping property that failed to populate");
                        }
                    }
                }
            }
        }

        for key in properties.keys() {
            if key != TYPE_KEY && !descriptors.iter().any(|descriptor| &descriptor.name == key) {
                debug!(owner, property = %key, "ignoring undeclared property");
            }
        }
        fields
    }

    /// Coerces one raw value to `kind`.
    ///
    /// Explicit nulls stay null for every scalar kind.
    pub fn coerce(&self, kind: &FieldKind, raw: &Value) -> Result<FieldValue, PopulateError> {
        if raw.is_null() && !matches!(kind, FieldKind::Capability(_)) {
            return Ok(FieldValue::Scalar(Value::Null));
        }
        let mismatch = || PopulateError::Coercion {
            expected: kind.label(),
            value: raw.to_string(),
        };
        let scalar = match kind {
            FieldKind::Text => Some(Value::String(stringify(raw))),
            FieldKind::Bool => parse_bool(raw).map(Value::Bool),
            FieldKind::Int => parse_i32(raw).map(Value::from),
            FieldKind::Long => parse_i64(raw).map(Value::from),
            FieldKind::Decimal => parse_f64(raw).and_then(Number::from_f64).map(Value::Number),
            FieldKind::Date => parse_datetime(raw).map(|date| Value::String(date.to_rfc3339())),
            FieldKind::Enum(variants) => enum_variant(variants, raw).map(Value::String),
            FieldKind::Json => Some(raw.clone()),
            FieldKind::Map => raw.is_object().then(|| raw.clone()),
            FieldKind::Capability(base) => {
                if raw.is_null() {
                    return Err(mismatch());
                }
                return self.parse_property(base, raw).map(FieldValue::Property);
            }
            FieldKind::List(inner) => {
                let Value::Array(items) = raw else {
                    return Err(mismatch());
                };
                let mut values = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    match self.coerce(inner, item) {
                        Ok(value) => values.push(value),
                        Err(error) => warn!(index, %error, "dropping list element that failed to populate"),
                    }
                }
                return Ok(FieldValue::List(values));
            }
            FieldKind::ChildAction | FieldKind::ActionMap => return Err(PopulateError::UnsupportedKind(kind.label())),
        };
        scalar.map(FieldValue::Scalar).ok_or_else(mismatch)
    }

    /// Parses `raw` as the property type `base`, or as the registered subtype
    /// of `base` named by the value's `_type` key.
    pub fn parse_property(&self, base: &str, raw: &Value) -> Result<PropertyInstance, PopulateError> {
        let base_type = self
            .registry
            .property(base)
            .ok_or_else(|| PopulateError::UnknownType(base.to_string()))?;
        let chosen = raw
            .get(TYPE_KEY)
            .and_then(Value::as_str)
            .and_then(|name| self.registry.property(name))
            .filter(|candidate| candidate.info.is_a(&base_type.info))
            .unwrap_or(base_type);
        let Some(parse) = chosen.factory else {
            return Err(PopulateError::AbstractType(chosen.info.name.clone()));
        };
        parse(&chosen.info, raw, self)
    }
}

fn enum_variant(variants: &[String], raw: &Value) -> Option<String> {
    let ordinal = match raw {
        Value::String(text) => {
            if let Some(variant) = variants.iter().find(|variant| *variant == text) {
                return Some(variant.clone());
            }
            text.trim().parse::<usize>().ok()
        }
        Value::Number(number) => number.as_u64().and_then(|ordinal| usize::try_from(ordinal).ok()),
        _ => None,
    };
    ordinal.and_then(|ordinal| variants.get(ordinal)).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TypeRegistry;
    use serde_json::json;

    fn descriptors() -> Vec<FieldDescriptor> {
        vec![
            FieldDescriptor::new("title", FieldKind::Text),
            FieldDescriptor::new("count", FieldKind::Int).with_default(5),
            FieldDescriptor::new("ratio", FieldKind::Decimal),
            FieldDescriptor::new("enabled", FieldKind::Bool),
            FieldDescriptor::new("when", FieldKind::Date),
            FieldDescriptor::new("method", FieldKind::enumeration(&["Get", "Post"])),
            FieldDescriptor::new("ids", FieldKind::list(FieldKind::Int)),
            FieldDescriptor::new("next", FieldKind::ChildAction),
            FieldDescriptor::new("cases", FieldKind::ActionMap),
        ]
    }

    #[test]
    fn test_populates_coerced_scalars_and_slots() {
        let registry = TypeRegistry::builder().build();
        let model = Model::new();
        let scope = PopulateScope::new(&registry, &model);
        let node = Node::new("n1", "Thing")
            .with_property("title", 12)
            .with_property("count", "7")
            .with_property("ratio", "0.5")
            .with_property("enabled", "TRUE")
            .with_property("when", "2024-01-02")
            .with_property("method", 1)
            .with_property("ids", json!(["1", "x", 3]))
            .with_property("unknown", "ignored")
            .with_action("next", "n2")
            .with_action("a", "n3")
            .with_action("b", "n4");

        let info = TypeInfo::new("Thing", "test::Thing").with_fields(descriptors());
        let mut fields = scope.populate_node(&info, &node);

        assert_eq!(fields.text("title").as_deref(), Some("12"));
        assert_eq!(fields.int("count"), Some(7));
        assert_eq!(fields.decimal("ratio"), Some(0.5));
        assert_eq!(fields.bool("enabled"), Some(true));
        assert_eq!(fields.text("when").as_deref(), Some("2024-01-02T00:00:00+00:00"));
        assert_eq!(fields.text("method").as_deref(), Some("Post"));
        assert_eq!(fields.list("ids"), vec![json!(1), json!(3)]);
        assert!(!fields.contains("unknown"));
        assert_eq!(fields.take_action("next").as_deref(), Some("n2"));
        let cases = fields.take_actions("cases");
        assert_eq!(cases.keys().collect::<Vec<_>>(), vec!["next", "a", "b"]);
        assert_eq!(cases.get("next").map(String::as_str), Some("n2"));
    }

    #[test]
    fn test_failed_coercion_uses_default_or_leaves_field_absent() {
        let registry = TypeRegistry::builder().build();
        let model = Model::new();
        let scope = PopulateScope::new(&registry, &model);
        let node = Node::new("n1", "Thing")
            .with_property("count", "many")
            .with_property("method", "Put")
            .with_property("title", Value::Null);

        let info = TypeInfo::new("Thing", "test::Thing").with_fields(descriptors());
        let fields = scope.populate_node(&info, &node);

        assert_eq!(fields.int("count"), Some(5));
        assert!(!fields.contains("method"));
        assert!(fields.contains("title"));
        assert!(fields.text("title").is_none());
        assert!(!fields.contains("ratio"));
    }

    #[test]
    fn test_unknown_capability_is_skipped() {
        let registry = TypeRegistry::builder().build();
        let model = Model::new();
        let scope = PopulateScope::new(&registry, &model);
        let info = TypeInfo::new("Thing", "test::Thing")
            .with_field(FieldDescriptor::new("rules", FieldKind::capability("NoSuchType")))
            .with_field(FieldDescriptor::new("title", FieldKind::Text));
        let node = Node::new("n1", "Thing")
            .with_property("rules", json!({"filters": []}))
            .with_property("title", "kept");

        let fields = scope.populate_node(&info, &node);
        assert!(!fields.contains("rules"));
        assert_eq!(fields.text("title").as_deref(), Some("kept"));
    }
}
