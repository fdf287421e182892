//! Entity property types used by the persistence actions.
//!
//! - `Entity` binds an entity and materializes a record from the value:
//!   `{ "_type": "Blog.Posts", "title": "${body.title}" }`.
//! - `EntitySelect` only selects an entity, by name or through `_type`.

use serde_json::{Map, Value};

use crate::{
    registry::{PopulateError, PopulateScope, PropertyInstance, TYPE_KEY, TypeInfo},
    store::{EntitySpec, Record},
};

/// An entity together with the record built from the property value.
#[derive(Debug, Clone)]
pub struct EntityBinding {
    pub spec: EntitySpec,
    /// The value's raw properties, `_type` removed.
    pub properties: Map<String, Value>,
    /// `properties` populated against the entity's schema; undeclared keys are
    /// dropped and only present fields appear.
    pub entry: Record,
}

/// A selected entity, without a record.
#[derive(Debug, Clone)]
pub struct EntitySelect {
    pub spec: EntitySpec,
}

pub(crate) fn entity_info() -> TypeInfo {
    TypeInfo::new("Entity", "nodeflow::Entity")
}

pub(crate) fn entity_select_info() -> TypeInfo {
    TypeInfo::new("EntitySelect", "nodeflow::EntitySelect")
}

fn lookup<'a>(scope: &PopulateScope<'a>, name: &str) -> Result<&'a EntitySpec, PopulateError> {
    scope
        .registry()
        .get_entity(name)
        .map_err(|error| PopulateError::invalid(error.to_string()))
}

pub(crate) fn parse_entity(_info: &TypeInfo, raw: &Value, scope: &PopulateScope<'_>) -> Result<PropertyInstance, PopulateError> {
    let Value::Object(map) = raw else {
        return Err(PopulateError::Coercion {
            expected: "Entity".into(),
            value: raw.to_string(),
        });
    };
    let name = map
        .get(TYPE_KEY)
        .and_then(Value::as_str)
        .ok_or_else(|| PopulateError::invalid("entity value does not name an entity in '_type'"))?;
    let spec = lookup(scope, name)?.clone();
    let mut properties = map.clone();
    properties.remove(TYPE_KEY);
    let entry = scope.populate_map(&spec.schema.fields, &spec.name, &properties).into_record();
    Ok(Box::new(EntityBinding { spec, properties, entry }))
}

pub(crate) fn parse_entity_select(_info: &TypeInfo, raw: &Value, scope: &PopulateScope<'_>) -> Result<PropertyInstance, PopulateError> {
    let name = match raw {
        Value::String(name) => name.as_str(),
        Value::Object(map) => map
            .get(TYPE_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| PopulateError::invalid("entity selection does not name an entity in '_type'"))?,
        other => {
            return Err(PopulateError::Coercion {
                expected: "EntitySelect".into(),
                value: other.to_string(),
            });
        }
    };
    let spec = lookup(scope, name)?.clone();
    Ok(Box::new(EntitySelect { spec }))
}
