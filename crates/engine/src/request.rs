//! Request specifications.
//!
//! A `RequestSpec` property value names a node of the model's `types`
//! section through `_type` and may override any of its properties:
//!
//! ```json
//! { "_type": "users-api", "path": "users/{id}", "pathParameters": { "id": "${path.id}" } }
//! ```
//!
//! The referenced node's properties are stored unevaluated in the model, so
//! the merged map is template-evaluated when the request is sent, against the
//! context of the invocation sending it.

use serde_json::{Map, Value};

use nodeflow_util::merge_json;

use crate::{
    actions::rest::RestCall,
    context::EvaluationContext,
    registry::{FieldDescriptor, FieldKind, PopulateError, PopulateScope, PropertyInstance, TYPE_KEY, TypeInfo},
    template::evaluate_properties,
};

/// A request template: the referenced type node's properties merged with
/// the property value's overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    /// Id of the `types` node the request was built from.
    pub type_id: Option<String>,
    pub properties: Map<String, Value>,
}

impl RequestSpec {
    /// Evaluates the template against `context` and reads the resulting call.
    pub fn resolve(&self, context: &EvaluationContext, scope: &PopulateScope<'_>) -> RestCall {
        let properties = evaluate_properties(&self.properties, context);
        let owner = self.type_id.as_deref().unwrap_or("RequestSpec");
        let fields = scope.populate_map(&request_spec_info().fields, owner, &properties);
        RestCall::from_fields(&fields)
    }
}

pub(crate) fn request_spec_info() -> TypeInfo {
    TypeInfo::new("RequestSpec", "nodeflow::RequestSpec").with_fields([
        FieldDescriptor::new("url", FieldKind::Text),
        FieldDescriptor::new("path", FieldKind::Text),
        FieldDescriptor::new("method", FieldKind::Text),
        FieldDescriptor::new("pathParameters", FieldKind::Map),
        FieldDescriptor::new("queryArgs", FieldKind::Map),
        FieldDescriptor::new("body", FieldKind::Json),
    ])
}

pub(crate) fn parse_request_spec(_info: &TypeInfo, raw: &Value, scope: &PopulateScope<'_>) -> Result<PropertyInstance, PopulateError> {
    let Value::Object(overrides) = raw else {
        return Err(PopulateError::Coercion {
            expected: "RequestSpec".into(),
            value: raw.to_string(),
        });
    };
    let type_id = overrides.get(TYPE_KEY).and_then(Value::as_str).map(str::to_string);
    let mut properties = match &type_id {
        Some(id) => scope
            .model()
            .type_node(id)
            .map(|node| node.properties.clone())
            .ok_or_else(|| PopulateError::invalid(format!("request type '{id}' is not defined in the model")))?,
        None => Map::new(),
    };
    merge_json(&mut properties, overrides);
    properties.remove(TYPE_KEY);
    Ok(Box::new(RequestSpec { type_id, properties }))
}
