//! Outbound HTTP actions: `Rest` and `Request`.
//!
//! Both resolve to a [`RestCall`] and send it through the engine's
//! [`HttpClientPool`](nodeflow_util::http::HttpClientPool), blocking the
//! current invocation until the response arrives.

use anyhow::Context as _;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use nodeflow_types::ActionResult;
use nodeflow_util::{
    block_on_future,
    coerce::stringify,
    http::{OutboundRequest, build_url, execute_request, fill_path, parse_method},
};

use super::{Action, ActionScope, StackSlots, stack_action_info};
use crate::{
    engine::Engine,
    registry::{FieldDescriptor, FieldKind, Fields, PopulateScope, TypeInfo},
    request::RequestSpec,
};

/// A fully evaluated outbound call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestCall {
    pub url: Option<String>,
    pub path: Option<String>,
    pub method: Option<String>,
    pub headers: Map<String, Value>,
    pub query_args: Map<String, Value>,
    pub body: Option<Value>,
}

impl RestCall {
    /// Reads the call from populated fields. `{name}` placeholders in `path`
    /// are filled from a `pathParameters` map when one is present.
    pub fn from_fields(fields: &Fields) -> Self {
        let path_parameters = fields.map("pathParameters");
        Self {
            url: fields.text("url").filter(|url| !url.trim().is_empty()),
            path: fields.text("path").map(|path| fill_path(&path, &path_parameters)),
            method: fields.text("method"),
            headers: fields.map("headers"),
            query_args: fields.map("queryArgs"),
            body: fields.json("body"),
        }
    }

    /// Sends the call. Transport failures and non-2xx statuses yield a failed
    /// result; malformed urls, methods and headers are errors.
    pub fn send(&self, engine: &Engine, node_id: &str) -> anyhow::Result<ActionResult> {
        let Some(method) = self.method.as_deref() else {
            return Ok(ActionResult::failure_with("request has no method"));
        };
        let Some(base) = self.url.as_deref() else {
            return Ok(ActionResult::failure_with("request has no url"));
        };
        let method = parse_method(method)?;
        let url = build_url(base, self.path.as_deref(), &self.query_args)?;

        let mut request = OutboundRequest::new(method.clone(), url.clone());
        request.headers = self
            .headers
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(name, value)| (name.clone(), stringify(value)))
            .collect();
        request.body = self.body.clone();

        let client = engine.http_pool().client_for(&url)?;
        debug!(node_id, method = %method, url = %url, "sending outbound request");
        let response = block_on_future(async move { execute_request(client, request).await.map_err(anyhow::Error::from) })
            .with_context(|| format!("{method} {url}"));
        match response {
            Ok(data) => Ok(ActionResult::success(data)),
            Err(error) => {
                warn!(node_id, error = %format!("{error:#}"), "outbound request failed");
                Ok(ActionResult::failure_with(format!("{error:#}")))
            }
        }
    }
}

/// Calls an HTTP endpoint described inline by the node's properties.
#[derive(Debug)]
pub struct Rest {
    pub call: RestCall,
    pub slots: StackSlots,
}

impl Action for Rest {
    fn execute(&mut self, scope: &mut ActionScope<'_>) -> anyhow::Result<ActionResult> {
        self.call.send(scope.engine, scope.node_id)
    }

    fn stack(&self) -> Option<&StackSlots> {
        Some(&self.slots)
    }
}

pub(crate) fn rest_info() -> TypeInfo {
    TypeInfo::new("Rest", "nodeflow::Rest")
        .with_fields([
            FieldDescriptor::new("url", FieldKind::Text),
            FieldDescriptor::new("path", FieldKind::Text),
            FieldDescriptor::new("method", FieldKind::Text),
            FieldDescriptor::new("headers", FieldKind::Map),
            FieldDescriptor::new("queryArgs", FieldKind::Map),
            FieldDescriptor::new("body", FieldKind::Json),
        ])
        .extends(&stack_action_info())
}

pub(crate) fn build_rest(mut fields: Fields) -> anyhow::Result<Box<dyn Action>> {
    Ok(Box::new(Rest {
        call: RestCall::from_fields(&fields),
        slots: StackSlots::from_fields(&mut fields),
    }))
}

/// Calls the endpoint described by a [`RequestSpec`], adding `headers`.
#[derive(Debug)]
pub struct Request {
    pub request: Option<RequestSpec>,
    pub headers: Map<String, Value>,
    pub slots: StackSlots,
}

impl Action for Request {
    fn execute(&mut self, scope: &mut ActionScope<'_>) -> anyhow::Result<ActionResult> {
        let Some(spec) = &self.request else {
            return Ok(ActionResult::failure_with("Request has no request specification"));
        };
        let populate = PopulateScope::new(scope.engine.registry(), scope.engine.model());
        let mut call = spec.resolve(scope.context, &populate);
        call.headers = self.headers.clone();
        call.send(scope.engine, scope.node_id)
    }

    fn stack(&self) -> Option<&StackSlots> {
        Some(&self.slots)
    }
}

pub(crate) fn request_info() -> TypeInfo {
    TypeInfo::new("Request", "nodeflow::Request")
        .with_fields([
            FieldDescriptor::new("request", FieldKind::capability("RequestSpec")),
            FieldDescriptor::new("headers", FieldKind::Map),
        ])
        .extends(&stack_action_info())
}

pub(crate) fn build_request(mut fields: Fields) -> anyhow::Result<Box<dyn Action>> {
    Ok(Box::new(Request {
        request: fields.take_property::<RequestSpec>("request"),
        headers: fields.map("headers"),
        slots: StackSlots::from_fields(&mut fields),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FieldValue;
    use serde_json::json;

    #[test]
    fn test_rest_call_fills_path_parameters() {
        let mut fields = Fields::new("n1");
        fields.insert("url", FieldValue::Scalar(json!("https://api.example.com")));
        fields.insert("path", FieldValue::Scalar(json!("users/{id}")));
        fields.insert("method", FieldValue::Scalar(json!("Get")));
        fields.insert("pathParameters", FieldValue::Scalar(json!({"id": 7})));
        let call = RestCall::from_fields(&fields);
        assert_eq!(call.path.as_deref(), Some("users/7"));
        assert_eq!(call.method.as_deref(), Some("Get"));
        assert!(call.body.is_none());
    }

    #[test]
    fn test_missing_method_or_url_fails_without_sending() {
        let engine = Engine::new(
            std::sync::Arc::new(crate::registry::TypeRegistry::with_builtins()),
            std::sync::Arc::new(nodeflow_types::Model::new()),
        );
        let call = RestCall {
            url: Some("https://api.example.com".into()),
            ..RestCall::default()
        };
        let result = call.send(&engine, "n1").expect("no transport error");
        assert!(!result.success);

        let call = RestCall {
            method: Some("GET".into()),
            ..RestCall::default()
        };
        let result = call.send(&engine, "n1").expect("no transport error");
        assert_eq!(result.return_data, Some(json!("request has no url")));
    }
}
