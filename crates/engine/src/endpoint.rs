//! # Endpoints
//!
//! Entry points of the model: REST-style `Controller`s with one action slot
//! per HTTP verb, and `Query` / `Mutation` graphs with a single `execute`
//! slot. Every endpoint carries an [`AccessPolicy`] checked against the
//! caller's [`Principal`] before its chain runs.
//!
//! The engine does not listen on a socket. A host resolves the request to a
//! controller (optionally through [`Engine::route`](crate::Engine::route)),
//! fills the context with `query`, `path` and `body`, and calls
//! [`Engine::invoke_endpoint`](crate::Engine::invoke_endpoint).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use nodeflow_types::{ActionResult, NodeId};

use crate::{
    condition::Condition,
    context::EvaluationContext,
    registry::{FieldDescriptor, FieldKind, Fields, TypeInfo},
};

/// Claim types that carry roles.
pub const ROLE_CLAIMS: [&str; 2] = ["role", "http://schemas.microsoft.com/ws/2008/06/identity/claims/role"];
/// Claim types that carry scopes.
pub const SCOPE_CLAIMS: [&str; 2] = ["scope", "http://schemas.microsoft.com/identity/claims/scope"];

/// HTTP verbs a controller can serve, in slot order.
pub const CONTROLLER_VERBS: [&str; 5] = ["get", "post", "put", "patch", "delete"];

/// An instantiated endpoint.
pub trait Endpoint: Send {
    /// Entry action for `method`, or `None` when the endpoint does not serve it.
    fn entry_for(&self, method: &str) -> Option<NodeId>;

    fn access(&self) -> &AccessPolicy;

    /// An additional precondition checked after the access policy.
    fn precondition(&self) -> bool {
        true
    }
}

/// The authenticated (or anonymous) caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Principal {
    pub authenticated: bool,
    /// Claim type to value; repeated claims are joined with commas.
    pub claims: Map<String, Value>,
    pub roles: Vec<String>,
    pub scopes: Vec<String>,
}

impl Principal {
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// An authenticated principal built from `(type, value)` claim pairs.
    pub fn from_claims<I, K, V>(claims: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut principal = Self {
            authenticated: true,
            ..Self::default()
        };
        for (kind, value) in claims {
            let (kind, value) = (kind.into(), value.into());
            let joined = match principal.claims.get(&kind).and_then(Value::as_str) {
                Some(existing) => format!("{existing},{value}"),
                None => value.clone(),
            };
            principal.claims.insert(kind.clone(), Value::String(joined));
            if ROLE_CLAIMS.contains(&kind.as_str()) {
                principal.roles.push(value);
            } else if SCOPE_CLAIMS.contains(&kind.as_str()) {
                principal.scopes.push(value);
            }
        }
        principal
    }

    /// Publishes `claims`, `roles` and `scopes` into `context`.
    pub fn bind(&self, context: &mut EvaluationContext) {
        context.insert("claims", Value::Object(self.claims.clone()));
        context.insert("roles", Value::from(self.roles.clone()));
        context.insert("scopes", Value::from(self.scopes.clone()));
    }
}

/// Who may invoke an endpoint.
#[derive(Debug, Default)]
pub struct AccessPolicy {
    pub allow_anonymous: bool,
    pub allowed_roles: Vec<String>,
    pub allowed_scopes: Vec<String>,
    pub allowed_condition: Option<Box<dyn Condition>>,
}

impl AccessPolicy {
    pub fn from_fields(fields: &mut Fields) -> Self {
        Self {
            allow_anonymous: fields.bool("allowAnonymous").unwrap_or(false),
            allowed_roles: split_list(fields.text("allowedRoles")),
            allowed_scopes: split_list(fields.text("allowedScopes")),
            allowed_condition: fields.take_property::<Box<dyn Condition>>("allowedCondition"),
        }
    }

    /// Unless anonymous access is allowed, the principal must be
    /// authenticated and hold one of the allowed roles and one of the allowed
    /// scopes (each check applies only when the list is non-empty). The
    /// allowed condition, when set, must hold in every case.
    pub fn permits(&self, principal: &Principal) -> bool {
        if !self.allow_anonymous {
            if !principal.authenticated {
                info!("caller is not authenticated");
                return false;
            }
            if !self.allowed_roles.is_empty() && !self.allowed_roles.iter().any(|role| principal.roles.contains(role)) {
                info!("caller does not hold a required role");
                return false;
            }
            if !self.allowed_scopes.is_empty() && !self.allowed_scopes.iter().any(|scope| principal.scopes.contains(scope)) {
                info!("caller does not hold a required scope");
                return false;
            }
        }
        if let Some(condition) = &self.allowed_condition
            && !condition.build()
        {
            info!("access condition not met");
            return false;
        }
        true
    }
}

fn split_list(value: Option<String>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Outcome of invoking an endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum EndpointOutcome {
    /// Unknown endpoint, or the endpoint does not serve the method.
    NotFound,
    Unauthorized,
    Completed(ActionResult),
}

impl EndpointOutcome {
    /// The HTTP status a host would answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            EndpointOutcome::NotFound => 404,
            EndpointOutcome::Unauthorized => 401,
            EndpointOutcome::Completed(result) if result.success => 200,
            EndpointOutcome::Completed(_) => 400,
        }
    }
}

/// A REST-style endpoint with one action slot per verb.
#[derive(Debug)]
pub struct Controller {
    pub path: Option<String>,
    /// Declared shapes of the query string, request body and response.
    pub query_args: Option<Value>,
    pub body: Option<Value>,
    pub output: Option<Value>,
    pub routes: IndexMap<String, NodeId>,
    pub access: AccessPolicy,
}

impl Endpoint for Controller {
    fn entry_for(&self, method: &str) -> Option<NodeId> {
        self.routes.get(&method.to_ascii_lowercase()).cloned()
    }

    fn access(&self) -> &AccessPolicy {
        &self.access
    }
}

/// A `Query` or `Mutation` graph.
#[derive(Debug)]
pub struct GraphEndpoint {
    pub input: Option<Value>,
    pub output: Option<Value>,
    pub condition: Option<Box<dyn Condition>>,
    pub execute: Option<NodeId>,
    pub access: AccessPolicy,
}

impl Endpoint for GraphEndpoint {
    fn entry_for(&self, _method: &str) -> Option<NodeId> {
        self.execute.clone()
    }

    fn access(&self) -> &AccessPolicy {
        &self.access
    }

    fn precondition(&self) -> bool {
        self.condition.as_ref().is_none_or(|condition| condition.build())
    }
}

/// Result of matching a request path against a controller path template.
#[derive(Debug, Clone, PartialEq)]
pub struct PathMatch {
    /// Number of literal (non-placeholder) segments that matched.
    pub literal_segments: usize,
    /// Values captured by `{name}` segments.
    pub parameters: Map<String, Value>,
}

fn segments(path: &str) -> Vec<&str> {
    path.trim().trim_matches('/').split('/').collect()
}

/// Matches `request_path` against `template` segment by segment.
///
/// Both must have the same number of segments; `{name}` segments match
/// anything and capture it, other segments must be equal.
pub fn match_path(template: &str, request_path: &str) -> Option<PathMatch> {
    let expected = segments(template);
    let actual = segments(request_path.split('?').next().unwrap_or_default());
    if expected.len() != actual.len() {
        return None;
    }
    let mut matched = PathMatch {
        literal_segments: 0,
        parameters: Map::new(),
    };
    for (pattern, segment) in expected.iter().zip(&actual) {
        if let Some(name) = pattern.strip_prefix('{').and_then(|rest| rest.strip_suffix('}')) {
            matched.parameters.insert(name.to_string(), Value::String(segment.to_string()));
        } else if pattern == segment {
            matched.literal_segments += 1;
        } else {
            return None;
        }
    }
    Some(matched)
}

pub(crate) fn endpoint_info() -> TypeInfo {
    TypeInfo::new("Endpoint", "nodeflow::Endpoint").abstract_type().with_fields([
        FieldDescriptor::new("allowAnonymous", FieldKind::Bool).with_default(false),
        FieldDescriptor::new("allowedRoles", FieldKind::Text),
        FieldDescriptor::new("allowedScopes", FieldKind::Text),
        FieldDescriptor::new("allowedCondition", FieldKind::capability("Condition")),
    ])
}

pub(crate) fn controller_info() -> TypeInfo {
    let verbs = CONTROLLER_VERBS
        .iter()
        .map(|verb| FieldDescriptor::new(*verb, FieldKind::ChildAction));
    TypeInfo::new("Controller", "nodeflow::Controller")
        .with_fields([
            FieldDescriptor::new("path", FieldKind::Text),
            FieldDescriptor::new("queryArgs", FieldKind::Json),
            FieldDescriptor::new("body", FieldKind::Json),
            FieldDescriptor::new("output", FieldKind::Json),
        ])
        .with_fields(verbs)
        .extends(&endpoint_info())
}

pub(crate) fn build_controller(mut fields: Fields) -> anyhow::Result<Box<dyn Endpoint>> {
    let mut routes = IndexMap::new();
    for verb in CONTROLLER_VERBS {
        if let Some(entry) = fields.take_action(verb) {
            routes.insert(verb.to_string(), entry);
        }
    }
    Ok(Box::new(Controller {
        path: fields.text("path"),
        query_args: fields.json("queryArgs"),
        body: fields.json("body"),
        output: fields.json("output"),
        routes,
        access: AccessPolicy::from_fields(&mut fields),
    }))
}

pub(crate) fn graph_info() -> TypeInfo {
    TypeInfo::new("Graph", "nodeflow::Graph")
        .abstract_type()
        .with_fields([
            FieldDescriptor::new("input", FieldKind::Json),
            FieldDescriptor::new("output", FieldKind::Json),
            FieldDescriptor::new("condition", FieldKind::capability("Condition")),
            FieldDescriptor::new("execute", FieldKind::ChildAction),
        ])
        .extends(&endpoint_info())
}

pub(crate) fn query_info() -> TypeInfo {
    TypeInfo::new("Query", "nodeflow::Query").extends(&graph_info())
}

pub(crate) fn mutation_info() -> TypeInfo {
    TypeInfo::new("Mutation", "nodeflow::Mutation").extends(&graph_info())
}

pub(crate) fn build_graph(mut fields: Fields) -> anyhow::Result<Box<dyn Endpoint>> {
    Ok(Box::new(GraphEndpoint {
        input: fields.json("input"),
        output: fields.json("output"),
        condition: fields.take_property::<Box<dyn Condition>>("condition"),
        execute: fields.take_action("execute"),
        access: AccessPolicy::from_fields(&mut fields),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{ConditionLinks, NullOrEmpty};
    use serde_json::json;

    #[test]
    fn test_claims_split_into_roles_and_scopes() {
        let principal = Principal::from_claims([("sub", "42"), ("role", "admin"), ("role", "editor"), ("scope", "posts")]);
        assert!(principal.authenticated);
        assert_eq!(principal.roles, vec!["admin", "editor"]);
        assert_eq!(principal.scopes, vec!["posts"]);
        assert_eq!(principal.claims["role"], json!("admin,editor"));

        let mut context = EvaluationContext::new();
        principal.bind(&mut context);
        assert_eq!(context.value("roles"), Some(&json!(["admin", "editor"])));
    }

    #[test]
    fn test_policy_requires_authentication_roles_and_scopes() {
        let policy = AccessPolicy {
            allowed_roles: split_list(Some("admin, editor".into())),
            allowed_scopes: split_list(Some("posts".into())),
            ..AccessPolicy::default()
        };
        assert!(!policy.permits(&Principal::anonymous()));
        assert!(!policy.permits(&Principal::from_claims([("role", "viewer"), ("scope", "posts")])));
        assert!(!policy.permits(&Principal::from_claims([("role", "editor")])));
        assert!(policy.permits(&Principal::from_claims([("role", "editor"), ("scope", "posts")])));
    }

    #[test]
    fn test_condition_applies_even_to_anonymous_endpoints() {
        let condition: Box<dyn Condition> = Box::new(NullOrEmpty {
            value: json!("token"),
            negate: false,
            links: ConditionLinks::default(),
        });
        let policy = AccessPolicy {
            allow_anonymous: true,
            allowed_condition: Some(condition),
            ..AccessPolicy::default()
        };
        assert!(!policy.permits(&Principal::anonymous()));
    }

    #[test]
    fn test_match_path_captures_parameters() {
        let matched = match_path("/posts/{id}/comments", "posts/7/comments?page=2").expect("match");
        assert_eq!(matched.literal_segments, 2);
        assert_eq!(matched.parameters["id"], json!("7"));
        assert!(match_path("posts/{id}", "posts/7/comments").is_none());
        assert!(match_path("posts/{id}", "users/7").is_none());
    }

    #[test]
    fn test_outcome_status_codes() {
        assert_eq!(EndpointOutcome::NotFound.status_code(), 404);
        assert_eq!(EndpointOutcome::Unauthorized.status_code(), 401);
        assert_eq!(EndpointOutcome::Completed(ActionResult::done()).status_code(), 200);
        assert_eq!(EndpointOutcome::Completed(ActionResult::failure()).status_code(), 400);
    }
}
