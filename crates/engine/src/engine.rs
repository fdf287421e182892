//! # Engine
//!
//! The interpreter. [`Engine::run`] walks a chain of action nodes by id:
//!
//! 1. evaluate the node's properties against the context (a working copy;
//!    the model is never touched),
//! 2. instantiate the node's action type from the evaluated copy,
//! 3. execute it,
//! 4. for stack actions, store the returned data under `state[returnName]`
//!    and fall back to the declared `nextAction`,
//! 5. stop at the first failure, otherwise continue with the successor.
//!
//! An engine is cheap to clone and shared by concurrent invocations; all
//! per-invocation data lives in the caller's [`EvaluationContext`].

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use nodeflow_types::{ActionResult, Model, Section};
use nodeflow_util::http::HttpClientPool;

use crate::{
    actions::ActionScope,
    context::EvaluationContext,
    endpoint::{CONTROLLER_VERBS, EndpointOutcome, Principal, match_path},
    registry::TypeRegistry,
    template::evaluate_properties,
};

/// A controller selected for a request path.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub controller_id: String,
    /// Values captured by the controller path's `{name}` segments.
    pub path_parameters: serde_json::Map<String, Value>,
}

/// Runs action chains and endpoints of one model.
#[derive(Debug, Clone)]
pub struct Engine {
    registry: Arc<TypeRegistry>,
    model: Arc<Model>,
    http: Arc<HttpClientPool>,
}

impl Engine {
    pub fn new(registry: Arc<TypeRegistry>, model: Arc<Model>) -> Self {
        Self {
            registry,
            model,
            http: Arc::new(HttpClientPool::default()),
        }
    }

    /// Shares `pool` for outbound requests instead of a private pool.
    pub fn with_http_pool(mut self, pool: Arc<HttpClientPool>) -> Self {
        self.http = pool;
        self
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn http_pool(&self) -> &HttpClientPool {
        &self.http
    }

    /// Runs the chain starting at action node `entry`.
    ///
    /// Binds `env` (unless already bound) and an empty `state` (unless
    /// already bound) first. Returns the first failing result, or the result
    /// of the last action when the chain ends.
    pub fn run(&self, entry: &str, context: &mut EvaluationContext) -> ActionResult {
        context.ensure_environment(self.model.environment_variables());
        context.state_mut();

        let mut current = Some(entry.to_string());
        let mut last = None;
        while let Some(node_id) = current.take() {
            let result = self.execute_node(&node_id, context);
            if !result.success {
                debug!(node_id = %node_id, "chain stopped by failed action");
                return result;
            }
            current = result.next_node.clone();
            last = Some(result);
        }
        last.unwrap_or_else(ActionResult::failure)
    }

    fn execute_node(&self, node_id: &str, context: &mut EvaluationContext) -> ActionResult {
        let Some(node) = self.model.action(node_id) else {
            error!(node_id, "action node is not defined in the model");
            return ActionResult::failure_with(format!("action '{node_id}' is not defined"));
        };
        let resolved = node.with_resolved_properties(evaluate_properties(&node.properties, context));
        let mut action = match self.registry.instantiate_action(&resolved, &self.model) {
            Ok(action) => action,
            Err(error) => {
                error!(node_id, action = %node.type_name, %error, "could not instantiate action");
                return ActionResult::failure_with(error.to_string());
            }
        };

        info!(node_id, action = %node.type_name, "executing action");
        let outcome = {
            let mut scope = ActionScope::new(self, context, node_id);
            action.execute(&mut scope)
        };
        let mut result = match outcome {
            Ok(result) => result,
            Err(error) => {
                let message = format!("{error:#}");
                error!(node_id, action = %node.type_name, error = %message, "action failed");
                return ActionResult::failure_with(message);
            }
        };

        if let Some(slots) = action.stack() {
            let data = result.return_data.clone().unwrap_or(Value::Null);
            let state = context.state_mut();
            // Results are copies, so the state map itself cannot be told apart
            // from an equal copy. Any non-empty result equal to the state is
            // taken to be the state and is not nested inside itself.
            let aliases_state = !state.is_empty() && matches!(&data, Value::Object(map) if map == &*state);
            if !aliases_state {
                state.insert(slots.return_name.clone(), data);
            }
            if result.next_node.is_none() {
                result.next_node = slots.next_action.clone();
            }
        }
        if !result.success {
            warn!(node_id, action = %node.type_name, "action reported failure");
        }
        result
    }

    /// Invokes endpoint `endpoint_id` (a controller or a graph) for `method`.
    ///
    /// The principal's claims, roles and scopes are bound into `context`, the
    /// endpoint's properties are evaluated against it, and the endpoint's
    /// entry chain runs if the access policy permits.
    pub fn invoke_endpoint(
        &self,
        endpoint_id: &str,
        method: &str,
        principal: &Principal,
        context: &mut EvaluationContext,
    ) -> EndpointOutcome {
        let Some(node) = self
            .model
            .controller(endpoint_id)
            .or_else(|| self.model.graph(endpoint_id))
        else {
            warn!(endpoint = endpoint_id, "endpoint is not defined in the model");
            return EndpointOutcome::NotFound;
        };
        principal.bind(context);
        context.ensure_environment(self.model.environment_variables());

        let resolved = node.with_resolved_properties(evaluate_properties(&node.properties, context));
        let endpoint = match self.registry.instantiate_endpoint(&resolved, &self.model) {
            Ok(endpoint) => endpoint,
            Err(error) => {
                warn!(endpoint = endpoint_id, %error, "could not instantiate endpoint");
                return EndpointOutcome::NotFound;
            }
        };
        let Some(entry) = endpoint.entry_for(method) else {
            debug!(endpoint = endpoint_id, method, "endpoint does not serve method");
            return EndpointOutcome::NotFound;
        };
        if !endpoint.access().permits(principal) || !endpoint.precondition() {
            return EndpointOutcome::Unauthorized;
        }

        info!(endpoint = endpoint_id, method, name = %node.name, "executing endpoint");
        EndpointOutcome::Completed(self.run(&entry, context))
    }

    /// Picks the controller serving `method` whose path template matches
    /// `request_path` with the most literal segments. Ties keep the first
    /// controller in model order.
    pub fn route(&self, method: &str, request_path: &str) -> Option<Route> {
        let verb = method.to_ascii_lowercase();
        if !CONTROLLER_VERBS.contains(&verb.as_str()) {
            return None;
        }
        let mut best: Option<(usize, Route)> = None;
        for node in self.model.section(Section::Controllers) {
            // Verb slots are populated by exact name, so only lowercase slots serve.
            if !node.actions.contains_key(&verb) {
                continue;
            }
            let Some(template) = node.properties.get("path").and_then(Value::as_str) else {
                continue;
            };
            if template.trim().is_empty() {
                continue;
            }
            let Some(matched) = match_path(template, request_path) else {
                continue;
            };
            if best.as_ref().is_none_or(|(score, _)| matched.literal_segments > *score) {
                best = Some((
                    matched.literal_segments,
                    Route {
                        controller_id: node.id.clone(),
                        path_parameters: matched.parameters,
                    },
                ));
            }
        }
        best.map(|(_, route)| route)
    }

    /// Routes a request to a controller, binds the captured path parameters
    /// as `path`, and invokes it.
    pub fn handle_request(
        &self,
        method: &str,
        request_path: &str,
        principal: &Principal,
        context: &mut EvaluationContext,
    ) -> EndpointOutcome {
        let Some(route) = self.route(method, request_path) else {
            debug!(method, path = request_path, "no controller matches request");
            return EndpointOutcome::NotFound;
        };
        context.insert("path", Value::Object(route.path_parameters));
        self.invoke_endpoint(&route.controller_id, method, principal, context)
    }
}
