//! # Nodeflow Engine
//!
//! Interprets declarative nodeflow models: graphs of typed action nodes whose
//! properties are `${...}` templates resolved against a per-invocation
//! context.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use nodeflow_engine::{Engine, EvaluationContext, TypeRegistry};
//! use nodeflow_types::Model;
//! use serde_json::json;
//!
//! let model = Model::from_value(&json!({
//!     "actions": [{
//!         "_id": "greet",
//!         "_type": "JsonAction",
//!         "properties": { "json": "Hello ${query.name}", "returnName": "greeting" }
//!     }]
//! }))?;
//! let engine = Engine::new(Arc::new(TypeRegistry::with_builtins()), Arc::new(model));
//!
//! let mut context = EvaluationContext::new();
//! context.insert("query", json!({ "name": "Ada" }));
//! let result = engine.run("greet", &mut context);
//! assert!(result.success);
//! assert_eq!(result.return_data, Some(json!("Hello Ada")));
//! assert_eq!(context.state().and_then(|state| state.get("greeting")), Some(&json!("Hello Ada")));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - **`context`** / **`template`**: the evaluation context and the template
//!   evaluator.
//! - **`registry`**: type catalog, field descriptors, property population.
//! - **`actions`**: built-in actions (data, flow control, HTTP).
//! - **`condition`**, **`query`**, **`entity`**, **`request`**: property types.
//! - **`store`**: the persistence seam and the in-memory store.
//! - **`endpoint`** / **`engine`**: endpoints, access policies and the run loop.

pub mod actions;
pub mod condition;
pub mod context;
pub mod endpoint;
pub mod engine;
pub mod entity;
pub mod query;
pub mod registry;
pub mod request;
pub mod store;
pub mod template;

pub use actions::{Action, ActionScope, StackSlots};
pub use condition::{Condition, Operator};
pub use context::{AttributeSource, ContextValue, EvaluationContext, HostFunction};
pub use endpoint::{AccessPolicy, Endpoint, EndpointOutcome, Principal};
pub use engine::{Engine, Route};
pub use query::{CompiledQuery, FilterRule, FilterType, OrderRule, RuleSet, SortDirection};
pub use registry::{
    FieldDescriptor, FieldKind, Fields, Instance, PopulateError, RegistryError, TypeGroup, TypeInfo, TypeRegistry,
    TypeRegistryBuilder,
};
pub use store::{Collection, EntityProvider, EntitySpec, MemoryStore, Record, RecordSchema, StoreError, StoreSession};
pub use template::{evaluate_properties, evaluate_template, evaluate_value};
