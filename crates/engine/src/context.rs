//! # Evaluation Context
//!
//! The mutable key/value environment an invocation runs against. Templates
//! read from it, `Foreach` binds its loop variable into it, and stack actions
//! publish their results under its `state` entry.
//!
//! Entries are one of three kinds:
//!
//! - **Data**: plain JSON, navigated by dotted paths in templates.
//! - **Function**: a host-registered callable invoked as `${name(a,b)}`.
//! - **Object**: a host object whose attributes are read by name.
//!
//! Two entries are reserved: `env` (the active environment's variables) and
//! `state` (the map shared by every action of one invocation).

use std::{fmt, sync::Arc};

use indexmap::IndexMap;
use serde_json::{Map, Value};

/// Key of the shared state map.
pub const STATE_KEY: &str = "state";
/// Key of the environment variable map.
pub const ENV_KEY: &str = "env";

/// A callable exposed to templates.
///
/// Arguments are passed as the raw, untrimmed text between commas.
pub trait HostFunction: Send + Sync {
    fn call(&self, arguments: &[&str]) -> Value;
}

impl<F> HostFunction for F
where
    F: Fn(&[&str]) -> Value + Send + Sync,
{
    fn call(&self, arguments: &[&str]) -> Value {
        self(arguments)
    }
}

/// A host object whose attributes templates may read.
pub trait AttributeSource: Send + Sync {
    /// Value of the attribute `name`, or `None` when it does not exist.
    fn attribute(&self, name: &str) -> Option<Value>;

    /// Value used when a template references the object itself.
    fn snapshot(&self) -> Value {
        Value::Null
    }
}

/// One entry of an [`EvaluationContext`].
#[derive(Clone)]
pub enum ContextValue {
    Data(Value),
    Function(Arc<dyn HostFunction>),
    Object(Arc<dyn AttributeSource>),
}

impl fmt::Debug for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextValue::Data(value) => f.debug_tuple("Data").field(value).finish(),
            ContextValue::Function(_) => f.write_str("Function(..)"),
            ContextValue::Object(_) => f.write_str("Object(..)"),
        }
    }
}

impl From<Value> for ContextValue {
    fn from(value: Value) -> Self {
        ContextValue::Data(value)
    }
}

/// Key/value environment for one invocation.
#[derive(Debug, Clone, Default)]
pub struct EvaluationContext {
    entries: IndexMap<String, ContextValue>,
}

impl EvaluationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a context whose data entries are the members of `map`.
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self {
            entries: map.into_iter().map(|(key, value)| (key, ContextValue::Data(value))).collect(),
        }
    }

    /// Binds a data entry, replacing any previous entry of that name.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), ContextValue::Data(value.into()));
    }

    /// Binds a closure callable from templates as `${name(args)}`.
    pub fn insert_function<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(&[&str]) -> Value + Send + Sync + 'static,
    {
        self.entries.insert(name.into(), ContextValue::Function(Arc::new(function)));
    }

    pub fn insert_host_function(&mut self, name: impl Into<String>, function: Arc<dyn HostFunction>) {
        self.entries.insert(name.into(), ContextValue::Function(function));
    }

    pub fn insert_object(&mut self, name: impl Into<String>, object: Arc<dyn AttributeSource>) {
        self.entries.insert(name.into(), ContextValue::Object(object));
    }

    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.entries.get(key)
    }

    /// Data entry `key`, ignoring functions and objects.
    pub fn value(&self, key: &str) -> Option<&Value> {
        match self.entries.get(key) {
            Some(ContextValue::Data(value)) => Some(value),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<ContextValue> {
        self.entries.shift_remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Copies every entry of `overlay` into this context.
    ///
    /// Entries of `self` not named by `overlay` are preserved.
    pub fn merge(&mut self, overlay: &EvaluationContext) {
        for (key, value) in &overlay.entries {
            self.entries.insert(key.clone(), value.clone());
        }
    }

    /// The shared state map, if one is bound.
    pub fn state(&self) -> Option<&Map<String, Value>> {
        self.value(STATE_KEY).and_then(Value::as_object)
    }

    /// The shared state map, binding an empty one when missing or not a map.
    pub fn state_mut(&mut self) -> &mut Map<String, Value> {
        let entry = self
            .entries
            .entry(STATE_KEY.to_string())
            .or_insert_with(|| ContextValue::Data(Value::Object(Map::new())));
        if !matches!(entry, ContextValue::Data(Value::Object(_))) {
            *entry = ContextValue::Data(Value::Object(Map::new()));
        }
        match entry {
            ContextValue::Data(Value::Object(map)) => map,
            _ => unreachable!("state entry was just normalised to a map"),
        }
    }

    /// Binds `env` unless the caller already supplied one.
    pub fn ensure_environment(&mut self, variables: Map<String, Value>) {
        if !self.entries.contains_key(ENV_KEY) {
            self.insert(ENV_KEY, Value::Object(variables));
        }
    }

    /// Data entries as a JSON map. Functions and objects are skipped.
    pub fn to_json(&self) -> Map<String, Value> {
        self.entries
            .iter()
            .filter_map(|(key, value)| match value {
                ContextValue::Data(data) => Some((key.clone(), data.clone())),
                ContextValue::Object(object) => Some((key.clone(), object.snapshot())),
                ContextValue::Function(_) => None,
            })
            .collect()
    }
}
