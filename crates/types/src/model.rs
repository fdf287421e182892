//! Model documents and the node arena.
//!
//! A model document is a JSON object with the sections `controllers`,
//! `graphs`, `actions`, `types`, `folders` and `environmentData`. Each node
//! section may be written either as a list of nodes or as a map keyed by id.
//!
//! Nodes may embed child nodes inline under their `actions` map. Loading
//! flattens every inline child into the arena under a generated id of the
//! form `<parent id>/<slot>` and replaces the embedded object by that id, so
//! the interpreter only ever walks ids. A string slot value is taken as a
//! reference to a node declared elsewhere.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{Node, NodeId};

/// Errors raised while loading a model document.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model document must be a JSON object")]
    NotAnObject,
    #[error("section '{0}' must be a list or a map of nodes")]
    InvalidSection(String),
    #[error("node in section '{section}' has no '_id' and no key to derive one from")]
    MissingId { section: String },
    #[error("node '{id}' is invalid: {reason}")]
    InvalidNode { id: String, reason: String },
    #[error("invalid environmentData: {0}")]
    InvalidEnvironmentData(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Node sections of a model document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Controllers,
    Graphs,
    Actions,
    Types,
    Folders,
}

impl Section {
    pub const ALL: [Section; 5] = [
        Section::Controllers,
        Section::Graphs,
        Section::Actions,
        Section::Types,
        Section::Folders,
    ];

    /// Key of this section inside a model document.
    pub fn key(self) -> &'static str {
        match self {
            Section::Controllers => "controllers",
            Section::Graphs => "graphs",
            Section::Actions => "actions",
            Section::Types => "types",
            Section::Folders => "folders",
        }
    }
}

/// Per-environment variable table.
///
/// Stored as written in the document: `values[key_index][environment_index]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvironmentTable {
    environments: Vec<String>,
    keys: Vec<String>,
    values: Vec<Vec<Value>>,
}

impl EnvironmentTable {
    /// Parses the `environmentData` section.
    pub fn from_value(value: &Value) -> Result<Self, ModelError> {
        let Value::Object(object) = value else {
            return Err(ModelError::InvalidEnvironmentData("expected an object".into()));
        };
        let environments = string_list(object.get("environments"), "environments")?;
        let keys = string_list(object.get("keys"), "keys")?;
        let values = match object.get("values") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(rows)) => rows
                .iter()
                .map(|row| match row {
                    Value::Array(cells) => Ok(cells.clone()),
                    _ => Err(ModelError::InvalidEnvironmentData("each values row must be a list".into())),
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err(ModelError::InvalidEnvironmentData("values must be a list".into())),
        };
        Ok(Self {
            environments,
            keys,
            values,
        })
    }

    /// Known environment names, in declaration order.
    pub fn environments(&self) -> &[String] {
        &self.environments
    }

    pub fn contains(&self, environment: &str) -> bool {
        self.environments.iter().any(|name| name == environment)
    }

    /// Variables of `environment` as a JSON map.
    ///
    /// Unknown environments and missing cells yield an empty map or a null
    /// value respectively.
    pub fn variables(&self, environment: &str) -> Map<String, Value> {
        let mut variables = Map::new();
        let Some(column) = self.environments.iter().position(|name| name == environment) else {
            return variables;
        };
        for (row, key) in self.keys.iter().enumerate() {
            let value = self
                .values
                .get(row)
                .and_then(|cells| cells.get(column))
                .cloned()
                .unwrap_or(Value::Null);
            variables.insert(key.clone(), value);
        }
        variables
    }
}

fn string_list(value: Option<&Value>, field: &str) -> Result<Vec<String>, ModelError> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| ModelError::InvalidEnvironmentData(format!("{field} must contain strings")))
            })
            .collect(),
        Some(_) => Err(ModelError::InvalidEnvironmentData(format!("{field} must be a list"))),
    }
}

/// A loaded model: the node arena, section membership and environments.
///
/// A model is read-only once handed to an engine; reloading means building a
/// new one.
#[derive(Debug, Clone, Default)]
pub struct Model {
    nodes: IndexMap<NodeId, Node>,
    sections: HashMap<Section, Vec<NodeId>>,
    environment: EnvironmentTable,
    active_environment: String,
}

impl Model {
    pub const DEFAULT_ENVIRONMENT: &'static str = "Prod";

    /// Creates an empty model using the default environment.
    pub fn new() -> Self {
        Self {
            active_environment: Self::DEFAULT_ENVIRONMENT.to_string(),
            ..Self::default()
        }
    }

    /// Parses a model document from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, ModelError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(&value)
    }

    /// Builds a model from a parsed document.
    ///
    /// # Errors
    ///
    /// Returns a [`ModelError`] when the document is not an object, a section
    /// has the wrong shape, a node lacks an id, or an action slot holds
    /// something other than an id or an inline node.
    pub fn from_value(document: &Value) -> Result<Self, ModelError> {
        let Value::Object(root) = document else {
            return Err(ModelError::NotAnObject);
        };
        let mut model = Self::new();
        for section in Section::ALL {
            match root.get(section.key()) {
                None | Some(Value::Null) => {}
                Some(Value::Array(entries)) => {
                    for entry in entries {
                        let id = load_node(entry, None, section.key(), &mut model.nodes)?;
                        model.sections.entry(section).or_default().push(id);
                    }
                }
                Some(Value::Object(entries)) => {
                    for (key, entry) in entries {
                        let id = load_node(entry, Some(key), section.key(), &mut model.nodes)?;
                        model.sections.entry(section).or_default().push(id);
                    }
                }
                Some(_) => return Err(ModelError::InvalidSection(section.key().to_string())),
            }
        }
        if let Some(environment) = root.get("environmentData").filter(|value| !value.is_null()) {
            model.environment = EnvironmentTable::from_value(environment)?;
        }
        Ok(model)
    }

    /// Adds an already-built node to `section`, replacing any node with the same id.
    pub fn insert(&mut self, section: Section, node: Node) {
        let id = node.id.clone();
        self.nodes.insert(id.clone(), node);
        let members = self.sections.entry(section).or_default();
        if !members.contains(&id) {
            members.push(id);
        }
    }

    /// Any node of the arena, inline children included.
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn controller(&self, id: &str) -> Option<&Node> {
        self.section_node(Section::Controllers, id)
    }

    pub fn graph(&self, id: &str) -> Option<&Node> {
        self.section_node(Section::Graphs, id)
    }

    /// Looks up an action node. Inline children are actions as well, so this
    /// falls back to the whole arena.
    pub fn action(&self, id: &str) -> Option<&Node> {
        self.section_node(Section::Actions, id).or_else(|| self.node(id))
    }

    pub fn type_node(&self, id: &str) -> Option<&Node> {
        self.section_node(Section::Types, id)
    }

    pub fn folder(&self, id: &str) -> Option<&Node> {
        self.section_node(Section::Folders, id)
    }

    /// Nodes declared at the top level of `section`, in document order.
    pub fn section(&self, section: Section) -> impl Iterator<Item = &Node> {
        self.sections
            .get(&section)
            .into_iter()
            .flatten()
            .filter_map(|id| self.nodes.get(id))
    }

    /// Every node of the arena.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn environments(&self) -> &EnvironmentTable {
        &self.environment
    }

    pub fn active_environment(&self) -> &str {
        &self.active_environment
    }

    /// Switches the active environment.
    ///
    /// Unknown names are ignored and reported through the return value.
    pub fn set_environment(&mut self, name: &str) -> bool {
        if !self.environment.contains(name) {
            return false;
        }
        self.active_environment = name.to_string();
        true
    }

    /// Variables of the active environment, exposed to templates as `env`.
    pub fn environment_variables(&self) -> Map<String, Value> {
        self.environment.variables(&self.active_environment)
    }

    fn section_node(&self, section: Section, id: &str) -> Option<&Node> {
        let members = self.sections.get(&section)?;
        if !members.iter().any(|member| member == id) {
            return None;
        }
        self.nodes.get(id)
    }
}

fn load_node(value: &Value, fallback_id: Option<&str>, section: &str, arena: &mut IndexMap<NodeId, Node>) -> Result<NodeId, ModelError> {
    let Value::Object(object) = value else {
        return Err(ModelError::InvalidNode {
            id: fallback_id.unwrap_or("<unknown>").to_string(),
            reason: "node must be an object".into(),
        });
    };
    let field = |primary: &str, alias: &str| object.get(primary).or_else(|| object.get(alias));
    let id = match field("_id", "id").and_then(Value::as_str) {
        Some(id) => id.to_string(),
        None => fallback_id
            .map(str::to_string)
            .ok_or_else(|| ModelError::MissingId { section: section.to_string() })?,
    };
    let invalid = |reason: &str| ModelError::InvalidNode {
        id: id.clone(),
        reason: reason.to_string(),
    };

    let type_name = match field("_type", "type") {
        Some(Value::String(type_name)) => type_name.clone(),
        None | Some(Value::Null) => String::new(),
        Some(_) => return Err(invalid("'_type' must be a string")),
    };
    let properties = match object.get("properties") {
        Some(Value::Object(properties)) => properties.clone(),
        None | Some(Value::Null) => Map::new(),
        Some(_) => return Err(invalid("'properties' must be an object")),
    };

    let mut actions = IndexMap::new();
    match object.get("actions") {
        None | Some(Value::Null) => {}
        Some(Value::Object(slots)) => {
            for (slot, target) in slots {
                match target {
                    Value::Null => {}
                    Value::String(reference) => {
                        actions.insert(slot.clone(), reference.clone());
                    }
                    Value::Object(_) => {
                        let generated = format!("{id}/{slot}");
                        let child_id = load_node(target, Some(&generated), section, arena)?;
                        actions.insert(slot.clone(), child_id);
                    }
                    _ => return Err(invalid(&format!("action slot '{slot}' must be a node id or an inline node"))),
                }
            }
        }
        Some(_) => return Err(invalid("'actions' must be an object")),
    }

    let node = Node {
        id: id.clone(),
        type_name,
        name: object.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
        folder: field("_folder", "folder").and_then(Value::as_str).map(str::to_string),
        properties,
        actions,
    };
    arena.insert(id.clone(), node);
    Ok(id)
}
