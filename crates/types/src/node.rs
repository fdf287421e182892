//! Model nodes.
//!
//! A node is the unit of a model document: a type name that selects a
//! registered capability, a bag of raw properties (which may contain `${...}`
//! templates), and named action slots pointing at other nodes by id.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identifier of a node inside a [`crate::Model`] arena.
pub type NodeId = String;

/// A single node of the model arena.
///
/// Action slots reference other nodes by id rather than by ownership, so a
/// model may contain back-edges and cycles (a retry loop is just an action
/// whose `nextAction` points at an earlier node).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique identifier inside the arena.
    pub id: NodeId,
    /// Registered type name used to resolve the node's capability.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Optional folder used for organising nodes in an editor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    /// Raw property values. Strings may contain templates.
    #[serde(default)]
    pub properties: Map<String, Value>,
    /// Named action slots mapped to node ids.
    #[serde(default)]
    pub actions: IndexMap<String, NodeId>,
}

impl Node {
    /// Creates a node with the given id and type and no properties.
    pub fn new(id: impl Into<NodeId>, type_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            type_name: type_name.into(),
            ..Self::default()
        }
    }

    /// Builder-style helper that sets a property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Builder-style helper that sets an action slot.
    pub fn with_action(mut self, slot: impl Into<String>, target: impl Into<NodeId>) -> Self {
        self.actions.insert(slot.into(), target.into());
        self
    }

    /// Returns a copy of this node whose properties are replaced by `properties`.
    ///
    /// The interpreter uses this to hand a freshly evaluated working copy to the
    /// registry without touching the node stored in the arena.
    pub fn with_resolved_properties(&self, properties: Map<String, Value>) -> Self {
        Self {
            id: self.id.clone(),
            type_name: self.type_name.clone(),
            name: self.name.clone(),
            folder: self.folder.clone(),
            properties,
            actions: self.actions.clone(),
        }
    }
}
