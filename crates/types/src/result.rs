//! The outcome of executing one action.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::NodeId;

/// Result returned by every action execution.
///
/// `success == false` halts the chain the action belongs to. `next_node`
/// selects the node to run next; `None` ends the chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_node: Option<NodeId>,
}

impl ActionResult {
    /// A successful result carrying `data`.
    pub fn success(data: Value) -> Self {
        Self {
            success: true,
            return_data: Some(data),
            next_node: None,
        }
    }

    /// A successful result with no data and no explicit successor.
    pub fn done() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    /// A successful result that routes to `next` (or ends the chain on `None`).
    pub fn route(next: Option<NodeId>) -> Self {
        Self {
            success: true,
            return_data: None,
            next_node: next,
        }
    }

    /// A failed result with no payload.
    pub fn failure() -> Self {
        Self::default()
    }

    /// A failed result carrying a diagnostic message as its return data.
    pub fn failure_with(message: impl Into<String>) -> Self {
        Self {
            success: false,
            return_data: Some(Value::String(message.into())),
            next_node: None,
        }
    }

    /// Replaces the successor node.
    pub fn with_next(mut self, next: Option<NodeId>) -> Self {
        self.next_node = next;
        self
    }
}
