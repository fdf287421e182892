//! # Actions
//!
//! Executable node types. Every action is built from a node's populated
//! fields by a factory registered in the [`TypeRegistry`](crate::registry::TypeRegistry)
//! and executed once by the [`Engine`](crate::Engine) run loop.
//!
//! Actions come in two flavours:
//!
//! - **Stack actions** produce a value. The engine stores it in the shared
//!   state under the action's `returnName` and, unless the action chose a
//!   successor itself, continues with its `nextAction` slot. They expose
//!   their [`StackSlots`] through [`Action::stack`].
//! - **Control-flow actions** (`If`, `SwitchCase`, `Foreach`) choose their
//!   successor directly and never write to the state.

pub mod data;
pub mod flow;
pub mod json;
pub mod rest;

use nodeflow_types::{ActionResult, NodeId};

use crate::{
    context::EvaluationContext,
    engine::Engine,
    registry::{FieldDescriptor, FieldKind, Fields, TypeInfo},
};

/// Default key a stack action's result is stored under.
pub const DEFAULT_RETURN_NAME: &str = "value";

/// An executable action instance.
pub trait Action: Send {
    /// Runs the action once.
    ///
    /// An `Err` is converted into a failed [`ActionResult`] carrying the
    /// error message by the engine; it never escapes the run loop.
    fn execute(&mut self, scope: &mut ActionScope<'_>) -> anyhow::Result<ActionResult>;

    /// The stack slots of a stack action; `None` for control-flow actions.
    fn stack(&self) -> Option<&StackSlots> {
        None
    }
}

/// What an action may touch while it executes.
pub struct ActionScope<'a> {
    pub engine: &'a Engine,
    pub context: &'a mut EvaluationContext,
    /// Id of the node being executed.
    pub node_id: &'a str,
}

impl<'a> ActionScope<'a> {
    pub fn new(engine: &'a Engine, context: &'a mut EvaluationContext, node_id: &'a str) -> Self {
        Self { engine, context, node_id }
    }

    /// Runs the chain starting at `entry` against this scope's context.
    pub fn run_chain(&mut self, entry: &str) -> ActionResult {
        self.engine.run(entry, self.context)
    }
}

/// `returnName` and `nextAction` of a stack action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackSlots {
    pub return_name: String,
    pub next_action: Option<NodeId>,
}

impl Default for StackSlots {
    fn default() -> Self {
        Self {
            return_name: DEFAULT_RETURN_NAME.to_string(),
            next_action: None,
        }
    }
}

impl StackSlots {
    pub fn from_fields(fields: &mut Fields) -> Self {
        Self {
            return_name: fields
                .text("returnName")
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| DEFAULT_RETURN_NAME.to_string()),
            next_action: fields.take_action("nextAction"),
        }
    }
}

/// Abstract base of every stack action.
pub(crate) fn stack_action_info() -> TypeInfo {
    TypeInfo::new("StackAction", "nodeflow::StackAction")
        .abstract_type()
        .with_field(FieldDescriptor::new("returnName", FieldKind::Text).with_default(DEFAULT_RETURN_NAME))
        .with_field(FieldDescriptor::new("nextAction", FieldKind::ChildAction))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FieldValue;
    use serde_json::json;

    #[test]
    fn test_stack_slots_default_return_name() {
        let mut fields = Fields::new("n1");
        fields.insert("returnName", FieldValue::Scalar(json!("")));
        let slots = StackSlots::from_fields(&mut fields);
        assert_eq!(slots, StackSlots::default());
    }

    #[test]
    fn test_stack_slots_take_next_action() {
        let mut fields = Fields::new("n1");
        fields.insert("returnName", FieldValue::Scalar(json!("user")));
        fields.insert("nextAction", FieldValue::Action("n2".into()));
        let slots = StackSlots::from_fields(&mut fields);
        assert_eq!(slots.return_name, "user");
        assert_eq!(slots.next_action.as_deref(), Some("n2"));
    }
}
