//! Control-flow actions: `If`, `SwitchCase` and `Foreach`.
//!
//! None of these write to the shared state. `If` and `SwitchCase` route to
//! one of their child slots; `Foreach` runs its `do` chain once per element
//! and then ends its own chain.

use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

use nodeflow_types::{ActionResult, NodeId};

use super::{Action, ActionScope};
use crate::{
    condition::Condition,
    registry::{FieldDescriptor, FieldKind, Fields, TypeInfo},
};

/// Default loop binding of `Foreach`.
pub const DEFAULT_ENTRY_NAME: &str = "entry";

#[derive(Debug)]
pub struct If {
    pub condition: Option<Box<dyn Condition>>,
    pub on_true: Option<NodeId>,
    pub on_false: Option<NodeId>,
}

impl Action for If {
    fn execute(&mut self, scope: &mut ActionScope<'_>) -> anyhow::Result<ActionResult> {
        // A missing condition counts as false.
        let passed = self.condition.as_ref().is_some_and(|condition| condition.build());
        debug!(node_id = scope.node_id, passed, "branch evaluated");
        let next = if passed { self.on_true.take() } else { self.on_false.take() };
        Ok(ActionResult::route(next))
    }
}

pub(crate) fn if_info() -> TypeInfo {
    TypeInfo::new("If", "nodeflow::If").with_fields([
        FieldDescriptor::new("condition", FieldKind::capability("Condition")),
        FieldDescriptor::new("onTrue", FieldKind::ChildAction),
        FieldDescriptor::new("onFalse", FieldKind::ChildAction),
    ])
}

pub(crate) fn build_if(mut fields: Fields) -> anyhow::Result<Box<dyn Action>> {
    Ok(Box::new(If {
        condition: fields.take_property::<Box<dyn Condition>>("condition"),
        on_true: fields.take_action("onTrue"),
        on_false: fields.take_action("onFalse"),
    }))
}

/// Routes to the case whose key equals `inputValue`, else to `default`.
#[derive(Debug)]
pub struct SwitchCase {
    pub input_value: Option<String>,
    pub conditions: IndexMap<String, NodeId>,
    pub default: Option<NodeId>,
}

impl Action for SwitchCase {
    fn execute(&mut self, scope: &mut ActionScope<'_>) -> anyhow::Result<ActionResult> {
        let matched = self
            .input_value
            .as_ref()
            .and_then(|input| self.conditions.shift_remove(input));
        match matched.or_else(|| self.default.take()) {
            Some(next) => {
                debug!(node_id = scope.node_id, next = %next, "switch case selected");
                Ok(ActionResult::route(Some(next)))
            }
            None => Ok(ActionResult::failure_with(format!(
                "no case matches '{}' and no default is set",
                self.input_value.as_deref().unwrap_or_default()
            ))),
        }
    }
}

pub(crate) fn switch_case_info() -> TypeInfo {
    TypeInfo::new("SwitchCase", "nodeflow::SwitchCase").with_fields([
        FieldDescriptor::new("inputValue", FieldKind::Text),
        FieldDescriptor::new("conditions", FieldKind::ActionMap),
        FieldDescriptor::new("default", FieldKind::ChildAction),
    ])
}

pub(crate) fn build_switch_case(mut fields: Fields) -> anyhow::Result<Box<dyn Action>> {
    Ok(Box::new(SwitchCase {
        input_value: fields.text("inputValue"),
        conditions: fields.take_actions("conditions"),
        default: fields.take_action("default"),
    }))
}

/// Runs `do` once per element of `list`, bound under `entryName`.
///
/// The loop stops at the first failing iteration and returns its result. The
/// binding is removed only after the loop completes.
#[derive(Debug)]
pub struct Foreach {
    pub list: Vec<Value>,
    pub entry_name: String,
    pub body: Option<NodeId>,
}

impl Action for Foreach {
    fn execute(&mut self, scope: &mut ActionScope<'_>) -> anyhow::Result<ActionResult> {
        let Some(body) = self.body.take() else {
            return Ok(ActionResult::failure_with("Foreach has no 'do' action"));
        };
        for (index, entry) in std::mem::take(&mut self.list).into_iter().enumerate() {
            scope.context.insert(self.entry_name.clone(), entry);
            let result = scope.run_chain(&body);
            if !result.success {
                debug!(node_id = scope.node_id, index, "iteration failed; stopping loop");
                return Ok(result);
            }
        }
        scope.context.remove(&self.entry_name);
        Ok(ActionResult::done())
    }
}

pub(crate) fn foreach_info() -> TypeInfo {
    TypeInfo::new("Foreach", "nodeflow::Foreach").with_fields([
        FieldDescriptor::new("list", FieldKind::list(FieldKind::Json)),
        FieldDescriptor::new("entryName", FieldKind::Text).with_default(DEFAULT_ENTRY_NAME),
        FieldDescriptor::new("do", FieldKind::ChildAction),
    ])
}

pub(crate) fn build_foreach(mut fields: Fields) -> anyhow::Result<Box<dyn Action>> {
    Ok(Box::new(Foreach {
        list: fields.list("list"),
        entry_name: fields
            .text("entryName")
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_ENTRY_NAME.to_string()),
        body: fields.take_action("do"),
    }))
}
