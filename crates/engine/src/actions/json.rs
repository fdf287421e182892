//! `JsonAction`: returns its evaluated `json` property.

use serde_json::Value;

use nodeflow_types::ActionResult;

use super::{Action, ActionScope, StackSlots, stack_action_info};
use crate::registry::{FieldDescriptor, FieldKind, Fields, TypeInfo};

#[derive(Debug)]
pub struct JsonAction {
    pub json: Value,
    pub slots: StackSlots,
}

impl Action for JsonAction {
    fn execute(&mut self, _scope: &mut ActionScope<'_>) -> anyhow::Result<ActionResult> {
        Ok(ActionResult::success(self.json.take()))
    }

    fn stack(&self) -> Option<&StackSlots> {
        Some(&self.slots)
    }
}

pub(crate) fn json_action_info() -> TypeInfo {
    TypeInfo::new("JsonAction", "nodeflow::JsonAction")
        .with_field(FieldDescriptor::new("json", FieldKind::Json))
        .extends(&stack_action_info())
}

pub(crate) fn build_json_action(mut fields: Fields) -> anyhow::Result<Box<dyn Action>> {
    Ok(Box::new(JsonAction {
        json: fields.json("json").unwrap_or(Value::Null),
        slots: StackSlots::from_fields(&mut fields),
    }))
}
