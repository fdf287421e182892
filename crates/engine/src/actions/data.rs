//! Persistence actions over registered entities.
//!
//! Each execution opens one [`StoreSession`](crate::store::StoreSession) on
//! the entity's provider, works on the entity's collection, and commits when
//! it changed something. Store errors surface as errors and are turned into a
//! failed result by the engine; "no matching record" is a plain failure.

use anyhow::ensure;
use serde_json::Value;
use tracing::debug;

use nodeflow_types::ActionResult;

use super::{Action, ActionScope, StackSlots, stack_action_info};
use crate::{
    entity::{EntityBinding, EntitySelect},
    query::{CompiledQuery, FilterRule, FilterType, RuleSet, compile::compile_filters},
    registry::{FieldDescriptor, FieldKind, Fields, TypeInfo},
    store::{Collection, Record},
};

fn no_entity() -> ActionResult {
    ActionResult::failure_with("no entity is selected")
}

fn not_found(entity: &str) -> ActionResult {
    ActionResult::failure_with(format!("no matching record in '{entity}'"))
}

/// How single-record actions find their record: by primary key when
/// `idValue` is set, otherwise through `rules`.
#[derive(Debug, Clone, Default)]
pub struct RecordLookup {
    pub id_value: Option<String>,
    pub rules: Option<RuleSet>,
}

impl RecordLookup {
    fn from_fields(fields: &mut Fields) -> Self {
        Self {
            id_value: fields.text("idValue").filter(|id| !id.is_empty()),
            rules: fields.take_property::<RuleSet>("rules"),
        }
    }

    /// `None` when neither an id nor rules are set.
    fn query(&self, collection: &dyn Collection) -> anyhow::Result<Option<CompiledQuery>> {
        let schema = collection.schema();
        if let Some(id) = &self.id_value {
            ensure!(
                schema.primary_key_field().is_some(),
                "record type '{}' does not declare its primary key '{}'",
                schema.name,
                schema.primary_key
            );
            let rule = FilterRule::new(schema.primary_key.clone(), FilterType::Equal, id.clone());
            return Ok(Some(CompiledQuery::from_filters(&[rule], schema)));
        }
        Ok(self.rules.as_ref().map(|rules| CompiledQuery::compile(rules, schema)))
    }

    fn find(&self, collection: &dyn Collection) -> anyhow::Result<Option<Record>> {
        let Some(query) = self.query(collection)? else {
            return Ok(None);
        };
        Ok(collection.query(&query)?.into_iter().next())
    }
}

fn lookup_fields() -> [FieldDescriptor; 2] {
    [
        FieldDescriptor::new("idValue", FieldKind::Text),
        FieldDescriptor::new("rules", FieldKind::capability("RuleSet")),
    ]
}

/// Adds the record materialized from `entity`.
#[derive(Debug)]
pub struct Create {
    pub entity: Option<EntityBinding>,
    pub slots: StackSlots,
}

impl Action for Create {
    fn execute(&mut self, scope: &mut ActionScope<'_>) -> anyhow::Result<ActionResult> {
        let Some(binding) = &self.entity else {
            return Ok(no_entity());
        };
        let mut session = binding.spec.open_session()?;
        let stored = session.collection(&binding.spec.collection)?.add(binding.entry.clone())?;
        session.commit()?;
        debug!(node_id = scope.node_id, entity = %binding.spec.name, "record created");
        Ok(ActionResult::success(Value::Object(stored)))
    }

    fn stack(&self) -> Option<&StackSlots> {
        Some(&self.slots)
    }
}

pub(crate) fn create_info() -> TypeInfo {
    TypeInfo::new("Create", "nodeflow::Create")
        .with_field(FieldDescriptor::new("entity", FieldKind::capability("Entity")))
        .extends(&stack_action_info())
}

pub(crate) fn build_create(mut fields: Fields) -> anyhow::Result<Box<dyn Action>> {
    Ok(Box::new(Create {
        entity: fields.take_property::<EntityBinding>("entity"),
        slots: StackSlots::from_fields(&mut fields),
    }))
}

/// Returns every record matching `rules` (all records without rules).
#[derive(Debug)]
pub struct Read {
    pub entity: Option<EntitySelect>,
    pub rules: Option<RuleSet>,
    pub slots: StackSlots,
}

impl Action for Read {
    fn execute(&mut self, _scope: &mut ActionScope<'_>) -> anyhow::Result<ActionResult> {
        let Some(select) = &self.entity else {
            return Ok(no_entity());
        };
        let mut session = select.spec.open_session()?;
        let collection = session.collection(&select.spec.collection)?;
        let query = match &self.rules {
            Some(rules) => CompiledQuery::compile(rules, collection.schema()),
            None => CompiledQuery::all(),
        };
        let records = collection.query(&query)?;
        Ok(ActionResult::success(Value::Array(records.into_iter().map(Value::Object).collect())))
    }

    fn stack(&self) -> Option<&StackSlots> {
        Some(&self.slots)
    }
}

pub(crate) fn read_info() -> TypeInfo {
    TypeInfo::new("Read", "nodeflow::Read")
        .with_fields([
            FieldDescriptor::new("entity", FieldKind::capability("EntitySelect")),
            FieldDescriptor::new("rules", FieldKind::capability("RuleSet")),
        ])
        .extends(&stack_action_info())
}

pub(crate) fn build_read(mut fields: Fields) -> anyhow::Result<Box<dyn Action>> {
    Ok(Box::new(Read {
        entity: fields.take_property::<EntitySelect>("entity"),
        rules: fields.take_property::<RuleSet>("rules"),
        slots: StackSlots::from_fields(&mut fields),
    }))
}

/// Returns the first matching record; fails when there is none.
#[derive(Debug)]
pub struct ReadFirst {
    pub entity: Option<EntitySelect>,
    pub lookup: RecordLookup,
    pub slots: StackSlots,
}

impl Action for ReadFirst {
    fn execute(&mut self, _scope: &mut ActionScope<'_>) -> anyhow::Result<ActionResult> {
        let Some(select) = &self.entity else {
            return Ok(no_entity());
        };
        let mut session = select.spec.open_session()?;
        let collection = session.collection(&select.spec.collection)?;
        match self.lookup.find(collection)? {
            Some(record) => Ok(ActionResult::success(Value::Object(record))),
            None => Ok(not_found(&select.spec.name)),
        }
    }

    fn stack(&self) -> Option<&StackSlots> {
        Some(&self.slots)
    }
}

pub(crate) fn read_first_info() -> TypeInfo {
    TypeInfo::new("ReadFirst", "nodeflow::ReadFirst")
        .with_field(FieldDescriptor::new("entity", FieldKind::capability("EntitySelect")))
        .with_fields(lookup_fields())
        .extends(&stack_action_info())
}

pub(crate) fn build_read_first(mut fields: Fields) -> anyhow::Result<Box<dyn Action>> {
    Ok(Box::new(ReadFirst {
        entity: fields.take_property::<EntitySelect>("entity"),
        lookup: RecordLookup::from_fields(&mut fields),
        slots: StackSlots::from_fields(&mut fields),
    }))
}

/// Copies the fields of `entity` onto the first matching record.
///
/// The record's primary key is never changed. With no fields to copy the
/// record is returned untouched.
#[derive(Debug)]
pub struct Update {
    pub entity: Option<EntityBinding>,
    pub lookup: RecordLookup,
    pub slots: StackSlots,
}

impl Action for Update {
    fn execute(&mut self, scope: &mut ActionScope<'_>) -> anyhow::Result<ActionResult> {
        let Some(binding) = &self.entity else {
            return Ok(no_entity());
        };
        let mut session = binding.spec.open_session()?;
        let collection = session.collection(&binding.spec.collection)?;
        let Some(mut record) = self.lookup.find(collection)? else {
            return Ok(not_found(&binding.spec.name));
        };
        if binding.properties.is_empty() {
            return Ok(ActionResult::success(Value::Object(record)));
        }

        let schema = &binding.spec.schema;
        let key = schema.key_of(&record).cloned();
        record.extend(binding.entry.iter().map(|(name, value)| (name.clone(), value.clone())));
        if let Some(key) = key {
            record.insert(schema.primary_key.clone(), key);
        }
        let updated = collection.update(record)?;
        session.commit()?;
        debug!(node_id = scope.node_id, entity = %binding.spec.name, "record updated");
        Ok(ActionResult::success(Value::Object(updated)))
    }

    fn stack(&self) -> Option<&StackSlots> {
        Some(&self.slots)
    }
}

pub(crate) fn update_info() -> TypeInfo {
    TypeInfo::new("Update", "nodeflow::Update")
        .with_field(FieldDescriptor::new("entity", FieldKind::capability("Entity")))
        .with_fields(lookup_fields())
        .extends(&stack_action_info())
}

pub(crate) fn build_update(mut fields: Fields) -> anyhow::Result<Box<dyn Action>> {
    Ok(Box::new(Update {
        entity: fields.take_property::<EntityBinding>("entity"),
        lookup: RecordLookup::from_fields(&mut fields),
        slots: StackSlots::from_fields(&mut fields),
    }))
}

/// Removes the first matching record and returns it.
#[derive(Debug)]
pub struct Delete {
    pub entity: Option<EntitySelect>,
    pub lookup: RecordLookup,
    pub slots: StackSlots,
}

impl Action for Delete {
    fn execute(&mut self, scope: &mut ActionScope<'_>) -> anyhow::Result<ActionResult> {
        let Some(select) = &self.entity else {
            return Ok(no_entity());
        };
        let mut session = select.spec.open_session()?;
        let collection = session.collection(&select.spec.collection)?;
        let Some(record) = self.lookup.find(collection)? else {
            return Ok(not_found(&select.spec.name));
        };
        let Some(key) = select.spec.schema.key_of(&record).cloned() else {
            return Ok(ActionResult::failure_with(format!(
                "record in '{}' has no primary key value",
                select.spec.name
            )));
        };
        let removed = collection.remove(&key)?;
        session.commit()?;
        debug!(node_id = scope.node_id, entity = %select.spec.name, "record deleted");
        Ok(ActionResult::success(Value::Object(removed)))
    }

    fn stack(&self) -> Option<&StackSlots> {
        Some(&self.slots)
    }
}

pub(crate) fn delete_info() -> TypeInfo {
    TypeInfo::new("Delete", "nodeflow::Delete")
        .with_field(FieldDescriptor::new("entity", FieldKind::capability("EntitySelect")))
        .with_fields(lookup_fields())
        .extends(&stack_action_info())
}

pub(crate) fn build_delete(mut fields: Fields) -> anyhow::Result<Box<dyn Action>> {
    Ok(Box::new(Delete {
        entity: fields.take_property::<EntitySelect>("entity"),
        lookup: RecordLookup::from_fields(&mut fields),
        slots: StackSlots::from_fields(&mut fields),
    }))
}

/// Counts the records matching `filters`.
#[derive(Debug)]
pub struct Count {
    pub entity: Option<EntitySelect>,
    pub filters: Vec<FilterRule>,
    pub slots: StackSlots,
}

impl Action for Count {
    fn execute(&mut self, _scope: &mut ActionScope<'_>) -> anyhow::Result<ActionResult> {
        let Some(select) = &self.entity else {
            return Ok(no_entity());
        };
        let mut session = select.spec.open_session()?;
        let collection = session.collection(&select.spec.collection)?;
        let predicates = compile_filters(&self.filters, collection.schema());
        let count = collection.count(&predicates)?;
        Ok(ActionResult::success(Value::from(count)))
    }

    fn stack(&self) -> Option<&StackSlots> {
        Some(&self.slots)
    }
}

pub(crate) fn count_info() -> TypeInfo {
    TypeInfo::new("Count", "nodeflow::Count")
        .with_fields([
            FieldDescriptor::new("entity", FieldKind::capability("EntitySelect")),
            FieldDescriptor::new("filters", FieldKind::list(FieldKind::capability("FilterRule"))),
        ])
        .extends(&stack_action_info())
}

pub(crate) fn build_count(mut fields: Fields) -> anyhow::Result<Box<dyn Action>> {
    Ok(Box::new(Count {
        entity: fields.take_property::<EntitySelect>("entity"),
        filters: fields.take_properties::<FilterRule>("filters"),
        slots: StackSlots::from_fields(&mut fields),
    }))
}
