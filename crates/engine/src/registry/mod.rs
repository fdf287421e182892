//! # Type Registry
//!
//! Maps the symbolic type names used in model documents to constructible
//! capabilities, grouped by kind: actions, endpoints, and property types.
//! It also holds the entity catalog published by registered entity providers.
//!
//! The registry is built once through [`TypeRegistryBuilder`] and is
//! read-only afterwards, so a single instance can be shared behind an `Arc`
//! by every concurrent invocation.
//!
//! ## Name collisions
//!
//! Registrations are keyed by symbolic name within their group. When a name
//! is registered twice, the newcomer replaces the incumbent only if the
//! newcomer's lineage includes the incumbent's qualified name, i.e. a host
//! type refining a built-in wins. Otherwise the incumbent is kept and the
//! collision is logged.

mod builtin;
pub mod fields;
pub mod populate;

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::Arc,
};

use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{info, warn};

use nodeflow_types::{Model, Node};

use crate::{
    actions::Action,
    endpoint::Endpoint,
    store::{EntityProvider, EntitySpec},
};

pub use fields::{FieldDescriptor, FieldKind, FieldValue, Fields, PropertyInstance};
pub use populate::{PopulateError, PopulateScope};

/// Key naming a node's (or a property value's) registered type.
pub const TYPE_KEY: &str = "_type";

/// Builds an action from its populated fields.
pub type ActionFactory = fn(Fields) -> anyhow::Result<Box<dyn Action>>;
/// Builds an endpoint from its populated fields.
pub type EndpointFactory = fn(Fields) -> anyhow::Result<Box<dyn Endpoint>>;
/// Parses a raw property value into a property instance.
pub type PropertyParser = fn(&TypeInfo, &Value, &PopulateScope<'_>) -> Result<PropertyInstance, PopulateError>;

/// Errors raised when resolving or instantiating registered types.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no {group} type named '{name}' is registered")]
    UnknownType { group: &'static str, name: String },
    #[error("{group} type '{name}' is abstract and cannot be instantiated")]
    AbstractType { group: &'static str, name: String },
    #[error("no entity named '{0}' is registered")]
    UnknownEntity(String),
    #[error("failed to construct '{name}': {message}")]
    Construction { name: String, message: String },
}

/// Metadata of a registered type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeInfo {
    /// Symbolic name used in model documents.
    pub name: String,
    /// Unique identity, e.g. `nodeflow::Rest`.
    pub qualified_name: String,
    /// Qualified names of every ancestor, nearest first.
    pub lineage: Vec<String>,
    pub is_abstract: bool,
    pub fields: Vec<FieldDescriptor>,
}

impl TypeInfo {
    pub fn new(name: impl Into<String>, qualified_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            qualified_name: qualified_name.into(),
            lineage: Vec::new(),
            is_abstract: false,
            fields: Vec::new(),
        }
    }

    /// Derives from `parent`: inherits its fields and extends its lineage.
    pub fn extends(mut self, parent: &TypeInfo) -> Self {
        let mut lineage = vec![parent.qualified_name.clone()];
        lineage.extend(parent.lineage.iter().cloned());
        self.lineage = lineage;
        let mut fields = parent.fields.clone();
        for field in self.fields.drain(..) {
            fields.retain(|existing| existing.name != field.name);
            fields.push(field);
        }
        self.fields = fields;
        self
    }

    pub fn abstract_type(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Adds a field, replacing an inherited field of the same name.
    pub fn with_field(mut self, field: FieldDescriptor) -> Self {
        self.fields.retain(|existing| existing.name != field.name);
        self.fields.push(field);
        self
    }

    pub fn with_fields(self, fields: impl IntoIterator<Item = FieldDescriptor>) -> Self {
        fields.into_iter().fold(self, TypeInfo::with_field)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// True when `self` is `other` or one of its descendants.
    pub fn is_a(&self, other: &TypeInfo) -> bool {
        self.qualified_name == other.qualified_name || self.lineage.contains(&other.qualified_name)
    }

    fn describe(&self) -> Value {
        let mut properties = Map::new();
        let mut actions = Map::new();
        for field in &self.fields {
            if field.kind.is_action_slot() {
                actions.insert(field.name.clone(), field.kind.describe());
            } else {
                properties.insert(field.name.clone(), field.describe());
            }
        }
        json!({
            "qualifiedName": self.qualified_name,
            "extends": self.lineage,
            "abstract": self.is_abstract,
            "properties": properties,
            "actions": actions,
        })
    }
}

/// A registered type: its metadata and, for concrete types, its factory.
#[derive(Clone)]
pub struct Registration<F> {
    pub info: TypeInfo,
    pub factory: Option<F>,
}

impl<F> fmt::Debug for Registration<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("info", &self.info)
            .field("concrete", &self.factory.is_some())
            .finish()
    }
}

struct Catalog<F> {
    group: &'static str,
    entries: HashMap<String, Registration<F>>,
}

impl<F> Catalog<F> {
    fn new(group: &'static str) -> Self {
        Self {
            group,
            entries: HashMap::new(),
        }
    }

    fn insert(&mut self, registration: Registration<F>) {
        let name = registration.info.name.clone();
        if let Some(incumbent) = self.entries.get(&name) {
            if !registration.info.lineage.contains(&incumbent.info.qualified_name) {
                warn!(
                    group = self.group,
                    name = %name,
                    kept = %incumbent.info.qualified_name,
                    ignored = %registration.info.qualified_name,
                    "duplicate type name; keeping the existing registration"
                );
                return;
            }
            info!(
                group = self.group,
                name = %name,
                replaced = %incumbent.info.qualified_name,
                by = %registration.info.qualified_name,
                "type registration overrides its base type"
            );
        }
        self.entries.insert(name, registration);
    }

    fn get(&self, name: &str) -> Option<&Registration<F>> {
        self.entries.get(name)
    }

    fn resolve(&self, name: &str) -> Result<&Registration<F>, RegistryError> {
        self.get(name).ok_or_else(|| RegistryError::UnknownType {
            group: self.group,
            name: name.to_string(),
        })
    }

    fn describe(&self) -> Value {
        let sorted: BTreeMap<&String, Value> = self
            .entries
            .iter()
            .map(|(name, registration)| (name, registration.info.describe()))
            .collect();
        json!(sorted)
    }
}

/// An instance produced by [`TypeRegistry::instantiate_and_populate`].
pub enum Instance {
    Action(Box<dyn Action>),
    Endpoint(Box<dyn Endpoint>),
    Property(PropertyInstance),
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instance::Action(_) => f.write_str("Instance::Action(..)"),
            Instance::Endpoint(_) => f.write_str("Instance::Endpoint(..)"),
            Instance::Property(_) => f.write_str("Instance::Property(..)"),
        }
    }
}

/// Collects registrations before freezing them into a [`TypeRegistry`].
pub struct TypeRegistryBuilder {
    actions: Catalog<ActionFactory>,
    endpoints: Catalog<EndpointFactory>,
    properties: Catalog<PropertyParser>,
    entities: BTreeMap<String, EntitySpec>,
}

impl Default for TypeRegistryBuilder {
    fn default() -> Self {
        Self {
            actions: Catalog::new("action"),
            endpoints: Catalog::new("endpoint"),
            properties: Catalog::new("property"),
            entities: BTreeMap::new(),
        }
    }
}

impl TypeRegistryBuilder {
    /// Registers the built-in actions, endpoints and property types.
    pub fn with_builtins(mut self) -> Self {
        builtin::register_all(&mut self);
        self
    }

    pub fn register_action(&mut self, info: TypeInfo, factory: ActionFactory) -> &mut Self {
        self.actions.insert(Registration {
            info,
            factory: Some(factory),
        });
        self
    }

    pub fn register_endpoint(&mut self, info: TypeInfo, factory: EndpointFactory) -> &mut Self {
        self.endpoints.insert(Registration {
            info,
            factory: Some(factory),
        });
        self
    }

    pub fn register_property(&mut self, info: TypeInfo, parser: PropertyParser) -> &mut Self {
        self.properties.insert(Registration {
            info,
            factory: Some(parser),
        });
        self
    }

    /// Registers an abstract base that concrete types in the same group derive from.
    pub fn register_abstract(&mut self, group: TypeGroup, info: TypeInfo) -> &mut Self {
        let info = info.abstract_type();
        match group {
            TypeGroup::Action => self.actions.insert(Registration { info, factory: None }),
            TypeGroup::Endpoint => self.endpoints.insert(Registration { info, factory: None }),
            TypeGroup::Property => self.properties.insert(Registration { info, factory: None }),
        }
        self
    }

    /// Publishes every collection of `provider` as an entity named
    /// `<provider>.<collection>`.
    pub fn register_entity_provider(&mut self, provider: Arc<dyn EntityProvider>) -> &mut Self {
        for (collection, schema) in provider.collections() {
            let name = format!("{}.{}", provider.name(), collection);
            if self.entities.contains_key(&name) {
                warn!(entity = %name, "duplicate entity name; keeping the existing registration");
                continue;
            }
            self.entities.insert(
                name.clone(),
                EntitySpec {
                    name,
                    collection,
                    schema: Arc::new(schema),
                    provider: provider.clone(),
                },
            );
        }
        self
    }

    pub fn build(self) -> TypeRegistry {
        info!(
            actions = self.actions.entries.len(),
            endpoints = self.endpoints.entries.len(),
            properties = self.properties.entries.len(),
            entities = self.entities.len(),
            "type registry loaded"
        );
        TypeRegistry {
            actions: self.actions,
            endpoints: self.endpoints,
            properties: self.properties,
            entities: self.entities,
        }
    }
}

/// Capability groups of the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeGroup {
    Action,
    Endpoint,
    Property,
}

/// Read-only catalog of registered types and entities.
pub struct TypeRegistry {
    actions: Catalog<ActionFactory>,
    endpoints: Catalog<EndpointFactory>,
    properties: Catalog<PropertyParser>,
    entities: BTreeMap<String, EntitySpec>,
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("actions", &self.actions.entries.len())
            .field("endpoints", &self.endpoints.entries.len())
            .field("properties", &self.properties.entries.len())
            .field("entities", &self.entities.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl TypeRegistry {
    pub fn builder() -> TypeRegistryBuilder {
        TypeRegistryBuilder::default()
    }

    /// A registry holding only the built-in types.
    pub fn with_builtins() -> Self {
        Self::builder().with_builtins().build()
    }

    pub fn resolve_action(&self, name: &str) -> Result<&Registration<ActionFactory>, RegistryError> {
        self.actions.resolve(name)
    }

    pub fn resolve_endpoint(&self, name: &str) -> Result<&Registration<EndpointFactory>, RegistryError> {
        self.endpoints.resolve(name)
    }

    pub fn resolve_property(&self, name: &str) -> Result<&Registration<PropertyParser>, RegistryError> {
        self.properties.resolve(name)
    }

    pub(crate) fn property(&self, name: &str) -> Option<&Registration<PropertyParser>> {
        self.properties.get(name)
    }

    /// Resolves `node`'s type as an action and builds it from the node.
    pub fn instantiate_action(&self, node: &Node, model: &Model) -> Result<Box<dyn Action>, RegistryError> {
        let registration = self.actions.resolve(&node.type_name)?;
        let factory = concrete(registration, "action")?;
        let fields = PopulateScope::new(self, model).populate_node(&registration.info, node);
        factory(fields).map_err(|error| construction_error(&node.type_name, error))
    }

    /// Resolves `node`'s type as an endpoint and builds it from the node.
    pub fn instantiate_endpoint(&self, node: &Node, model: &Model) -> Result<Box<dyn Endpoint>, RegistryError> {
        let registration = self.endpoints.resolve(&node.type_name)?;
        let factory = concrete(registration, "endpoint")?;
        let fields = PopulateScope::new(self, model).populate_node(&registration.info, node);
        factory(fields).map_err(|error| construction_error(&node.type_name, error))
    }

    /// Instantiates `type_name` from `node`, searching actions, then
    /// endpoints, then property types.
    pub fn instantiate_and_populate(&self, type_name: &str, node: &Node, model: &Model) -> Result<Instance, RegistryError> {
        if self.actions.get(type_name).is_some() {
            let node = retyped(node, type_name);
            return self.instantiate_action(&node, model).map(Instance::Action);
        }
        if self.endpoints.get(type_name).is_some() {
            let node = retyped(node, type_name);
            return self.instantiate_endpoint(&node, model).map(Instance::Endpoint);
        }
        let registration = self.properties.resolve(type_name)?;
        let parse = concrete(registration, "property")?;
        let scope = PopulateScope::new(self, model);
        parse(&registration.info, &Value::Object(node.properties.clone()), &scope)
            .map(Instance::Property)
            .map_err(|error| RegistryError::Construction {
                name: type_name.to_string(),
                message: error.to_string(),
            })
    }

    pub fn get_entity(&self, name: &str) -> Result<&EntitySpec, RegistryError> {
        self.entities
            .get(name)
            .ok_or_else(|| RegistryError::UnknownEntity(name.to_string()))
    }

    /// Registered entity names, sorted.
    pub fn list_entity_names(&self) -> Vec<String> {
        self.entities.keys().cloned().collect()
    }

    /// JSON description of every registered type and entity.
    pub fn describe(&self) -> Value {
        let entities: Map<String, Value> = self
            .entities
            .iter()
            .map(|(name, spec)| (name.clone(), spec.schema.describe()))
            .collect();
        json!({
            "actions": self.actions.describe(),
            "endpoints": self.endpoints.describe(),
            "properties": self.properties.describe(),
            "entities": entities,
        })
    }
}

fn concrete<F: Copy>(registration: &Registration<F>, group: &'static str) -> Result<F, RegistryError> {
    registration.factory.ok_or_else(|| RegistryError::AbstractType {
        group,
        name: registration.info.name.clone(),
    })
}

fn construction_error(name: &str, error: anyhow::Error) -> RegistryError {
    RegistryError::Construction {
        name: name.to_string(),
        message: format!("{error:#}"),
    }
}

fn retyped(node: &Node, type_name: &str) -> Node {
    let mut node = node.clone();
    node.type_name = type_name.to_string();
    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        actions::{ActionScope, StackSlots},
        condition::Condition,
    };
    use nodeflow_types::ActionResult;

    struct Marker(&'static str);

    impl Action for Marker {
        fn execute(&mut self, _scope: &mut ActionScope<'_>) -> anyhow::Result<ActionResult> {
            Ok(ActionResult::success(Value::String(self.0.to_string())))
        }

        fn stack(&self) -> Option<&StackSlots> {
            None
        }
    }

    fn base_info() -> TypeInfo {
        TypeInfo::new("Thing", "test::Thing").with_field(FieldDescriptor::new("a", FieldKind::Text))
    }

    fn build_base(_: Fields) -> anyhow::Result<Box<dyn Action>> {
        Ok(Box::new(Marker("base")))
    }

    fn build_sub(_: Fields) -> anyhow::Result<Box<dyn Action>> {
        Ok(Box::new(Marker("sub")))
    }

    #[test]
    fn test_subtype_registration_overrides_incumbent() {
        let mut builder = TypeRegistry::builder();
        builder.register_action(base_info(), build_base);
        let sub = TypeInfo::new("Thing", "host::BetterThing").extends(&base_info());
        builder.register_action(sub, build_sub);
        let registry = builder.build();

        let registration = registry.resolve_action("Thing").expect("registered");
        assert_eq!(registration.info.qualified_name, "host::BetterThing");
        assert!(registration.info.field("a").is_some());
    }

    #[test]
    fn test_unrelated_registration_keeps_incumbent() {
        let mut builder = TypeRegistry::builder();
        builder.register_action(base_info(), build_base);
        builder.register_action(TypeInfo::new("Thing", "other::Thing"), build_sub);
        let registry = builder.build();

        let registration = registry.resolve_action("Thing").expect("registered");
        assert_eq!(registration.info.qualified_name, "test::Thing");
    }

    #[test]
    fn test_resolution_misses_are_errors() {
        let registry = TypeRegistry::builder().build();
        let error = registry.resolve_action("Nope").expect_err("missing");
        assert!(matches!(error, RegistryError::UnknownType { group: "action", .. }));
        assert!(matches!(registry.get_entity("Db.Table"), Err(RegistryError::UnknownEntity(_))));
    }

    #[test]
    fn test_instantiate_and_populate_searches_each_catalog() {
        let registry = TypeRegistry::with_builtins();
        let model = Model::new();

        let unknown = registry
            .instantiate_and_populate("NoSuchType", &Node::new("n", "NoSuchType"), &model)
            .expect_err("unregistered");
        assert!(matches!(unknown, RegistryError::UnknownType { ref name, .. } if name == "NoSuchType"));

        let node = Node::new("n", "Untyped").with_property("json", "hi");
        let action = registry.instantiate_and_populate("JsonAction", &node, &model).expect("action");
        assert!(matches!(action, Instance::Action(_)));

        let node = Node::new("n", "Untyped")
            .with_property("left", 2)
            .with_property("operator", "Equal")
            .with_property("right", "2");
        let Instance::Property(property) = registry
            .instantiate_and_populate("OperatorCondition", &node, &model)
            .expect("property")
        else {
            panic!("expected a property instance");
        };
        let condition = property
            .downcast::<Box<dyn Condition>>()
            .expect("boxed condition");
        assert!(condition.build());
    }

    #[test]
    fn test_abstract_types_cannot_be_instantiated() {
        let mut builder = TypeRegistry::builder();
        builder.register_abstract(TypeGroup::Action, TypeInfo::new("Base", "test::Base"));
        let registry = builder.build();
        let model = Model::new();
        let error = registry
            .instantiate_action(&Node::new("n", "Base"), &model)
            .err()
            .expect("abstract");
        assert!(matches!(error, RegistryError::AbstractType { .. }));
    }

    #[test]
    fn test_extends_inherits_fields_and_lineage() {
        let root = TypeInfo::new("Root", "test::Root").with_field(FieldDescriptor::new("x", FieldKind::Int));
        let middle = TypeInfo::new("Middle", "test::Middle").extends(&root);
        let leaf = TypeInfo::new("Leaf", "test::Leaf")
            .with_field(FieldDescriptor::new("x", FieldKind::Text))
            .extends(&middle);

        assert_eq!(leaf.lineage, vec!["test::Middle".to_string(), "test::Root".to_string()]);
        assert!(leaf.is_a(&root));
        assert!(!root.is_a(&leaf));
        assert_eq!(leaf.field("x").map(|field| &field.kind), Some(&FieldKind::Text));
    }

    #[test]
    fn test_builtins_describe_themselves() {
        let registry = TypeRegistry::with_builtins();
        let description = registry.describe();
        for name in ["JsonAction", "Rest", "Request", "If", "SwitchCase", "Foreach", "Create", "Read", "Count"] {
            assert!(description["actions"].get(name).is_some(), "{name} should be registered");
        }
        assert!(description["endpoints"].get("Controller").is_some());
        assert!(description["properties"].get("Condition").is_some());
        assert_eq!(description["properties"]["Condition"]["abstract"], json!(true));
    }
}
