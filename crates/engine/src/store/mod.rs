//! # Record Stores
//!
//! The persistence seam used by the data actions. An [`EntityProvider`]
//! publishes named collections of records, each described by a
//! [`RecordSchema`]; the registry exposes them as entities named
//! `<provider>.<collection>`. A data action opens a [`StoreSession`], works
//! on one [`Collection`] through it, and commits.
//!
//! [`MemoryStore`] is the in-process implementation used by tests and by the
//! CLI's configured stores.

mod memory;

use std::{fmt, sync::Arc};

use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::{
    query::{CompiledQuery, Predicate},
    registry::{FieldDescriptor, TypeInfo},
};

pub use memory::MemoryStore;

/// A record: field name to value.
pub type Record = Map<String, Value>;

/// Errors raised by store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown collection '{0}'")]
    UnknownCollection(String),
    #[error("record with key {key} already exists in '{collection}'")]
    DuplicateKey { collection: String, key: String },
    #[error("no record with key {key} in '{collection}'")]
    NotFound { collection: String, key: String },
    #[error("record for '{collection}' has no primary key value")]
    MissingKey { collection: String },
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Declared shape of a record type.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSchema {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
    pub primary_key: String,
}

impl RecordSchema {
    pub fn new(name: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            primary_key: primary_key.into(),
        }
    }

    pub fn with_field(mut self, field: FieldDescriptor) -> Self {
        self.fields.retain(|existing| existing.name != field.name);
        self.fields.push(field);
        self
    }

    pub fn with_fields(self, fields: impl IntoIterator<Item = FieldDescriptor>) -> Self {
        fields.into_iter().fold(self, RecordSchema::with_field)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn primary_key_field(&self) -> Option<&FieldDescriptor> {
        self.field(&self.primary_key)
    }

    /// Primary key value of `record`, if set.
    pub fn key_of<'a>(&self, record: &'a Record) -> Option<&'a Value> {
        record.get(&self.primary_key).filter(|value| !value.is_null())
    }

    /// The schema viewed as a type, for populating records from property maps.
    pub fn type_info(&self) -> TypeInfo {
        TypeInfo::new(self.name.clone(), format!("record::{}", self.name)).with_fields(self.fields.iter().cloned())
    }

    pub fn describe(&self) -> Value {
        let fields: Map<String, Value> = self
            .fields
            .iter()
            .map(|field| (field.name.clone(), field.describe()))
            .collect();
        json!({"name": self.name, "primaryKey": self.primary_key, "fields": fields})
    }
}

/// One collection inside an open session.
pub trait Collection {
    fn schema(&self) -> &RecordSchema;

    /// Stores a new record and returns it as stored (generated keys included).
    fn add(&mut self, record: Record) -> Result<Record, StoreError>;

    /// Replaces the record with the same primary key.
    fn update(&mut self, record: Record) -> Result<Record, StoreError>;

    /// Removes and returns the record with primary key `key`.
    fn remove(&mut self, key: &Value) -> Result<Record, StoreError>;

    fn query(&self, query: &CompiledQuery) -> Result<Vec<Record>, StoreError>;

    fn count(&self, filters: &[Predicate]) -> Result<usize, StoreError>;
}

/// A unit of work against one provider.
///
/// Changes made through [`StoreSession::collection`] become visible to other
/// sessions only after [`StoreSession::commit`].
pub trait StoreSession {
    fn collection(&mut self, name: &str) -> Result<&mut dyn Collection, StoreError>;

    fn commit(&mut self) -> Result<(), StoreError>;
}

/// A source of record collections.
pub trait EntityProvider: Send + Sync {
    /// Provider name, the first half of every entity name it publishes.
    fn name(&self) -> &str;

    /// Published collections and their schemas.
    fn collections(&self) -> Vec<(String, RecordSchema)>;

    fn open_session(&self) -> Result<Box<dyn StoreSession>, StoreError>;
}

/// A registered entity: a provider's collection and its schema.
#[derive(Clone)]
pub struct EntitySpec {
    pub name: String,
    pub collection: String,
    pub schema: Arc<RecordSchema>,
    pub provider: Arc<dyn EntityProvider>,
}

impl fmt::Debug for EntitySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitySpec")
            .field("name", &self.name)
            .field("collection", &self.collection)
            .field("schema", &self.schema)
            .finish()
    }
}

impl EntitySpec {
    pub fn open_session(&self) -> Result<Box<dyn StoreSession>, StoreError> {
        self.provider.open_session()
    }
}
