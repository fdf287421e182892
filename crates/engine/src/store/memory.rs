use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

use nodeflow_util::coerce::stringify;

use super::{Collection, EntityProvider, Record, RecordSchema, StoreError, StoreSession};
use crate::{
    query::{CompiledQuery, Predicate},
    registry::FieldKind,
};

type Tables = Arc<Mutex<HashMap<String, Vec<Record>>>>;

/// In-process record store.
///
/// Sessions work on private copies of the collections they touch and write
/// them back on commit, so an uncommitted session never affects readers.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    name: String,
    schemas: IndexMap<String, Arc<RecordSchema>>,
    tables: Tables,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schemas: IndexMap::new(),
            tables: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Declares a collection.
    pub fn with_collection(mut self, collection: impl Into<String>, schema: RecordSchema) -> Self {
        self.schemas.insert(collection.into(), Arc::new(schema));
        self
    }

    /// Appends records to a collection without going through a session.
    pub fn seed(&self, collection: &str, records: impl IntoIterator<Item = Record>) -> Result<(), StoreError> {
        if !self.schemas.contains_key(collection) {
            return Err(StoreError::UnknownCollection(collection.to_string()));
        }
        let mut tables = self.tables.lock().expect("memory store lock");
        tables.entry(collection.to_string()).or_default().extend(records);
        Ok(())
    }

    /// Committed records of a collection.
    pub fn snapshot(&self, collection: &str) -> Vec<Record> {
        self.tables
            .lock()
            .expect("memory store lock")
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }
}

impl EntityProvider for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn collections(&self) -> Vec<(String, RecordSchema)> {
        self.schemas
            .iter()
            .map(|(name, schema)| (name.clone(), schema.as_ref().clone()))
            .collect()
    }

    fn open_session(&self) -> Result<Box<dyn StoreSession>, StoreError> {
        Ok(Box::new(MemorySession {
            schemas: self.schemas.clone(),
            tables: self.tables.clone(),
            working: HashMap::new(),
        }))
    }
}

struct MemorySession {
    schemas: IndexMap<String, Arc<RecordSchema>>,
    tables: Tables,
    working: HashMap<String, MemoryCollection>,
}

impl StoreSession for MemorySession {
    fn collection(&mut self, name: &str) -> Result<&mut dyn Collection, StoreError> {
        if !self.working.contains_key(name) {
            let schema = self
                .schemas
                .get(name)
                .cloned()
                .ok_or_else(|| StoreError::UnknownCollection(name.to_string()))?;
            let records = self
                .tables
                .lock()
                .expect("memory store lock")
                .get(name)
                .cloned()
                .unwrap_or_default();
            self.working.insert(
                name.to_string(),
                MemoryCollection {
                    schema,
                    records,
                    dirty: false,
                },
            );
        }
        let collection = self
            .working
            .get_mut(name)
            .ok_or_else(|| StoreError::UnknownCollection(name.to_string()))?;
        Ok(collection)
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().expect("memory store lock");
        for (name, collection) in self.working.iter_mut().filter(|(_, collection)| collection.dirty) {
            debug!(collection = %name, records = collection.records.len(), "committing memory collection");
            tables.insert(name.clone(), collection.records.clone());
            collection.dirty = false;
        }
        Ok(())
    }
}

struct MemoryCollection {
    schema: Arc<RecordSchema>,
    records: Vec<Record>,
    dirty: bool,
}

impl MemoryCollection {
    fn position(&self, key: &Value) -> Option<usize> {
        let wanted = stringify(key);
        self.records
            .iter()
            .position(|record| self.schema.key_of(record).is_some_and(|existing| stringify(existing) == wanted))
    }

    fn next_key(&self) -> Value {
        let highest = self
            .records
            .iter()
            .filter_map(|record| self.schema.key_of(record).and_then(Value::as_i64))
            .max()
            .unwrap_or(0);
        Value::from(highest + 1)
    }

    fn has_integer_key(&self) -> bool {
        self.schema
            .primary_key_field()
            .is_some_and(|field| matches!(field.kind, FieldKind::Int | FieldKind::Long))
    }
}

impl Collection for MemoryCollection {
    fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    fn add(&mut self, mut record: Record) -> Result<Record, StoreError> {
        // Integer keys left at zero are treated as unset, like an identity column.
        let supplied = self
            .schema
            .key_of(&record)
            .filter(|key| !(self.has_integer_key() && key.as_i64() == Some(0)))
            .cloned();
        let key = match supplied {
            Some(key) => key,
            None if self.has_integer_key() => {
                let key = self.next_key();
                record.insert(self.schema.primary_key.clone(), key.clone());
                key
            }
            None => {
                return Err(StoreError::MissingKey {
                    collection: self.schema.name.clone(),
                });
            }
        };
        if self.position(&key).is_some() {
            return Err(StoreError::DuplicateKey {
                collection: self.schema.name.clone(),
                key: stringify(&key),
            });
        }
        self.records.push(record.clone());
        self.dirty = true;
        Ok(record)
    }

    fn update(&mut self, record: Record) -> Result<Record, StoreError> {
        let key = self.schema.key_of(&record).cloned().ok_or_else(|| StoreError::MissingKey {
            collection: self.schema.name.clone(),
        })?;
        let index = self.position(&key).ok_or_else(|| StoreError::NotFound {
            collection: self.schema.name.clone(),
            key: stringify(&key),
        })?;
        self.records[index] = record.clone();
        self.dirty = true;
        Ok(record)
    }

    fn remove(&mut self, key: &Value) -> Result<Record, StoreError> {
        let index = self.position(key).ok_or_else(|| StoreError::NotFound {
            collection: self.schema.name.clone(),
            key: stringify(key),
        })?;
        self.dirty = true;
        Ok(self.records.remove(index))
    }

    fn query(&self, query: &CompiledQuery) -> Result<Vec<Record>, StoreError> {
        Ok(query.apply(self.records.iter().cloned()))
    }

    fn count(&self, filters: &[Predicate]) -> Result<usize, StoreError> {
        Ok(self
            .records
            .iter()
            .filter(|record| filters.iter().all(|predicate| predicate.matches(record)))
            .count())
    }
}
