//! Runtime configuration for the `nodeflow` binary.
//!
//! Read from JSON or YAML (chosen by file extension). Lookup order: an
//! explicit `--config` path, then [`CONFIG_PATH_ENV`], then
//! `<config_dir>/nodeflow/runtime.json`.

use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use dirs_next::config_dir;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use nodeflow_engine::{FieldDescriptor, FieldKind, MemoryStore, RecordSchema, TypeRegistryBuilder};
use nodeflow_util::expand_tilde;

/// Environment variable overriding the configuration file path.
pub const CONFIG_PATH_ENV: &str = "NODEFLOW_CONFIG_PATH";

pub const CONFIG_FILE_NAME: &str = "runtime.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed JSON configuration {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("malformed YAML configuration {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("collection '{collection}' declares field '{field}' with unknown kind '{kind}'")]
    UnknownFieldKind {
        collection: String,
        field: String,
        kind: String,
    },
    #[error("collection '{collection}' has a seed record that is not an object")]
    InvalidRecord { collection: String },
    #[error("store '{store}' could not be seeded: {message}")]
    Seed { store: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Model file loaded when no `--model` flag is given.
    pub model_path: Option<PathBuf>,
    /// Named environment from the model's environment table.
    pub environment: String,
    pub http_timeout_secs: u64,
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub log_filter: Option<String>,
    /// In-memory stores registered as entity providers.
    pub stores: Vec<StoreConfig>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            environment: "Prod".to_string(),
            http_timeout_secs: 30,
            log_filter: None,
            stores: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub name: String,
    #[serde(default)]
    pub collections: Vec<CollectionConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub name: String,
    /// Record type name; defaults to the collection name.
    #[serde(default)]
    pub record_type: Option<String>,
    pub primary_key: String,
    /// Field name to kind name (`text`, `int`, `long`, `decimal`, ...).
    #[serde(default)]
    pub fields: IndexMap<String, String>,
    #[serde(default)]
    pub records: Vec<Value>,
}

impl RuntimeConfig {
    /// Loads configuration following the lookup order.
    ///
    /// A missing file yields defaults. A malformed file is an error when the
    /// path was given explicitly and a warning otherwise.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::read(path).map(Option::unwrap_or_default);
        }
        let path = default_config_path();
        match Self::read(&path) {
            Ok(config) => Ok(config.unwrap_or_default()),
            Err(error) => {
                warn!(path = %path.display(), %error, "ignoring unreadable configuration");
                Ok(Self::default())
            }
        }
    }

    /// Parses the file at `path`; `Ok(None)` when it does not exist.
    pub fn read(path: &Path) -> Result<Option<Self>, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no configuration file");
                return Ok(None);
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let yaml = path
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| matches!(extension, "yaml" | "yml"));
        let config = if yaml {
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            serde_json::from_str(&content).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?
        };
        Ok(Some(config))
    }

    /// Builds the configured stores and registers them as entity providers.
    pub fn register_stores(&self, builder: &mut TypeRegistryBuilder) -> Result<(), ConfigError> {
        for store in &self.stores {
            builder.register_entity_provider(Arc::new(store.build()?));
        }
        Ok(())
    }
}

impl StoreConfig {
    pub fn build(&self) -> Result<MemoryStore, ConfigError> {
        let mut store = MemoryStore::new(self.name.clone());
        for collection in &self.collections {
            store = store.with_collection(collection.name.clone(), collection.schema()?);
        }
        for collection in &self.collections {
            let records = collection
                .records
                .iter()
                .map(|record| {
                    record.as_object().cloned().ok_or_else(|| ConfigError::InvalidRecord {
                        collection: collection.name.clone(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            store.seed(&collection.name, records).map_err(|error| ConfigError::Seed {
                store: self.name.clone(),
                message: error.to_string(),
            })?;
        }
        Ok(store)
    }
}

impl CollectionConfig {
    pub fn schema(&self) -> Result<RecordSchema, ConfigError> {
        let record_type = self.record_type.clone().unwrap_or_else(|| self.name.clone());
        let fields = self
            .fields
            .iter()
            .map(|(field, kind)| {
                FieldKind::from_name(kind)
                    .map(|kind| FieldDescriptor::new(field.clone(), kind))
                    .ok_or_else(|| ConfigError::UnknownFieldKind {
                        collection: self.name.clone(),
                        field: field.clone(),
                        kind: kind.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RecordSchema::new(record_type, self.primary_key.clone()).with_fields(fields))
    }
}

/// Path of the configuration file when none is given explicitly.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = env::var(CONFIG_PATH_ENV)
        && !path.trim().is_empty()
    {
        return expand_tilde(&path);
    }

    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nodeflow")
        .join(CONFIG_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodeflow_engine::EntityProvider;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).expect("create config file");
        file.write_all(content.as_bytes()).expect("write config file");
        path
    }

    #[test]
    fn test_missing_explicit_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = RuntimeConfig::load(Some(&dir.path().join("absent.json"))).expect("defaults");
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.environment, "Prod");
        assert_eq!(config.http_timeout_secs, 30);
    }

    #[test]
    fn test_reads_json_and_yaml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let json_path = write_file(&dir, "runtime.json", r#"{"environment": "Dev", "http_timeout_secs": 5}"#);
        let config = RuntimeConfig::load(Some(&json_path)).expect("json config");
        assert_eq!(config.environment, "Dev");
        assert_eq!(config.http_timeout_secs, 5);
        assert!(config.model_path.is_none());

        let yaml_path = write_file(&dir, "runtime.yaml", "model_path: /srv/model.json\nlog_filter: debug\n");
        let config = RuntimeConfig::load(Some(&yaml_path)).expect("yaml config");
        assert_eq!(config.model_path, Some(PathBuf::from("/srv/model.json")));
        assert_eq!(config.log_filter.as_deref(), Some("debug"));
        assert_eq!(config.environment, "Prod");
    }

    #[test]
    fn test_malformed_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_file(&dir, "runtime.json", "{ not json");
        let error = RuntimeConfig::load(Some(&path)).expect_err("malformed config");
        assert!(matches!(error, ConfigError::Json { .. }));
    }

    #[test]
    fn test_store_config_builds_seeded_memory_store() {
        let config: RuntimeConfig = serde_json::from_value(serde_json::json!({
            "stores": [{
                "name": "Blog",
                "collections": [{
                    "name": "Posts",
                    "primary_key": "id",
                    "fields": {"id": "long", "title": "text"},
                    "records": [{"id": 1, "title": "Hello"}]
                }]
            }]
        }))
        .expect("config");

        let store = config.stores[0].build().expect("store");
        assert_eq!(store.name(), "Blog");
        assert_eq!(store.snapshot("Posts").len(), 1);
        let (collection, schema) = store.collections().remove(0);
        assert_eq!(collection, "Posts");
        assert_eq!(schema.name, "Posts");
        assert_eq!(schema.field("id").map(|field| &field.kind), Some(&FieldKind::Long));
    }

    #[test]
    fn test_unknown_field_kind_is_rejected() {
        let collection = CollectionConfig {
            name: "Posts".into(),
            record_type: Some("Post".into()),
            primary_key: "id".into(),
            fields: IndexMap::from([("id".to_string(), "uuid".to_string())]),
            records: Vec::new(),
        };
        let error = collection.schema().expect_err("unknown kind");
        assert!(matches!(error, ConfigError::UnknownFieldKind { ref kind, .. } if kind == "uuid"));
    }
}
