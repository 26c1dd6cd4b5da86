//! Storage backend selection, read from the `storage` section of a config
//! file. The `type` tag picks the backend.

use serde::{Deserialize, Serialize};

use super::{StorageError, StorageResult};

/// Defaults to SlateDB in a `.feedview` directory under the working directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum StorageConfig {
    InMemory,
    SlateDb(SlateDbStorageConfig),
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::local(".feedview")
    }
}

impl StorageConfig {
    /// SlateDB on the local filesystem rooted at `dir`.
    pub fn local(dir: impl Into<String>) -> Self {
        StorageConfig::SlateDb(SlateDbStorageConfig {
            path: "feedview".to_string(),
            object_store: ObjectStoreConfig::Local(LocalObjectStoreConfig { path: dir.into() }),
            settings_path: None,
        })
    }

    /// SlateDB over an in-memory object store. Data is lost on exit.
    pub fn slatedb_in_memory(path: impl Into<String>) -> Self {
        StorageConfig::SlateDb(SlateDbStorageConfig {
            path: path.into(),
            object_store: ObjectStoreConfig::InMemory,
            settings_path: None,
        })
    }

    /// Rejects settings that would only fail later inside SlateDB.
    pub fn validate(&self) -> StorageResult<()> {
        let StorageConfig::SlateDb(slate) = self else {
            return Ok(());
        };
        let invalid = |field: &str| {
            Err(StorageError::Internal(format!(
                "invalid storage config: {} must not be empty",
                field
            )))
        };
        if slate.path.trim().is_empty() {
            return invalid("path");
        }
        match &slate.object_store {
            ObjectStoreConfig::InMemory => Ok(()),
            ObjectStoreConfig::Aws(aws) if aws.region.trim().is_empty() => {
                invalid("object_store.region")
            }
            ObjectStoreConfig::Aws(aws) if aws.bucket.trim().is_empty() => {
                invalid("object_store.bucket")
            }
            ObjectStoreConfig::Aws(_) => Ok(()),
            ObjectStoreConfig::Local(local) if local.path.trim().is_empty() => {
                invalid("object_store.path")
            }
            ObjectStoreConfig::Local(_) => Ok(()),
        }
    }

    /// Short label for log lines.
    pub fn describe(&self) -> String {
        match self {
            StorageConfig::InMemory => "in-memory".to_string(),
            StorageConfig::SlateDb(slate) => match &slate.object_store {
                ObjectStoreConfig::InMemory => format!("slatedb:{} (memory)", slate.path),
                ObjectStoreConfig::Aws(aws) => {
                    format!("slatedb:{} (s3://{}/)", slate.path, aws.bucket)
                }
                ObjectStoreConfig::Local(local) => {
                    format!("slatedb:{} ({})", slate.path, local.path)
                }
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlateDbStorageConfig {
    /// Database prefix inside the object store.
    pub path: String,

    pub object_store: ObjectStoreConfig,

    /// SlateDB settings file. Without one, `Settings::load()` applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings_path: Option<String>,
}

#[derive(Default, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ObjectStoreConfig {
    #[default]
    InMemory,
    Aws(AwsObjectStoreConfig),
    Local(LocalObjectStoreConfig),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AwsObjectStoreConfig {
    pub region: String,
    pub bucket: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocalObjectStoreConfig {
    /// Created if missing.
    pub path: String,
}
