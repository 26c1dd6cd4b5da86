//! Opens a [`Storage`] backend from a [`StorageConfig`].

use std::sync::Arc;

use slatedb::DbBuilder;
use slatedb::config::Settings;
use slatedb::object_store::{self, ObjectStore};

use super::config::{ObjectStoreConfig, SlateDbStorageConfig, StorageConfig};
use super::in_memory::InMemoryStorage;
use super::slate::SlateDbStorage;
use super::{Storage, StorageError, StorageResult};

pub async fn create_storage(config: &StorageConfig) -> StorageResult<Arc<dyn Storage>> {
    config.validate()?;
    tracing::debug!(backend = %config.describe(), "opening storage");
    match config {
        StorageConfig::InMemory => Ok(Arc::new(InMemoryStorage::new())),
        StorageConfig::SlateDb(slate_config) => {
            let storage = open_slatedb(slate_config).await?;
            Ok(Arc::new(storage))
        }
    }
}

fn object_store(config: &ObjectStoreConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    match config {
        ObjectStoreConfig::InMemory => Ok(Arc::new(object_store::memory::InMemory::new())),
        ObjectStoreConfig::Aws(aws) => {
            let store = object_store::aws::AmazonS3Builder::new()
                .with_region(&aws.region)
                .with_bucket_name(&aws.bucket)
                .build()
                .map_err(|e| StorageError::Storage(format!("failed to create S3 store: {}", e)))?;
            Ok(Arc::new(store))
        }
        ObjectStoreConfig::Local(local) => {
            std::fs::create_dir_all(&local.path).map_err(|e| {
                StorageError::Storage(format!(
                    "failed to create storage directory '{}': {}",
                    local.path, e
                ))
            })?;
            let store = object_store::local::LocalFileSystem::new_with_prefix(&local.path)
                .map_err(|e| {
                    StorageError::Storage(format!("failed to create local store: {}", e))
                })?;
            Ok(Arc::new(store))
        }
    }
}

async fn open_slatedb(config: &SlateDbStorageConfig) -> StorageResult<SlateDbStorage> {
    let object_store = object_store(&config.object_store)?;

    let settings = match &config.settings_path {
        Some(path) => Settings::from_file(path).map_err(|e| {
            StorageError::Storage(format!("failed to load SlateDB settings from {}: {}", path, e))
        })?,
        None => Settings::load().unwrap_or_default(),
    };

    let db = DbBuilder::new(config.path.clone(), object_store)
        .with_settings(settings)
        .build()
        .await
        .map_err(|e| StorageError::Storage(format!("failed to open SlateDB: {}", e)))?;

    Ok(SlateDbStorage::new(Arc::new(db)))
}
