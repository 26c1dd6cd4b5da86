use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use slatedb::config::WriteOptions as SlateDbWriteOptions;
use slatedb::{Db, DbIterator, WriteBatch};

use crate::storage::{EmptyIterator, RecordOp, Storage, WriteOptions};
use crate::{BytesRange, Record, StorageError, StorageIterator, StorageRead, StorageResult};

/// [`Storage`] over a SlateDB database.
///
/// Each [`Storage::apply_with_options`] call becomes one SlateDB `WriteBatch`,
/// which SlateDB commits atomically.
pub struct SlateDbStorage {
    db: Arc<Db>,
}

impl SlateDbStorage {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl StorageRead for SlateDbStorage {
    #[tracing::instrument(level = "trace", skip_all)]
    async fn get(&self, key: Bytes) -> StorageResult<Option<Record>> {
        let value = self
            .db
            .get(&key)
            .await
            .map_err(StorageError::from_storage)?;
        Ok(value.map(|v| Record::new(key, v)))
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn scan_iter(
        &self,
        range: BytesRange,
    ) -> StorageResult<Box<dyn StorageIterator + Send + 'static>> {
        if range.is_empty() {
            return Ok(Box::new(EmptyIterator));
        }
        let iter = self
            .db
            .scan(range)
            .await
            .map_err(StorageError::from_storage)?;
        Ok(Box::new(SlateDbIterator { iter }))
    }
}

struct SlateDbIterator {
    iter: DbIterator,
}

#[async_trait]
impl StorageIterator for SlateDbIterator {
    #[tracing::instrument(level = "trace", skip_all)]
    async fn next(&mut self) -> StorageResult<Option<Record>> {
        match self.iter.next().await.map_err(StorageError::from_storage)? {
            Some(entry) => Ok(Some(Record::new(entry.key, entry.value))),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl Storage for SlateDbStorage {
    #[tracing::instrument(level = "trace", skip_all, fields(ops = ops.len()))]
    async fn apply_with_options(
        &self,
        ops: Vec<RecordOp>,
        options: WriteOptions,
    ) -> StorageResult<()> {
        let mut batch = WriteBatch::new();
        for op in ops {
            match op {
                RecordOp::Put(record) => batch.put(record.key, record.value),
                RecordOp::Delete(key) => batch.delete(key),
            }
        }
        let slate_options = SlateDbWriteOptions {
            await_durable: options.await_durable,
        };
        self.db
            .write_with_options(batch, &slate_options)
            .await
            .map_err(StorageError::from_storage)?;
        Ok(())
    }

    async fn flush(&self) -> StorageResult<()> {
        self.db.flush().await.map_err(StorageError::from_storage)?;
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        self.db.close().await.map_err(StorageError::from_storage)?;
        Ok(())
    }
}
