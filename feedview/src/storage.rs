//! View-scoped storage access.
//!
//! [`ViewStorage`] confines a view to its namespace and its checkpoint.
//! Index writes and the checkpoint always go to storage in one batch.

use std::sync::Arc;

use bytes::Bytes;
use common::{BytesRange, Record, RecordOp, Storage, StorageIterator, WriteOptions};

use crate::error::{Error, Result};
use crate::model::Sequence;
use crate::serde::{CheckpointKey, ViewNamespace, decode_sequence, encode_sequence};

/// Read side of a view's storage.
#[derive(Clone)]
pub(crate) struct ViewStorageRead {
    storage: Arc<dyn Storage>,
    namespace: ViewNamespace,
    checkpoint_key: Bytes,
}

impl ViewStorageRead {
    pub(crate) fn namespace(&self) -> &ViewNamespace {
        &self.namespace
    }

    pub(crate) async fn get(&self, key: Bytes) -> Result<Option<Bytes>> {
        let record = self.storage.get(key).await?;
        Ok(record.map(|r| r.value))
    }

    /// The raw checkpoint blob, if one was ever written.
    pub(crate) async fn checkpoint_state(&self) -> Result<Option<Bytes>> {
        self.get(self.checkpoint_key.clone()).await
    }

    /// Next sequence to index; 0 for a view that has never committed.
    pub(crate) async fn checkpoint(&self) -> Result<Sequence> {
        match self.checkpoint_state().await? {
            Some(value) => decode_sequence(&value),
            None => Ok(0),
        }
    }

    pub(crate) async fn scan(
        &self,
        range: BytesRange,
    ) -> Result<Box<dyn StorageIterator + Send + 'static>> {
        Ok(self.storage.scan_iter(range).await?)
    }
}

#[derive(Clone)]
pub(crate) struct ViewStorage {
    storage: Arc<dyn Storage>,
    read: ViewStorageRead,
    /// Applied to every commit and clear. Durable unless configured otherwise.
    write_options: WriteOptions,
}

impl ViewStorage {
    pub(crate) fn new(storage: Arc<dyn Storage>, view: &str) -> Self {
        let read = ViewStorageRead {
            storage: storage.clone(),
            namespace: ViewNamespace::new(view),
            checkpoint_key: CheckpointKey::serialize(view),
        };
        Self {
            storage,
            read,
            write_options: WriteOptions {
                await_durable: true,
            },
        }
    }

    pub(crate) fn with_await_durable(mut self, await_durable: bool) -> Self {
        self.write_options.await_durable = await_durable;
        self
    }

    pub(crate) fn as_read(&self) -> &ViewStorageRead {
        &self.read
    }

    /// Writes index records and the new checkpoint as one batch.
    ///
    /// Returns once the batch is durable, unless durability was turned off.
    pub(crate) async fn commit(&self, records: Vec<Record>, checkpoint: Sequence) -> Result<()> {
        if let Some(stray) = records.iter().find(|r| !self.read.namespace.contains(&r.key)) {
            return Err(Error::Internal(format!(
                "refusing to write key outside view namespace: {:?}",
                stray.key
            )));
        }
        let mut ops: Vec<RecordOp> = records.into_iter().map(RecordOp::Put).collect();
        ops.push(RecordOp::Put(Record::new(
            self.read.checkpoint_key.clone(),
            encode_sequence(checkpoint),
        )));
        self.storage
            .apply_with_options(ops, self.write_options.clone())
            .await?;
        Ok(())
    }

    pub(crate) async fn store_checkpoint(&self, checkpoint: Sequence) -> Result<()> {
        self.commit(Vec::new(), checkpoint).await
    }

    /// Deletes every index record and the checkpoint in one batch.
    ///
    /// Returns the number of index records removed.
    pub(crate) async fn clear(&self) -> Result<usize> {
        let mut iter = self.read.scan(self.read.namespace.range()).await?;
        let mut ops = Vec::new();
        while let Some(record) = iter.next().await? {
            ops.push(RecordOp::Delete(record.key));
        }
        let removed = ops.len();
        ops.push(RecordOp::Delete(self.read.checkpoint_key.clone()));
        self.storage
            .apply_with_options(ops, self.write_options.clone())
            .await?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use common::storage::in_memory::InMemoryStorage;

    use super::*;
    use crate::serde::ChannelKey;

    fn key(storage: &ViewStorage, name: &str) -> Bytes {
        ChannelKey::new(name).serialize(storage.as_read().namespace())
    }

    #[tokio::test]
    async fn should_start_at_checkpoint_zero() {
        let storage = ViewStorage::new(Arc::new(InMemoryStorage::new()), "channels");
        assert_eq!(storage.as_read().checkpoint().await.unwrap(), 0);
        assert!(storage.as_read().checkpoint_state().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn should_commit_records_with_checkpoint() {
        // given
        let storage = ViewStorage::new(Arc::new(InMemoryStorage::new()), "channels");
        let record = Record::new(key(&storage, "barn"), Bytes::new());

        // when
        storage.commit(vec![record.clone()], 12).await.unwrap();

        // then
        let read = storage.as_read();
        assert_eq!(read.checkpoint().await.unwrap(), 12);
        assert_eq!(read.get(record.key).await.unwrap(), Some(Bytes::new()));
    }

    #[tokio::test]
    async fn should_refuse_keys_outside_namespace() {
        // given
        let storage = ViewStorage::new(Arc::new(InMemoryStorage::new()), "channels");
        let stray = Record::new(Bytes::from_static(b"elsewhere"), Bytes::new());

        // when
        let result = storage.commit(vec![stray], 1).await;

        // then
        assert!(matches!(result, Err(Error::Internal(_))));
        assert_eq!(storage.as_read().checkpoint().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn should_clear_only_own_namespace() {
        // given
        let backend: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let mine = ViewStorage::new(backend.clone(), "channels");
        let other = ViewStorage::new(backend, "channels-v2");
        mine.commit(
            vec![
                Record::new(key(&mine, "a"), Bytes::new()),
                Record::new(key(&mine, "b"), Bytes::new()),
            ],
            5,
        )
        .await
        .unwrap();
        other
            .commit(vec![Record::new(key(&other, "a"), Bytes::new())], 3)
            .await
            .unwrap();

        // when
        let removed = mine.clear().await.unwrap();

        // then
        assert_eq!(removed, 2);
        assert_eq!(mine.as_read().checkpoint().await.unwrap(), 0);
        assert!(mine.as_read().get(key(&mine, "a")).await.unwrap().is_none());
        assert_eq!(other.as_read().checkpoint().await.unwrap(), 3);
        assert!(other.as_read().get(key(&other, "a")).await.unwrap().is_some());
    }
}
