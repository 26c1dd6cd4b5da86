use std::collections::BTreeMap;
use std::ops::RangeBounds;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;

use crate::storage::{EmptyIterator, RecordOp, Storage, WriteOptions};
use crate::{BytesRange, Record, StorageError, StorageIterator, StorageRead, StorageResult};

/// In-memory storage backed by a `BTreeMap`.
///
/// Batches are applied under a single write lock, and scans copy the matching
/// records up front, so every iterator sees a point-in-time view.
#[derive(Default)]
pub struct InMemoryStorage {
    data: RwLock<BTreeMap<Bytes, Bytes>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> StorageError {
        StorageError::Internal("in-memory storage lock poisoned".to_string())
    }
}

#[async_trait]
impl StorageRead for InMemoryStorage {
    async fn get(&self, key: Bytes) -> StorageResult<Option<Record>> {
        let data = self.data.read().map_err(|_| Self::poisoned())?;
        Ok(data.get(&key).map(|v| Record::new(key, v.clone())))
    }

    async fn scan_iter(
        &self,
        range: BytesRange,
    ) -> StorageResult<Box<dyn StorageIterator + Send + 'static>> {
        if range.is_empty() {
            return Ok(Box::new(EmptyIterator));
        }
        let data = self.data.read().map_err(|_| Self::poisoned())?;
        let records: Vec<Record> = data
            .range::<Bytes, _>((range.start_bound(), range.end_bound()))
            .map(|(k, v)| Record::new(k.clone(), v.clone()))
            .collect();
        Ok(Box::new(InMemoryIterator {
            records: records.into_iter(),
        }))
    }
}

struct InMemoryIterator {
    records: std::vec::IntoIter<Record>,
}

#[async_trait]
impl StorageIterator for InMemoryIterator {
    async fn next(&mut self) -> StorageResult<Option<Record>> {
        Ok(self.records.next())
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn apply_with_options(
        &self,
        ops: Vec<RecordOp>,
        _options: WriteOptions,
    ) -> StorageResult<()> {
        let mut data = self.data.write().map_err(|_| Self::poisoned())?;
        for op in ops {
            match op {
                RecordOp::Put(record) => {
                    data.insert(record.key, record.value);
                }
                RecordOp::Delete(key) => {
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn flush(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(storage: &InMemoryStorage, range: BytesRange) -> Vec<Record> {
        let mut iter = storage.scan_iter(range).await.unwrap();
        let mut records = Vec::new();
        while let Some(record) = iter.next().await.unwrap() {
            records.push(record);
        }
        records
    }

    #[tokio::test]
    async fn should_get_record_when_present() {
        // given
        let storage = InMemoryStorage::new();
        storage
            .put(vec![Record::new(Bytes::from("k"), Bytes::from("v"))])
            .await
            .unwrap();

        // when
        let record = storage.get(Bytes::from("k")).await.unwrap();

        // then
        assert_eq!(record.unwrap().value, Bytes::from("v"));
        assert!(storage.get(Bytes::from("missing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn should_scan_in_key_order_within_range() {
        // given
        let storage = InMemoryStorage::new();
        storage
            .put(vec![
                Record::new(Bytes::from("c"), Bytes::from("3")),
                Record::new(Bytes::from("a"), Bytes::from("1")),
                Record::new(Bytes::from("b"), Bytes::from("2")),
                Record::new(Bytes::from("d"), Bytes::from("4")),
            ])
            .await
            .unwrap();

        // when
        let records = collect(
            &storage,
            BytesRange::new(
                std::ops::Bound::Excluded(Bytes::from("a")),
                std::ops::Bound::Excluded(Bytes::from("d")),
            ),
        )
        .await;

        // then
        let keys: Vec<_> = records.iter().map(|r| r.key.clone()).collect();
        assert_eq!(keys, vec![Bytes::from("b"), Bytes::from("c")]);
    }

    #[tokio::test]
    async fn should_apply_puts_and_deletes_together() {
        // given
        let storage = InMemoryStorage::new();
        storage
            .put(vec![Record::new(Bytes::from("old"), Bytes::from("x"))])
            .await
            .unwrap();

        // when
        storage
            .apply(vec![
                RecordOp::Delete(Bytes::from("old")),
                RecordOp::Put(Record::new(Bytes::from("new"), Bytes::from("y"))),
            ])
            .await
            .unwrap();

        // then
        let records = collect(&storage, BytesRange::unbounded()).await;
        assert_eq!(records, vec![Record::new(Bytes::from("new"), Bytes::from("y"))]);
    }

    #[tokio::test]
    async fn should_not_observe_writes_after_scan_started() {
        // given
        let storage = InMemoryStorage::new();
        storage
            .put(vec![Record::new(Bytes::from("a"), Bytes::from("1"))])
            .await
            .unwrap();
        let mut iter = storage.scan_iter(BytesRange::unbounded()).await.unwrap();

        // when
        storage
            .put(vec![Record::new(Bytes::from("b"), Bytes::from("2"))])
            .await
            .unwrap();

        // then
        assert_eq!(iter.next().await.unwrap().unwrap().key, Bytes::from("a"));
        assert!(iter.next().await.unwrap().is_none());
    }
}
