//! The append-only feed that views index.
//!
//! Views consume the feed through the [`Feed`] trait: an ordered, replayable
//! sequence of entries addressed by [`Sequence`], plus a watch channel that
//! announces new entries. [`FeedLog`] is the local implementation, stored in
//! the same [`Storage`] as the views.

use std::ops::Range;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use common::{Record, Storage, WriteOptions};
use tokio::sync::{Mutex, watch};

use crate::error::{Error, Result};
use crate::model::{FeedEntry, Sequence};
use crate::serde::{FeedEntryKey, decode_sequence, encode_sequence, feed_head_key};

#[async_trait]
pub trait Feed: Send + Sync {
    /// Up to `limit` entries with `sequence >= start`, in sequence order.
    async fn read(&self, start: Sequence, limit: usize) -> Result<Vec<FeedEntry>>;

    /// The next sequence to be assigned. Every entry below it is readable.
    fn head(&self) -> Sequence;

    /// Receives the head each time it advances.
    fn watch(&self) -> watch::Receiver<Sequence>;
}

/// A single-writer feed persisted in [`Storage`].
///
/// Entries are keyed by sequence. The head record is written in the same
/// batch as the entries it covers, so a reopened feed never reuses a
/// sequence.
pub struct FeedLog {
    storage: Arc<dyn Storage>,
    /// Next sequence to assign. Held across the write so appends serialize.
    next: Mutex<Sequence>,
    head: watch::Sender<Sequence>,
}

impl FeedLog {
    pub async fn open(storage: Arc<dyn Storage>) -> Result<Self> {
        let head = match storage.get(feed_head_key()).await? {
            Some(record) => decode_sequence(&record.value)?,
            None => 0,
        };
        tracing::info!(head, "opened feed");
        let (tx, _) = watch::channel(head);
        Ok(Self {
            storage,
            next: Mutex::new(head),
            head: tx,
        })
    }

    /// Appends raw entries, returning the sequences they were assigned.
    ///
    /// Returns once the entries are durable, so views never index an entry
    /// a crash could still lose.
    pub async fn append(&self, values: Vec<Bytes>) -> Result<Range<Sequence>> {
        self.append_with_options(
            values,
            WriteOptions {
                await_durable: true,
            },
        )
        .await
    }

    pub async fn append_with_options(
        &self,
        values: Vec<Bytes>,
        options: WriteOptions,
    ) -> Result<Range<Sequence>> {
        let mut next = self.next.lock().await;
        let start = *next;
        if values.is_empty() {
            return Ok(start..start);
        }

        // Build: entries plus the advanced head.
        let end = start
            .checked_add(values.len() as u64)
            .ok_or_else(|| Error::Internal("feed sequence overflow".to_string()))?;
        let mut records: Vec<Record> = values
            .into_iter()
            .zip(start..end)
            .map(|(value, sequence)| Record::new(FeedEntryKey::new(sequence).serialize(), value))
            .collect();
        records.push(Record::new(feed_head_key(), encode_sequence(end)));

        // Write: one atomic batch.
        self.storage.put_with_options(records, options).await?;

        // Apply: only after the batch is committed.
        *next = end;
        self.head.send_replace(end);
        tracing::debug!(start, end, "appended to feed");
        Ok(start..end)
    }
}

#[async_trait]
impl Feed for FeedLog {
    async fn read(&self, start: Sequence, limit: usize) -> Result<Vec<FeedEntry>> {
        let mut entries = Vec::new();
        if limit == 0 {
            return Ok(entries);
        }
        let mut iter = self
            .storage
            .scan_iter(FeedEntryKey::scan_from(start))
            .await?;
        while let Some(record) = iter.next().await? {
            let key = FeedEntryKey::deserialize(&record.key)?;
            entries.push(FeedEntry::new(key.sequence, record.value));
            if entries.len() >= limit {
                break;
            }
        }
        Ok(entries)
    }

    fn head(&self) -> Sequence {
        *self.head.borrow()
    }

    fn watch(&self) -> watch::Receiver<Sequence> {
        self.head.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use common::storage::in_memory::InMemoryStorage;

    use super::*;

    fn values(items: &[&'static str]) -> Vec<Bytes> {
        items.iter().map(|s| Bytes::from_static(s.as_bytes())).collect()
    }

    #[tokio::test]
    async fn should_assign_consecutive_sequences() {
        // given
        let feed = FeedLog::open(Arc::new(InMemoryStorage::new())).await.unwrap();

        // when
        let first = feed.append(values(&["a", "b"])).await.unwrap();
        let second = feed.append(values(&["c"])).await.unwrap();

        // then
        assert_eq!(first, 0..2);
        assert_eq!(second, 2..3);
        assert_eq!(feed.head(), 3);
    }

    #[tokio::test]
    async fn should_read_from_start_up_to_limit() {
        // given
        let feed = FeedLog::open(Arc::new(InMemoryStorage::new())).await.unwrap();
        feed.append(values(&["a", "b", "c", "d"])).await.unwrap();

        // when
        let entries = feed.read(1, 2).await.unwrap();

        // then
        assert_eq!(
            entries,
            vec![FeedEntry::new(1, "b"), FeedEntry::new(2, "c")]
        );
        assert!(feed.read(4, 10).await.unwrap().is_empty());
        assert!(feed.read(0, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_resume_head_after_reopen() {
        // given
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let feed = FeedLog::open(storage.clone()).await.unwrap();
        feed.append(values(&["a", "b"])).await.unwrap();

        // when
        let reopened = FeedLog::open(storage).await.unwrap();
        let range = reopened.append(values(&["c"])).await.unwrap();

        // then
        assert_eq!(range, 2..3);
        assert_eq!(reopened.read(0, 10).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn should_notify_watchers_of_new_head() {
        // given
        let feed = FeedLog::open(Arc::new(InMemoryStorage::new())).await.unwrap();
        let mut rx = feed.watch();

        // when
        feed.append(values(&["a"])).await.unwrap();

        // then
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), 1);
    }

    #[tokio::test]
    async fn should_ignore_empty_append() {
        // given
        let feed = FeedLog::open(Arc::new(InMemoryStorage::new())).await.unwrap();

        // when
        let range = feed.append(Vec::new()).await.unwrap();

        // then
        assert!(range.is_empty());
        assert_eq!(feed.head(), 0);
    }
}
