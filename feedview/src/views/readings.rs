//! Time-series view of sensor readings.
//!
//! Each reading is indexed under `(channel, timestamp, sequence)` with the
//! raw feed entry as value. Reads re-derive the [`Reading`] from that entry,
//! taking the timestamp from the key so corrected timestamps survive.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use common::{Record, Storage, StorageIterator};

use crate::engine::{MapContext, View};
use crate::error::{Error, Result};
use crate::events::{Subscription, Subscriptions, Topic};
use crate::model::{FeedEntry, Reading, SeriesSet, Timestamp};
use crate::sanitize::Sanitize;
use crate::serde::{ReadingKey, ViewNamespace};
use crate::storage::ViewStorage;

pub const READINGS_VIEW: &str = "readings";

/// Bounds and order of a [`ReadingsView::read`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadOptions {
    /// Only readings strictly after this timestamp.
    pub after: Option<Timestamp>,
    /// Only readings strictly before this timestamp.
    pub before: Option<Timestamp>,
    pub limit: Option<usize>,
    /// Newest first. Defaults to `true`.
    pub reverse: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            after: None,
            before: None,
            limit: None,
            reverse: true,
        }
    }
}

impl ReadOptions {
    pub fn latest(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }
}

pub struct ReadingsView {
    storage: ViewStorage,
    events: Subscriptions<Reading>,
}

impl ReadingsView {
    pub fn new(storage: Arc<dyn Storage>, event_capacity: usize) -> Self {
        Self {
            storage: ViewStorage::new(storage, READINGS_VIEW),
            events: Subscriptions::new(event_capacity),
        }
    }

    /// Live readings for one channel (`Topic::Channel`) or all (`Topic::Global`).
    pub fn subscribe(&self, topic: Topic) -> Subscription<Reading> {
        self.events.subscribe(topic)
    }

    pub fn events(&self) -> &Subscriptions<Reading> {
        &self.events
    }

    /// Readings of `channel` within the bounds of `options`.
    ///
    /// Only committed batches are visible. The iterator is single-pass.
    ///
    /// Forward reads stream from storage and stop at `limit`. Reverse reads,
    /// the default, scan the whole bounded range before yielding anything,
    /// since storage only iterates forward: they cost time proportional to
    /// the channel's history within the bounds, keep at most `limit`
    /// records, and buffer the entire range when `limit` is `None`.
    pub async fn read(&self, channel: &str, options: ReadOptions) -> Result<ReadingIterator> {
        let read = self.storage.as_read();
        let namespace = read.namespace().clone();
        if options.limit == Some(0) {
            return Ok(ReadingIterator::buffered(namespace, VecDeque::new()));
        }
        let range = ReadingKey::scan_range(&namespace, channel, options.after, options.before);
        let mut iter = read.scan(range).await?;
        if !options.reverse {
            return Ok(ReadingIterator {
                namespace,
                source: Source::Forward(iter),
                remaining: options.limit,
            });
        }

        // Storage iterates forward only; keep the tail of the range.
        let mut tail = VecDeque::new();
        while let Some(record) = iter.next().await? {
            tail.push_back(record);
            if options.limit.is_some_and(|limit| tail.len() > limit) {
                tail.pop_front();
            }
        }
        Ok(ReadingIterator::buffered(namespace, tail))
    }

    /// Readings of `channel` regrouped by field and device, oldest first.
    pub async fn series(&self, channel: &str, options: ReadOptions) -> Result<SeriesSet> {
        let mut iter = self.read(channel, options).await?;
        let mut readings = Vec::new();
        while let Some(reading) = iter.next().await? {
            readings.push(reading);
        }
        if options.reverse {
            readings.reverse();
        }
        let mut series = SeriesSet::default();
        for reading in &readings {
            series.push(reading);
        }
        Ok(series)
    }
}

#[async_trait]
impl View for ReadingsView {
    type Item = Reading;
    type Batch = ();

    fn name(&self) -> &str {
        READINGS_VIEW
    }

    async fn map(
        &self,
        ctx: &MapContext,
        _batch: &mut (),
        entry: &FeedEntry,
        item: &Reading,
    ) -> Result<Vec<Record>> {
        let key = ReadingKey::new(item.channel.as_str(), item.timestamp, item.sequence)
            .serialize(ctx.namespace())?;
        Ok(vec![Record::new(key, entry.value.clone())])
    }

    fn on_indexed(&self, _batch: (), items: &[Reading]) {
        for reading in items {
            self.events
                .publish(&Topic::channel(reading.channel.as_str()), reading);
            self.events.publish(&Topic::Global, reading);
        }
    }
}

enum Source {
    Forward(Box<dyn StorageIterator + Send + 'static>),
    /// Records in ascending key order, consumed from the back.
    Reversed(VecDeque<Record>),
}

/// Lazy, single-pass sequence of readings.
pub struct ReadingIterator {
    namespace: ViewNamespace,
    source: Source,
    remaining: Option<usize>,
}

impl ReadingIterator {
    fn buffered(namespace: ViewNamespace, records: VecDeque<Record>) -> Self {
        Self {
            namespace,
            source: Source::Reversed(records),
            remaining: None,
        }
    }

    pub async fn next(&mut self) -> Result<Option<Reading>> {
        if self.remaining == Some(0) {
            return Ok(None);
        }
        let record = match &mut self.source {
            Source::Forward(iter) => iter.next().await?,
            Source::Reversed(records) => records.pop_back(),
        };
        let Some(record) = record else {
            return Ok(None);
        };
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }
        self.decode(record).map(Some)
    }

    fn decode(&self, record: Record) -> Result<Reading> {
        let key = ReadingKey::deserialize(&self.namespace, &record.key)?;
        let entry = FeedEntry::new(key.sequence, record.value);
        let mut reading = Reading::sanitize(&entry).map_err(|rejection| {
            Error::Encoding(format!(
                "indexed entry {} no longer sanitizes: {}",
                key.sequence, rejection
            ))
        })?;
        reading.timestamp = key.timestamp;
        Ok(reading)
    }
}
