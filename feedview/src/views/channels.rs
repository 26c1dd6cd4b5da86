//! Channel discovery.
//!
//! Keeps a registry of every channel named by a sensor entry and announces
//! each channel the first time it is registered. Whether a channel is new is
//! decided by a point lookup against committed state plus the set of
//! channels already seen in the current batch, so repeated mentions within
//! one batch register the channel once.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use common::{Record, Storage};

use crate::engine::{MapContext, View};
use crate::error::Result;
use crate::events::{Subscription, Subscriptions, Topic};
use crate::model::{ChannelMention, FeedEntry};
use crate::serde::ChannelKey;
use crate::storage::ViewStorage;

pub const CHANNELS_VIEW: &str = "channels";

/// Per-batch discovery state.
#[derive(Debug, Default)]
pub struct ChannelBatch {
    seen: HashSet<String>,
    /// Channels registered by this batch, in first-seen order.
    added: Vec<String>,
}

pub struct ChannelsView {
    storage: ViewStorage,
    events: Subscriptions<String>,
}

impl ChannelsView {
    pub fn new(storage: Arc<dyn Storage>, event_capacity: usize) -> Self {
        Self {
            storage: ViewStorage::new(storage, CHANNELS_VIEW),
            events: Subscriptions::new(event_capacity),
        }
    }

    /// Newly discovered channel names, published on `Topic::Global`.
    pub fn subscribe(&self) -> Subscription<String> {
        self.events.subscribe(Topic::Global)
    }

    pub fn events(&self) -> &Subscriptions<String> {
        &self.events
    }

    /// Every registered channel, ordered by name bytes.
    pub async fn list(&self) -> Result<Vec<String>> {
        let read = self.storage.as_read();
        let mut iter = read.scan(ChannelKey::scan_range(read.namespace())).await?;
        let mut names = Vec::new();
        while let Some(record) = iter.next().await? {
            names.push(ChannelKey::deserialize(read.namespace(), &record.key)?.name);
        }
        Ok(names)
    }

    pub async fn contains(&self, name: &str) -> Result<bool> {
        let read = self.storage.as_read();
        let key = ChannelKey::new(name).serialize(read.namespace());
        Ok(read.get(key).await?.is_some())
    }
}

#[async_trait]
impl View for ChannelsView {
    type Item = ChannelMention;
    type Batch = ChannelBatch;

    fn name(&self) -> &str {
        CHANNELS_VIEW
    }

    async fn map(
        &self,
        ctx: &MapContext,
        batch: &mut ChannelBatch,
        _entry: &FeedEntry,
        item: &ChannelMention,
    ) -> Result<Vec<Record>> {
        if batch.seen.contains(&item.channel) {
            return Ok(Vec::new());
        }
        batch.seen.insert(item.channel.clone());

        let key = ChannelKey::new(item.channel.as_str()).serialize(ctx.namespace());
        if ctx.get(key.clone()).await?.is_some() {
            return Ok(Vec::new());
        }
        batch.added.push(item.channel.clone());
        Ok(vec![Record::new(key, Bytes::new())])
    }

    fn on_indexed(&self, batch: ChannelBatch, _items: &[ChannelMention]) {
        for name in batch.added {
            tracing::info!(channel = %name, "discovered channel");
            self.events.publish(&Topic::Global, &name);
        }
    }
}

#[cfg(test)]
mod tests {
    use common::storage::in_memory::InMemoryStorage;

    use super::*;

    fn mention(sequence: u64, channel: &str) -> ChannelMention {
        ChannelMention {
            sequence,
            channel: channel.to_string(),
            timestamp: 1.0,
        }
    }

    /// Maps and commits one batch the way the engine would.
    async fn index(view: &ChannelsView, mentions: &[ChannelMention]) -> usize {
        let ctx = MapContext::new(view.storage.as_read().clone());
        let entry = FeedEntry::new(0, Bytes::new());
        let mut batch = ChannelBatch::default();
        let mut records = Vec::new();
        for mention in mentions {
            records.extend(view.map(&ctx, &mut batch, &entry, mention).await.unwrap());
        }
        let written = records.len();
        let next = mentions.last().map_or(0, |m| m.sequence + 1);
        view.storage.commit(records, next).await.unwrap();
        view.on_indexed(batch, mentions);
        written
    }

    fn drain(sub: &mut Subscription<String>) -> Vec<String> {
        std::iter::from_fn(|| sub.try_recv()).collect()
    }

    #[tokio::test]
    async fn should_register_each_channel_once_within_batch() {
        // given
        let view = ChannelsView::new(Arc::new(InMemoryStorage::new()), 16);
        let mut added = view.subscribe();

        // when
        let written = index(
            &view,
            &[mention(0, "barn"), mention(1, "attic"), mention(2, "barn")],
        )
        .await;

        // then
        assert_eq!(written, 2);
        assert_eq!(drain(&mut added), vec!["barn", "attic"]);
        assert_eq!(view.list().await.unwrap(), vec!["attic", "barn"]);
    }

    #[tokio::test]
    async fn should_not_announce_known_channel_in_later_batch() {
        // given
        let view = ChannelsView::new(Arc::new(InMemoryStorage::new()), 16);
        index(&view, &[mention(0, "barn")]).await;
        let mut added = view.subscribe();

        // when
        let written = index(&view, &[mention(1, "barn"), mention(2, "silo")]).await;

        // then
        assert_eq!(written, 1);
        assert_eq!(drain(&mut added), vec!["silo"]);
    }

    #[tokio::test]
    async fn should_answer_membership() {
        // given
        let view = ChannelsView::new(Arc::new(InMemoryStorage::new()), 16);

        // when
        index(&view, &[mention(0, "barn")]).await;

        // then
        assert!(view.contains("barn").await.unwrap());
        assert!(!view.contains("bar").await.unwrap());
        assert!(!view.contains("barn2").await.unwrap());
    }
}
