//! Wiring of storage, feed and views into one running index.

use std::ops::Range;
use std::sync::Arc;

use bytes::Bytes;
use common::clock::{Clock, SystemClock};
use common::storage::factory::create_storage;
use common::{MonotonicClock, Storage};

use crate::config::Config;
use crate::engine::{View, ViewEngine, ViewHandle, ViewStatus};
use crate::error::Result;
use crate::feed::{Feed, FeedLog};
use crate::model::Sequence;
use crate::views::{ChannelsView, ReadingsView};

/// A feed with the readings and channels views indexing it in the
/// background.
pub struct FeedIndex {
    storage: Arc<dyn Storage>,
    feed: Arc<FeedLog>,
    readings: ViewHandle<ReadingsView>,
    channels: ViewHandle<ChannelsView>,
    readings_view: Arc<ReadingsView>,
    channels_view: Arc<ChannelsView>,
}

impl FeedIndex {
    /// Opens storage from `config` and starts both views.
    pub async fn open(config: Config) -> Result<Self> {
        tracing::info!(storage = %config.storage.describe(), "opening feed index");
        let storage = create_storage(&config.storage).await?;
        Self::open_with(storage, Arc::new(SystemClock), &config).await
    }

    /// Starts both views over existing storage, resuming their checkpoints.
    pub async fn open_with(
        storage: Arc<dyn Storage>,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Result<Self> {
        let feed = Arc::new(FeedLog::open(storage.clone()).await?);
        let clock = Arc::new(MonotonicClock::new(clock));
        let capacity = config.subscriptions.capacity;
        let readings_view = Arc::new(ReadingsView::new(storage.clone(), capacity));
        let channels_view = Arc::new(ChannelsView::new(storage.clone(), capacity));

        let as_feed: Arc<dyn Feed> = feed.clone();
        let readings = ViewEngine::open(
            readings_view.clone(),
            as_feed.clone(),
            storage.clone(),
            clock.clone(),
            config.indexer.clone(),
        )
        .await?
        .spawn();
        let channels = ViewEngine::open(
            channels_view.clone(),
            as_feed,
            storage.clone(),
            clock,
            config.indexer.clone(),
        )
        .await?
        .spawn();

        Ok(Self {
            storage,
            feed,
            readings,
            channels,
            readings_view,
            channels_view,
        })
    }

    pub fn feed(&self) -> &Arc<FeedLog> {
        &self.feed
    }

    pub fn readings(&self) -> &Arc<ReadingsView> {
        &self.readings_view
    }

    pub fn channels(&self) -> &Arc<ChannelsView> {
        &self.channels_view
    }

    pub async fn append(&self, values: Vec<Bytes>) -> Result<Range<Sequence>> {
        self.feed.append(values).await
    }

    /// Waits until both views have indexed every entry below `sequence`.
    pub async fn wait_indexed(&self, sequence: Sequence) -> Result<()> {
        self.readings.wait_for(sequence).await?;
        self.channels.wait_for(sequence).await?;
        Ok(())
    }

    /// Waits until both views have indexed the whole feed.
    pub async fn sync(&self) -> Result<()> {
        self.wait_indexed(self.feed.head()).await
    }

    pub fn statuses(&self) -> Vec<(String, ViewStatus, Sequence)> {
        vec![
            (
                self.readings.name().to_string(),
                self.readings.status(),
                self.readings.checkpoint(),
            ),
            (
                self.channels.name().to_string(),
                self.channels.status(),
                self.channels.checkpoint(),
            ),
        ]
    }

    /// Drops both views and re-indexes the feed from the start.
    pub async fn rebuild(self) -> Result<Self> {
        let readings = restart(self.readings).await?;
        let channels = restart(self.channels).await?;
        Ok(Self {
            readings,
            channels,
            ..self
        })
    }

    /// Stops both views after their current batch and closes storage.
    pub async fn close(self) -> Result<()> {
        self.readings.shutdown().await?;
        self.channels.shutdown().await?;
        self.storage.flush().await?;
        self.storage.close().await?;
        tracing::info!("closed feed index");
        Ok(())
    }
}

async fn restart<V: View>(handle: ViewHandle<V>) -> Result<ViewHandle<V>> {
    let mut engine = handle.shutdown().await?;
    engine.rebuild().await?;
    Ok(engine.spawn())
}
