//! Feedview - live materialized views over an append-only feed.
//!
//! Feed entries are small JSON messages from many authors. Feedview indexes
//! them incrementally into an ordered key-value store, so an application can
//! answer "the latest readings of this channel" or "every channel seen so far"
//! without rescanning the feed, and can follow new data as it is indexed.
//!
//! # Architecture
//!
//! Each [`View`] owns a disjoint namespace of the store and a checkpoint. A
//! [`ViewEngine`] pulls bounded batches from the [`Feed`] starting at the
//! checkpoint, sanitizes entries into typed items, maps them to records and
//! commits the records together with the advanced checkpoint in one atomic
//! batch. Readers therefore only ever see whole batches, and a crash replays
//! at most the batch that was in flight.
//!
//! Two views are provided:
//!
//! - [`ReadingsView`]: sensor readings keyed by channel and timestamp, read
//!   newest first with optional time bounds.
//! - [`ChannelsView`]: the registry of channels, announcing each new one.
//!
//! [`FeedIndex`] wires a [`FeedLog`] and both views over one storage handle
//! and runs their engines in the background.
//!
//! # Example
//!
//! ```ignore
//! use feedview::{Config, FeedIndex, ReadOptions};
//!
//! let index = FeedIndex::open(Config::default()).await?;
//! index.append(vec![entry_bytes]).await?;
//! index.sync().await?;
//!
//! let mut readings = index.readings().read("greenhouse", ReadOptions::latest(10)).await?;
//! while let Some(reading) = readings.next().await? {
//!     println!("{} {:?}", reading.timestamp, reading.fields);
//! }
//! ```

mod config;
mod engine;
mod error;
mod events;
mod feed;
mod index;
mod model;
mod sanitize;
mod serde;
mod storage;
mod views;

pub use config::{Config, IndexerConfig, SubscriptionConfig, load_config};
pub use engine::{BatchSummary, MapContext, Timestamped, View, ViewEngine, ViewHandle, ViewStatus};
pub use error::{Error, Result};
pub use events::{Subscription, Subscriptions, Topic};
pub use feed::{Feed, FeedLog};
pub use index::FeedIndex;
pub use model::{
    ChannelMention, FeedEntry, Point, Reading, SeriesSet, Sequence, Timestamp,
};
pub use sanitize::{Rejection, SENSOR_TYPE_PREFIX, Sanitize};
pub use serde::{ChannelKey, KeyValue, ReadingKey, ViewNamespace};
pub use views::{
    CHANNELS_VIEW, ChannelBatch, ChannelsView, READINGS_VIEW, ReadOptions, ReadingIterator,
    ReadingsView,
};
