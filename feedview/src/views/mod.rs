//! The concrete views: readings by channel and time, and channel discovery.

pub mod channels;
pub mod readings;

pub use channels::{CHANNELS_VIEW, ChannelBatch, ChannelsView};
pub use readings::{READINGS_VIEW, ReadOptions, ReadingIterator, ReadingsView};
