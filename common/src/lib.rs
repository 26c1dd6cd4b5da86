//! Shared building blocks for feedview crates.
//!
//! - [`storage`]: the ordered key-value storage abstraction and its backends
//!   (in-memory and SlateDB), plus configuration and a factory.
//! - [`serde`]: order-preserving encodings used to build storage keys.
//! - [`clock`]: wall-clock sources, including a monotonic clock.
//! - [`util`]: byte-key ranges.

pub mod clock;
pub mod serde;
pub mod storage;
pub mod util;

pub use clock::{Clock, MonotonicClock};
pub use storage::config::StorageConfig;
pub use storage::{
    Record, RecordOp, Storage, StorageError, StorageIterator, StorageRead, StorageResult,
    WriteOptions,
};
pub use util::BytesRange;
