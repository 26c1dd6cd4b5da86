//! Ordered key-value storage abstraction.
//!
//! [`StorageRead`] provides point lookups and ordered forward scans;
//! [`Storage`] adds atomic batched writes. Every call to [`Storage::apply`]
//! (and the `put` helpers built on it) is all-or-nothing: readers observe
//! either none or all of a batch.

pub mod config;
pub mod factory;
pub mod in_memory;
pub mod slate;

use async_trait::async_trait;
use bytes::Bytes;

use crate::BytesRange;

/// A key-value pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: Bytes,
    pub value: Bytes,
}

impl Record {
    pub fn new(key: Bytes, value: Bytes) -> Self {
        Self { key, value }
    }
}

/// A single mutation inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOp {
    Put(Record),
    Delete(Bytes),
}

impl From<Record> for RecordOp {
    fn from(record: Record) -> Self {
        RecordOp::Put(record)
    }
}

/// Options for write operations.
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Wait for the batch to be durable before returning.
    pub await_durable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Failure reported by the storage backend.
    Storage(String),
    /// Invariant violation inside the storage layer.
    Internal(String),
}

impl StorageError {
    pub fn from_storage(err: impl std::fmt::Display) -> Self {
        StorageError::Storage(err.to_string())
    }
}

impl std::error::Error for StorageError {}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Storage(msg) => write!(f, "Storage error: {}", msg),
            StorageError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Forward iterator over records in key order.
#[async_trait]
pub trait StorageIterator {
    async fn next(&mut self) -> StorageResult<Option<Record>>;
}

/// Iterator over no records, for scans whose bounds cannot match anything.
pub(crate) struct EmptyIterator;

#[async_trait]
impl StorageIterator for EmptyIterator {
    async fn next(&mut self) -> StorageResult<Option<Record>> {
        Ok(None)
    }
}

#[async_trait]
pub trait StorageRead: Send + Sync {
    /// Returns the record stored under `key`, if any.
    async fn get(&self, key: Bytes) -> StorageResult<Option<Record>>;

    /// Scans records whose keys fall inside `range`, in ascending key order.
    ///
    /// The iterator observes committed batches only.
    async fn scan_iter(
        &self,
        range: BytesRange,
    ) -> StorageResult<Box<dyn StorageIterator + Send + 'static>>;
}

#[async_trait]
pub trait Storage: StorageRead {
    /// Applies all operations as one atomic batch.
    async fn apply(&self, ops: Vec<RecordOp>) -> StorageResult<()> {
        self.apply_with_options(ops, WriteOptions::default()).await
    }

    async fn apply_with_options(
        &self,
        ops: Vec<RecordOp>,
        options: WriteOptions,
    ) -> StorageResult<()>;

    async fn put(&self, records: Vec<Record>) -> StorageResult<()> {
        self.put_with_options(records, WriteOptions::default())
            .await
    }

    async fn put_with_options(
        &self,
        records: Vec<Record>,
        options: WriteOptions,
    ) -> StorageResult<()> {
        let ops = records.into_iter().map(RecordOp::Put).collect();
        self.apply_with_options(ops, options).await
    }

    /// Makes all previously applied batches durable.
    async fn flush(&self) -> StorageResult<()>;

    async fn close(&self) -> StorageResult<()>;
}
