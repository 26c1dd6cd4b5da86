//! The view engine: incremental, checkpointed indexing of a feed.
//!
//! A [`View`] turns sanitized feed entries into index records. A
//! [`ViewEngine`] drives one view over one feed, one batch at a time:
//!
//! 1. read up to `max_batch` entries starting at the checkpoint,
//! 2. sanitize each entry, skipping rejected ones,
//! 3. re-stamp entries whose timestamp lies in the future,
//! 4. map accepted entries to records,
//! 5. commit the records and the advanced checkpoint in one batch,
//! 6. hand the accepted items, in timestamp order, to [`View::on_indexed`].
//!
//! Rejected entries still advance the checkpoint, so they are never read
//! again. A failed commit leaves nothing visible, and the batch is retried
//! from the old checkpoint. Because replay re-maps entries that may already
//! be indexed, `map` must yield the same records for the same entry.
//!
//! [`ViewEngine::spawn`] runs the engine in a task that indexes until the
//! feed is drained, then sleeps until the feed head moves.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use common::{MonotonicClock, Record, Storage};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::IndexerConfig;
use crate::error::{Error, Result};
use crate::feed::Feed;
use crate::model::{ChannelMention, FeedEntry, Reading, Sequence, Timestamp};
use crate::sanitize::Sanitize;
use crate::serde::{ViewNamespace, decode_sequence, encode_sequence};
use crate::storage::{ViewStorage, ViewStorageRead};

/// Items that carry a feed position and a timestamp the engine may correct.
pub trait Timestamped {
    fn sequence(&self) -> Sequence;
    fn timestamp(&self) -> Timestamp;
    fn set_timestamp(&mut self, timestamp: Timestamp);
}

impl Timestamped for Reading {
    fn sequence(&self) -> Sequence {
        self.sequence
    }

    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    fn set_timestamp(&mut self, timestamp: Timestamp) {
        self.timestamp = timestamp;
    }
}

impl Timestamped for ChannelMention {
    fn sequence(&self) -> Sequence {
        self.sequence
    }

    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    fn set_timestamp(&mut self, timestamp: Timestamp) {
        self.timestamp = timestamp;
    }
}

/// A materialized view over the feed.
#[async_trait]
pub trait View: Send + Sync + 'static {
    /// What an entry must sanitize into to be indexed by this view.
    type Item: Sanitize + Timestamped + Send + Sync + 'static;

    /// Scratch state shared by the `map` calls of one batch and handed to
    /// `on_indexed` once the batch commits.
    type Batch: Default + Send + 'static;

    /// Names the view's namespace and checkpoint. Must be stable.
    fn name(&self) -> &str;

    /// Produces the records for one accepted entry.
    ///
    /// Every key must lie inside `ctx.namespace()`. Must be deterministic
    /// for a given entry and committed state. An error other than a
    /// storage failure halts the view.
    async fn map(
        &self,
        ctx: &MapContext,
        batch: &mut Self::Batch,
        entry: &FeedEntry,
        item: &Self::Item,
    ) -> Result<Vec<Record>>;

    /// Called once per committed batch with the accepted items sorted by
    /// timestamp. Must not block.
    fn on_indexed(&self, _batch: Self::Batch, _items: &[Self::Item]) {}
}

/// What `map` may see: the view's namespace and its committed records.
pub struct MapContext {
    storage: ViewStorageRead,
}

impl MapContext {
    pub(crate) fn new(storage: ViewStorageRead) -> Self {
        Self { storage }
    }

    pub fn namespace(&self) -> &ViewNamespace {
        self.storage.namespace()
    }

    /// Point lookup of a committed record of this view.
    pub async fn get(&self, key: Bytes) -> Result<Option<Bytes>> {
        if !self.namespace().contains(&key) {
            return Err(Error::InvalidInput(
                "lookup outside view namespace".to_string(),
            ));
        }
        self.storage.get(key).await
    }
}

/// Outcome of one indexing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    /// Feed entries consumed, including rejected ones. 0 when idle.
    pub processed: usize,
    /// Entries that passed sanitization.
    pub accepted: usize,
    /// Records written, excluding the checkpoint.
    pub written: usize,
    /// Checkpoint after the cycle.
    pub checkpoint: Sequence,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewStatus {
    Indexing,
    Idle,
    Halted(String),
    Stopped,
}

pub struct ViewEngine<V: View> {
    view: Arc<V>,
    name: String,
    feed: Arc<dyn Feed>,
    storage: ViewStorage,
    clock: Arc<MonotonicClock>,
    config: IndexerConfig,
    checkpoint: Sequence,
    halted: Option<String>,
}

impl<V: View> ViewEngine<V> {
    /// Opens the engine, resuming from the view's stored checkpoint.
    pub async fn open(
        view: Arc<V>,
        feed: Arc<dyn Feed>,
        storage: Arc<dyn Storage>,
        clock: Arc<MonotonicClock>,
        config: IndexerConfig,
    ) -> Result<Self> {
        let name = view.name().to_string();
        let storage =
            ViewStorage::new(storage, &name).with_await_durable(config.await_durable);
        let checkpoint = storage.as_read().checkpoint().await?;
        tracing::info!(view = %name, checkpoint, "resuming view");
        Ok(Self {
            view,
            name,
            feed,
            storage,
            clock,
            config,
            checkpoint,
            halted: None,
        })
    }

    pub fn view(&self) -> &Arc<V> {
        &self.view
    }

    pub fn checkpoint(&self) -> Sequence {
        self.checkpoint
    }

    /// Runs one indexing cycle, retrying transient failures.
    ///
    /// Once this returns an error the engine is halted and every later call
    /// returns [`Error::Halted`].
    pub async fn index_batch(&mut self) -> Result<BatchSummary> {
        if let Some(reason) = &self.halted {
            return Err(Error::Halted {
                view: self.name.clone(),
                reason: reason.clone(),
            });
        }
        let mut attempt = 1;
        loop {
            match self.try_index_batch().await {
                Ok(summary) => return Ok(summary),
                Err(err) if err.is_transient() && attempt < self.config.max_attempts => {
                    tracing::warn!(
                        view = %self.name,
                        attempt,
                        checkpoint = self.checkpoint,
                        error = %err,
                        "batch failed, retrying"
                    );
                    tokio::time::sleep(self.config.retry_backoff()).await;
                    attempt += 1;
                }
                Err(err) => {
                    tracing::error!(view = %self.name, attempt, error = %err, "halting view");
                    self.halted = Some(err.to_string());
                    return Err(err);
                }
            }
        }
    }

    async fn try_index_batch(&mut self) -> Result<BatchSummary> {
        let start = self.checkpoint;
        let entries = self.feed.read(start, self.config.max_batch).await?;
        let Some(last) = entries.last() else {
            return Ok(BatchSummary {
                processed: 0,
                accepted: 0,
                written: 0,
                checkpoint: start,
            });
        };
        let next = last.sequence + 1;

        let now_ms = self.clock.now_ms();
        let mut accepted: Vec<(&FeedEntry, V::Item)> = Vec::new();
        for entry in &entries {
            match V::Item::sanitize(entry) {
                Ok(mut item) => {
                    if item.timestamp().trunc() > now_ms {
                        let corrected = self.clock.next();
                        tracing::debug!(
                            view = %self.name,
                            sequence = entry.sequence,
                            declared = item.timestamp(),
                            corrected,
                            "correcting future timestamp"
                        );
                        item.set_timestamp(corrected);
                    }
                    accepted.push((entry, item));
                }
                Err(rejection) => {
                    tracing::trace!(
                        view = %self.name,
                        sequence = entry.sequence,
                        %rejection,
                        "skipping entry"
                    );
                }
            }
        }

        let ctx = MapContext::new(self.storage.as_read().clone());
        let mut batch = V::Batch::default();
        let mut records = Vec::new();
        for (entry, item) in &accepted {
            let mapped = self
                .view
                .map(&ctx, &mut batch, entry, item)
                .await
                .map_err(|err| match err {
                    err if err.is_transient() => err,
                    err => Error::Map {
                        view: self.name.clone(),
                        message: format!("entry {}: {}", entry.sequence, err),
                    },
                })?;
            if let Some(stray) = mapped.iter().find(|r| !ctx.namespace().contains(&r.key)) {
                return Err(Error::Map {
                    view: self.name.clone(),
                    message: format!(
                        "entry {} mapped to key outside namespace: {:?}",
                        entry.sequence, stray.key
                    ),
                });
            }
            records.extend(mapped);
        }

        let written = records.len();
        self.storage.commit(records, next).await?;
        self.checkpoint = next;

        let mut items: Vec<V::Item> = accepted.into_iter().map(|(_, item)| item).collect();
        items.sort_by(|a, b| {
            a.timestamp()
                .total_cmp(&b.timestamp())
                .then(a.sequence().cmp(&b.sequence()))
        });
        let summary = BatchSummary {
            processed: entries.len(),
            accepted: items.len(),
            written,
            checkpoint: next,
        };
        tracing::debug!(
            view = %self.name,
            from = start,
            to = next,
            processed = summary.processed,
            accepted = summary.accepted,
            written,
            "indexed batch"
        );
        self.view.on_indexed(batch, &items);
        Ok(summary)
    }

    /// Indexes until the checkpoint reaches the feed head observed on entry.
    ///
    /// Returns the number of entries processed.
    pub async fn catch_up(&mut self) -> Result<u64> {
        let target = self.feed.head();
        let mut processed = 0u64;
        while self.checkpoint < target {
            let summary = self.index_batch().await?;
            if summary.processed == 0 {
                break;
            }
            processed += summary.processed as u64;
        }
        Ok(processed)
    }

    /// Drops every index record and the checkpoint, so indexing restarts
    /// from the beginning of the feed.
    pub async fn rebuild(&mut self) -> Result<()> {
        let removed = self.storage.clear().await?;
        self.checkpoint = 0;
        self.halted = None;
        tracing::info!(view = %self.name, removed, "cleared view for rebuild");
        Ok(())
    }

    /// The opaque checkpoint blob, suitable for [`ViewEngine::store_state`].
    pub async fn fetch_state(&self) -> Result<Bytes> {
        match self.storage.as_read().checkpoint_state().await? {
            Some(state) => Ok(state),
            None => Ok(encode_sequence(0)),
        }
    }

    /// Overwrites the checkpoint with a blob from [`ViewEngine::fetch_state`].
    pub async fn store_state(&mut self, state: Bytes) -> Result<()> {
        let checkpoint = decode_sequence(&state)
            .map_err(|e| Error::InvalidInput(format!("invalid checkpoint state: {}", e)))?;
        self.storage.store_checkpoint(checkpoint).await?;
        self.checkpoint = checkpoint;
        tracing::info!(view = %self.name, checkpoint, "stored view state");
        Ok(())
    }

    /// Runs the engine in a background task.
    pub fn spawn(self) -> ViewHandle<V> {
        let name = self.name.clone();
        let (state_tx, state_rx) = watch::channel(ViewState {
            status: ViewStatus::Idle,
            checkpoint: self.checkpoint,
        });
        let cancel = CancellationToken::new();
        let task = tokio::spawn(self.run(state_tx, cancel.clone()));
        ViewHandle {
            name,
            state: state_rx,
            cancel,
            task,
        }
    }

    async fn run(mut self, state: watch::Sender<ViewState>, cancel: CancellationToken) -> Self {
        let mut head = self.feed.watch();
        loop {
            if cancel.is_cancelled() {
                break;
            }
            // Mark the head seen before reading, so an append racing the
            // read still wakes the idle wait below.
            head.borrow_and_update();
            state.send_modify(|s| s.status = ViewStatus::Indexing);
            match self.index_batch().await {
                Ok(summary) => {
                    state.send_modify(|s| s.checkpoint = summary.checkpoint);
                    if summary.processed > 0 {
                        tokio::task::yield_now().await;
                        continue;
                    }
                }
                Err(err) => {
                    state.send_modify(|s| s.status = ViewStatus::Halted(err.to_string()));
                    return self;
                }
            }

            state.send_modify(|s| s.status = ViewStatus::Idle);
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = head.changed() => {
                    if changed.is_err() {
                        // Feed is gone; nothing more will arrive.
                        cancel.cancelled().await;
                        break;
                    }
                }
            }
        }
        tracing::info!(view = %self.name, checkpoint = self.checkpoint, "view stopped");
        state.send_modify(|s| s.status = ViewStatus::Stopped);
        self
    }
}

#[derive(Debug, Clone)]
struct ViewState {
    status: ViewStatus,
    checkpoint: Sequence,
}

/// Control of a spawned [`ViewEngine`].
pub struct ViewHandle<V: View> {
    name: String,
    state: watch::Receiver<ViewState>,
    cancel: CancellationToken,
    task: JoinHandle<ViewEngine<V>>,
}

impl<V: View> ViewHandle<V> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> ViewStatus {
        self.state.borrow().status.clone()
    }

    pub fn checkpoint(&self) -> Sequence {
        self.state.borrow().checkpoint
    }

    /// Waits until the view has indexed every entry below `sequence`.
    ///
    /// Fails if the view halts or stops first.
    pub async fn wait_for(&self, sequence: Sequence) -> Result<Sequence> {
        let mut state = self.state.clone();
        let reached = state
            .wait_for(|s| {
                s.checkpoint >= sequence
                    || matches!(s.status, ViewStatus::Halted(_) | ViewStatus::Stopped)
            })
            .await
            .map_err(|_| Error::Internal(format!("view '{}' task is gone", self.name)))?
            .clone();
        if reached.checkpoint >= sequence {
            return Ok(reached.checkpoint);
        }
        match reached.status {
            ViewStatus::Halted(reason) => Err(Error::Halted {
                view: self.name.clone(),
                reason,
            }),
            _ => Err(Error::Internal(format!(
                "view '{}' stopped at {} before reaching {}",
                self.name, reached.checkpoint, sequence
            ))),
        }
    }

    /// Stops the task after its current batch and returns the engine.
    pub async fn shutdown(self) -> Result<ViewEngine<V>> {
        self.cancel.cancel();
        self.task
            .await
            .map_err(|e| Error::Internal(format!("view '{}' task failed: {}", self.name, e)))
    }
}
