//! Live fan-out of indexed data.
//!
//! Subscribers register against a [`Topic`] and receive events through a
//! bounded channel. Publishing never waits: when a subscriber's buffer is
//! full the event is dropped for that subscriber, and subscribers whose
//! receiver is gone are pruned.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Events about one channel.
    Channel(String),
    /// Events about every channel.
    Global,
}

impl Topic {
    pub fn channel(name: impl Into<String>) -> Self {
        Topic::Channel(name.into())
    }
}

pub struct Subscriptions<E> {
    capacity: usize,
    subscribers: Mutex<HashMap<Topic, Vec<mpsc::Sender<E>>>>,
    dropped: AtomicU64,
}

impl<E: Clone + Send + 'static> Subscriptions<E> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subscribers: Mutex::new(HashMap::new()),
            dropped: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Topic, Vec<mpsc::Sender<E>>>> {
        // The map stays consistent even if a holder panicked.
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self, topic: Topic) -> Subscription<E> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.lock().entry(topic.clone()).or_default().push(tx);
        Subscription { topic, rx }
    }

    /// Offers `event` to every subscriber of `topic`.
    ///
    /// Returns how many subscribers accepted it.
    pub fn publish(&self, topic: &Topic, event: &E) -> usize {
        let mut subscribers = self.lock();
        let Some(senders) = subscribers.get_mut(topic) else {
            return 0;
        };
        let mut delivered = 0;
        senders.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(?topic, "subscriber full, dropping event");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });
        if senders.is_empty() {
            subscribers.remove(topic);
        }
        delivered
    }

    /// Events dropped so far because a subscriber was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.lock().get(topic).map_or(0, |senders| {
            senders.iter().filter(|tx| !tx.is_closed()).count()
        })
    }
}

/// Receiving end of one subscription. Dropping it unsubscribes.
pub struct Subscription<E> {
    topic: Topic,
    rx: mpsc::Receiver<E>,
}

impl<E> Subscription<E> {
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Waits for the next event. `None` once the publisher is gone.
    pub async fn recv(&mut self) -> Option<E> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<E> {
        self.rx.try_recv().ok()
    }
}
