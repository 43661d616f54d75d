//! Fan-out of accepted publishes to in-process subscribers.
//!
//! The feed is a notification channel only. The index stays the source of
//! truth: a subscriber that lags and loses events can always re-read the
//! index, and nothing is published through the feed that the index has not
//! already accepted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;
use verdist_types::{FileInfo, FileName};

/// Default capacity of each subscriber's channel.
pub const DEFAULT_FEED_CAPACITY: usize = 256;

/// One accepted publish.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PublishEvent {
    /// Position of this event in the feed, starting at 1.
    pub sequence: u64,
    pub info: FileInfo,
}

/// Which events a subscriber receives.
#[derive(Clone, Debug, Default)]
pub struct FeedFilter {
    /// If set, only events for these file names are delivered.
    pub filenames: Option<Vec<FileName>>,
}

impl FeedFilter {
    pub fn files(filenames: impl IntoIterator<Item = FileName>) -> Self {
        Self {
            filenames: Some(filenames.into_iter().collect()),
        }
    }

    pub fn matches(&self, event: &PublishEvent) -> bool {
        match &self.filenames {
            Some(names) => names.contains(&event.info.filename),
            None => true,
        }
    }
}

/// Receiving end of a feed subscription.
pub type FeedStream = broadcast::Receiver<PublishEvent>;

struct Subscriber {
    filter: FeedFilter,
    sender: broadcast::Sender<PublishEvent>,
}

/// Broadcasts accepted publishes to filtered subscribers.
///
/// Cloning shares the subscriber list and sequence counter.
#[derive(Clone)]
pub struct PublishFeed {
    subscribers: Arc<RwLock<Vec<Subscriber>>>,
    sequence: Arc<AtomicU64>,
    capacity: usize,
}

impl PublishFeed {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Arc::default(),
            sequence: Arc::default(),
            capacity: capacity.max(1),
        }
    }

    pub fn subscribe(&self, filter: FeedFilter) -> FeedStream {
        let (sender, rx) = broadcast::channel(self.capacity);
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber { filter, sender });
        rx
    }

    /// Deliver `info` to every matching subscriber and return the event.
    ///
    /// Subscribers whose receivers were dropped are pruned.
    pub fn publish(&self, info: FileInfo) -> PublishEvent {
        // Numbered under the lock so subscribers see sequences in order.
        let mut subs = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let event = PublishEvent {
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed) + 1,
            info,
        };
        let mut delivered = 0usize;
        subs.retain(|sub| {
            if sub.filter.matches(&event) {
                let alive = sub.sender.send(event.clone()).is_ok();
                delivered += usize::from(alive);
                alive
            } else {
                sub.sender.receiver_count() > 0
            }
        });
        debug!(
            sequence = event.sequence,
            filename = %event.info.filename,
            delivered,
            "publish event routed"
        );
        event
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for PublishFeed {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_CAPACITY)
    }
}

impl std::fmt::Debug for PublishFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishFeed")
            .field("subscribers", &self.subscriber_count())
            .field("capacity", &self.capacity)
            .finish()
    }
}
