//! Process-wide map from subscription topic to open subscriber channels.
//!
//! Each subscriber owns the receiving half of a bounded queue; the registry
//! holds the only sender. Removing a channel from the registry therefore drops
//! its sender, which ends the subscriber's stream once buffered frames drain.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

use crate::db::models::MatchId;

/// Serialized event, shared between every channel it is written to
pub type Frame = Arc<str>;

pub type ChannelId = u64;

/// Broadcast scope a channel is registered under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// The reserved "all matches" list scope
    AllMatches,
    Match(MatchId),
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::AllMatches => f.write_str("all_matches"),
            Topic::Match(id) => write!(f, "match:{}", id),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("subscriber disconnected")]
    Closed,
    #[error("subscriber queue full")]
    Lagging,
}

/// Write handle to one subscriber's connection
#[derive(Debug, Clone)]
pub struct Channel {
    id: ChannelId,
    sender: mpsc::Sender<Frame>,
}

impl Channel {
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Queue a frame without waiting; a slow subscriber counts as a failure.
    pub fn try_write(&self, frame: Frame) -> Result<(), DeliveryError> {
        self.sender.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Lagging,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

pub struct SubscriptionRegistry {
    topics: Mutex<HashMap<Topic, HashMap<ChannelId, Channel>>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl SubscriptionRegistry {
    /// `capacity` is the number of frames buffered per subscriber.
    pub fn new(capacity: usize) -> Self {
        SubscriptionRegistry {
            topics: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Topic, HashMap<ChannelId, Channel>>> {
        // Every critical section leaves the map consistent, so a poisoned
        // guard is still usable.
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create an unregistered channel and the receiver its stream reads from.
    pub fn open_channel(&self) -> (Channel, mpsc::Receiver<Frame>) {
        let (sender, receiver) = mpsc::channel(self.capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        (Channel { id, sender }, receiver)
    }

    /// Add `channel` under `topic`, creating the topic entry on first use.
    pub fn register(&self, topic: Topic, channel: Channel) {
        let id = channel.id;
        let mut topics = self.lock();
        let channels = topics.entry(topic).or_default();
        channels.insert(id, channel);
        debug!(%topic, channel = id, subscribers = channels.len(), "channel registered");
    }

    /// Remove a channel from `topic`, dropping the topic once it is empty.
    /// Unknown topics or channels are ignored.
    pub fn unregister(&self, topic: &Topic, id: ChannelId) -> bool {
        let mut topics = self.lock();
        let Some(channels) = topics.get_mut(topic) else {
            return false;
        };
        let removed = channels.remove(&id).is_some();
        if channels.is_empty() {
            topics.remove(topic);
        }
        if removed {
            debug!(%topic, channel = id, "channel unregistered");
        }
        removed
    }

    /// Remove a channel from every topic it appears under.
    pub fn remove_channel(&self, id: ChannelId) -> usize {
        let mut topics = self.lock();
        let mut removed = 0;
        topics.retain(|topic, channels| {
            if channels.remove(&id).is_some() {
                removed += 1;
                debug!(%topic, channel = id, "channel removed");
            }
            !channels.is_empty()
        });
        removed
    }

    /// Open a channel, register it, and hand back the guard that unregisters it.
    pub fn subscribe(self: &Arc<Self>, topic: Topic) -> Subscription {
        let (channel, receiver) = self.open_channel();
        let id = channel.id;
        self.register(topic, channel);
        Subscription {
            topic,
            id,
            receiver,
            registry: Arc::clone(self),
        }
    }

    /// Copy of the channels currently under `topic`, safe to write to
    /// while other tasks register or unregister.
    pub fn channels(&self, topic: &Topic) -> Vec<Channel> {
        self.lock()
            .get(topic)
            .map(|channels| channels.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Copy of every registered channel with its topic.
    pub fn all_channels(&self) -> Vec<(Topic, Channel)> {
        self.lock()
            .iter()
            .flat_map(|(topic, channels)| channels.values().map(move |c| (*topic, c.clone())))
            .collect()
    }

    pub fn topics(&self) -> Vec<Topic> {
        self.lock().keys().copied().collect()
    }

    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.lock().get(topic).map_or(0, HashMap::len)
    }

    pub fn total_subscribers(&self) -> usize {
        self.lock().values().map(HashMap::len).sum()
    }

    /// Drop every channel, ending all open streams. Used on shutdown.
    pub fn close_all(&self) -> usize {
        let drained: Vec<_> = self.lock().drain().collect();
        drained.iter().map(|(_, channels)| channels.len()).sum()
    }
}

/// A live registration. Dropping it unregisters the channel, whatever ended
/// the stream that owned it.
pub struct Subscription {
    topic: Topic,
    id: ChannelId,
    receiver: mpsc::Receiver<Frame>,
    registry: Arc<SubscriptionRegistry>,
}

impl Subscription {
    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Next frame, or `None` once the registry has dropped this channel.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.unregister(&self.topic, self.id);
    }
}
