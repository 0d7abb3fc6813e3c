use std::sync::Arc;
use tracing::{error, warn};

use super::events::StreamEvent;
use super::registry::{Channel, Frame, SubscriptionRegistry, Topic};

/// Pushes serialized events to registered channels.
///
/// Delivery is fire-and-forget: a channel whose write fails is dropped from
/// the registry and the remaining channels still receive the frame.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<SubscriptionRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        Broadcaster { registry }
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Deliver to every channel registered under `topic` right now.
    /// Returns the number of successful writes.
    pub fn publish_to_topic(&self, topic: &Topic, event: &StreamEvent) -> usize {
        let Some(frame) = encode(event) else {
            return 0;
        };
        let targets = self
            .registry
            .channels(topic)
            .into_iter()
            .map(|c| (*topic, c))
            .collect();
        self.deliver(targets, frame)
    }

    /// Deliver to every channel under every topic.
    pub fn publish_to_all(&self, event: &StreamEvent) -> usize {
        let Some(frame) = encode(event) else {
            return 0;
        };
        self.deliver(self.registry.all_channels(), frame)
    }

    fn deliver(&self, targets: Vec<(Topic, Channel)>, frame: Frame) -> usize {
        let mut delivered = 0;
        for (topic, channel) in targets {
            match channel.try_write(Arc::clone(&frame)) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(%topic, channel = channel.id(), "dropping subscriber: {}", e);
                    self.registry.remove_channel(channel.id());
                }
            }
        }
        delivered
    }
}

fn encode(event: &StreamEvent) -> Option<Frame> {
    match event.to_json() {
        Ok(json) => Some(Frame::from(json)),
        Err(e) => {
            error!("Failed to serialize {} event: {}", event.kind(), e);
            None
        }
    }
}
