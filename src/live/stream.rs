//! Per-connection lifecycle of a stream subscriber.
//!
//! ```text
//!  CONNECTING ──snapshot──▶ STREAMING ──disconnect / write failure / close_all──▶ CLOSED
//!                               │ ▲
//!                               └─┘ frames from the registry, PING every interval
//! ```
//!
//! CLOSED is reached by dropping the stream: the transport drops it when the
//! client goes away or a write (including a ping) fails, and the stream ends on
//! its own once the registry drops its channel. Either way the owned
//! [`Subscription`] is dropped, which unregisters the channel.

use axum::response::sse::Event;
use futures_util::stream::{self, Stream};
use std::convert::Infallible;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error};

use super::events::StreamEvent;
use super::registry::{Frame, Subscription};

enum Phase {
    Connecting {
        snapshot: Option<StreamEvent>,
        subscription: Subscription,
    },
    Streaming {
        subscription: Subscription,
        ping: Interval,
    },
}

enum Next {
    Frame(Option<Frame>),
    Ping,
}

/// Build the SSE body for an already registered subscription.
///
/// The snapshot, if any, is always the first event written; frames published
/// after registration follow it in order.
pub fn subscriber_stream(
    snapshot: Option<StreamEvent>,
    subscription: Subscription,
    ping_every: Duration,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    stream::unfold(
        Phase::Connecting {
            snapshot,
            subscription,
        },
        move |phase| async move {
            match phase {
                Phase::Connecting {
                    snapshot,
                    subscription,
                } => {
                    debug!(topic = %subscription.topic(), channel = subscription.id(), "stream open");
                    let mut ping = interval_at(Instant::now() + ping_every, ping_every);
                    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    match snapshot.as_ref().and_then(encode) {
                        Some(event) => Some((Ok(event), Phase::Streaming { subscription, ping })),
                        None => next_event(subscription, ping).await,
                    }
                }
                Phase::Streaming { subscription, ping } => next_event(subscription, ping).await,
            }
        },
    )
}

async fn next_event(
    mut subscription: Subscription,
    mut ping: Interval,
) -> Option<(Result<Event, Infallible>, Phase)> {
    loop {
        let next = tokio::select! {
            frame = subscription.recv() => Next::Frame(frame),
            _ = ping.tick() => Next::Ping,
        };
        let event = match next {
            Next::Frame(Some(frame)) => Event::default().data(&*frame),
            Next::Frame(None) => {
                debug!(topic = %subscription.topic(), channel = subscription.id(), "stream closed by registry");
                return None;
            }
            Next::Ping => match encode(&StreamEvent::Ping) {
                Some(event) => event,
                None => continue,
            },
        };
        return Some((Ok(event), Phase::Streaming { subscription, ping }));
    }
}

fn encode(event: &StreamEvent) -> Option<Event> {
    match event.to_json() {
        Ok(json) => Some(Event::default().data(json)),
        Err(e) => {
            error!("Failed to serialize {} event: {}", event.kind(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::registry::{SubscriptionRegistry, Topic};
    use crate::live::Broadcaster;
    use futures_util::StreamExt;
    use std::sync::Arc;

    const PING: Duration = Duration::from_secs(30);

    fn setup() -> (Arc<SubscriptionRegistry>, Broadcaster) {
        let reg = Arc::new(SubscriptionRegistry::new(8));
        (Arc::clone(&reg), Broadcaster::new(reg))
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_first_then_published_frames() {
        let (reg, b) = setup();
        let sub = reg.subscribe(Topic::AllMatches);
        let snapshot = StreamEvent::InitialData { matches: vec![] };
        let mut s = Box::pin(subscriber_stream(Some(snapshot), sub, PING));

        b.publish_to_topic(&Topic::AllMatches, &StreamEvent::Ping);

        assert!(s.next().await.is_some());
        assert!(s.next().await.is_some());
        assert_eq!(reg.subscriber_count(&Topic::AllMatches), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_after_idle_interval() {
        let (reg, _b) = setup();
        let sub = reg.subscribe(Topic::Match(1));
        let mut s = Box::pin(subscriber_stream(None, sub, PING));

        let started = Instant::now();
        assert!(s.next().await.is_some());
        assert!(started.elapsed() >= PING);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_unregisters() {
        let (reg, _b) = setup();
        let sub = reg.subscribe(Topic::Match(1));
        let s = subscriber_stream(None, sub, PING);
        assert_eq!(reg.subscriber_count(&Topic::Match(1)), 1);
        drop(s);
        assert!(reg.topics().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_all_ends_stream() {
        let (reg, _b) = setup();
        let sub = reg.subscribe(Topic::AllMatches);
        let mut s = Box::pin(subscriber_stream(None, sub, PING));
        reg.close_all();
        assert!(s.next().await.is_none());
    }
}
