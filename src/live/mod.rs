//! Live-update fan-out: topic registry, broadcaster, and per-subscriber streams.

pub mod dispatcher;
pub mod events;
pub mod registry;
pub mod stream;

pub use dispatcher::Broadcaster;
pub use events::StreamEvent;
pub use registry::{Subscription, SubscriptionRegistry, Topic};
pub use stream::subscriber_stream;
