//! Redis-backed pub/sub transport.
//!
//! Provides a [`crate::transport::PubSub`] implementation on Redis pub/sub
//! with a presence sidecar channel per subscribed channel.

mod pubsub;

pub use pubsub::{presence_channel, to_channel_event, RedisPubSub, PRESENCE_SUFFIX};
