//! Presence queries.
//!
//! A peer is online while something is subscribed to the channel named by
//! its bare number (the call transport's own signaling channel), and
//! streaming while something is subscribed to its stream channel.

use crate::protocol::stream_channel;
use crate::transport::PubSub;
use tracing::{debug, warn};

/// True when the `number` channel has at least one subscriber.
///
/// Transport failures resolve to `false`.
pub async fn is_online(pubsub: &dyn PubSub, number: &str) -> bool {
    is_occupied(pubsub, number).await
}

/// True when `number`'s stream channel has at least one subscriber.
pub async fn is_streaming(pubsub: &dyn PubSub, number: &str) -> bool {
    is_occupied(pubsub, &stream_channel(number)).await
}

/// True when `channel` has at least one subscriber.
pub async fn is_occupied(pubsub: &dyn PubSub, channel: &str) -> bool {
    match pubsub.occupancy(channel).await {
        Ok(occupancy) => {
            debug!(
                target: "cc.presence",
                channel = %channel,
                occupancy,
                "Presence reply"
            );
            occupancy != 0
        }
        Err(e) => {
            warn!(
                target: "cc.presence",
                channel = %channel,
                error = %e,
                "Presence query failed"
            );
            false
        }
    }
}
