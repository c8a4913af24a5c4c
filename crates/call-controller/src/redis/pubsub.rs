//! Redis pub/sub transport adapter.
//!
//! # Channels
//!
//! - `<channel>`: JSON messages published by peers
//! - `<channel>-pnpres`: presence sidecar carrying [`PresenceEvent`] JSON
//!
//! # Connection Pattern
//!
//! Publishing and `PUBSUB NUMSUB` share one cheaply cloneable
//! `MultiplexedConnection`. Subscriptions need a dedicated connection in
//! subscriber mode, which a background task owns. `subscribe`/`unsubscribe`
//! requests reach that task through an mpsc mailbox and are answered over
//! oneshot channels.
//!
//! # Usage
//!
//! ```rust,ignore
//! let pubsub = RedisPubSub::connect("redis://localhost:6379", "555").await?;
//! let (tx, mut rx) = tokio::sync::mpsc::channel(64);
//! pubsub.subscribe("555-ctrl", tx).await?;
//! pubsub.publish("777-ctrl", json!({"type": "userJoin", "data": "555"})).await?;
//! ```

use crate::errors::TransportError;
use crate::observability;
use crate::transport::{ChannelEvent, PresenceAction, PresenceEvent, PubSub};
use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::{MultiplexedConnection, PubSub as RedisSubscriber};
use redis::{AsyncCommands, Client};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Suffix of the presence sidecar channel.
pub const PRESENCE_SUFFIX: &str = "-pnpres";

/// Mailbox size for subscription commands.
const COMMAND_CHANNEL_BUFFER: usize = 64;

/// Presence sidecar of `channel`.
#[must_use]
pub fn presence_channel(channel: &str) -> String {
    format!("{channel}{PRESENCE_SUFFIX}")
}

/// Convert a raw pub/sub delivery into a [`ChannelEvent`].
///
/// Non-JSON payloads on data channels are passed through as JSON strings.
/// Returns `None` for presence payloads that do not parse.
#[must_use]
pub fn to_channel_event(channel_name: &str, payload: &str) -> Option<ChannelEvent> {
    if let Some(channel) = channel_name.strip_suffix(PRESENCE_SUFFIX) {
        return match serde_json::from_str::<PresenceEvent>(payload) {
            Ok(event) => Some(ChannelEvent::Presence {
                channel: channel.to_string(),
                event,
            }),
            Err(e) => {
                warn!(
                    target: "cc.redis.pubsub",
                    channel = %channel_name,
                    error = %e,
                    "Dropping malformed presence event"
                );
                None
            }
        };
    }

    let payload = serde_json::from_str(payload).unwrap_or_else(|_| Value::String(payload.to_string()));
    Some(ChannelEvent::Message {
        channel: channel_name.to_string(),
        payload,
    })
}

/// Hand a raw delivery to the sink registered for its base channel.
///
/// Runs on the subscriber task, which also serves subscription commands, so
/// it never waits on a sink.
fn route_delivery(
    sinks: &HashMap<String, mpsc::Sender<ChannelEvent>>,
    channel_name: &str,
    payload: &str,
) {
    let base = channel_name
        .strip_suffix(PRESENCE_SUFFIX)
        .unwrap_or(channel_name);
    let Some(sink) = sinks.get(base) else {
        return;
    };
    if let Some(event) = to_channel_event(channel_name, payload) {
        forward(sink, event);
    }
}

/// Non-blocking send. A full sink drops the event, matching the transport's
/// best-effort delivery.
fn forward(sink: &mpsc::Sender<ChannelEvent>, event: ChannelEvent) -> bool {
    match sink.try_send(event) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(event)) => {
            observability::record_channel_event_dropped();
            warn!(
                target: "cc.redis.pubsub",
                channel = %event.channel(),
                "Subscriber queue full, event dropped"
            );
            false
        }
        Err(mpsc::error::TrySendError::Closed(event)) => {
            debug!(
                target: "cc.redis.pubsub",
                channel = %event.channel(),
                "Event sink dropped"
            );
            false
        }
    }
}

enum SubscriptionCommand {
    Subscribe {
        channel: String,
        sink: mpsc::Sender<ChannelEvent>,
        respond_to: oneshot::Sender<Result<(), TransportError>>,
    },
    Unsubscribe {
        channel: String,
        respond_to: oneshot::Sender<Result<(), TransportError>>,
    },
}

/// [`PubSub`] implementation over Redis.
pub struct RedisPubSub {
    connection: MultiplexedConnection,
    commands: mpsc::Sender<SubscriptionCommand>,
    identity: String,
    task: JoinHandle<()>,
}

impl RedisPubSub {
    /// Connect to Redis.
    ///
    /// `identity` is reported as the `uuid` of this subscriber's presence
    /// events.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Connection` if either connection fails.
    pub async fn connect(
        redis_url: &str,
        identity: impl Into<String>,
    ) -> Result<Self, TransportError> {
        let client = Client::open(redis_url).map_err(|e| {
            // Do not log redis_url, it may carry credentials.
            error!(target: "cc.redis.pubsub", error = %e, "Failed to open Redis client");
            TransportError::Connection(format!("Failed to open Redis client: {e}"))
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                error!(target: "cc.redis.pubsub", error = %e, "Failed to connect to Redis");
                TransportError::Connection(format!("Failed to connect to Redis: {e}"))
            })?;

        let subscriber = client.get_async_pubsub().await.map_err(|e| {
            error!(
                target: "cc.redis.pubsub",
                error = %e,
                "Failed to open Redis subscriber connection"
            );
            TransportError::Connection(format!("Failed to open subscriber connection: {e}"))
        })?;

        let (commands, receiver) = mpsc::channel(COMMAND_CHANNEL_BUFFER);
        let task = tokio::spawn(run_subscriber(subscriber, receiver));

        Ok(Self {
            connection,
            commands,
            identity: identity.into(),
            task,
        })
    }

    async fn request(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<(), TransportError>>) -> SubscriptionCommand,
    ) -> Result<(), TransportError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| TransportError::Closed)?;
        rx.await.map_err(|_| TransportError::Closed)?
    }

    async fn announce(&self, channel: &str, action: PresenceAction) {
        let occupancy = match self.occupancy(channel).await {
            Ok(occupancy) => occupancy,
            Err(e) => {
                warn!(target: "cc.redis.pubsub", error = %e, "Presence occupancy lookup failed");
                0
            }
        };
        let event = PresenceEvent {
            action,
            uuid: self.identity.clone(),
            occupancy,
        };
        let payload = match serde_json::to_string(&event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(target: "cc.redis.pubsub", error = %e, "Failed to encode presence event");
                return;
            }
        };

        let mut conn = self.connection.clone();
        let sidecar = presence_channel(channel);
        let result: redis::RedisResult<i64> = conn.publish(&sidecar, payload).await;
        if let Err(e) = result {
            warn!(
                target: "cc.redis.pubsub",
                channel = %sidecar,
                error = %e,
                "Failed to publish presence event"
            );
        }
    }
}

impl Drop for RedisPubSub {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[async_trait]
impl PubSub for RedisPubSub {
    #[instrument(skip_all, fields(channel = %channel))]
    async fn subscribe(
        &self,
        channel: &str,
        events: mpsc::Sender<ChannelEvent>,
    ) -> Result<(), TransportError> {
        self.request(|respond_to| SubscriptionCommand::Subscribe {
            channel: channel.to_string(),
            sink: events,
            respond_to,
        })
        .await?;
        self.announce(channel, PresenceAction::Join).await;
        Ok(())
    }

    #[instrument(skip_all, fields(channel = %channel))]
    async fn unsubscribe(&self, channel: &str) -> Result<(), TransportError> {
        self.request(|respond_to| SubscriptionCommand::Unsubscribe {
            channel: channel.to_string(),
            respond_to,
        })
        .await?;
        self.announce(channel, PresenceAction::Leave).await;
        Ok(())
    }

    async fn publish(&self, channel: &str, message: Value) -> Result<(), TransportError> {
        let mut conn = self.connection.clone();
        let receivers: i64 = conn
            .publish(channel, message.to_string())
            .await
            .map_err(|e| TransportError::Publish {
                channel: channel.to_string(),
                reason: e.to_string(),
            })?;

        debug!(
            target: "cc.redis.pubsub",
            channel = %channel,
            receivers = receivers,
            "Published message"
        );
        Ok(())
    }

    async fn occupancy(&self, channel: &str) -> Result<u64, TransportError> {
        let mut conn = self.connection.clone();
        let (_, count): (String, u64) = redis::cmd("PUBSUB")
            .arg("NUMSUB")
            .arg(channel)
            .query_async(&mut conn)
            .await
            .map_err(|e| TransportError::Presence {
                channel: channel.to_string(),
                reason: e.to_string(),
            })?;
        Ok(count)
    }
}

/// Subscriber task: owns the subscriber-mode connection and routes
/// deliveries to the sinks registered per channel.
async fn run_subscriber(
    mut subscriber: RedisSubscriber,
    mut commands: mpsc::Receiver<SubscriptionCommand>,
) {
    let mut sinks: HashMap<String, mpsc::Sender<ChannelEvent>> = HashMap::new();

    loop {
        let command = {
            let mut messages = subscriber.on_message();
            tokio::select! {
                delivery = messages.next() => {
                    let Some(delivery) = delivery else {
                        error!(target: "cc.redis.pubsub", "Subscriber connection closed");
                        break;
                    };
                    let channel_name = delivery.get_channel_name().to_string();
                    let payload: String = match delivery.get_payload() {
                        Ok(payload) => payload,
                        Err(e) => {
                            warn!(
                                target: "cc.redis.pubsub",
                                channel = %channel_name,
                                error = %e,
                                "Dropping non-text payload"
                            );
                            continue;
                        }
                    };
                    route_delivery(&sinks, &channel_name, &payload);
                    continue;
                }
                command = commands.recv() => command,
            }
        };

        let Some(command) = command else {
            debug!(target: "cc.redis.pubsub", "Command channel closed, subscriber exiting");
            break;
        };

        match command {
            SubscriptionCommand::Subscribe {
                channel,
                sink,
                respond_to,
            } => {
                let result = subscribe_pair(&mut subscriber, &channel).await;
                if result.is_ok() {
                    forward(
                        &sink,
                        ChannelEvent::Connected {
                            channel: channel.clone(),
                        },
                    );
                    info!(target: "cc.redis.pubsub", channel = %channel, "Subscribed");
                    sinks.insert(channel, sink);
                }
                let _ = respond_to.send(result);
            }
            SubscriptionCommand::Unsubscribe {
                channel,
                respond_to,
            } => {
                sinks.remove(&channel);
                let result = unsubscribe_pair(&mut subscriber, &channel).await;
                if result.is_ok() {
                    info!(target: "cc.redis.pubsub", channel = %channel, "Unsubscribed");
                }
                let _ = respond_to.send(result);
            }
        }
    }

    // Fail pending and future requests.
    commands.close();
    while let Some(command) = commands.recv().await {
        let respond_to = match command {
            SubscriptionCommand::Subscribe { respond_to, .. }
            | SubscriptionCommand::Unsubscribe { respond_to, .. } => respond_to,
        };
        let _ = respond_to.send(Err(TransportError::Closed));
    }
}

/// Subscriber-mode connection operations used by the subscriber task.
#[async_trait]
trait SubscriberConnection: Send {
    async fn subscribe_channel(&mut self, channel: &str) -> redis::RedisResult<()>;

    async fn unsubscribe_channel(&mut self, channel: &str) -> redis::RedisResult<()>;
}

#[async_trait]
impl SubscriberConnection for RedisSubscriber {
    async fn subscribe_channel(&mut self, channel: &str) -> redis::RedisResult<()> {
        self.subscribe(channel).await
    }

    async fn unsubscribe_channel(&mut self, channel: &str) -> redis::RedisResult<()> {
        self.unsubscribe(channel).await
    }
}

/// Subscribe `channel` and its presence sidecar, or neither.
async fn subscribe_pair<S: SubscriberConnection>(
    subscriber: &mut S,
    channel: &str,
) -> Result<(), TransportError> {
    let to_error = |e: redis::RedisError| TransportError::Subscription {
        channel: channel.to_string(),
        reason: e.to_string(),
    };
    subscriber.subscribe_channel(channel).await.map_err(to_error)?;

    if let Err(e) = subscriber
        .subscribe_channel(&presence_channel(channel))
        .await
    {
        if let Err(undo) = subscriber.unsubscribe_channel(channel).await {
            warn!(
                target: "cc.redis.pubsub",
                channel = %channel,
                error = %undo,
                "Failed to undo data channel subscription"
            );
        }
        return Err(to_error(e));
    }
    Ok(())
}

async fn unsubscribe_pair<S: SubscriberConnection>(
    subscriber: &mut S,
    channel: &str,
) -> Result<(), TransportError> {
    let to_error = |e: redis::RedisError| TransportError::Subscription {
        channel: channel.to_string(),
        reason: e.to_string(),
    };
    subscriber
        .unsubscribe_channel(channel)
        .await
        .map_err(to_error)?;
    subscriber
        .unsubscribe_channel(&presence_channel(channel))
        .await
        .map_err(to_error)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_presence_channel_name() {
        assert_eq!(presence_channel("555-stream"), "555-stream-pnpres");
    }

    #[test]
    fn test_data_payload_is_decoded_as_json() {
        let event = to_channel_event("555-ctrl", r#"{"type":"userJoin","data":"777"}"#).unwrap();
        assert_eq!(
            event,
            ChannelEvent::Message {
                channel: "555-ctrl".to_string(),
                payload: json!({"type": "userJoin", "data": "777"}),
            }
        );
    }

    #[test]
    fn test_non_json_payload_passes_through_as_string() {
        let event = to_channel_event("555-stream", "hello viewers").unwrap();
        assert_eq!(
            event,
            ChannelEvent::Message {
                channel: "555-stream".to_string(),
                payload: json!("hello viewers"),
            }
        );
    }

    #[test]
    fn test_presence_payload_routes_to_base_channel() {
        let event = to_channel_event(
            "555-stream-pnpres",
            r#"{"action":"join","uuid":"777","occupancy":2}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ChannelEvent::Presence {
                channel: "555-stream".to_string(),
                event: PresenceEvent {
                    action: PresenceAction::Join,
                    uuid: "777".to_string(),
                    occupancy: 2,
                },
            }
        );
    }

    #[test]
    fn test_malformed_presence_is_dropped() {
        assert!(to_channel_event("555-stream-pnpres", "not json").is_none());
    }

    #[test]
    fn test_route_delivery_reaches_base_channel_sink() {
        let (tx, mut rx) = mpsc::channel(4);
        let sinks = HashMap::from([("555-stream".to_string(), tx)]);

        route_delivery(&sinks, "555-stream", r#"{"slide":1}"#);
        route_delivery(
            &sinks,
            "555-stream-pnpres",
            r#"{"action":"leave","uuid":"777","occupancy":0}"#,
        );
        route_delivery(&sinks, "999-stream", "unrouted");

        assert!(matches!(rx.try_recv(), Ok(ChannelEvent::Message { .. })));
        assert!(matches!(rx.try_recv(), Ok(ChannelEvent::Presence { .. })));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_full_sink_drops_instead_of_blocking() {
        let (tx, mut rx) = mpsc::channel(1);
        let sinks = HashMap::from([("555-stream".to_string(), tx)]);

        // Runs synchronously: a blocking send on the full sink would hang here.
        route_delivery(&sinks, "555-stream", r#""first""#);
        route_delivery(&sinks, "555-stream", r#""second""#);
        route_delivery(&sinks, "555-stream", r#""third""#);

        assert!(matches!(
            rx.try_recv(),
            Ok(ChannelEvent::Message { payload, .. }) if payload == json!("first")
        ));
        assert!(rx.try_recv().is_err());
    }

    /// Subscriber connection that refuses one channel.
    #[derive(Default)]
    struct RefusingSubscriber {
        refuse: String,
        subscribed: Vec<String>,
    }

    #[async_trait]
    impl SubscriberConnection for RefusingSubscriber {
        async fn subscribe_channel(&mut self, channel: &str) -> redis::RedisResult<()> {
            if channel == self.refuse {
                return Err(redis::RedisError::from((
                    redis::ErrorKind::IoError,
                    "subscription refused",
                )));
            }
            self.subscribed.push(channel.to_string());
            Ok(())
        }

        async fn unsubscribe_channel(&mut self, channel: &str) -> redis::RedisResult<()> {
            self.subscribed.retain(|c| c != channel);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_subscribe_pair_subscribes_data_and_sidecar() {
        let mut subscriber = RefusingSubscriber::default();

        subscribe_pair(&mut subscriber, "555-stream").await.unwrap();

        assert_eq!(subscriber.subscribed, vec!["555-stream", "555-stream-pnpres"]);
    }

    #[tokio::test]
    async fn test_failed_sidecar_subscription_undoes_data_channel() {
        let mut subscriber = RefusingSubscriber {
            refuse: "555-stream-pnpres".to_string(),
            ..RefusingSubscriber::default()
        };

        let result = subscribe_pair(&mut subscriber, "555-stream").await;

        assert!(matches!(
            result,
            Err(TransportError::Subscription { ref channel, .. }) if channel == "555-stream"
        ));
        assert!(subscriber.subscribed.is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_pair_leaves_both_channels() {
        let mut subscriber = RefusingSubscriber::default();
        subscribe_pair(&mut subscriber, "555-ctrl").await.unwrap();

        unsubscribe_pair(&mut subscriber, "555-ctrl").await.unwrap();

        assert!(subscriber.subscribed.is_empty());
    }

    #[test]
    fn test_forward_reports_full_and_closed_sinks() {
        let (tx, rx) = mpsc::channel(1);
        let connected = || ChannelEvent::Connected {
            channel: "555-ctrl".to_string(),
        };

        assert!(forward(&tx, connected()));
        assert!(!forward(&tx, connected()));

        drop(rx);
        assert!(!forward(&tx, connected()));
    }
}
