//! In-memory pub/sub mock.
//!
//! Records every subscribe, unsubscribe and publish, answers occupancy
//! queries from a fixed table, and lets tests inject channel events.
//!
//! # Example
//!
//! ```rust,ignore
//! use call_test_utils::MockPubSub;
//!
//! let pubsub = MockPubSub::new().with_occupancy("555-stream", 3);
//! // ... run the controller ...
//! pubsub.deliver("me-ctrl", json!({"type": "userLeave", "data": "555"})).await;
//! assert_eq!(pubsub.control_messages_to("555-ctrl").len(), 1);
//! ```

use async_trait::async_trait;
use call_controller::errors::TransportError;
use call_controller::protocol::{decode, ControlMessage, Inbound};
use call_controller::transport::{ChannelEvent, PresenceEvent, PubSub};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Mock pub/sub transport.
#[derive(Debug, Clone)]
pub struct MockPubSub {
    inner: Arc<Mutex<MockPubSubInner>>,
}

#[derive(Debug)]
struct MockPubSubInner {
    /// Live subscriptions and their event sinks.
    sinks: HashMap<String, mpsc::Sender<ChannelEvent>>,
    /// Every subscribe call, in order.
    subscribe_log: Vec<String>,
    /// Every unsubscribe call, in order.
    unsubscribe_log: Vec<String>,
    /// Successful publishes, in order.
    published: Vec<(String, Value)>,
    /// Occupancy answers per channel (missing means 0).
    occupancy: HashMap<String, u64>,
    /// Acknowledge subscriptions with `ChannelEvent::Connected`.
    ack_subscribe: bool,
    fail_publish: bool,
    fail_presence: bool,
}

impl Default for MockPubSubInner {
    fn default() -> Self {
        Self {
            sinks: HashMap::new(),
            subscribe_log: Vec::new(),
            unsubscribe_log: Vec::new(),
            published: Vec::new(),
            occupancy: HashMap::new(),
            ack_subscribe: true,
            fail_publish: false,
            fail_presence: false,
        }
    }
}

impl Default for MockPubSub {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPubSub {
    /// Create a mock that accepts everything and acknowledges subscriptions.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockPubSubInner::default())),
        }
    }

    /// Report `occupancy` subscribers on `channel`.
    #[must_use]
    pub fn with_occupancy(self, channel: &str, occupancy: u64) -> Self {
        self.set_occupancy(channel, occupancy);
        self
    }

    /// Do not send `Connected` after subscribing.
    #[must_use]
    pub fn without_subscribe_ack(self) -> Self {
        self.inner.lock().unwrap().ack_subscribe = false;
        self
    }

    /// Fail every publish.
    #[must_use]
    pub fn failing_publishes(self) -> Self {
        self.set_publish_failure(true);
        self
    }

    /// Fail every occupancy query.
    #[must_use]
    pub fn failing_presence(self) -> Self {
        self.inner.lock().unwrap().fail_presence = true;
        self
    }

    pub fn set_occupancy(&self, channel: &str, occupancy: u64) {
        self.inner
            .lock()
            .unwrap()
            .occupancy
            .insert(channel.to_string(), occupancy);
    }

    pub fn set_publish_failure(&self, fail: bool) {
        self.inner.lock().unwrap().fail_publish = fail;
    }

    /// Channels currently subscribed, sorted.
    pub fn subscriptions(&self) -> Vec<String> {
        let mut channels: Vec<String> = self.inner.lock().unwrap().sinks.keys().cloned().collect();
        channels.sort();
        channels
    }

    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.inner.lock().unwrap().sinks.contains_key(channel)
    }

    /// Every subscribe call, in order.
    pub fn subscribe_log(&self) -> Vec<String> {
        self.inner.lock().unwrap().subscribe_log.clone()
    }

    /// Every unsubscribe call, in order.
    pub fn unsubscribe_log(&self) -> Vec<String> {
        self.inner.lock().unwrap().unsubscribe_log.clone()
    }

    /// Successful publishes, in order.
    pub fn published(&self) -> Vec<(String, Value)> {
        self.inner.lock().unwrap().published.clone()
    }

    /// Raw payloads published on `channel`.
    pub fn published_to(&self, channel: &str) -> Vec<Value> {
        self.published()
            .into_iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, payload)| payload)
            .collect()
    }

    /// Decoded control messages published anywhere, with their channel.
    pub fn control_messages(&self) -> Vec<(String, ControlMessage)> {
        self.published()
            .into_iter()
            .filter_map(|(channel, payload)| match decode(&payload) {
                Ok(Inbound::Known(message)) => Some((channel, message)),
                _ => None,
            })
            .collect()
    }

    /// Decoded control messages published on `channel`.
    pub fn control_messages_to(&self, channel: &str) -> Vec<ControlMessage> {
        self.control_messages()
            .into_iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, message)| message)
            .collect()
    }

    /// Forget recorded publishes.
    pub fn clear_published(&self) {
        self.inner.lock().unwrap().published.clear();
    }

    /// Deliver a published message to the subscriber of `channel`.
    ///
    /// # Panics
    ///
    /// Panics if nothing is subscribed to `channel`.
    pub async fn deliver(&self, channel: &str, payload: Value) {
        self.emit(ChannelEvent::Message {
            channel: channel.to_string(),
            payload,
        })
        .await;
    }

    /// Deliver a control message to the subscriber of `channel`.
    pub async fn deliver_control(&self, channel: &str, message: &ControlMessage) {
        self.deliver(channel, message.to_value()).await;
    }

    /// Deliver a presence event to the subscriber of `channel`.
    pub async fn deliver_presence(&self, channel: &str, event: PresenceEvent) {
        self.emit(ChannelEvent::Presence {
            channel: channel.to_string(),
            event,
        })
        .await;
    }

    /// Send `Connected` to the subscriber of `channel`.
    pub async fn connect(&self, channel: &str) {
        self.emit(ChannelEvent::Connected {
            channel: channel.to_string(),
        })
        .await;
    }

    async fn emit(&self, event: ChannelEvent) {
        let sink = self
            .inner
            .lock()
            .unwrap()
            .sinks
            .get(event.channel())
            .cloned()
            .unwrap_or_else(|| panic!("no subscriber on {}", event.channel()));
        sink.send(event).await.unwrap();
    }
}

#[async_trait]
impl PubSub for MockPubSub {
    async fn subscribe(
        &self,
        channel: &str,
        events: mpsc::Sender<ChannelEvent>,
    ) -> Result<(), TransportError> {
        let ack = {
            let mut inner = self.inner.lock().unwrap();
            inner.subscribe_log.push(channel.to_string());
            inner.sinks.insert(channel.to_string(), events.clone());
            inner.ack_subscribe
        };

        if ack {
            let _ = events
                .send(ChannelEvent::Connected {
                    channel: channel.to_string(),
                })
                .await;
        }
        Ok(())
    }

    async fn unsubscribe(&self, channel: &str) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.unsubscribe_log.push(channel.to_string());
        inner.sinks.remove(channel);
        Ok(())
    }

    async fn publish(&self, channel: &str, message: Value) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_publish {
            return Err(TransportError::Publish {
                channel: channel.to_string(),
                reason: "mock publish failure".to_string(),
            });
        }
        inner.published.push((channel.to_string(), message));
        Ok(())
    }

    async fn occupancy(&self, channel: &str) -> Result<u64, TransportError> {
        let inner = self.inner.lock().unwrap();
        if inner.fail_presence {
            return Err(TransportError::Presence {
                channel: channel.to_string(),
                reason: "mock presence failure".to_string(),
            });
        }
        Ok(inner.occupancy.get(channel).copied().unwrap_or(0))
    }
}
