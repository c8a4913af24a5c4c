//! Boundaries with the external collaborators.
//!
//! The controller consumes three collaborators it does not implement:
//!
//! - [`PubSub`]: channel subscribe/publish/presence (see [`crate::redis`] for a
//!   Redis-backed adapter)
//! - [`CallTransport`]: peer connections, sessions and local media tracks
//! - [`IceProvider`]: ICE/TURN server descriptors (see [`crate::ice`])
//!
//! Inbound traffic flows back to the controller over `mpsc` channels:
//! [`ChannelEvent`]s from the pub/sub adapter and [`CallEvent`]s from the call
//! transport.

use crate::errors::{IceError, TransportError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

// ----------------------------------------------------------------------------
// Pub/sub boundary
// ----------------------------------------------------------------------------

/// Presence action reported on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceAction {
    Join,
    Leave,
    Timeout,
}

/// A presence change on a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEvent {
    pub action: PresenceAction,
    /// Identity of the subscriber that joined or left.
    pub uuid: String,
    /// Subscriber count after the change.
    pub occupancy: u64,
}

/// Event delivered by the pub/sub adapter for a subscribed channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The subscription is established.
    Connected { channel: String },
    /// A message was published on the channel.
    Message { channel: String, payload: Value },
    /// Someone joined or left the channel.
    Presence {
        channel: String,
        event: PresenceEvent,
    },
}

impl ChannelEvent {
    /// Channel this event belongs to.
    #[must_use]
    pub fn channel(&self) -> &str {
        match self {
            ChannelEvent::Connected { channel }
            | ChannelEvent::Message { channel, .. }
            | ChannelEvent::Presence { channel, .. } => channel,
        }
    }
}

/// Publish/subscribe messaging service.
///
/// Delivery is assumed at-least-once, unordered across channels and
/// best-effort. Calls return once the request is handed to the backend; they
/// do not wait for delivery.
#[async_trait]
pub trait PubSub: Send + Sync {
    /// Subscribe to `channel`, routing its events into `events`.
    ///
    /// Implementations send [`ChannelEvent::Connected`] once the subscription
    /// is live.
    async fn subscribe(
        &self,
        channel: &str,
        events: mpsc::Sender<ChannelEvent>,
    ) -> Result<(), TransportError>;

    /// Stop receiving events for `channel`.
    async fn unsubscribe(&self, channel: &str) -> Result<(), TransportError>;

    /// Publish a JSON message on `channel`.
    async fn publish(&self, channel: &str, message: Value) -> Result<(), TransportError>;

    /// Current number of subscribers on `channel`.
    async fn occupancy(&self, channel: &str) -> Result<u64, TransportError>;
}

// ----------------------------------------------------------------------------
// Call transport boundary
// ----------------------------------------------------------------------------

/// Opaque handle to a call-transport session with one remote peer.
///
/// The transport owns the session lifecycle; the roster only keeps a
/// reference.
pub trait CallSession: Send + Sync + fmt::Debug {
    /// Number of the remote peer.
    fn number(&self) -> &str;

    /// True once the transport reports the session as ended.
    fn is_closed(&self) -> bool;
}

/// Shared session reference.
pub type SessionRef = Arc<dyn CallSession>;

/// Kind of local media track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

impl TrackKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Audio => "audio",
            TrackKind::Video => "video",
        }
    }
}

/// A local media track owned by the call transport.
pub trait MediaTrack: Send + Sync + fmt::Debug {
    fn kind(&self) -> TrackKind;

    fn enabled(&self) -> bool;

    fn set_enabled(&self, enabled: bool);
}

/// Lifecycle events emitted by the call transport.
#[derive(Debug, Clone)]
pub enum CallEvent {
    /// Transport is connected and can place calls.
    Ready,
    /// Transport cannot operate (e.g. no media permission).
    Unable,
    /// A session opened or closed.
    Session(SessionRef),
}

/// Peer-connection transport.
#[async_trait]
pub trait CallTransport: Send + Sync {
    /// Number identifying the local peer.
    fn local_number(&self) -> &str;

    /// Dial `number`. Returns `None` when a session to that number already
    /// exists and nothing new was created.
    async fn dial(&self, number: &str, ice_servers: &[IceServer]) -> Option<SessionRef>;

    /// Hang up one session, or every session when `number` is `None`.
    async fn hangup(&self, number: Option<&str>);

    /// Local tracks of the given kind.
    fn local_tracks(&self, kind: TrackKind) -> Vec<Arc<dyn MediaTrack>>;

    /// Send data over the peer-to-peer data path.
    async fn send(&self, message: Value, number: Option<&str>) -> Result<(), TransportError>;
}

// ----------------------------------------------------------------------------
// ICE provider boundary
// ----------------------------------------------------------------------------

/// One ICE server descriptor as handed to the peer connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceServer {
    /// One URL or a list of URLs (`stun:`, `turn:`, `turns:`).
    #[serde(alias = "url")]
    pub urls: IceUrls,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

/// URL field of an ICE server descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IceUrls {
    One(String),
    Many(Vec<String>),
}

impl IceServer {
    /// Descriptor with a single URL and no credentials.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            urls: IceUrls::One(url.into()),
            username: None,
            credential: None,
        }
    }

    /// All URLs of this descriptor.
    #[must_use]
    pub fn urls(&self) -> Vec<&str> {
        match &self.urls {
            IceUrls::One(url) => vec![url.as_str()],
            IceUrls::Many(urls) => urls.iter().map(String::as_str).collect(),
        }
    }
}

/// Source of ICE/TURN server descriptors.
#[async_trait]
pub trait IceProvider: Send + Sync {
    /// Fetch a fresh server list. A failure must abort the dial that asked.
    async fn ice_servers(&self) -> Result<Vec<IceServer>, IceError>;
}
