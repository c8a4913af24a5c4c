//! Message types for the controller actor.
//!
//! Requests use `tokio::sync::oneshot` for request-reply semantics.

use super::hooks::Hook;
use crate::errors::CallError;
use crate::protocol::Mode;
use crate::transport::SessionRef;
use serde_json::Value;
use tokio::sync::oneshot;

/// Messages sent to `CallControllerActor`.
#[derive(Debug)]
pub enum CallMessage {
    /// Fetch ICE servers, then dial `number`.
    Dial {
        number: String,
        respond_to: oneshot::Sender<Result<DialOutcome, CallError>>,
    },

    /// Hang up one peer, or everyone when `number` is `None`.
    Hangup {
        number: Option<String>,
        respond_to: oneshot::Sender<()>,
    },

    /// Flip local audio tracks; responds with the new enabled state.
    ToggleAudio { respond_to: oneshot::Sender<bool> },

    /// Flip local video tracks; responds with the new enabled state.
    ToggleVideo { respond_to: oneshot::Sender<bool> },

    /// Subscribe to a stream channel (own stream when `name` is `None`).
    ///
    /// `announce` also sends `userJoin` to the named stream owner.
    JoinStream {
        name: Option<String>,
        announce: bool,
        respond_to: oneshot::Sender<()>,
    },

    /// Unsubscribe from a stream channel (own stream when `name` is `None`).
    LeaveStream {
        name: Option<String>,
        respond_to: oneshot::Sender<()>,
    },

    /// Send application data (stream channel in oneway mode, data path otherwise).
    Send {
        message: Value,
        number: Option<String>,
        respond_to: oneshot::Sender<()>,
    },

    /// Install a callback, replacing any earlier one for the same slot.
    RegisterHook {
        hook: Hook,
        respond_to: oneshot::Sender<()>,
    },

    /// Snapshot of controller state.
    GetState { respond_to: oneshot::Sender<CallState> },
}

/// Result of a successful `dial`.
#[derive(Debug, Clone)]
pub enum DialOutcome {
    /// The call transport created a new session.
    Dialed(SessionRef),
    /// A session to that number already existed; nothing was sent.
    AlreadyConnected,
}

impl DialOutcome {
    #[must_use]
    pub fn is_dialed(&self) -> bool {
        matches!(self, DialOutcome::Dialed(_))
    }
}

/// Controller state snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallState {
    pub local_number: String,
    pub mode: Mode,
    /// Roster numbers in join order.
    pub roster: Vec<String>,
    /// Stream channel the controller is connected to, if any.
    pub stream_name: Option<String>,
}
