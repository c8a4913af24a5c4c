//! Call controller error types.
//!
//! Every boundary gets its own error enum. Failures on the pub/sub path are
//! logged and dropped by the controller; only `dial` and the handle plumbing
//! surface errors to callers.

use thiserror::Error;

/// Pub/sub transport or call transport failure.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Connection to the messaging backend failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Publish call failed.
    #[error("Publish to {channel} failed: {reason}")]
    Publish { channel: String, reason: String },

    /// Subscribe or unsubscribe call failed.
    #[error("Subscription change for {channel} failed: {reason}")]
    Subscription { channel: String, reason: String },

    /// Presence (occupancy) query failed.
    #[error("Presence query for {channel} failed: {reason}")]
    Presence { channel: String, reason: String },

    /// Peer-to-peer data send failed.
    #[error("Send failed: {0}")]
    Send(String),

    /// Adapter task is gone.
    #[error("Transport closed")]
    Closed,
}

/// ICE/TURN credential retrieval failure.
#[derive(Debug, Clone, Error)]
pub enum IceError {
    /// HTTP request failed (connect, timeout, transport).
    #[error("HTTP error: {0}")]
    Http(String),

    /// Credential service answered with an error status.
    #[error("Credential service returned status {0}")]
    Status(u16),

    /// Credential service reported an application-level error.
    #[error("Credential service rejected request: {0}")]
    Rejected(String),

    /// Response body could not be parsed.
    #[error("Invalid credential response: {0}")]
    InvalidResponse(String),

    /// Provider could not be built.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Control message decoding failure.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Payload has no string `type` field.
    #[error("Control message has no type")]
    MissingType,

    /// Known type with a payload of the wrong shape.
    #[error("Malformed {kind} message: {source}")]
    Malformed {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Error returned by `CallControllerHandle` operations.
#[derive(Debug, Error)]
pub enum CallError {
    /// Pub/sub or call transport failure.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// ICE credential fetch failed, nothing was dialed.
    #[error("ICE credential error: {0}")]
    IceCredentials(#[from] IceError),

    /// Caller passed an unusable value (e.g. an empty number).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Controller has been cancelled.
    #[error("Controller is shut down")]
    Shutdown,

    /// Internal plumbing failure (mailbox closed, responder dropped).
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_conversions() {
        let err: CallError = IceError::Http("timed out".to_string()).into();
        assert!(matches!(err, CallError::IceCredentials(IceError::Http(_))));

        let err: CallError = TransportError::Closed.into();
        assert!(matches!(err, CallError::Transport(TransportError::Closed)));
    }

    #[test]
    fn test_display_formatting() {
        assert_eq!(
            format!(
                "{}",
                TransportError::Publish {
                    channel: "555-ctrl".to_string(),
                    reason: "broken pipe".to_string(),
                }
            ),
            "Publish to 555-ctrl failed: broken pipe"
        );
        assert_eq!(
            format!("{}", CallError::IceCredentials(IceError::Status(401))),
            "ICE credential error: Credential service returned status 401"
        );
    }
}
