//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] types used for credentials in Switchboard
//! configuration: the Redis connection URL (which may embed a password) and
//! the ICE credential service secret.
//!
//! `SecretString` implements `Debug` with redaction, so any struct that
//! derives `Debug` over a secret is safe to log with `{:?}` or tracing.
//! Secrets are zeroized on drop.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct IceCredentials {
//!     ident: String,
//!     secret: SecretString,
//! }
//!
//! let creds = IceCredentials {
//!     ident: "switchboard".to_string(),
//!     secret: SecretString::from("s3cr3t"),
//! };
//!
//! assert!(!format!("{creds:?}").contains("s3cr3t"));
//! assert_eq!(creds.secret.expose_secret(), "s3cr3t");
//! ```
//!
//! # Logging connection URLs
//!
//! Use [`redact_url`] when a URL has to appear in logs:
//!
//! ```rust
//! use common::secret::redact_url;
//!
//! assert_eq!(
//!     redact_url("redis://:hunter2@cache:6379/0"),
//!     "redis://[REDACTED]@cache:6379/0"
//! );
//! ```

// Re-export the main types from secrecy
pub use secrecy::{ExposeSecret, SecretBox, SecretString};

/// Placeholder for redacted userinfo.
const REDACTED: &str = "[REDACTED]";

/// Replace the userinfo part of `url` (`user:password@`) with a placeholder.
///
/// URLs without userinfo are returned unchanged.
#[must_use]
pub fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };

    let authority_end = rest.find('/').unwrap_or(rest.len());
    let (authority, path) = rest.split_at(authority_end);

    match authority.rsplit_once('@') {
        Some((_, host)) => format!("{scheme}://{REDACTED}@{host}{path}"),
        None => url.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("redis://:hunter2@cache:6379");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("hunter2"));
    }

    #[test]
    fn test_deserialize() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct IceCredentials {
            ident: String,
            secret: SecretString,
        }

        let json = r#"{"ident": "switchboard", "secret": "my-secret-value"}"#;
        let creds: IceCredentials = serde_json::from_str(json).expect("deserialize");

        assert_eq!(creds.secret.expose_secret(), "my-secret-value");

        let debug = format!("{creds:?}");
        assert!(!debug.contains("my-secret-value"));
        assert!(debug.contains("switchboard"));
    }

    #[test]
    fn test_redact_url_strips_userinfo() {
        assert_eq!(
            redact_url("redis://default:pw@cache.internal:6379/2"),
            "redis://[REDACTED]@cache.internal:6379/2"
        );
        assert_eq!(redact_url("rediss://:pw@cache"), "rediss://[REDACTED]@cache");
    }

    #[test]
    fn test_redact_url_without_userinfo_is_unchanged() {
        assert_eq!(redact_url("redis://127.0.0.1:6379"), "redis://127.0.0.1:6379");
        assert_eq!(redact_url("not a url"), "not a url");
        // '@' after the authority is not userinfo
        assert_eq!(
            redact_url("https://api.example.com/path@x"),
            "https://api.example.com/path@x"
        );
    }
}
