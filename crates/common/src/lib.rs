//! Common utilities shared across Switchboard components.

#![warn(clippy::pedantic)]

/// Module for secret types that prevent accidental logging
pub mod secret;
