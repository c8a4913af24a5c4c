//! Actor implementation of the call controller.
//!
//! ```text
//! CallControllerActor (one per local peer)
//! ├── owns Roster + ControlEngine + hook slots + active stream name
//! ├── <- ChannelEvents from the PubSub (control and stream channels)
//! ├── <- CallEvents from the CallTransport
//! └── <- CallMessages from CallControllerHandle
//! ```
//!
//! # Modules
//!
//! - [`controller`] - `CallControllerActor` and its handle
//! - [`hooks`] - Single-slot caller callbacks
//! - [`messages`] - Message types for actor communication
//! - [`metrics`] - Mailbox monitoring

pub mod controller;
pub mod hooks;
pub mod messages;
pub mod metrics;

pub use controller::{CallControllerActor, CallControllerHandle, CALL_EVENT_BUFFER};
pub use hooks::Hook;
pub use messages::{CallMessage, CallState, DialOutcome};
pub use metrics::{MailboxLevel, MailboxMonitor};
