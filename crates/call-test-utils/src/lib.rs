//! Test utilities for the Call Controller
//!
//! In-memory stand-ins for the controller's collaborators, plus a harness
//! that runs a real controller actor against them.
//!
//! # Modules
//!
//! - `mock_pubsub` - Pub/sub transport with publish log and event injection
//! - `mock_call` - Call transport with sessions, tracks and a dial log
//! - `mock_ice` - ICE provider with a fixed list or forced failures
//! - `fixtures` - `TestCall` harness and canned ICE servers

pub mod fixtures;
pub mod mock_call;
pub mod mock_ice;
pub mod mock_pubsub;

pub use fixtures::{test_ice_servers, TestCall};
pub use mock_call::{DialRecord, MockCallTransport, MockSession, MockTrack};
pub use mock_ice::MockIceProvider;
pub use mock_pubsub::MockPubSub;
