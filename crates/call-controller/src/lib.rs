//! Call Controller Library
//!
//! Control-channel signaling for multi-party calls layered over a
//! publish/subscribe messaging service:
//!
//! - Roster of remote participants, kept consistent under any ordering of
//!   joins, leaves and session closes
//! - Control protocol (`userJoin`, `userLeave`, `userVideo`, `userAudio`,
//!   reserved `userCall`) on private per-peer control channels
//! - Group (full mesh) and oneway (one broadcaster, many viewers) topologies
//! - ICE/TURN credential retrieval before every dial
//!
//! # Architecture
//!
//! ```text
//! CallControllerHandle ──> CallControllerActor ──> ControlEngine ──> Roster
//!                                 │    ▲
//!                                 ▼    │
//!              PubSub (Redis) / CallTransport / IceProvider
//! ```
//!
//! Media, peer connections and the messaging backend live outside this crate
//! behind the traits in [`transport`].
//!
//! # Modules
//!
//! - [`actors`] - Controller actor and handle
//! - [`config`] - Configuration from environment
//! - [`engine`] - Pure protocol rules producing side effects
//! - [`errors`] - Error types with caller-facing codes
//! - [`ice`] - ICE server providers
//! - [`observability`] - Metrics
//! - [`presence`] - Online/streaming queries
//! - [`protocol`] - Wire format and channel naming
//! - [`redis`] - Redis pub/sub adapter
//! - [`roster`] - Participant roster
//! - [`transport`] - Boundary traits

pub mod actors;
pub mod config;
pub mod engine;
pub mod errors;
pub mod ice;
pub mod observability;
pub mod presence;
pub mod protocol;
pub mod redis;
pub mod roster;
pub mod transport;
