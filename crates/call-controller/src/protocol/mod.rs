//! Control-channel protocol.
//!
//! Every peer owns a private control channel, `<number>-ctrl`, on which other
//! peers publish [`ControlMessage`]s addressed to it. A broadcasting peer also
//! owns a stream channel, `<number>-stream`, that carries viewer data and
//! presence.
//!
//! Messages carry no sequence number, timestamp or acknowledgment; the wire
//! format is the JSON object `{ "type": "<kind>", "data": <payload> }`.

mod messages;

pub use messages::{decode, AudioState, ControlMessage, Inbound, VideoState, KNOWN_TYPES};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Suffix of a peer's control channel.
pub const CONTROL_SUFFIX: &str = "-ctrl";

/// Suffix of a peer's stream channel.
pub const STREAM_SUFFIX: &str = "-stream";

/// Control channel owned by `number`.
#[must_use]
pub fn control_channel(number: &str) -> String {
    format!("{number}{CONTROL_SUFFIX}")
}

/// Stream channel owned by `name` (a peer number or an alias).
#[must_use]
pub fn stream_channel(name: &str) -> String {
    format!("{name}{STREAM_SUFFIX}")
}

/// Call topology, fixed at controller construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Full mesh: every peer dials and announces to every other peer.
    #[default]
    Group,
    /// One broadcaster, many viewers joining its stream channel.
    Oneway,
}

impl Mode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Mode::Group => "group",
            Mode::Oneway => "oneway",
        }
    }

    #[must_use]
    pub const fn is_oneway(&self) -> bool {
        matches!(self, Mode::Oneway)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "group" => Ok(Mode::Group),
            "oneway" | "stream" => Ok(Mode::Oneway),
            other => Err(format!("unknown call mode '{other}'")),
        }
    }
}
