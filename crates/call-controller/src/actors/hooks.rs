//! Caller-registered callbacks.
//!
//! Each hook is a single slot: registering a callback replaces the previous
//! one. Hooks run on the controller task, so they must not block.

use crate::roster::Participant;
use crate::transport::{PresenceEvent, SessionRef};
use serde_json::Value;
use std::fmt;

pub type LifecycleHook = Box<dyn Fn() + Send + Sync>;
pub type SessionHook = Box<dyn Fn(&SessionRef) + Send + Sync>;
pub type ToggleHook = Box<dyn Fn(&Participant, bool) + Send + Sync>;
pub type StreamPresenceHook = Box<dyn Fn(&PresenceEvent) + Send + Sync>;
pub type StreamMessageHook = Box<dyn Fn(&Value) + Send + Sync>;

/// A callback to install in one of the hook slots.
pub enum Hook {
    /// Call transport is ready.
    Ready(LifecycleHook),
    /// Call transport cannot operate.
    Unable(LifecycleHook),
    /// A session opened or closed (fires after the roster update).
    Receive(SessionHook),
    /// A roster member toggled its video.
    VideoToggled(ToggleHook),
    /// A roster member toggled its audio.
    AudioToggled(ToggleHook),
    /// Presence change on the active stream channel.
    StreamPresence(StreamPresenceHook),
    /// Message published on the active stream channel.
    StreamMessage(StreamMessageHook),
}

impl Hook {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Hook::Ready(_) => "ready",
            Hook::Unable(_) => "unable",
            Hook::Receive(_) => "receive",
            Hook::VideoToggled(_) => "video_toggled",
            Hook::AudioToggled(_) => "audio_toggled",
            Hook::StreamPresence(_) => "stream_presence",
            Hook::StreamMessage(_) => "stream_message",
        }
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Hook").field(&self.name()).finish()
    }
}

/// The hook slots owned by the controller actor.
#[derive(Default)]
pub(crate) struct Hooks {
    ready: Option<LifecycleHook>,
    unable: Option<LifecycleHook>,
    receive: Option<SessionHook>,
    video_toggled: Option<ToggleHook>,
    audio_toggled: Option<ToggleHook>,
    stream_presence: Option<StreamPresenceHook>,
    stream_message: Option<StreamMessageHook>,
}

impl Hooks {
    /// Install `hook`, replacing any earlier registration for the same slot.
    pub(crate) fn register(&mut self, hook: Hook) {
        match hook {
            Hook::Ready(cb) => self.ready = Some(cb),
            Hook::Unable(cb) => self.unable = Some(cb),
            Hook::Receive(cb) => self.receive = Some(cb),
            Hook::VideoToggled(cb) => self.video_toggled = Some(cb),
            Hook::AudioToggled(cb) => self.audio_toggled = Some(cb),
            Hook::StreamPresence(cb) => self.stream_presence = Some(cb),
            Hook::StreamMessage(cb) => self.stream_message = Some(cb),
        }
    }

    pub(crate) fn ready(&self) {
        if let Some(cb) = &self.ready {
            cb();
        }
    }

    pub(crate) fn unable(&self) {
        if let Some(cb) = &self.unable {
            cb();
        }
    }

    pub(crate) fn receive(&self, session: &SessionRef) {
        if let Some(cb) = &self.receive {
            cb(session);
        }
    }

    pub(crate) fn video_toggled(&self, participant: &Participant, enabled: bool) {
        if let Some(cb) = &self.video_toggled {
            cb(participant, enabled);
        }
    }

    pub(crate) fn audio_toggled(&self, participant: &Participant, enabled: bool) {
        if let Some(cb) = &self.audio_toggled {
            cb(participant, enabled);
        }
    }

    pub(crate) fn stream_presence(&self, event: &PresenceEvent) {
        if let Some(cb) = &self.stream_presence {
            cb(event);
        }
    }

    pub(crate) fn stream_message(&self, payload: &Value) {
        if let Some(cb) = &self.stream_message {
            cb(payload);
        }
    }
}
