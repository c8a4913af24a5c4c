//! Control Protocol Engine.
//!
//! Translates inbound signaling (decoded control messages and call-transport
//! session events) into roster mutations plus a list of [`Effect`]s for the
//! controller to carry out. The engine performs no I/O, so every rule below is
//! testable as a function of `(mode, roster, event)`.
//!
//! # Rules
//!
//! | Event | Precondition | Effect |
//! |-------|--------------|--------|
//! | `userCall` | none | reserved, surfaced as [`Effect::CallRequested`] |
//! | `userJoin` | sender is not self | oneway: add sender to the local stream; group: mesh-dial sender |
//! | `userLeave` | sender in roster | remove sender |
//! | `userVideo` / `userAudio` | sender in roster | toggle callback, no mutation |
//! | session opened | not self, not present | group: announce `userJoin` to everyone, then insert |
//! | session closed | present | remove, no announcement |
//!
//! Closed entries are pruned after every mutation.

use crate::protocol::{control_channel, ControlMessage, Inbound, Mode};
use crate::roster::{Participant, Roster};
use crate::transport::SessionRef;
use serde_json::Value;
use tracing::{debug, trace};

/// Side effect requested by the engine.
#[derive(Debug, Clone)]
pub enum Effect {
    /// Publish `message` on `channel`.
    Publish {
        channel: String,
        message: ControlMessage,
    },
    /// Full-mesh dial (credentials first) of the given number.
    MeshDial(String),
    /// Pull the given viewer into the local stream (dial without ICE servers).
    AddToStream(String),
    /// A roster member toggled its video.
    VideoToggled {
        participant: Participant,
        enabled: bool,
    },
    /// A roster member toggled its audio.
    AudioToggled {
        participant: Participant,
        enabled: bool,
    },
    /// Reserved `userCall` hook; payload passed through untouched.
    CallRequested(Value),
}

/// Stateless protocol rules for one local peer.
#[derive(Debug, Clone)]
pub struct ControlEngine {
    local_number: String,
    mode: Mode,
}

impl ControlEngine {
    #[must_use]
    pub fn new(local_number: impl Into<String>, mode: Mode) -> Self {
        Self {
            local_number: local_number.into(),
            mode,
        }
    }

    #[must_use]
    pub fn local_number(&self) -> &str {
        &self.local_number
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Handle a decoded control-channel message.
    pub fn receive(&self, roster: &mut Roster, inbound: Inbound) -> Vec<Effect> {
        let message = match inbound {
            Inbound::Known(message) => message,
            Inbound::Unknown { kind } => {
                debug!(
                    target: "cc.engine",
                    kind = %kind,
                    "Ignoring unknown control message type"
                );
                return Vec::new();
            }
        };

        match message {
            ControlMessage::UserCall(data) => vec![Effect::CallRequested(data)],

            ControlMessage::UserJoin(number) => {
                if number == self.local_number {
                    trace!(target: "cc.engine", "Ignoring userJoin from self");
                    return Vec::new();
                }
                if self.mode.is_oneway() {
                    vec![Effect::AddToStream(number)]
                } else {
                    vec![Effect::MeshDial(number)]
                }
            }

            ControlMessage::UserLeave(number) => {
                if let Some(index) = roster.find(&number) {
                    roster.remove_at(index);
                    debug!(
                        target: "cc.engine",
                        number = %number,
                        roster_size = roster.len(),
                        "Participant left"
                    );
                }
                roster.prune_closed();
                Vec::new()
            }

            ControlMessage::UserVideo(state) => roster
                .find(&state.user)
                .and_then(|index| roster.get(index))
                .map(|participant| Effect::VideoToggled {
                    participant: participant.clone(),
                    enabled: state.video,
                })
                .into_iter()
                .collect(),

            ControlMessage::UserAudio(state) => roster
                .find(&state.user)
                .and_then(|index| roster.get(index))
                .map(|participant| Effect::AudioToggled {
                    participant: participant.clone(),
                    enabled: state.audio,
                })
                .into_iter()
                .collect(),
        }
    }

    /// Handle a session opened or closed by the call transport.
    pub fn session_changed(&self, roster: &mut Roster, session: &SessionRef) -> Vec<Effect> {
        let number = session.number();
        if number == self.local_number {
            return Vec::new();
        }

        let mut effects = Vec::new();
        let existing = roster.find(number);

        if session.is_closed() {
            if let Some(index) = existing {
                roster.remove_at(index);
                debug!(
                    target: "cc.engine",
                    number = %number,
                    "Session closed, participant removed"
                );
            }
        } else if existing.is_none() {
            // Announce before inserting so the joiner is not told about itself.
            if self.mode == Mode::Group {
                effects = self.publish_to_all(roster, &ControlMessage::UserJoin(number.to_string()));
            }
            roster.insert(Participant::from_session(session.clone()));
            debug!(
                target: "cc.engine",
                number = %number,
                roster_size = roster.len(),
                announcements = effects.len(),
                "Participant joined"
            );
        }

        roster.prune_closed();
        effects
    }

    /// One `Publish` per roster entry, in join order.
    #[must_use]
    pub fn publish_to_all(&self, roster: &Roster, message: &ControlMessage) -> Vec<Effect> {
        roster
            .iter()
            .map(|participant| Effect::Publish {
                channel: control_channel(&participant.number),
                message: message.clone(),
            })
            .collect()
    }

    /// Apply a locally initiated hangup of one number, or of everyone.
    ///
    /// Behaves like the matching session-close events, so the transport's own
    /// close notification that follows is a no-op.
    pub fn local_hangup(&self, roster: &mut Roster, number: Option<&str>) {
        match number {
            Some(number) => roster.mark_closed(number),
            None => roster.mark_all_closed(),
        }
        roster.prune_closed();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::protocol::{AudioState, VideoState};
    use crate::transport::CallSession;
    use std::sync::Arc;

    #[derive(Debug)]
    struct TestSession {
        number: String,
        closed: bool,
    }

    impl CallSession for TestSession {
        fn number(&self) -> &str {
            &self.number
        }

        fn is_closed(&self) -> bool {
            self.closed
        }
    }

    fn open(number: &str) -> SessionRef {
        Arc::new(TestSession {
            number: number.to_string(),
            closed: false,
        })
    }

    fn closed(number: &str) -> SessionRef {
        Arc::new(TestSession {
            number: number.to_string(),
            closed: true,
        })
    }

    fn published(effects: &[Effect]) -> Vec<(String, ControlMessage)> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Publish { channel, message } => Some((channel.clone(), message.clone())),
                _ => None,
            })
            .collect()
    }

    fn group_with(members: &[&str]) -> (ControlEngine, Roster) {
        let engine = ControlEngine::new("me", Mode::Group);
        let mut roster = Roster::new();
        for member in members {
            engine.session_changed(&mut roster, &open(member));
        }
        (engine, roster)
    }

    #[test]
    fn test_group_join_announces_to_existing_members_only() {
        let (engine, mut roster) = group_with(&["a", "b"]);

        let effects = engine.session_changed(&mut roster, &open("c"));
        let announcements = published(&effects);

        assert_eq!(announcements.len(), 2);
        assert_eq!(
            announcements,
            vec![
                ("a-ctrl".to_string(), ControlMessage::UserJoin("c".to_string())),
                ("b-ctrl".to_string(), ControlMessage::UserJoin("c".to_string())),
            ]
        );
        assert_eq!(roster.numbers(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_first_joiner_triggers_no_announcements() {
        let engine = ControlEngine::new("me", Mode::Group);
        let mut roster = Roster::new();

        let effects = engine.session_changed(&mut roster, &open("a"));
        assert!(effects.is_empty());
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn test_oneway_session_open_does_not_announce() {
        let engine = ControlEngine::new("me", Mode::Oneway);
        let mut roster = Roster::new();
        engine.session_changed(&mut roster, &open("a"));

        let effects = engine.session_changed(&mut roster, &open("b"));
        assert!(effects.is_empty());
        assert_eq!(roster.numbers(), vec!["a", "b"]);
    }

    #[test]
    fn test_self_sessions_never_mutate_roster() {
        let (engine, mut roster) = group_with(&["a"]);

        assert!(engine.session_changed(&mut roster, &open("me")).is_empty());
        assert!(engine.session_changed(&mut roster, &closed("me")).is_empty());
        assert_eq!(roster.numbers(), vec!["a"]);
    }

    #[test]
    fn test_duplicate_open_is_deduplicated() {
        let (engine, mut roster) = group_with(&["a", "b"]);

        let effects = engine.session_changed(&mut roster, &open("b"));
        assert!(effects.is_empty());
        assert_eq!(roster.numbers(), vec!["a", "b"]);
    }

    #[test]
    fn test_session_close_removes_without_announcement() {
        let (engine, mut roster) = group_with(&["a", "b"]);

        let effects = engine.session_changed(&mut roster, &closed("a"));
        assert!(effects.is_empty());
        assert_eq!(roster.numbers(), vec!["b"]);

        // Closing an absent number is idempotent.
        engine.session_changed(&mut roster, &closed("a"));
        assert_eq!(roster.numbers(), vec!["b"]);
    }

    #[test]
    fn test_user_join_dispatch_by_mode() {
        let mut roster = Roster::new();

        let group = ControlEngine::new("me", Mode::Group);
        let effects = group.receive(
            &mut roster,
            Inbound::Known(ControlMessage::UserJoin("555".to_string())),
        );
        assert!(matches!(effects.as_slice(), [Effect::MeshDial(n)] if n == "555"));

        let oneway = ControlEngine::new("me", Mode::Oneway);
        let effects = oneway.receive(
            &mut roster,
            Inbound::Known(ControlMessage::UserJoin("555".to_string())),
        );
        assert!(matches!(effects.as_slice(), [Effect::AddToStream(n)] if n == "555"));
        assert!(roster.is_empty());
    }

    #[test]
    fn test_user_join_from_self_is_ignored() {
        let engine = ControlEngine::new("me", Mode::Group);
        let mut roster = Roster::new();
        let effects = engine.receive(
            &mut roster,
            Inbound::Known(ControlMessage::UserJoin("me".to_string())),
        );
        assert!(effects.is_empty());
    }

    #[test]
    fn test_leave_then_video_toggle_is_ignored() {
        let (engine, mut roster) = group_with(&["a", "b"]);

        engine.receive(
            &mut roster,
            Inbound::Known(ControlMessage::UserLeave("a".to_string())),
        );
        assert_eq!(roster.numbers(), vec!["b"]);

        let effects = engine.receive(
            &mut roster,
            Inbound::Known(ControlMessage::UserVideo(VideoState {
                user: "a".to_string(),
                video: false,
            })),
        );
        assert!(effects.is_empty());
    }

    #[test]
    fn test_toggles_for_roster_members() {
        let (engine, mut roster) = group_with(&["a"]);

        let effects = engine.receive(
            &mut roster,
            Inbound::Known(ControlMessage::UserAudio(AudioState {
                user: "a".to_string(),
                audio: false,
            })),
        );
        assert!(matches!(
            effects.as_slice(),
            [Effect::AudioToggled { participant, enabled: false }] if participant.number == "a"
        ));

        let effects = engine.receive(
            &mut roster,
            Inbound::Known(ControlMessage::UserVideo(VideoState {
                user: "a".to_string(),
                video: true,
            })),
        );
        assert!(matches!(
            effects.as_slice(),
            [Effect::VideoToggled { participant, enabled: true }] if participant.number == "a"
        ));
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn test_user_call_is_passed_through() {
        let engine = ControlEngine::new("me", Mode::Group);
        let mut roster = Roster::new();
        let effects = engine.receive(
            &mut roster,
            Inbound::Known(ControlMessage::UserCall(serde_json::json!({"token": "x"}))),
        );
        assert!(matches!(effects.as_slice(), [Effect::CallRequested(_)]));
    }

    #[test]
    fn test_unknown_kind_is_ignored() {
        let (engine, mut roster) = group_with(&["a"]);
        let effects = engine.receive(
            &mut roster,
            Inbound::Unknown {
                kind: "userWave".to_string(),
            },
        );
        assert!(effects.is_empty());
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn test_any_event_order_leaves_at_most_one_entry() {
        let engine = ControlEngine::new("me", Mode::Group);
        let join = || Inbound::Known(ControlMessage::UserJoin("p".to_string()));
        let leave = || Inbound::Known(ControlMessage::UserLeave("p".to_string()));

        #[derive(Clone, Copy, Debug)]
        enum Step {
            Open,
            Close,
            Join,
            Leave,
        }
        let steps = [Step::Open, Step::Close, Step::Join, Step::Leave];

        // Every sequence of length 4 over the four events, duplicates included.
        for a in steps {
            for b in steps {
                for c in steps {
                    for d in steps {
                        let mut roster = Roster::new();
                        for step in [a, b, c, d] {
                            match step {
                                Step::Open => {
                                    engine.session_changed(&mut roster, &open("p"));
                                }
                                Step::Close => {
                                    engine.session_changed(&mut roster, &closed("p"));
                                    assert_eq!(roster.len(), 0, "after close in {:?}", [a, b, c, d]);
                                }
                                Step::Join => {
                                    engine.receive(&mut roster, join());
                                }
                                Step::Leave => {
                                    engine.receive(&mut roster, leave());
                                    assert_eq!(roster.len(), 0, "after leave in {:?}", [a, b, c, d]);
                                }
                            }
                            assert!(roster.len() <= 1, "sequence {:?}", [a, b, c, d]);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_local_hangup() {
        let (engine, mut roster) = group_with(&["a", "b", "c"]);

        engine.local_hangup(&mut roster, Some("b"));
        assert_eq!(roster.numbers(), vec!["a", "c"]);

        engine.local_hangup(&mut roster, Some("b"));
        assert_eq!(roster.numbers(), vec!["a", "c"]);

        engine.local_hangup(&mut roster, None);
        assert!(roster.is_empty());
    }

    #[test]
    fn test_publish_to_all_targets_control_channels() {
        let (engine, roster) = group_with(&["a", "b"]);
        let effects = engine.publish_to_all(&roster, &ControlMessage::UserLeave("me".to_string()));
        let channels: Vec<String> = published(&effects).into_iter().map(|(c, _)| c).collect();
        assert_eq!(channels, vec!["a-ctrl", "b-ctrl"]);
    }
}
