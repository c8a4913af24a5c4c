//! Mock call transport.
//!
//! Sessions are plain in-memory records. Every session opened or closed is
//! reported on the `CallEvent` channel returned by [`MockCallTransport::new`],
//! the same way a real peer-connection layer would report it.

use async_trait::async_trait;
use call_controller::errors::TransportError;
use call_controller::transport::{
    CallEvent, CallSession, CallTransport, IceServer, MediaTrack, SessionRef, TrackKind,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Buffer for emitted call events.
const MOCK_CALL_EVENT_BUFFER: usize = 256;

/// Session record with a flippable closed flag.
#[derive(Debug)]
pub struct MockSession {
    number: String,
    closed: AtomicBool,
}

impl MockSession {
    #[must_use]
    pub fn new(number: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            number: number.into(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl CallSession for MockSession {
    fn number(&self) -> &str {
        &self.number
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Local media track with an enabled flag.
#[derive(Debug)]
pub struct MockTrack {
    kind: TrackKind,
    enabled: AtomicBool,
}

impl MockTrack {
    #[must_use]
    pub fn new(kind: TrackKind, enabled: bool) -> Arc<Self> {
        Arc::new(Self {
            kind,
            enabled: AtomicBool::new(enabled),
        })
    }
}

impl MediaTrack for MockTrack {
    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }
}

/// Recorded `dial` call.
#[derive(Debug, Clone)]
pub struct DialRecord {
    pub number: String,
    pub ice_servers: Vec<IceServer>,
    /// Whether a new session was created.
    pub created: bool,
}

/// Mock call transport.
#[derive(Debug, Clone)]
pub struct MockCallTransport {
    local_number: String,
    events: mpsc::Sender<CallEvent>,
    inner: Arc<Mutex<MockCallInner>>,
}

#[derive(Debug, Default)]
struct MockCallInner {
    sessions: HashMap<String, Arc<MockSession>>,
    dials: Vec<DialRecord>,
    hangups: Vec<Option<String>>,
    sent: Vec<(Value, Option<String>)>,
    tracks: Vec<Arc<MockTrack>>,
    fail_send: bool,
}

impl MockCallTransport {
    /// Create a transport for `local_number` and the receiver of its events.
    #[must_use]
    pub fn new(local_number: impl Into<String>) -> (Self, mpsc::Receiver<CallEvent>) {
        let (events, receiver) = mpsc::channel(MOCK_CALL_EVENT_BUFFER);
        let transport = Self {
            local_number: local_number.into(),
            events,
            inner: Arc::new(Mutex::new(MockCallInner::default())),
        };
        (transport, receiver)
    }

    /// Add `audio` enabled audio tracks and `video` enabled video tracks.
    #[must_use]
    pub fn with_tracks(self, audio: usize, video: usize) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            for _ in 0..audio {
                inner.tracks.push(MockTrack::new(TrackKind::Audio, true));
            }
            for _ in 0..video {
                inner.tracks.push(MockTrack::new(TrackKind::Video, true));
            }
        }
        self
    }

    /// Fail every data-path send.
    #[must_use]
    pub fn failing_send(self) -> Self {
        self.inner.lock().unwrap().fail_send = true;
        self
    }

    /// Simulate a remote peer calling in: open a session and report it.
    pub async fn open_session(&self, number: &str) -> Arc<MockSession> {
        let session = MockSession::new(number);
        self.inner
            .lock()
            .unwrap()
            .sessions
            .insert(number.to_string(), Arc::clone(&session));
        self.emit(CallEvent::Session(session.clone())).await;
        session
    }

    /// Simulate the remote side ending the session with `number`.
    pub async fn close_session(&self, number: &str) {
        let session = self.inner.lock().unwrap().sessions.remove(number);
        if let Some(session) = session {
            session.close();
            self.emit(CallEvent::Session(session)).await;
        }
    }

    /// Report an arbitrary event.
    pub async fn emit(&self, event: CallEvent) {
        self.events.send(event).await.unwrap();
    }

    pub fn has_session(&self, number: &str) -> bool {
        self.inner.lock().unwrap().sessions.contains_key(number)
    }

    pub fn dials(&self) -> Vec<DialRecord> {
        self.inner.lock().unwrap().dials.clone()
    }

    pub fn hangups(&self) -> Vec<Option<String>> {
        self.inner.lock().unwrap().hangups.clone()
    }

    pub fn sent(&self) -> Vec<(Value, Option<String>)> {
        self.inner.lock().unwrap().sent.clone()
    }

    /// Enabled flags of local tracks of `kind`.
    pub fn track_states(&self, kind: TrackKind) -> Vec<bool> {
        self.inner
            .lock()
            .unwrap()
            .tracks
            .iter()
            .filter(|t| t.kind() == kind)
            .map(|t| t.enabled())
            .collect()
    }
}

#[async_trait]
impl CallTransport for MockCallTransport {
    fn local_number(&self) -> &str {
        &self.local_number
    }

    async fn dial(&self, number: &str, ice_servers: &[IceServer]) -> Option<SessionRef> {
        let session = {
            let mut inner = self.inner.lock().unwrap();
            let created = !inner.sessions.contains_key(number);
            inner.dials.push(DialRecord {
                number: number.to_string(),
                ice_servers: ice_servers.to_vec(),
                created,
            });
            if !created {
                return None;
            }
            let session = MockSession::new(number);
            inner
                .sessions
                .insert(number.to_string(), Arc::clone(&session));
            session
        };

        self.emit(CallEvent::Session(session.clone())).await;
        Some(session)
    }

    async fn hangup(&self, number: Option<&str>) {
        let closed: Vec<Arc<MockSession>> = {
            let mut inner = self.inner.lock().unwrap();
            inner.hangups.push(number.map(str::to_string));
            match number {
                Some(number) => inner.sessions.remove(number).into_iter().collect(),
                None => inner.sessions.drain().map(|(_, s)| s).collect(),
            }
        };

        for session in closed {
            session.close();
            self.emit(CallEvent::Session(session)).await;
        }
    }

    fn local_tracks(&self, kind: TrackKind) -> Vec<Arc<dyn MediaTrack>> {
        self.inner
            .lock()
            .unwrap()
            .tracks
            .iter()
            .filter(|t| t.kind() == kind)
            .map(|t| Arc::clone(t) as Arc<dyn MediaTrack>)
            .collect()
    }

    async fn send(&self, message: Value, number: Option<&str>) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_send {
            return Err(TransportError::Send("mock send failure".to_string()));
        }
        inner.sent.push((message, number.map(str::to_string)));
        Ok(())
    }
}
