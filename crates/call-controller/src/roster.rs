//! Roster of remote participants known to the local peer.
//!
//! Insertion order is join order, which keeps fan-out iteration
//! deterministic. Lookups are linear scans; rosters are interactive-call
//! sized, so this is a scaling limit rather than a correctness concern.
//!
//! Only the [`crate::engine::ControlEngine`] mutates a roster.

use crate::transport::SessionRef;

/// One remote peer the local peer is in a call or stream with.
#[derive(Debug, Clone)]
pub struct Participant {
    /// Remote peer number, stable for the lifetime of the call.
    pub number: String,
    /// Borrowed transport session. The roster never drives its lifecycle.
    pub session: SessionRef,
    /// Set during a mutation pass once the session is known to be over.
    pub closed: bool,
}

impl Participant {
    /// Participant for an open transport session.
    #[must_use]
    pub fn from_session(session: SessionRef) -> Self {
        Self {
            number: session.number().to_string(),
            closed: session.is_closed(),
            session,
        }
    }

    /// True when marked closed here or reported closed by the transport.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed || self.session.is_closed()
    }
}

/// Ordered set of live participants, at most one per number.
#[derive(Debug, Default)]
pub struct Roster {
    participants: Vec<Participant>,
}

impl Roster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the live entry for `number`.
    #[must_use]
    pub fn find(&self, number: &str) -> Option<usize> {
        self.participants
            .iter()
            .position(|p| p.number == number && !p.is_closed())
    }

    #[must_use]
    pub fn contains(&self, number: &str) -> bool {
        self.find(number).is_some()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Participant> {
        self.participants.get(index)
    }

    /// Append a participant.
    ///
    /// Returns `false` and leaves the roster untouched when a live entry for
    /// the same number already exists.
    pub fn insert(&mut self, participant: Participant) -> bool {
        if self.contains(&participant.number) {
            return false;
        }
        self.participants.push(participant);
        true
    }

    /// Remove and return the entry at `index`.
    pub fn remove_at(&mut self, index: usize) -> Option<Participant> {
        (index < self.participants.len()).then(|| self.participants.remove(index))
    }

    /// Mark every entry for `number` as closed.
    pub fn mark_closed(&mut self, number: &str) {
        for participant in self.participants.iter_mut().filter(|p| p.number == number) {
            participant.closed = true;
        }
    }

    /// Mark every entry as closed.
    pub fn mark_all_closed(&mut self) {
        for participant in &mut self.participants {
            participant.closed = true;
        }
    }

    /// Drop closed entries. Returns how many were removed.
    pub fn prune_closed(&mut self) -> usize {
        let before = self.participants.len();
        self.participants.retain(|p| !p.is_closed());
        before - self.participants.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter()
    }

    /// Numbers in join order.
    #[must_use]
    pub fn numbers(&self) -> Vec<String> {
        self.participants.iter().map(|p| p.number.clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}
