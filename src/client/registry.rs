//! Session registry
//!
//! The single table of live sessions, keyed by readiness handle. Removing an
//! entry drops its session, which closes the connection in the same step.

use std::collections::BTreeMap;

use crate::client::session::Session;
use crate::client::state::ClientKind;
use crate::transport::Handle;

/// Registry for tracking live sessions, iterated in ascending handle order.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: BTreeMap<Handle, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session under its connection's handle.
    ///
    /// # Panics
    ///
    /// If the handle is already live. Handles of fresh accepts never collide
    /// with live entries, so a collision is a transport bug.
    #[track_caller]
    pub fn insert(&mut self, session: Session) -> Handle {
        let handle = session.handle();
        assert!(
            !self.sessions.contains_key(&handle),
            "session handle {handle} is already registered"
        );
        self.sessions.insert(handle, session);
        handle
    }

    /// Removes a session and closes its connection.
    ///
    /// # Panics
    ///
    /// If the handle is not present. Callers check [`contains`](Self::contains)
    /// first.
    #[track_caller]
    pub fn remove(&mut self, handle: Handle) -> Session {
        match self.sessions.remove(&handle) {
            Some(session) => session,
            None => panic!("session handle {handle} is not registered"),
        }
    }

    /// Closes every session. Used when the event loop shuts down.
    pub fn clear(&mut self) {
        self.sessions.clear();
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.sessions.contains_key(&handle)
    }

    pub fn get(&self, handle: Handle) -> Option<&Session> {
        self.sessions.get(&handle)
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut Session> {
        self.sessions.get_mut(&handle)
    }

    /// All live handles in ascending order.
    pub fn handles(&self) -> Vec<Handle> {
        self.sessions.keys().copied().collect()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle, &mut Session)> {
        self.sessions.iter_mut().map(|(handle, session)| (*handle, session))
    }

    /// Finds the live session that completed its handshake as `kind`/`id`.
    pub fn find_classified(&self, kind: ClientKind, id: u64) -> Option<Handle> {
        self.sessions
            .iter()
            .find(|(_, session)| session.is_classified_as(kind, id))
            .map(|(handle, _)| *handle)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
