use crate::X25519PublicKey;
use crate::state::SessionState;
use std::collections::VecDeque;

/// Everything known about the sessions with one remote address.
///
/// Holds the current state plus a ring buffer of archived states, newest
/// first, so that messages encrypted under a replaced session can still be
/// decrypted.
#[derive(Clone, Default)]
pub struct SessionRecord {
    pub(crate) current_session: Option<SessionState>,
    pub(crate) previous_sessions: VecDeque<SessionState>,
}

impl SessionRecord {
    /// A record without any session.
    pub fn new_fresh() -> Self {
        Self::default()
    }

    /// The current session state, if any.
    pub fn session_state(&self) -> Option<&SessionState> {
        self.current_session.as_ref()
    }

    pub(crate) fn session_state_mut(&mut self) -> Option<&mut SessionState> {
        self.current_session.as_mut()
    }

    pub(crate) fn set_session_state(&mut self, state: SessionState) {
        self.current_session = Some(state);
    }

    /// Archived states, most recent first.
    pub fn previous_session_states(&self) -> impl Iterator<Item = &SessionState> {
        self.previous_sessions.iter()
    }

    /// Number of archived states.
    pub fn previous_session_count(&self) -> usize {
        self.previous_sessions.len()
    }

    /// Whether the current state can send.
    pub fn has_current_session_state(&self) -> bool {
        self.current_session.is_some()
    }

    /// Skipped message keys cached by the current state.
    pub fn skipped_message_key_count(&self) -> usize {
        self.current_session
            .as_ref()
            .map_or(0, SessionState::skipped_message_key_count)
    }

    /// Moves the current state to the archive, leaving no current state.
    pub fn archive_current_state(&mut self, max_archived: usize) {
        if let Some(state) = self.current_session.take() {
            self.previous_sessions.push_front(state);
            self.previous_sessions.truncate(max_archived);
        }
    }

    /// Makes `state` current, archiving the state it replaces.
    pub(crate) fn promote_state(&mut self, state: SessionState, max_archived: usize) {
        self.archive_current_state(max_archived);
        self.current_session = Some(state);
    }

    /// Replaces the archived state at `index` with `state` and makes it current.
    pub(crate) fn promote_old_session(
        &mut self,
        index: usize,
        state: SessionState,
        max_archived: usize,
    ) {
        self.previous_sessions.remove(index);
        self.promote_state(state, max_archived);
    }

    /// Looks for a state created by the handshake with `base_key` and makes
    /// it current. Returns whether one was found.
    pub(crate) fn promote_matching_session(
        &mut self,
        version: u8,
        base_key: &X25519PublicKey,
        max_archived: usize,
    ) -> bool {
        let matches = |state: &SessionState| {
            state.session_version() == version && state.alice_base_key() == base_key
        };

        if self.current_session.as_ref().is_some_and(matches) {
            return true;
        }

        let found = self.previous_sessions.iter().position(matches);
        match found.and_then(|index| self.previous_sessions.remove(index)) {
            Some(state) => {
                self.promote_state(state, max_archived);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratchet::{ChainKey, RootKey};
    use crate::{IdentityKeyPair, X25519Secret};

    fn state(base: u8) -> SessionState {
        let identity = IdentityKeyPair::generate().unwrap().identity_key();
        SessionState::new(
            3,
            identity,
            identity,
            RootKey::new([1u8; 32]),
            X25519Secret::generate().unwrap(),
            ChainKey::new([2u8; 32], 0),
            X25519PublicKey::from([base; 32]),
        )
    }

    fn record_with(state: SessionState) -> SessionRecord {
        let mut record = SessionRecord::new_fresh();
        record.set_session_state(state);
        record
    }

    #[test]
    fn test_archive_is_a_bounded_ring() {
        let mut record = record_with(state(0));
        for base in 1..=5u8 {
            record.promote_state(state(base), 3);
        }

        assert_eq!(record.previous_session_count(), 3);
        let bases: Vec<u8> = record
            .previous_session_states()
            .map(|state| state.alice_base_key().as_bytes()[0])
            .collect();
        assert_eq!(bases, vec![4, 3, 2]);
        assert_eq!(
            record.session_state().unwrap().alice_base_key(),
            &X25519PublicKey::from([5u8; 32])
        );
    }

    #[test]
    fn test_promote_matching_session() {
        let mut record = record_with(state(1));
        record.promote_state(state(2), 5);

        assert!(record.promote_matching_session(3, &X25519PublicKey::from([2u8; 32]), 5));
        assert_eq!(record.previous_session_count(), 1);

        assert!(record.promote_matching_session(3, &X25519PublicKey::from([1u8; 32]), 5));
        assert_eq!(
            record.session_state().unwrap().alice_base_key(),
            &X25519PublicKey::from([1u8; 32])
        );
        assert_eq!(record.previous_session_count(), 1);

        assert!(!record.promote_matching_session(3, &X25519PublicKey::from([7u8; 32]), 5));
        assert!(!record.promote_matching_session(2, &X25519PublicKey::from([1u8; 32]), 5));
    }

    #[test]
    fn test_archive_current_state_leaves_no_session() {
        let mut record = record_with(state(1));
        record.archive_current_state(5);

        assert!(!record.has_current_session_state());
        assert_eq!(record.previous_session_count(), 1);
        assert_eq!(record.skipped_message_key_count(), 0);
    }
}
