use crate::consts::{
    ARCHIVED_STATES_MAX_LENGTH, MAX_MESSAGE_GAP, MAX_RECEIVER_CHAINS, MAX_SKIPPED_MESSAGE_KEYS,
};

/// Bounds applied to every session handled by a [`SessionManager`](crate::SessionManager).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Total skipped message keys a session state may cache.
    pub max_skipped_message_keys: u32,
    /// Largest forward jump a single message may request on its chain.
    pub max_message_gap: u32,
    /// Receiving chains retained per state.
    pub max_receiver_chains: usize,
    /// Archived states retained per record.
    pub max_archived_states: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_skipped_message_keys: MAX_SKIPPED_MESSAGE_KEYS,
            max_message_gap: MAX_MESSAGE_GAP,
            max_receiver_chains: MAX_RECEIVER_CHAINS,
            max_archived_states: ARCHIVED_STATES_MAX_LENGTH,
        }
    }
}
