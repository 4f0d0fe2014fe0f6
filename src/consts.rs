//! Protocol constants and the bounds that keep session records finite.

/// Session version written into every wire message.
pub const CIPHERTEXT_MESSAGE_CURRENT_VERSION: u8 = 3;

/// Upper bound on cached skipped message keys across all receiving chains of a state.
pub const MAX_SKIPPED_MESSAGE_KEYS: u32 = 2000;

/// Upper bound on how far a single message may jump ahead of its chain.
pub const MAX_MESSAGE_GAP: u32 = 1000;

/// Receiving chains kept per state; the oldest is dropped first.
pub const MAX_RECEIVER_CHAINS: usize = 5;

/// Archived session states kept per record; the oldest is dropped first.
pub const ARCHIVED_STATES_MAX_LENGTH: usize = 10;

pub(crate) const KDF_INFO_ROOT: &[u8] = b"WhisperText";
pub(crate) const KDF_INFO_RATCHET: &[u8] = b"WhisperRatchet";
pub(crate) const KDF_INFO_MESSAGE_KEYS: &[u8] = b"WhisperMessageKeys";
