use crate::ProtocolAddress;
use crate::storage::StoreError;

/// Errors that can occur during session establishment and message processing.
///
/// Only [`Error::Store`] is safe to retry: it reports a failure of the backing
/// store and leaves the session untouched. Every other variant is final for the
/// message or bundle that produced it.
#[derive(thiserror::Error, Debug, Clone, Eq, PartialEq)]
pub enum Error {
    /// The signed pre-key signature in a bundle did not verify.
    #[error("Signed pre-key signature is invalid")]
    Signature,

    /// A referenced pre-key is unknown or has already been consumed.
    #[error("Invalid pre-key id: {0}")]
    InvalidKeyId(u32),

    /// The message key for this counter was already used or never existed.
    #[error("Duplicate or unknown message with counter {counter}")]
    DuplicateMessage {
        /// Counter carried by the rejected message.
        counter: u32,
    },

    /// Caching the keys needed to reach a message would exceed the skipped-key bound.
    #[error("Too many skipped messages: {requested} requested, limit {limit}")]
    SkippedKeyLimitExceeded {
        /// Number of keys the message would have required.
        requested: u32,
        /// Configured bound that was hit.
        limit: u32,
    },

    /// A chain reached the last counter and cannot produce further keys.
    #[error("Message chain exhausted")]
    ChainExhausted,

    /// Authenticated decryption failed: the message was tampered with or the key is wrong.
    #[error("Message decryption failed")]
    DecryptionFailure,

    /// The remote identity key differs from the one on record.
    #[error("Untrusted identity for {0}")]
    UntrustedIdentity(ProtocolAddress),

    /// No usable session exists for the address.
    #[error("No session for {0}")]
    NoSession(ProtocolAddress),

    /// A wire message could not be parsed.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// The backing store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Serialization or deserialization failed.
    #[error("Serialization/deserialization failed: {0}")]
    Serde(String),

    /// A cryptographic primitive failed.
    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),

    /// Random number generation failed.
    #[error("Random number generation failed")]
    Random,
}

impl Error {
    /// Whether the operation may be attempted again with the same input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

impl From<aes_gcm_siv::Error> for Error {
    fn from(_: aes_gcm_siv::Error) -> Self {
        Self::DecryptionFailure
    }
}

impl From<prost::DecodeError> for Error {
    fn from(value: prost::DecodeError) -> Self {
        Self::Serde(value.to_string())
    }
}
