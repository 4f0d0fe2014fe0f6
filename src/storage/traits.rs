//! Storage capabilities required by session building and message processing.
//!
//! Every method takes `&self`; implementations synchronize internally and
//! must be thread-safe (`Send + Sync`). A `SessionManager` serializes access
//! per address, so a store never sees two concurrent writes for one address.

use crate::storage::StoreError;
use crate::{
    IdentityKey, IdentityKeyPair, PreKeyRecord, ProtocolAddress, SessionRecord,
    SignedPreKeyRecord,
};

/// Which way a message travels when an identity's trust is checked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Sending,
    Receiving,
}

/// Persistence of session records, one per remote address.
pub trait SessionStore: Send + Sync {
    /// Load the record for `address`, `Ok(None)` if there is none.
    fn load_session(&self, address: &ProtocolAddress) -> Result<Option<SessionRecord>, StoreError>;

    /// Save the record for `address`, replacing any previous one.
    fn store_session(
        &self,
        address: &ProtocolAddress,
        record: &SessionRecord,
    ) -> Result<(), StoreError>;

    /// Check whether a record exists for `address`.
    fn contains_session(&self, address: &ProtocolAddress) -> Result<bool, StoreError>;

    /// Delete the record for `address`. Deleting a missing record is not an error.
    fn delete_session(&self, address: &ProtocolAddress) -> Result<(), StoreError>;

    /// Delete the records of every device of `name`.
    fn delete_all_sessions(&self, name: &str) -> Result<(), StoreError>;

    /// Device ids of `name` that have a record.
    fn sub_device_sessions(&self, name: &str) -> Result<Vec<u32>, StoreError>;
}

/// Local one-time pre-keys, consumed by inbound handshakes.
pub trait PreKeyStore: Send + Sync {
    fn load_pre_key(&self, id: u32) -> Result<Option<PreKeyRecord>, StoreError>;

    fn store_pre_key(&self, id: u32, record: &PreKeyRecord) -> Result<(), StoreError>;

    fn contains_pre_key(&self, id: u32) -> Result<bool, StoreError>;

    /// Remove a pre-key once a handshake that used it has decrypted.
    fn remove_pre_key(&self, id: u32) -> Result<(), StoreError>;
}

/// Local signed pre-keys.
pub trait SignedPreKeyStore: Send + Sync {
    fn load_signed_pre_key(&self, id: u32) -> Result<Option<SignedPreKeyRecord>, StoreError>;

    fn store_signed_pre_key(&self, id: u32, record: &SignedPreKeyRecord)
    -> Result<(), StoreError>;
}

/// The local identity and what is known about remote ones.
pub trait IdentityKeyStore: Send + Sync {
    fn identity_key_pair(&self) -> Result<IdentityKeyPair, StoreError>;

    fn local_registration_id(&self) -> Result<u32, StoreError>;

    /// Decide whether `identity` may be used with `address` in `direction`.
    fn is_trusted_identity(
        &self,
        address: &ProtocolAddress,
        identity: &IdentityKey,
        direction: Direction,
    ) -> Result<bool, StoreError>;

    /// Record `identity` for `address`. Returns `true` if it replaced a different key.
    fn save_identity(
        &self,
        address: &ProtocolAddress,
        identity: &IdentityKey,
    ) -> Result<bool, StoreError>;

    fn identity(&self, address: &ProtocolAddress) -> Result<Option<IdentityKey>, StoreError>;
}

/// Everything a [`SessionManager`](crate::SessionManager) needs from storage.
pub trait ProtocolStore: SessionStore + PreKeyStore + SignedPreKeyStore + IdentityKeyStore {}

impl<T> ProtocolStore for T where T: SessionStore + PreKeyStore + SignedPreKeyStore + IdentityKeyStore
{}
