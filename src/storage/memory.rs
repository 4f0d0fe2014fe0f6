//! In-memory protocol store for tests and short-lived clients.
//!
//! Records and pre-keys are held in their serialized form, so every load
//! goes through the same decoding path a persistent backend would use.

use crate::storage::{
    Direction, IdentityKeyStore, PreKeyStore, SessionStore, SignedPreKeyStore, StoreError,
};
use crate::{
    IdentityKey, IdentityKeyPair, PreKeyRecord, ProtocolAddress, SessionRecord,
    SignedPreKeyRecord,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::warn;
use zeroize::Zeroize;

/// A [`ProtocolStore`](crate::ProtocolStore) kept entirely in memory.
///
/// Trusts an identity the first time it is seen for an address and
/// afterwards only that identical key. All data is lost when the store is
/// dropped.
pub struct InMemoryProtocolStore {
    identity_key_pair: IdentityKeyPair,
    registration_id: u32,
    sessions: Mutex<HashMap<ProtocolAddress, Vec<u8>>>,
    pre_keys: Mutex<HashMap<u32, [u8; 36]>>,
    signed_pre_keys: Mutex<HashMap<u32, [u8; 108]>>,
    identities: Mutex<HashMap<ProtocolAddress, IdentityKey>>,
}

impl InMemoryProtocolStore {
    /// Creates an empty store for the given local identity.
    pub fn new(identity_key_pair: IdentityKeyPair, registration_id: u32) -> Self {
        Self {
            identity_key_pair,
            registration_id,
            sessions: Mutex::new(HashMap::new()),
            pre_keys: Mutex::new(HashMap::new()),
            signed_pre_keys: Mutex::new(HashMap::new()),
            identities: Mutex::new(HashMap::new()),
        }
    }

    /// Number of one-time pre-keys still available.
    pub fn pre_key_count(&self) -> usize {
        self.pre_keys.lock().len()
    }
}

impl SessionStore for InMemoryProtocolStore {
    fn load_session(&self, address: &ProtocolAddress) -> Result<Option<SessionRecord>, StoreError> {
        let sessions = self.sessions.lock();
        sessions
            .get(address)
            .map(|bytes| {
                SessionRecord::deserialize(bytes)
                    .map_err(|err| StoreError::Serialization(err.to_string()))
            })
            .transpose()
    }

    fn store_session(
        &self,
        address: &ProtocolAddress,
        record: &SessionRecord,
    ) -> Result<(), StoreError> {
        let bytes = record
            .serialize()
            .map_err(|err| StoreError::Serialization(err.to_string()))?;

        if let Some(mut previous) = self.sessions.lock().insert(address.clone(), bytes) {
            previous.zeroize();
        }
        Ok(())
    }

    fn contains_session(&self, address: &ProtocolAddress) -> Result<bool, StoreError> {
        Ok(self.sessions.lock().contains_key(address))
    }

    fn delete_session(&self, address: &ProtocolAddress) -> Result<(), StoreError> {
        if let Some(mut bytes) = self.sessions.lock().remove(address) {
            bytes.zeroize();
        }
        Ok(())
    }

    fn delete_all_sessions(&self, name: &str) -> Result<(), StoreError> {
        self.sessions.lock().retain(|address, bytes| {
            let keep = address.name() != name;
            if !keep {
                bytes.zeroize();
            }
            keep
        });
        Ok(())
    }

    fn sub_device_sessions(&self, name: &str) -> Result<Vec<u32>, StoreError> {
        let mut device_ids: Vec<u32> = self
            .sessions
            .lock()
            .keys()
            .filter(|address| address.name() == name)
            .map(ProtocolAddress::device_id)
            .collect();
        device_ids.sort_unstable();
        Ok(device_ids)
    }
}

impl PreKeyStore for InMemoryProtocolStore {
    fn load_pre_key(&self, id: u32) -> Result<Option<PreKeyRecord>, StoreError> {
        Ok(self.pre_keys.lock().get(&id).map(|bytes| PreKeyRecord::from(*bytes)))
    }

    fn store_pre_key(&self, id: u32, record: &PreKeyRecord) -> Result<(), StoreError> {
        self.pre_keys.lock().insert(id, record.to_bytes());
        Ok(())
    }

    fn contains_pre_key(&self, id: u32) -> Result<bool, StoreError> {
        Ok(self.pre_keys.lock().contains_key(&id))
    }

    fn remove_pre_key(&self, id: u32) -> Result<(), StoreError> {
        if let Some(mut bytes) = self.pre_keys.lock().remove(&id) {
            bytes.zeroize();
        }
        Ok(())
    }
}

impl SignedPreKeyStore for InMemoryProtocolStore {
    fn load_signed_pre_key(&self, id: u32) -> Result<Option<SignedPreKeyRecord>, StoreError> {
        let signed_pre_keys = self.signed_pre_keys.lock();
        signed_pre_keys
            .get(&id)
            .map(|bytes| {
                SignedPreKeyRecord::from_bytes(bytes)
                    .map_err(|err| StoreError::Serialization(err.to_string()))
            })
            .transpose()
    }

    fn store_signed_pre_key(
        &self,
        id: u32,
        record: &SignedPreKeyRecord,
    ) -> Result<(), StoreError> {
        self.signed_pre_keys.lock().insert(id, record.to_bytes());
        Ok(())
    }
}

impl IdentityKeyStore for InMemoryProtocolStore {
    fn identity_key_pair(&self) -> Result<IdentityKeyPair, StoreError> {
        Ok(self.identity_key_pair.clone())
    }

    fn local_registration_id(&self) -> Result<u32, StoreError> {
        Ok(self.registration_id)
    }

    fn is_trusted_identity(
        &self,
        address: &ProtocolAddress,
        identity: &IdentityKey,
        _direction: Direction,
    ) -> Result<bool, StoreError> {
        Ok(self
            .identities
            .lock()
            .get(address)
            .is_none_or(|known| known == identity))
    }

    fn save_identity(
        &self,
        address: &ProtocolAddress,
        identity: &IdentityKey,
    ) -> Result<bool, StoreError> {
        let previous = self.identities.lock().insert(address.clone(), *identity);
        let changed = previous.is_some_and(|known| known != *identity);
        if changed {
            warn!(%address, "Replaced identity key on record");
        }
        Ok(changed)
    }

    fn identity(&self, address: &ProtocolAddress) -> Result<Option<IdentityKey>, StoreError> {
        Ok(self.identities.lock().get(address).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> InMemoryProtocolStore {
        InMemoryProtocolStore::new(IdentityKeyPair::generate().unwrap(), 5)
    }

    #[test]
    fn test_trust_on_first_use() {
        let store = store();
        let address = ProtocolAddress::new("bob", 1);
        let bob = IdentityKeyPair::generate().unwrap().identity_key();
        let mallory = IdentityKeyPair::generate().unwrap().identity_key();

        assert!(store
            .is_trusted_identity(&address, &bob, Direction::Sending)
            .unwrap());
        assert!(!store.save_identity(&address, &bob).unwrap());
        assert!(store
            .is_trusted_identity(&address, &bob, Direction::Receiving)
            .unwrap());
        assert!(!store
            .is_trusted_identity(&address, &mallory, Direction::Receiving)
            .unwrap());

        assert!(store.save_identity(&address, &mallory).unwrap());
        assert_eq!(store.identity(&address).unwrap(), Some(mallory));
    }

    #[test]
    fn test_pre_key_lifecycle() {
        let store = store();
        let record = PreKeyRecord::generate(12).unwrap();
        store.store_pre_key(12, &record).unwrap();

        assert!(store.contains_pre_key(12).unwrap());
        assert_eq!(
            store.load_pre_key(12).unwrap().unwrap().public_key(),
            record.public_key()
        );

        store.remove_pre_key(12).unwrap();
        assert!(store.load_pre_key(12).unwrap().is_none());
        assert_eq!(store.pre_key_count(), 0);
    }

    #[test]
    fn test_signed_pre_key_round_trips_through_bytes() {
        let store = store();
        let identity = store.identity_key_pair().unwrap();
        let record = SignedPreKeyRecord::generate(3, &identity, 99).unwrap();
        store.store_signed_pre_key(3, &record).unwrap();

        let loaded = store.load_signed_pre_key(3).unwrap().unwrap();
        assert_eq!(loaded.public_key(), record.public_key());
        assert_eq!(loaded.timestamp(), 99);
        assert!(store.load_signed_pre_key(4).unwrap().is_none());
    }

    #[test]
    fn test_sessions_by_device() {
        let store = store();
        let record = SessionRecord::new_fresh();
        for device_id in [3, 1, 2] {
            store
                .store_session(&ProtocolAddress::new("bob", device_id), &record)
                .unwrap();
        }
        store
            .store_session(&ProtocolAddress::new("carol", 1), &record)
            .unwrap();

        assert_eq!(store.sub_device_sessions("bob").unwrap(), vec![1, 2, 3]);

        store.delete_session(&ProtocolAddress::new("bob", 2)).unwrap();
        assert_eq!(store.sub_device_sessions("bob").unwrap(), vec![1, 3]);

        store.delete_all_sessions("bob").unwrap();
        assert!(store.sub_device_sessions("bob").unwrap().is_empty());
        assert!(store
            .contains_session(&ProtocolAddress::new("carol", 1))
            .unwrap());
    }
}
