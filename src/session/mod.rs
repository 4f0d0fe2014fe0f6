//! Session establishment and message processing on top of a [`ProtocolStore`].
//!
//! Every operation loads the record of one remote address, mutates a working
//! copy and commits it with a single `store_session` call. The whole cycle
//! runs under that address's lock, so concurrent calls for one address are
//! serialized while distinct addresses proceed in parallel.

mod builder;
pub use builder::SessionBuilder;
mod cipher;
pub use cipher::SessionCipher;

use crate::{ProtocolAddress, ProtocolStore, SessionConfig};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Lock table with one mutex per remote address.
#[derive(Default)]
pub(crate) struct SessionLocks {
    locks: Mutex<HashMap<ProtocolAddress, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    /// The lock guarding `address`, created on first use.
    ///
    /// Entries nobody holds or waits on are dropped on the way, so the table
    /// only tracks addresses with operations in flight.
    pub(crate) fn lock_for(&self, address: &ProtocolAddress) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        locks.retain(|known, lock| known == address || Arc::strong_count(lock) > 1);
        locks.entry(address.clone()).or_default().clone()
    }
}

/// Owns the store and the configuration shared by all builders and ciphers.
pub struct SessionManager<S> {
    store: S,
    config: SessionConfig,
    locks: SessionLocks,
}

impl<S: ProtocolStore> SessionManager<S> {
    /// Creates a manager over `store`. `None` selects [`SessionConfig::default`].
    pub fn new(store: S, config: Option<SessionConfig>) -> Self {
        Self {
            store,
            config: config.unwrap_or_default(),
            locks: SessionLocks::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// A builder for outbound sessions with `remote_address`.
    pub fn session_builder(&self, remote_address: ProtocolAddress) -> SessionBuilder<'_, S> {
        SessionBuilder::new(self, remote_address)
    }

    /// A cipher for messages exchanged with `remote_address`.
    pub fn session_cipher(&self, remote_address: ProtocolAddress) -> SessionCipher<'_, S> {
        SessionCipher::new(self, remote_address)
    }

    pub(crate) fn lock_for(&self, address: &ProtocolAddress) -> Arc<Mutex<()>> {
        self.locks.lock_for(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locks_are_per_address() {
        let locks = SessionLocks::default();
        let alice = ProtocolAddress::new("alice", 1);
        let bob = ProtocolAddress::new("bob", 1);

        let first = locks.lock_for(&alice);
        assert!(Arc::ptr_eq(&first, &locks.lock_for(&alice)));
        assert!(!Arc::ptr_eq(&first, &locks.lock_for(&bob)));

        let _guard = first.lock();
        assert!(locks.lock_for(&alice).try_lock().is_none());
        assert!(locks.lock_for(&bob).try_lock().is_some());
    }

    #[test]
    fn test_idle_locks_are_pruned() {
        let locks = SessionLocks::default();
        let held = locks.lock_for(&ProtocolAddress::new("alice", 1));
        for device in 0..100 {
            drop(locks.lock_for(&ProtocolAddress::new("bob", device)));
        }

        let carol = locks.lock_for(&ProtocolAddress::new("carol", 1));
        assert_eq!(locks.locks.lock().len(), 2);
        assert!(Arc::ptr_eq(&held, &locks.lock_for(&ProtocolAddress::new("alice", 1))));
        drop(carol);
    }
}
