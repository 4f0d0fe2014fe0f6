use crate::ratchet::{ChainKey, RootKey};
use crate::state::SkippedKeys;
use crate::{IdentityKey, X25519PublicKey, X25519Secret};
use std::collections::VecDeque;

#[derive(Clone)]
pub(crate) struct SenderChain {
    pub(crate) ratchet_key: X25519Secret,
    pub(crate) chain_key: ChainKey,
}

#[derive(Clone)]
pub(crate) struct ReceiverChain {
    pub(crate) ratchet_key: X25519PublicKey,
    pub(crate) chain_key: ChainKey,
}

/// Handshake data of a locally initiated session that the peer has not
/// answered yet. Every outgoing message repeats it until the first reply
/// decrypts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingPreKey {
    pub(crate) pre_key_id: Option<u32>,
    pub(crate) signed_pre_key_id: u32,
    pub(crate) base_key: X25519PublicKey,
}

impl PendingPreKey {
    /// Id of the consumed one-time pre-key, if the bundle carried one.
    pub fn pre_key_id(&self) -> Option<u32> {
        self.pre_key_id
    }

    /// Id of the remote signed pre-key.
    pub fn signed_pre_key_id(&self) -> u32 {
        self.signed_pre_key_id
    }

    /// Local base key used in the handshake.
    pub fn base_key(&self) -> &X25519PublicKey {
        &self.base_key
    }
}

/// One ratchet session with a remote device.
#[derive(Clone)]
pub struct SessionState {
    pub(crate) session_version: u8,
    pub(crate) local_identity: IdentityKey,
    pub(crate) remote_identity: IdentityKey,
    pub(crate) local_registration_id: u32,
    pub(crate) remote_registration_id: u32,
    pub(crate) root_key: RootKey,
    pub(crate) sender_chain: SenderChain,
    // Oldest first.
    pub(crate) receiver_chains: VecDeque<ReceiverChain>,
    pub(crate) previous_counter: u32,
    pub(crate) alice_base_key: X25519PublicKey,
    pub(crate) pending_pre_key: Option<PendingPreKey>,
    pub(crate) skipped_keys: SkippedKeys,
}

impl SessionState {
    pub(crate) fn new(
        session_version: u8,
        local_identity: IdentityKey,
        remote_identity: IdentityKey,
        root_key: RootKey,
        sender_ratchet_key: X25519Secret,
        sender_chain_key: ChainKey,
        alice_base_key: X25519PublicKey,
    ) -> Self {
        Self {
            session_version,
            local_identity,
            remote_identity,
            local_registration_id: 0,
            remote_registration_id: 0,
            root_key,
            sender_chain: SenderChain {
                ratchet_key: sender_ratchet_key,
                chain_key: sender_chain_key,
            },
            receiver_chains: VecDeque::new(),
            previous_counter: 0,
            alice_base_key,
            pending_pre_key: None,
            skipped_keys: SkippedKeys::default(),
        }
    }

    /// Protocol version this session was created with.
    pub fn session_version(&self) -> u8 {
        self.session_version
    }

    /// Our identity at the time the session was created.
    pub fn local_identity(&self) -> &IdentityKey {
        &self.local_identity
    }

    /// The peer's identity the session was created with.
    pub fn remote_identity(&self) -> &IdentityKey {
        &self.remote_identity
    }

    /// Our registration id.
    pub fn local_registration_id(&self) -> u32 {
        self.local_registration_id
    }

    /// The peer's registration id.
    pub fn remote_registration_id(&self) -> u32 {
        self.remote_registration_id
    }

    /// The initiator's base key; identifies the handshake that created this state.
    pub fn alice_base_key(&self) -> &X25519PublicKey {
        &self.alice_base_key
    }

    /// Our current sending ratchet public key.
    pub fn sender_ratchet_key(&self) -> X25519PublicKey {
        self.sender_chain.ratchet_key.public_key()
    }

    /// Number of messages sent under our previous sending chain.
    pub fn previous_counter(&self) -> u32 {
        self.previous_counter
    }

    /// Handshake data still attached to outgoing messages, if any.
    pub fn pending_pre_key(&self) -> Option<&PendingPreKey> {
        self.pending_pre_key.as_ref()
    }

    /// Number of receiving chains currently retained.
    pub fn receiver_chain_count(&self) -> usize {
        self.receiver_chains.len()
    }

    /// Number of cached keys for messages that have not arrived yet.
    pub fn skipped_message_key_count(&self) -> usize {
        self.skipped_keys.len()
    }

    pub(crate) fn root_key(&self) -> &RootKey {
        &self.root_key
    }

    pub(crate) fn sender_ratchet_private(&self) -> &X25519Secret {
        &self.sender_chain.ratchet_key
    }

    pub(crate) fn sender_chain_key(&self) -> &ChainKey {
        &self.sender_chain.chain_key
    }

    pub(crate) fn set_sender_chain_key(&mut self, chain_key: ChainKey) {
        self.sender_chain.chain_key = chain_key;
    }

    pub(crate) fn receiver_chain_key(&self, ratchet_key: &X25519PublicKey) -> Option<&ChainKey> {
        self.receiver_chains
            .iter()
            .find(|chain| chain.ratchet_key == *ratchet_key)
            .map(|chain| &chain.chain_key)
    }

    pub(crate) fn set_receiver_chain_key(
        &mut self,
        ratchet_key: &X25519PublicKey,
        chain_key: ChainKey,
    ) {
        if let Some(chain) = self
            .receiver_chains
            .iter_mut()
            .find(|chain| chain.ratchet_key == *ratchet_key)
        {
            chain.chain_key = chain_key;
        }
    }

    /// The ratchet key of the most recently established receiving chain.
    pub(crate) fn last_receiver_ratchet_key(&self) -> Option<X25519PublicKey> {
        self.receiver_chains.back().map(|chain| chain.ratchet_key)
    }

    /// Appends a receiving chain, dropping the oldest ones beyond `max_chains`
    /// together with their skipped keys. Returns how many keys were dropped.
    pub(crate) fn add_receiver_chain(
        &mut self,
        ratchet_key: X25519PublicKey,
        chain_key: ChainKey,
        max_chains: usize,
    ) -> usize {
        self.receiver_chains.push_back(ReceiverChain {
            ratchet_key,
            chain_key,
        });

        let mut dropped = 0;
        while self.receiver_chains.len() > max_chains.max(1) {
            if let Some(evicted) = self.receiver_chains.pop_front() {
                dropped += self.skipped_keys.remove_chain(&evicted.ratchet_key);
            }
        }
        dropped
    }

    /// Completes a ratchet step: new root key, new sending chain, and the
    /// count of messages sent under the chain being replaced.
    pub(crate) fn replace_sender_chain(
        &mut self,
        root_key: RootKey,
        ratchet_key: X25519Secret,
        chain_key: ChainKey,
    ) {
        self.previous_counter = self.sender_chain.chain_key.index();
        self.root_key = root_key;
        self.sender_chain = SenderChain {
            ratchet_key,
            chain_key,
        };
    }

    pub(crate) fn clear_pending_pre_key(&mut self) {
        self.pending_pre_key = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IdentityKeyPair;

    fn state() -> SessionState {
        let identity = IdentityKeyPair::generate().unwrap().identity_key();
        SessionState::new(
            3,
            identity,
            identity,
            RootKey::new([1u8; 32]),
            X25519Secret::generate().unwrap(),
            ChainKey::new([2u8; 32], 0),
            X25519PublicKey::from([3u8; 32]),
        )
    }

    #[test]
    fn test_receiver_chains_are_bounded() {
        let mut state = state();
        for i in 0..7u8 {
            state.add_receiver_chain(
                X25519PublicKey::from([i; 32]),
                ChainKey::new([i; 32], 0),
                5,
            );
        }

        assert_eq!(state.receiver_chain_count(), 5);
        assert!(state.receiver_chain_key(&X25519PublicKey::from([0u8; 32])).is_none());
        assert!(state.receiver_chain_key(&X25519PublicKey::from([6u8; 32])).is_some());
        assert_eq!(
            state.last_receiver_ratchet_key(),
            Some(X25519PublicKey::from([6u8; 32]))
        );
    }

    #[test]
    fn test_evicted_chain_takes_its_skipped_keys() {
        let mut state = state();
        let oldest = X25519PublicKey::from([0u8; 32]);
        let newest = X25519PublicKey::from([1u8; 32]);
        state.add_receiver_chain(oldest, ChainKey::new([0u8; 32], 0), 2);
        state.add_receiver_chain(newest, ChainKey::new([1u8; 32], 0), 2);

        let mut chain_key = ChainKey::new([0u8; 32], 0);
        for _ in 0..3 {
            state.skipped_keys.insert(oldest, chain_key.message_keys().unwrap());
            chain_key = chain_key.next_chain_key().unwrap();
        }
        state
            .skipped_keys
            .insert(newest, ChainKey::new([1u8; 32], 0).message_keys().unwrap());

        let dropped = state.add_receiver_chain(
            X25519PublicKey::from([2u8; 32]),
            ChainKey::new([2u8; 32], 0),
            2,
        );

        assert_eq!(dropped, 3);
        assert_eq!(state.skipped_message_key_count(), 1);
        assert!(state.skipped_keys.take(&newest, 0).is_some());
    }

    #[test]
    fn test_replacing_sender_chain_records_previous_counter() {
        let mut state = state();
        let advanced = state.sender_chain_key().next_chain_key().unwrap();
        let advanced = advanced.next_chain_key().unwrap();
        state.set_sender_chain_key(advanced);

        let old_ratchet_key = state.sender_ratchet_key();
        state.replace_sender_chain(
            RootKey::new([8u8; 32]),
            X25519Secret::generate().unwrap(),
            ChainKey::new([9u8; 32], 0),
        );

        assert_eq!(state.previous_counter(), 2);
        assert_eq!(state.sender_chain_key().index(), 0);
        assert_ne!(state.sender_ratchet_key(), old_ratchet_key);
    }
}
