//! Key schedule of the double ratchet and construction of the initial
//! session state on both sides of a handshake.
//!
//! The root key evolves with each DH ratchet step; each step yields a chain
//! key that is in turn advanced once per message. Compromise of a message key
//! reveals neither earlier keys (forward secrecy) nor, once a further DH step
//! has happened, later ones (break-in recovery).

mod chain;
mod root;

pub(crate) use chain::{ChainKey, MessageKeys};
pub(crate) use root::RootKey;

use crate::consts::CIPHERTEXT_MESSAGE_CURRENT_VERSION;
use crate::state::SessionState;
use crate::x3dh::{self, PreKeyBundle};
use crate::{
    Error, IdentityKey, IdentityKeyPair, PreKeyRecord, SignedPreKeyRecord, X25519PublicKey,
    X25519Secret,
};

/// Builds the initiator's state from a verified bundle.
///
/// The bundle's signed pre-key doubles as the responder's first ratchet key:
/// the initiator registers it as a receiving chain and immediately performs
/// one root-key step with a fresh sending ratchet key.
pub(crate) fn initialize_alice_session(
    our_identity: &IdentityKeyPair,
    our_base_key: &X25519Secret,
    their_bundle: &PreKeyBundle,
) -> Result<SessionState, Error> {
    let (root_key, chain_key) =
        x3dh::initiate_for_alice(our_identity, our_base_key, their_bundle)?.into_keys();

    let their_ratchet_key = their_bundle.signed_pre_key().1;
    let sending_ratchet_key = X25519Secret::generate()?;
    let (sending_root_key, sending_chain_key) =
        root_key.create_chain(&their_ratchet_key, &sending_ratchet_key)?;

    let mut state = SessionState::new(
        CIPHERTEXT_MESSAGE_CURRENT_VERSION,
        our_identity.identity_key(),
        *their_bundle.identity_key(),
        sending_root_key,
        sending_ratchet_key,
        sending_chain_key,
        our_base_key.public_key(),
    );
    state.add_receiver_chain(their_ratchet_key, chain_key, usize::MAX);

    Ok(state)
}

/// Builds the responder's state from the private halves of the pre-keys the
/// initiator claims to have used.
pub(crate) fn initialize_bob_session(
    our_identity: &IdentityKeyPair,
    our_signed_pre_key: &SignedPreKeyRecord,
    our_one_time_pre_key: Option<&PreKeyRecord>,
    their_identity: &IdentityKey,
    their_base_key: &X25519PublicKey,
) -> Result<SessionState, Error> {
    let (root_key, chain_key) = x3dh::initiate_for_bob(
        our_identity,
        our_signed_pre_key,
        our_one_time_pre_key,
        their_identity,
        their_base_key,
    )?
    .into_keys();

    Ok(SessionState::new(
        CIPHERTEXT_MESSAGE_CURRENT_VERSION,
        our_identity.identity_key(),
        *their_identity,
        root_key,
        our_signed_pre_key.key_pair(),
        chain_key,
        *their_base_key,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_states_line_up() {
        let alice_identity = IdentityKeyPair::generate().unwrap();
        let alice_base = X25519Secret::generate().unwrap();
        let bob_identity = IdentityKeyPair::generate().unwrap();
        let bob_signed = SignedPreKeyRecord::generate(3, &bob_identity, 0).unwrap();
        let bundle = PreKeyBundle::new(
            1,
            1,
            None,
            (bob_signed.id(), bob_signed.public_key()),
            bob_signed.signature(),
            bob_identity.identity_key(),
        );

        let alice = initialize_alice_session(&alice_identity, &alice_base, &bundle).unwrap();
        let bob = initialize_bob_session(
            &bob_identity,
            &bob_signed,
            None,
            &alice_identity.identity_key(),
            &alice_base.public_key(),
        )
        .unwrap();

        // Alice receives on Bob's signed pre-key chain, which is Bob's initial sending chain.
        let alice_receiving = alice
            .receiver_chain_key(&bob_signed.public_key())
            .unwrap();
        assert_eq!(alice_receiving.key(), bob.sender_chain_key().key());

        // Bob's first ratchet step with Alice's sending key reproduces her sending chain.
        let (root, chain) = bob
            .root_key()
            .create_chain(&alice.sender_ratchet_key(), bob.sender_ratchet_private())
            .unwrap();
        assert_eq!(root.key(), alice.root_key().key());
        assert_eq!(chain.key(), alice.sender_chain_key().key());

        assert_eq!(alice.alice_base_key(), bob.alice_base_key());
        assert_eq!(alice.remote_identity(), &bob_identity.identity_key());
    }
}
