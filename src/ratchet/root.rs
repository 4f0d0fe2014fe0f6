use crate::consts::KDF_INFO_RATCHET;
use crate::ratchet::ChainKey;
use crate::{Error, X25519PublicKey, X25519Secret};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// The root secret of a session, replaced on every ratchet step.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub(crate) struct RootKey {
    key: [u8; 32],
}

impl RootKey {
    pub(crate) fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    pub(crate) fn key(&self) -> &[u8; 32] {
        &self.key
    }

    /// One root-key step: mixes `DH(our_ratchet_key, their_ratchet_key)` into the
    /// root key, yielding the next root key and a fresh chain.
    pub(crate) fn create_chain(
        &self,
        their_ratchet_key: &X25519PublicKey,
        our_ratchet_key: &X25519Secret,
    ) -> Result<(RootKey, ChainKey), Error> {
        let mut shared_secret = our_ratchet_key.dh(their_ratchet_key).to_bytes();
        let hkdf = Hkdf::<Sha256>::new(Some(&self.key), &shared_secret);
        shared_secret.zeroize();

        let mut derived_material = [0u8; 64];
        hkdf.expand(KDF_INFO_RATCHET, &mut derived_material)
            .map_err(|_| Error::Crypto("HKDF expansion failed for root key".to_string()))?;

        let mut root_key = [0u8; 32];
        let mut chain_key = [0u8; 32];
        root_key.copy_from_slice(&derived_material[0..32]);
        chain_key.copy_from_slice(&derived_material[32..64]);
        derived_material.zeroize();

        Ok((RootKey::new(root_key), ChainKey::new(chain_key, 0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_sides_derive_same_chain() {
        let root = RootKey::new([4u8; 32]);
        let alice = X25519Secret::generate().unwrap();
        let bob = X25519Secret::generate().unwrap();

        let (alice_root, alice_chain) = root.create_chain(&bob.public_key(), &alice).unwrap();
        let (bob_root, bob_chain) = root.create_chain(&alice.public_key(), &bob).unwrap();

        assert_eq!(alice_root.key(), bob_root.key());
        assert_eq!(alice_chain.key(), bob_chain.key());
        assert_eq!(alice_chain.index(), 0);
        assert_ne!(alice_root.key(), root.key());
    }
}
