use crate::Error;
use crate::consts::KDF_INFO_MESSAGE_KEYS;
use crate::crypto::hmac_sha256;
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

const MESSAGE_KEY_SEED: u8 = 0x01;
const CHAIN_KEY_SEED: u8 = 0x02;

/// Symmetric key of one sending or receiving chain, with the index of the
/// next message it will produce a key for.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub(crate) struct ChainKey {
    key: [u8; 32],
    index: u32,
}

impl ChainKey {
    pub(crate) fn new(key: [u8; 32], index: u32) -> Self {
        Self { key, index }
    }

    pub(crate) fn key(&self) -> &[u8; 32] {
        &self.key
    }

    pub(crate) fn index(&self) -> u32 {
        self.index
    }

    /// Advances the chain one step. The current key cannot be recovered from the result.
    ///
    /// Counters never repeat: a chain at `u32::MAX` cannot advance.
    pub(crate) fn next_chain_key(&self) -> Result<Self, Error> {
        let index = self.index.checked_add(1).ok_or(Error::ChainExhausted)?;
        Ok(Self {
            key: hmac_sha256(&self.key, &[CHAIN_KEY_SEED])?,
            index,
        })
    }

    /// Derives the keys for the message at this chain's index.
    pub(crate) fn message_keys(&self) -> Result<MessageKeys, Error> {
        let mut seed = hmac_sha256(&self.key, &[MESSAGE_KEY_SEED])?;
        let hkdf = Hkdf::<Sha256>::new(None, &seed);
        seed.zeroize();

        let mut derived_material = [0u8; 44];
        hkdf.expand(KDF_INFO_MESSAGE_KEYS, &mut derived_material)
            .map_err(|_| Error::Crypto("HKDF expansion failed".to_string()))?;

        let mut cipher_key = [0u8; 32];
        let mut nonce = [0u8; 12];
        cipher_key.copy_from_slice(&derived_material[0..32]);
        nonce.copy_from_slice(&derived_material[32..44]);
        derived_material.zeroize();

        Ok(MessageKeys {
            cipher_key,
            nonce,
            counter: self.index,
        })
    }
}

/// Keys protecting exactly one message.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub(crate) struct MessageKeys {
    cipher_key: [u8; 32],
    nonce: [u8; 12],
    counter: u32,
}

impl MessageKeys {
    pub(crate) fn new(cipher_key: [u8; 32], nonce: [u8; 12], counter: u32) -> Self {
        Self {
            cipher_key,
            nonce,
            counter,
        }
    }

    pub(crate) fn cipher_key(&self) -> &[u8; 32] {
        &self.cipher_key
    }

    pub(crate) fn nonce(&self) -> &[u8; 12] {
        &self.nonce
    }

    pub(crate) fn counter(&self) -> u32 {
        self.counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_chain_advances_index_and_key() {
        let chain = ChainKey::new([5u8; 32], 0);
        let next = chain.next_chain_key().unwrap();

        assert_eq!(next.index(), 1);
        assert_ne!(next.key(), chain.key());
    }

    #[test]
    fn test_chain_does_not_wrap() {
        let last = ChainKey::new([5u8; 32], u32::MAX);

        assert_eq!(last.message_keys().unwrap().counter(), u32::MAX);
        assert_eq!(last.next_chain_key().err(), Some(Error::ChainExhausted));
    }

    #[test]
    fn test_message_key_differs_from_chain_key() {
        let chain = ChainKey::new([5u8; 32], 0);
        let keys = chain.message_keys().unwrap();

        assert_ne!(keys.cipher_key(), chain.key());
        assert_ne!(keys.cipher_key(), chain.next_chain_key().unwrap().key());
        assert_eq!(keys.counter(), 0);
    }

    #[test]
    fn test_message_keys_are_pairwise_distinct() {
        let mut chain = ChainKey::new([9u8; 32], 0);
        let mut seen = HashSet::new();

        for expected in 0..100 {
            let keys = chain.message_keys().unwrap();
            assert_eq!(keys.counter(), expected);
            assert!(seen.insert(*keys.cipher_key()));
            chain = chain.next_chain_key().unwrap();
        }
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let a = ChainKey::new([1u8; 32], 3).message_keys().unwrap();
        let b = ChainKey::new([1u8; 32], 3).message_keys().unwrap();

        assert_eq!(a.cipher_key(), b.cipher_key());
        assert_eq!(a.nonce(), b.nonce());
    }
}
