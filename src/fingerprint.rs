//! Numeric safety numbers for comparing identity keys out of band.

use crate::IdentityKey;
use sha2::{Digest, Sha512};
use std::fmt;

/// Hash iterations used unless the caller asks otherwise.
pub const DEFAULT_ITERATIONS: u32 = 5200;

const FINGERPRINT_VERSION: u16 = 0;

/// Derives [`Fingerprint`]s with a fixed iteration count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FingerprintGenerator {
    iterations: u32,
}

impl Default for FingerprintGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_ITERATIONS)
    }
}

impl FingerprintGenerator {
    /// A generator hashing `iterations` times; at least one iteration is always done.
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }

    /// The 60-digit safety number shared by the two parties.
    ///
    /// Both sides compute the same number regardless of which one is local.
    pub fn create_for(
        &self,
        local_identifier: &[u8],
        local_key: &IdentityKey,
        remote_identifier: &[u8],
        remote_key: &IdentityKey,
    ) -> Fingerprint {
        let mut halves = [
            self.display_string_for(local_identifier, local_key),
            self.display_string_for(remote_identifier, remote_key),
        ];
        halves.sort_unstable();

        Fingerprint {
            digits: halves.concat(),
        }
    }

    fn display_string_for(&self, identifier: &[u8], key: &IdentityKey) -> String {
        let key = key.to_bytes();

        let mut data = Vec::with_capacity(2 + key.len() + identifier.len());
        data.extend_from_slice(&FINGERPRINT_VERSION.to_be_bytes());
        data.extend_from_slice(&key);
        data.extend_from_slice(identifier);

        for _ in 0..self.iterations {
            let mut hasher = Sha512::new();
            hasher.update(&data);
            hasher.update(key);
            data = hasher.finalize().to_vec();
        }

        data[..30].chunks(5).map(encoded_chunk).collect()
    }
}

/// Five bytes as a zero-padded five digit group.
fn encoded_chunk(chunk: &[u8]) -> String {
    let value = chunk
        .iter()
        .fold(0u64, |acc, &byte| (acc << 8) | u64::from(byte));
    format!("{:05}", value % 100_000)
}

/// A displayable safety number.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fingerprint {
    digits: String,
}

impl Fingerprint {
    pub fn display_text(&self) -> &str {
        &self.digits
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.digits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IdentityKeyPair;

    #[test]
    fn test_fingerprint_is_symmetric() {
        let generator = FingerprintGenerator::new(10);
        let alice = IdentityKeyPair::generate().unwrap().identity_key();
        let bob = IdentityKeyPair::generate().unwrap().identity_key();

        let from_alice = generator.create_for(b"+14152222222", &alice, b"+14153333333", &bob);
        let from_bob = generator.create_for(b"+14153333333", &bob, b"+14152222222", &alice);

        assert_eq!(from_alice, from_bob);
        assert_eq!(from_alice.display_text().len(), 60);
        assert!(from_alice.to_string().bytes().all(|b| b.is_ascii_digit()));
    }

    #[test]
    fn test_fingerprint_depends_on_keys() {
        let generator = FingerprintGenerator::new(10);
        let alice = IdentityKeyPair::generate().unwrap().identity_key();
        let bob = IdentityKeyPair::generate().unwrap().identity_key();
        let mallory = IdentityKeyPair::generate().unwrap().identity_key();

        assert_ne!(
            generator.create_for(b"alice", &alice, b"bob", &bob),
            generator.create_for(b"alice", &alice, b"bob", &mallory)
        );
    }

    #[test]
    fn test_zero_iterations_still_hashes() {
        let key = IdentityKeyPair::generate().unwrap().identity_key();
        assert_eq!(
            FingerprintGenerator::new(0).display_string_for(b"id", &key),
            FingerprintGenerator::new(1).display_string_for(b"id", &key)
        );
    }

    #[test]
    fn test_chunk_encoding() {
        assert_eq!(encoded_chunk(&[0, 0, 0, 0, 7]), "00007");
        assert_eq!(encoded_chunk(&[0xff; 5]), format!("{:05}", 0xff_ffff_ffffu64 % 100_000));
    }
}
