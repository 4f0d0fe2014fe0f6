use crate::{Error, X25519PublicKey, X25519Secret, crypto::generate_random_seed};
use base64::Engine;
use ed25519_dalek::{SecretKey, Signature, Signer, SigningKey, VerifyingKey};
use std::fmt;
use x25519_dalek::SharedSecret;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of a serialized public [`IdentityKey`].
pub const IDENTITY_KEY_LENGTH: usize = 64;

/// The public half of a device identity.
///
/// Carries the X25519 key used in the handshake and the Ed25519 key that
/// signs pre-keys. Serializes to 64 bytes: agreement key then verifying key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    dh_key: X25519PublicKey,
    signing_key: VerifyingKey,
}

impl IdentityKey {
    /// Creates an identity from its two public components.
    pub fn new(dh_key: X25519PublicKey, signing_key: VerifyingKey) -> Self {
        Self {
            dh_key,
            signing_key,
        }
    }

    /// The X25519 key used for Diffie-Hellman.
    #[inline]
    pub fn dh_key(&self) -> &X25519PublicKey {
        &self.dh_key
    }

    /// The Ed25519 key that verifies pre-key signatures.
    #[inline]
    pub fn signing_key(&self) -> &VerifyingKey {
        &self.signing_key
    }

    /// Verifies `signature` over `message` with this identity.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), Error> {
        self.signing_key
            .verify_strict(message, signature)
            .map_err(|_| Error::Signature)
    }

    /// Serializes the public identity to 64 bytes.
    pub fn to_bytes(&self) -> [u8; IDENTITY_KEY_LENGTH] {
        let mut bytes = [0u8; IDENTITY_KEY_LENGTH];
        bytes[0..32].copy_from_slice(self.dh_key.as_bytes());
        bytes[32..64].copy_from_slice(self.signing_key.as_bytes());
        bytes
    }

    /// Parses a public identity from exactly 64 bytes.
    pub fn try_from_slice(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != IDENTITY_KEY_LENGTH {
            return Err(Error::InvalidMessage(format!(
                "Invalid identity key length: {}",
                bytes.len()
            )));
        }

        let dh_key = X25519PublicKey::try_from_slice(&bytes[0..32])?;
        let mut signing_bytes = [0u8; 32];
        signing_bytes.copy_from_slice(&bytes[32..64]);
        let signing_key = VerifyingKey::from_bytes(&signing_bytes)
            .map_err(|err| Error::InvalidMessage(err.to_string()))?;

        Ok(Self {
            dh_key,
            signing_key,
        })
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let engine = base64::engine::general_purpose::STANDARD;
        f.write_str(&engine.encode(self.to_bytes()))
    }
}

/// Long-term identity key pair that combines signing and key agreement capabilities.
///
/// Both the Ed25519 signing key and the X25519 agreement key are derived from
/// one random seed.
#[derive(Clone)]
pub struct IdentityKeyPair {
    signing_key: Box<SigningKey>,
    dh_key: X25519Secret,
}

impl IdentityKeyPair {
    /// Creates a new identity key pair with randomly generated components.
    pub fn generate() -> Result<Self, Error> {
        let seed = generate_random_seed()?;
        let signing_key = Box::new(SigningKey::from(SecretKey::from(*seed)));
        let dh_key = X25519Secret::from(seed);

        Ok(Self {
            signing_key,
            dh_key,
        })
    }

    /// Signs a message using the Ed25519 signing key.
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }

    /// The public identity published to other parties.
    pub fn identity_key(&self) -> IdentityKey {
        IdentityKey {
            dh_key: self.dh_key.public_key(),
            signing_key: self.signing_key.verifying_key(),
        }
    }

    pub(crate) fn dh(&self, public_key: &X25519PublicKey) -> SharedSecret {
        self.dh_key.dh(public_key)
    }

    /// Serializes the private key pair to a 64-byte array.
    ///
    /// The first 32 bytes contain the Ed25519 private key,
    /// and the last 32 bytes contain the X25519 private key.
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut bytes = [0u8; 64];
        bytes[0..32].copy_from_slice(self.signing_key.as_bytes().as_slice());
        bytes[32..64].copy_from_slice(self.dh_key.as_bytes());

        bytes
    }
}

impl From<[u8; 64]> for IdentityKeyPair {
    /// Deserializes a private key pair from a 64-byte array.
    fn from(mut bytes: [u8; 64]) -> Self {
        let mut private_sk_bytes = Box::new([0u8; 32]);
        private_sk_bytes.copy_from_slice(&bytes[0..32]);
        let signing_key = Box::new(SigningKey::from_bytes(&private_sk_bytes));
        private_sk_bytes.zeroize();

        let mut private_dh_bytes = Box::new([0u8; 32]);
        private_dh_bytes.copy_from_slice(&bytes[32..64]);
        let dh_key = X25519Secret::from(private_dh_bytes);

        bytes.zeroize();

        Self {
            signing_key,
            dh_key,
        }
    }
}

impl ZeroizeOnDrop for IdentityKeyPair {}
