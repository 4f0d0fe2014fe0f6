use crate::{Error, IdentityKeyPair, X25519PublicKey, X25519Secret};
use ed25519_dalek::Signature;
use x25519_dalek::SharedSecret;

/// A medium-term signed pre-key as defined in Signal's X3DH protocol.
///
/// Signed pre-keys are signed with the owner's identity key so that an
/// initiator can authenticate them before running the handshake. They are
/// rotated periodically; older ones stay in the store until no pending
/// handshake can reference them.
#[derive(Clone)]
pub struct SignedPreKeyRecord {
    pre_key: X25519Secret,
    id: u32,
    signature: Signature,
    timestamp: u64,
}

impl SignedPreKeyRecord {
    /// Generates a new signed pre-key and signs its public half with `identity`.
    pub fn generate(id: u32, identity: &IdentityKeyPair, timestamp: u64) -> Result<Self, Error> {
        let pre_key = X25519Secret::generate()?;
        let signature = identity.sign(pre_key.public_key().as_bytes());

        Ok(Self {
            pre_key,
            id,
            signature,
            timestamp,
        })
    }

    /// Returns the public component of this signed pre-key.
    pub fn public_key(&self) -> X25519PublicKey {
        self.pre_key.public_key()
    }

    pub(crate) fn key_pair(&self) -> X25519Secret {
        self.pre_key.clone()
    }

    /// Returns the unique identifier for this signed pre-key.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Signature over the 32 public key bytes by the owner's identity key.
    pub fn signature(&self) -> Signature {
        self.signature
    }

    /// Creation time in milliseconds since the Unix epoch.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub(crate) fn dh(&self, public_key: &X25519PublicKey) -> SharedSecret {
        self.pre_key.dh(public_key)
    }

    /// Serializes the signed pre-key to a 108-byte array.
    ///
    /// The format is:
    /// - 4 bytes: ID (big-endian u32)
    /// - 32 bytes: X25519 private key
    /// - 64 bytes: Ed25519 signature
    /// - 8 bytes: timestamp (big-endian u64)
    pub fn to_bytes(&self) -> [u8; 108] {
        let mut result = [0u8; 108];

        result[0..4].copy_from_slice(&self.id.to_be_bytes());
        result[4..36].copy_from_slice(self.pre_key.as_bytes());
        result[36..100].copy_from_slice(&self.signature.to_bytes());
        result[100..108].copy_from_slice(&self.timestamp.to_be_bytes());

        result
    }

    /// Deserializes a signed pre-key produced by [`SignedPreKeyRecord::to_bytes`].
    pub fn from_bytes(bytes: &[u8; 108]) -> Result<Self, Error> {
        let mut id_bytes = [0u8; 4];
        id_bytes.copy_from_slice(&bytes[0..4]);

        let pre_key = X25519Secret::try_from_slice(&bytes[4..36])?;
        let signature =
            Signature::from_slice(&bytes[36..100]).map_err(|err| Error::Serde(err.to_string()))?;

        let mut timestamp_bytes = [0u8; 8];
        timestamp_bytes.copy_from_slice(&bytes[100..108]);

        Ok(Self {
            pre_key,
            id: u32::from_be_bytes(id_bytes),
            signature,
            timestamp: u64::from_be_bytes(timestamp_bytes),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_pre_key_creation() {
        let identity = IdentityKeyPair::generate().unwrap();
        let pre_key = SignedPreKeyRecord::generate(13, &identity, 1_700_000_000_000).unwrap();

        assert_eq!(pre_key.id(), 13);
        assert!(
            identity
                .identity_key()
                .verify(pre_key.public_key().as_bytes(), &pre_key.signature())
                .is_ok()
        );
    }

    #[test]
    fn test_signed_pre_key_serialization() {
        let identity = IdentityKeyPair::generate().unwrap();
        let original = SignedPreKeyRecord::generate(21, &identity, 42).unwrap();

        let restored = SignedPreKeyRecord::from_bytes(&original.to_bytes()).unwrap();
        assert_eq!(restored.id(), 21);
        assert_eq!(restored.timestamp(), 42);
        assert_eq!(restored.public_key(), original.public_key());
        assert_eq!(restored.signature(), original.signature());
    }
}
