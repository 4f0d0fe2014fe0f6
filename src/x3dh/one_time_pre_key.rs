use crate::{Error, X25519PublicKey, X25519Secret};
use x25519_dalek::SharedSecret;

/// Length of a stored [`PreKeyRecord`]: id then private key.
pub const PRE_KEY_RECORD_LENGTH: usize = 36;

/// A one-time pre-key and the id it is published under.
///
/// A bundle offers at most one of these. The responder consumes it during the
/// handshake, after which the record is removed from the
/// [`PreKeyStore`](crate::PreKeyStore) so it can never complete a second one.
#[derive(Clone)]
pub struct PreKeyRecord {
    id: u32,
    key: X25519Secret,
}

impl PreKeyRecord {
    pub fn generate(id: u32) -> Result<Self, Error> {
        Ok(Self {
            id,
            key: X25519Secret::generate()?,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// The half that goes into a [`PreKeyBundle`](crate::PreKeyBundle).
    pub fn public_key(&self) -> X25519PublicKey {
        self.key.public_key()
    }

    pub(crate) fn dh(&self, their_base_key: &X25519PublicKey) -> SharedSecret {
        self.key.dh(their_base_key)
    }

    /// Big-endian id followed by the private key.
    pub fn to_bytes(&self) -> [u8; PRE_KEY_RECORD_LENGTH] {
        let mut bytes = [0u8; PRE_KEY_RECORD_LENGTH];
        let (id, key) = bytes.split_at_mut(4);
        id.copy_from_slice(&self.id.to_be_bytes());
        key.copy_from_slice(self.key.as_bytes());

        bytes
    }
}

impl From<[u8; PRE_KEY_RECORD_LENGTH]> for PreKeyRecord {
    fn from(bytes: [u8; PRE_KEY_RECORD_LENGTH]) -> Self {
        let (id, key) = bytes.split_at(4);
        let mut id_bytes = [0u8; 4];
        id_bytes.copy_from_slice(id);
        let mut key_bytes = Box::new([0u8; 32]);
        key_bytes.copy_from_slice(key);

        Self {
            id: u32::from_be_bytes(id_bytes),
            key: X25519Secret::from(key_bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_layout() {
        let record = PreKeyRecord::generate(0x0a0b_0c0d).unwrap();
        let bytes = record.to_bytes();

        assert_eq!(&bytes[..4], &[0x0a, 0x0b, 0x0c, 0x0d]);
        assert_eq!(&bytes[4..], record.key.as_bytes());
    }

    #[test]
    fn test_restored_record_agrees_on_dh() {
        let record = PreKeyRecord::generate(7).unwrap();
        let restored = PreKeyRecord::from(record.to_bytes());
        let their_base_key = X25519Secret::generate().unwrap();

        assert_eq!(restored.id(), 7);
        assert_eq!(
            restored.dh(&their_base_key.public_key()).as_bytes(),
            their_base_key.dh(&record.public_key()).as_bytes()
        );
    }
}
