//! Generation of the key material a device publishes and keeps.

use crate::crypto::random_u32;
use crate::{Error, IdentityKeyPair, PreKeyRecord, SignedPreKeyRecord};
use std::time::{SystemTime, UNIX_EPOCH};

/// Registration ids are 14-bit values.
const REGISTRATION_ID_MASK: u32 = 0x3fff;

/// Generates a long-term identity key pair for a new installation.
pub fn generate_identity_key_pair() -> Result<IdentityKeyPair, Error> {
    IdentityKeyPair::generate()
}

/// Generates a random 14-bit registration id.
pub fn generate_registration_id() -> Result<u32, Error> {
    Ok(random_u32()? & REGISTRATION_ID_MASK)
}

/// Generates `count` one-time pre-keys with consecutive ids starting at `start`.
///
/// Ids wrap around on overflow.
pub fn generate_pre_keys(start: u32, count: u32) -> Result<Vec<PreKeyRecord>, Error> {
    (0..count)
        .map(|offset| PreKeyRecord::generate(start.wrapping_add(offset)))
        .collect()
}

/// Generates a signed pre-key and signs it with `identity`.
pub fn generate_signed_pre_key(
    identity: &IdentityKeyPair,
    id: u32,
) -> Result<SignedPreKeyRecord, Error> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    SignedPreKeyRecord::generate(id, identity, u64::try_from(timestamp).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_id_fits_in_fourteen_bits() {
        for _ in 0..32 {
            assert!(generate_registration_id().unwrap() <= REGISTRATION_ID_MASK);
        }
    }

    #[test]
    fn test_pre_keys_have_consecutive_ids() {
        let keys = generate_pre_keys(u32::MAX - 1, 3).unwrap();
        let ids: Vec<u32> = keys.iter().map(PreKeyRecord::id).collect();
        assert_eq!(ids, vec![u32::MAX - 1, u32::MAX, 0]);
    }

    #[test]
    fn test_signed_pre_key_is_signed_by_identity() {
        let identity = generate_identity_key_pair().unwrap();
        let signed = generate_signed_pre_key(&identity, 5).unwrap();

        assert_eq!(signed.id(), 5);
        assert!(signed.timestamp() > 0);
        assert!(
            identity
                .identity_key()
                .verify(signed.public_key().as_bytes(), &signed.signature())
                .is_ok()
        );
    }
}
