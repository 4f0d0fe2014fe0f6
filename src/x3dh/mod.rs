mod identity_key;
pub use identity_key::*;
pub mod key_helper;
mod one_time_pre_key;
pub use one_time_pre_key::*;
mod pre_key;
pub use pre_key::*;

use crate::consts::KDF_INFO_ROOT;
use crate::ratchet::{ChainKey, RootKey};
use crate::{Error, X25519PublicKey, X25519Secret};
use ed25519_dalek::Signature;
use hkdf::Hkdf;
use sha2::Sha256;
use x25519_dalek::SharedSecret;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Prefix that separates the master secret from any valid curve point encoding.
const DISCONTINUITY_BYTES: [u8; 32] = [0xFF; 32];

/// The 64 bytes derived from an X3DH key agreement: root key then chain key.
#[derive(Zeroize, ZeroizeOnDrop)]
pub(crate) struct X3DHSharedSecret(Box<[u8; 64]>);

impl X3DHSharedSecret {
    /// Splits the secret into the initial root key and chain key.
    pub(crate) fn into_keys(self) -> (RootKey, ChainKey) {
        let mut root_key = [0u8; 32];
        let mut chain_key = [0u8; 32];
        root_key.copy_from_slice(&self.0[0..32]);
        chain_key.copy_from_slice(&self.0[32..64]);

        (RootKey::new(root_key), ChainKey::new(chain_key, 0))
    }
}

/// A bundle of public keys used for X3DH key agreement.
///
/// Contains all the public key material needed by another user to establish
/// a secure session asynchronously:
/// - Identity key for authentication and key agreement
/// - Signed pre-key with signature for authenticated key agreement
/// - Optional one-time pre-key for additional security
#[derive(Clone, Debug)]
pub struct PreKeyBundle {
    registration_id: u32,
    device_id: u32,
    pre_key: Option<(u32, X25519PublicKey)>,
    signed_pre_key: (u32, X25519PublicKey),
    signed_pre_key_signature: Signature,
    identity_key: IdentityKey,
}

impl PreKeyBundle {
    /// Creates a new pre-key bundle from the provided keys.
    pub fn new(
        registration_id: u32,
        device_id: u32,
        pre_key: Option<(u32, X25519PublicKey)>,
        signed_pre_key: (u32, X25519PublicKey),
        signed_pre_key_signature: Signature,
        identity_key: IdentityKey,
    ) -> Self {
        Self {
            registration_id,
            device_id,
            pre_key,
            signed_pre_key,
            signed_pre_key_signature,
            identity_key,
        }
    }

    /// Verifies that the signed pre-key was signed by the bundle's identity key.
    pub fn verify(&self) -> Result<(), Error> {
        self.identity_key.verify(
            self.signed_pre_key.1.as_bytes(),
            &self.signed_pre_key_signature,
        )
    }

    /// Registration id of the publishing installation.
    #[inline]
    pub fn registration_id(&self) -> u32 {
        self.registration_id
    }

    /// Device id of the publishing installation.
    #[inline]
    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    /// The optional one-time pre-key with its id.
    #[inline]
    pub fn pre_key(&self) -> Option<(u32, X25519PublicKey)> {
        self.pre_key
    }

    /// The signed pre-key with its id.
    #[inline]
    pub fn signed_pre_key(&self) -> (u32, X25519PublicKey) {
        self.signed_pre_key
    }

    /// The signature over the signed pre-key.
    #[inline]
    pub fn signed_pre_key_signature(&self) -> Signature {
        self.signed_pre_key_signature
    }

    /// The publisher's identity key.
    #[inline]
    pub fn identity_key(&self) -> &IdentityKey {
        &self.identity_key
    }
}

/// Initiator side of the key agreement.
///
/// The caller verifies the bundle first; this only performs the DH
/// computations in their fixed order and derives the shared secret.
pub(crate) fn initiate_for_alice(
    our_identity: &IdentityKeyPair,
    our_base_key: &X25519Secret,
    their_bundle: &PreKeyBundle,
) -> Result<X3DHSharedSecret, Error> {
    let their_signed_pre_key = &their_bundle.signed_pre_key().1;

    // DH1 = DH(IKa, SPKb)
    let dh1 = our_identity.dh(their_signed_pre_key);
    // DH2 = DH(EKa, IKb)
    let dh2 = our_base_key.dh(their_bundle.identity_key().dh_key());
    // DH3 = DH(EKa, SPKb)
    let dh3 = our_base_key.dh(their_signed_pre_key);
    // DH4 = DH(EKa, OPKb)
    let dh4 = their_bundle
        .pre_key()
        .map(|(_, one_time)| our_base_key.dh(&one_time));

    calculate_shared_secret(dh1, dh2, dh3, dh4)
}

/// Responder side of the key agreement, mirroring [`initiate_for_alice`].
pub(crate) fn initiate_for_bob(
    our_identity: &IdentityKeyPair,
    our_signed_pre_key: &SignedPreKeyRecord,
    our_one_time_pre_key: Option<&PreKeyRecord>,
    their_identity: &IdentityKey,
    their_base_key: &X25519PublicKey,
) -> Result<X3DHSharedSecret, Error> {
    // DH1 = DH(SPKb, IKa)
    let dh1 = our_signed_pre_key.dh(their_identity.dh_key());
    // DH2 = DH(IKb, EKa)
    let dh2 = our_identity.dh(their_base_key);
    // DH3 = DH(SPKb, EKa)
    let dh3 = our_signed_pre_key.dh(their_base_key);
    // DH4 = DH(OPKb, EKa)
    let dh4 = our_one_time_pre_key.map(|one_time| one_time.dh(their_base_key));

    calculate_shared_secret(dh1, dh2, dh3, dh4)
}

fn calculate_shared_secret(
    dh1: SharedSecret,
    dh2: SharedSecret,
    dh3: SharedSecret,
    dh4: Option<SharedSecret>,
) -> Result<X3DHSharedSecret, Error> {
    // IKM = F || DH1 || DH2 || DH3 || DH4 (if available)
    let mut key_material = Vec::with_capacity(32 * 5);
    key_material.extend_from_slice(&DISCONTINUITY_BYTES);
    key_material.extend_from_slice(dh1.as_bytes());
    key_material.extend_from_slice(dh2.as_bytes());
    key_material.extend_from_slice(dh3.as_bytes());
    if let Some(dh4) = dh4 {
        key_material.extend_from_slice(dh4.as_bytes());
    }

    let hkdf = Hkdf::<Sha256>::new(None, &key_material);
    key_material.zeroize();

    let mut shared_secret = Box::new([0u8; 64]);
    hkdf.expand(KDF_INFO_ROOT, shared_secret.as_mut_slice())
        .map_err(|_| Error::Crypto("HKDF expansion failed".to_string()))?;

    Ok(X3DHSharedSecret(shared_secret))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bob {
        identity: IdentityKeyPair,
        signed_pre_key: SignedPreKeyRecord,
        one_time_pre_key: PreKeyRecord,
    }

    fn bob() -> Bob {
        let identity = IdentityKeyPair::generate().unwrap();
        let signed_pre_key = SignedPreKeyRecord::generate(1, &identity, 0).unwrap();
        let one_time_pre_key = PreKeyRecord::generate(1).unwrap();
        Bob {
            identity,
            signed_pre_key,
            one_time_pre_key,
        }
    }

    fn bundle(bob: &Bob, with_one_time: bool) -> PreKeyBundle {
        PreKeyBundle::new(
            7,
            1,
            with_one_time.then(|| (bob.one_time_pre_key.id(), bob.one_time_pre_key.public_key())),
            (bob.signed_pre_key.id(), bob.signed_pre_key.public_key()),
            bob.signed_pre_key.signature(),
            bob.identity.identity_key(),
        )
    }

    #[test]
    fn test_x3dh_key_agreement() {
        let alice_identity = IdentityKeyPair::generate().unwrap();
        let alice_base = X25519Secret::generate().unwrap();
        let bob = bob();
        let bob_bundle = bundle(&bob, true);

        assert!(bob_bundle.verify().is_ok());

        let alice_secret = initiate_for_alice(&alice_identity, &alice_base, &bob_bundle).unwrap();
        let bob_secret = initiate_for_bob(
            &bob.identity,
            &bob.signed_pre_key,
            Some(&bob.one_time_pre_key),
            &alice_identity.identity_key(),
            &alice_base.public_key(),
        )
        .unwrap();

        let (alice_root, alice_chain) = alice_secret.into_keys();
        let (bob_root, bob_chain) = bob_secret.into_keys();
        assert_eq!(alice_root.key(), bob_root.key());
        assert_eq!(alice_chain.key(), bob_chain.key());
    }

    #[test]
    fn test_x3dh_agreement_without_one_time_key() {
        let alice_identity = IdentityKeyPair::generate().unwrap();
        let alice_base = X25519Secret::generate().unwrap();
        let bob = bob();
        let bob_bundle = bundle(&bob, false);

        let alice_secret = initiate_for_alice(&alice_identity, &alice_base, &bob_bundle).unwrap();
        let bob_secret = initiate_for_bob(
            &bob.identity,
            &bob.signed_pre_key,
            None,
            &alice_identity.identity_key(),
            &alice_base.public_key(),
        )
        .unwrap();

        assert_eq!(alice_secret.into_keys().0.key(), bob_secret.into_keys().0.key());
    }

    #[test]
    fn test_one_time_key_term_changes_secret() {
        let alice_identity = IdentityKeyPair::generate().unwrap();
        let alice_base = X25519Secret::generate().unwrap();
        let bob = bob();

        let with = initiate_for_alice(&alice_identity, &alice_base, &bundle(&bob, true)).unwrap();
        let without =
            initiate_for_alice(&alice_identity, &alice_base, &bundle(&bob, false)).unwrap();

        assert_ne!(with.into_keys().0.key(), without.into_keys().0.key());
    }

    #[test]
    fn test_bundle_with_foreign_signature_fails_verification() {
        let bob = bob();
        let mallory = IdentityKeyPair::generate().unwrap();
        let forged = PreKeyBundle::new(
            7,
            1,
            None,
            (bob.signed_pre_key.id(), bob.signed_pre_key.public_key()),
            mallory.sign(bob.signed_pre_key.public_key().as_bytes()),
            bob.identity.identity_key(),
        );

        assert_eq!(forged.verify(), Err(Error::Signature));
    }
}
