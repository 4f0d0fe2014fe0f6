#[macro_use]
extern crate afl;
use parley::key_helper;
use parley::{
    CiphertextMessage, CiphertextMessageType, InMemoryProtocolStore, PreKeyBundle, PreKeyStore,
    ProtocolAddress, SessionManager, SignedPreKeyStore,
};

fn manager() -> (SessionManager<InMemoryProtocolStore>, PreKeyBundle) {
    let identity = key_helper::generate_identity_key_pair().expect("identity");
    let registration_id = key_helper::generate_registration_id().expect("registration id");
    let store = InMemoryProtocolStore::new(identity.clone(), registration_id);

    let signed = key_helper::generate_signed_pre_key(&identity, 1).expect("signed pre-key");
    store.store_signed_pre_key(1, &signed).expect("store signed pre-key");
    let pre_key = key_helper::generate_pre_keys(1, 1).expect("pre-key").remove(0);
    store.store_pre_key(pre_key.id(), &pre_key).expect("store pre-key");

    let bundle = PreKeyBundle::new(
        registration_id,
        1,
        Some((pre_key.id(), pre_key.public_key())),
        (signed.id(), signed.public_key()),
        signed.signature(),
        identity.identity_key(),
    );
    (SessionManager::new(store, None), bundle)
}

fn main() {
    // The victim holds an open session with the attacker.
    let (victim, victim_bundle) = manager();
    let (attacker, _) = manager();
    let victim_address = ProtocolAddress::new("victim", 1);
    let attacker_address = ProtocolAddress::new("attacker", 1);

    attacker
        .session_builder(victim_address.clone())
        .process_pre_key_bundle(&victim_bundle)
        .expect("Setup failed");
    let hello = attacker
        .session_cipher(victim_address)
        .encrypt(b"hello")
        .expect("Setup failed");

    let cipher = victim.session_cipher(attacker_address);
    cipher.decrypt(&hello).expect("Setup failed");

    fuzz!(|data: &[u8]| {
        for kind in [CiphertextMessageType::Whisper, CiphertextMessageType::PreKey] {
            if let Ok(message) = CiphertextMessage::from_bytes(kind, data) {
                let _ = cipher.decrypt(&message);
            }
        }
    });
}
