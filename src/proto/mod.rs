//! Protocol Buffers messages for the wire format and for persisted session
//! records.

use crate::ratchet::{ChainKey, MessageKeys, RootKey};
use crate::state::{PendingPreKey, SessionRecord, SessionState, SkippedKeys};
use crate::state::{ReceiverChain, SenderChain};
use crate::{Error, IdentityKey, X25519PublicKey, X25519Secret};
use prost::Message;
use std::collections::VecDeque;

/// Current schema version of [`SessionRecordProto`].
const SESSION_RECORD_VERSION: u32 = 1;

#[derive(Clone, PartialEq, Message)]
pub(crate) struct SignalMessageProto {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub(crate) ratchet_key: Option<Vec<u8>>,
    #[prost(uint32, optional, tag = "2")]
    pub(crate) counter: Option<u32>,
    #[prost(uint32, optional, tag = "3")]
    pub(crate) previous_counter: Option<u32>,
    #[prost(bytes = "vec", optional, tag = "4")]
    pub(crate) ciphertext: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub(crate) struct PreKeySignalMessageProto {
    #[prost(uint32, optional, tag = "1")]
    pub(crate) pre_key_id: Option<u32>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub(crate) base_key: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub(crate) identity_key: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "4")]
    pub(crate) message: Option<Vec<u8>>,
    #[prost(uint32, optional, tag = "5")]
    pub(crate) registration_id: Option<u32>,
    #[prost(uint32, optional, tag = "6")]
    pub(crate) signed_pre_key_id: Option<u32>,
}

#[derive(Clone, PartialEq, Message)]
struct SessionRecordProto {
    #[prost(uint32, tag = "1")]
    version: u32,
    #[prost(message, optional, tag = "2")]
    current_session: Option<SessionStateProto>,
    #[prost(message, repeated, tag = "3")]
    previous_sessions: Vec<SessionStateProto>,
}

#[derive(Clone, PartialEq, Message)]
struct SessionStateProto {
    #[prost(uint32, tag = "1")]
    session_version: u32,
    #[prost(bytes = "vec", tag = "2")]
    local_identity: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    remote_identity: Vec<u8>,
    #[prost(uint32, tag = "4")]
    local_registration_id: u32,
    #[prost(uint32, tag = "5")]
    remote_registration_id: u32,
    #[prost(bytes = "vec", tag = "6")]
    root_key: Vec<u8>,
    #[prost(message, optional, tag = "7")]
    sender_chain: Option<ChainProto>,
    #[prost(message, repeated, tag = "8")]
    receiver_chains: Vec<ChainProto>,
    #[prost(uint32, tag = "9")]
    previous_counter: u32,
    #[prost(bytes = "vec", tag = "10")]
    alice_base_key: Vec<u8>,
    #[prost(message, optional, tag = "11")]
    pending_pre_key: Option<PendingPreKeyProto>,
    #[prost(message, repeated, tag = "12")]
    skipped_keys: Vec<SkippedKeyProto>,
}

/// A sending chain stores the private ratchet key, a receiving chain the public one.
#[derive(Clone, PartialEq, Message)]
struct ChainProto {
    #[prost(bytes = "vec", tag = "1")]
    ratchet_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    chain_key: Vec<u8>,
    #[prost(uint32, tag = "3")]
    index: u32,
}

#[derive(Clone, PartialEq, Message)]
struct PendingPreKeyProto {
    #[prost(uint32, optional, tag = "1")]
    pre_key_id: Option<u32>,
    #[prost(uint32, tag = "2")]
    signed_pre_key_id: u32,
    #[prost(bytes = "vec", tag = "3")]
    base_key: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
struct SkippedKeyProto {
    #[prost(bytes = "vec", tag = "1")]
    ratchet_key: Vec<u8>,
    #[prost(uint32, tag = "2")]
    counter: u32,
    #[prost(bytes = "vec", tag = "3")]
    cipher_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "4")]
    nonce: Vec<u8>,
}

impl SessionRecord {
    /// Serialize the record to Protocol Buffers format
    pub fn serialize(&self) -> Result<Vec<u8>, Error> {
        let record_proto = SessionRecordProto {
            version: SESSION_RECORD_VERSION,
            current_session: self.current_session.as_ref().map(serialize_state),
            previous_sessions: self.previous_sessions.iter().map(serialize_state).collect(),
        };

        let mut buf = Vec::with_capacity(record_proto.encoded_len());
        record_proto
            .encode(&mut buf)
            .map_err(|err| Error::Serde(format!("Failed to encode session record: {err:?}")))?;

        Ok(buf)
    }

    /// Deserialize a record from Protocol Buffers format
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        let record_proto = SessionRecordProto::decode(bytes)
            .map_err(|err| Error::Serde(format!("Failed to decode session record: {err:?}")))?;

        if record_proto.version != SESSION_RECORD_VERSION {
            return Err(Error::Serde(format!(
                "Unsupported schema version: {}",
                record_proto.version
            )));
        }

        let current_session = record_proto
            .current_session
            .map(deserialize_state)
            .transpose()?;
        let previous_sessions = record_proto
            .previous_sessions
            .into_iter()
            .map(deserialize_state)
            .collect::<Result<VecDeque<_>, _>>()?;

        Ok(SessionRecord {
            current_session,
            previous_sessions,
        })
    }
}

fn serialize_state(state: &SessionState) -> SessionStateProto {
    let receiver_chains = state
        .receiver_chains
        .iter()
        .map(|chain| ChainProto {
            ratchet_key: chain.ratchet_key.to_bytes().to_vec(),
            chain_key: chain.chain_key.key().to_vec(),
            index: chain.chain_key.index(),
        })
        .collect();

    let skipped_keys = state
        .skipped_keys
        .iter()
        .map(|(id, keys)| SkippedKeyProto {
            ratchet_key: id.ratchet_key.to_bytes().to_vec(),
            counter: id.counter,
            cipher_key: keys.cipher_key().to_vec(),
            nonce: keys.nonce().to_vec(),
        })
        .collect();

    SessionStateProto {
        session_version: u32::from(state.session_version),
        local_identity: state.local_identity.to_bytes().to_vec(),
        remote_identity: state.remote_identity.to_bytes().to_vec(),
        local_registration_id: state.local_registration_id,
        remote_registration_id: state.remote_registration_id,
        root_key: state.root_key.key().to_vec(),
        sender_chain: Some(ChainProto {
            ratchet_key: state.sender_chain.ratchet_key.as_bytes().to_vec(),
            chain_key: state.sender_chain.chain_key.key().to_vec(),
            index: state.sender_chain.chain_key.index(),
        }),
        receiver_chains,
        previous_counter: state.previous_counter,
        alice_base_key: state.alice_base_key.to_bytes().to_vec(),
        pending_pre_key: state
            .pending_pre_key
            .as_ref()
            .map(|pending| PendingPreKeyProto {
                pre_key_id: pending.pre_key_id,
                signed_pre_key_id: pending.signed_pre_key_id,
                base_key: pending.base_key.to_bytes().to_vec(),
            }),
        skipped_keys,
    }
}

fn deserialize_state(proto: SessionStateProto) -> Result<SessionState, Error> {
    let session_version = u8::try_from(proto.session_version)
        .map_err(|_| Error::Serde("Invalid session version".to_string()))?;

    let local_identity = identity_key(&proto.local_identity, "local")?;
    let remote_identity = identity_key(&proto.remote_identity, "remote")?;
    let root_key = RootKey::new(key_bytes(&proto.root_key, "root key")?);

    let sender_proto = proto
        .sender_chain
        .ok_or_else(|| Error::Serde("Missing sender chain".to_string()))?;
    let sender_chain = SenderChain {
        ratchet_key: X25519Secret::try_from_slice(&sender_proto.ratchet_key)?,
        chain_key: ChainKey::new(
            key_bytes(&sender_proto.chain_key, "sender chain key")?,
            sender_proto.index,
        ),
    };

    let mut receiver_chains = VecDeque::with_capacity(proto.receiver_chains.len());
    for chain in proto.receiver_chains {
        receiver_chains.push_back(ReceiverChain {
            ratchet_key: public_key(&chain.ratchet_key, "receiver ratchet key")?,
            chain_key: ChainKey::new(
                key_bytes(&chain.chain_key, "receiver chain key")?,
                chain.index,
            ),
        });
    }

    let pending_pre_key = match proto.pending_pre_key {
        Some(pending) => Some(PendingPreKey {
            pre_key_id: pending.pre_key_id,
            signed_pre_key_id: pending.signed_pre_key_id,
            base_key: public_key(&pending.base_key, "pending base key")?,
        }),
        None => None,
    };

    let mut skipped_keys = SkippedKeys::default();
    for skipped in proto.skipped_keys {
        let nonce: [u8; 12] = skipped
            .nonce
            .as_slice()
            .try_into()
            .map_err(|_| Error::Serde("Invalid skipped message nonce length".to_string()))?;
        skipped_keys.insert(
            public_key(&skipped.ratchet_key, "skipped ratchet key")?,
            MessageKeys::new(
                key_bytes(&skipped.cipher_key, "skipped message key")?,
                nonce,
                skipped.counter,
            ),
        );
    }

    Ok(SessionState {
        session_version,
        local_identity,
        remote_identity,
        local_registration_id: proto.local_registration_id,
        remote_registration_id: proto.remote_registration_id,
        root_key,
        sender_chain,
        receiver_chains,
        previous_counter: proto.previous_counter,
        alice_base_key: public_key(&proto.alice_base_key, "base key")?,
        pending_pre_key,
        skipped_keys,
    })
}

fn key_bytes(bytes: &[u8], what: &str) -> Result<[u8; 32], Error> {
    bytes
        .try_into()
        .map_err(|_| Error::Serde(format!("Invalid {what} length")))
}

fn public_key(bytes: &[u8], what: &str) -> Result<X25519PublicKey, Error> {
    Ok(X25519PublicKey::from(key_bytes(bytes, what)?))
}

fn identity_key(bytes: &[u8], side: &str) -> Result<IdentityKey, Error> {
    IdentityKey::try_from_slice(bytes)
        .map_err(|_| Error::Serde(format!("Invalid {side} identity key")))
}
