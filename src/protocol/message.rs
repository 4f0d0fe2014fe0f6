use crate::consts::CIPHERTEXT_MESSAGE_CURRENT_VERSION;
use crate::proto::{PreKeySignalMessageProto, SignalMessageProto};
use crate::{Error, IdentityKey, X25519PublicKey};
use prost::Message;

fn version_byte(message_version: u8) -> u8 {
    (message_version << 4) | CIPHERTEXT_MESSAGE_CURRENT_VERSION
}

/// Splits off and checks the leading version byte.
fn split_version(bytes: &[u8]) -> Result<(u8, &[u8]), Error> {
    let (&first, body) = bytes
        .split_first()
        .ok_or_else(|| Error::InvalidMessage("Empty message".to_string()))?;

    let message_version = first >> 4;
    if message_version != CIPHERTEXT_MESSAGE_CURRENT_VERSION {
        return Err(Error::InvalidMessage(format!(
            "Unsupported message version: {message_version}"
        )));
    }

    Ok((message_version, body))
}

fn required<T>(field: Option<T>, name: &str) -> Result<T, Error> {
    field.ok_or_else(|| Error::InvalidMessage(format!("Missing {name}")))
}

/// A message encrypted under an established session.
///
/// Serialized as one version byte followed by the protobuf body carrying the
/// sender's ratchet key, the message counter, the previous counter and the
/// ciphertext.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignalMessage {
    message_version: u8,
    ratchet_key: X25519PublicKey,
    counter: u32,
    previous_counter: u32,
    ciphertext: Vec<u8>,
    serialized: Vec<u8>,
}

impl SignalMessage {
    pub(crate) fn new(
        message_version: u8,
        ratchet_key: X25519PublicKey,
        counter: u32,
        previous_counter: u32,
        ciphertext: Vec<u8>,
    ) -> Self {
        let body = SignalMessageProto {
            ratchet_key: Some(ratchet_key.to_bytes().to_vec()),
            counter: Some(counter),
            previous_counter: Some(previous_counter),
            ciphertext: Some(ciphertext.clone()),
        };

        let mut serialized = Vec::with_capacity(1 + body.encoded_len());
        serialized.push(version_byte(message_version));
        serialized.extend_from_slice(&body.encode_to_vec());

        Self {
            message_version,
            ratchet_key,
            counter,
            previous_counter,
            ciphertext,
            serialized,
        }
    }

    /// Parses a message received from the transport.
    pub fn try_from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let (message_version, body) = split_version(bytes)?;
        let proto = SignalMessageProto::decode(body)
            .map_err(|err| Error::InvalidMessage(err.to_string()))?;

        let ratchet_key = X25519PublicKey::try_from_slice(&required(proto.ratchet_key, "ratchet key")?)?;

        Ok(Self {
            message_version,
            ratchet_key,
            counter: required(proto.counter, "counter")?,
            previous_counter: required(proto.previous_counter, "previous counter")?,
            ciphertext: required(proto.ciphertext, "ciphertext")?,
            serialized: bytes.to_vec(),
        })
    }

    /// Version nibble of the sender.
    pub fn message_version(&self) -> u8 {
        self.message_version
    }

    /// The sender's current ratchet public key.
    pub fn ratchet_key(&self) -> &X25519PublicKey {
        &self.ratchet_key
    }

    /// Index of this message in the sender's chain.
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Length of the sender's previous sending chain.
    pub fn previous_counter(&self) -> u32 {
        self.previous_counter
    }

    /// The AEAD ciphertext.
    pub fn body(&self) -> &[u8] {
        &self.ciphertext
    }

    /// The bytes to put on the wire.
    pub fn serialized(&self) -> &[u8] {
        &self.serialized
    }
}

impl TryFrom<&[u8]> for SignalMessage {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::try_from_bytes(bytes)
    }
}

/// First message(s) of a locally initiated session: a [`SignalMessage`] plus
/// what the responder needs to run its side of the handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreKeySignalMessage {
    message_version: u8,
    registration_id: u32,
    pre_key_id: Option<u32>,
    signed_pre_key_id: u32,
    base_key: X25519PublicKey,
    identity_key: IdentityKey,
    message: SignalMessage,
    serialized: Vec<u8>,
}

impl PreKeySignalMessage {
    pub(crate) fn new(
        message_version: u8,
        registration_id: u32,
        pre_key_id: Option<u32>,
        signed_pre_key_id: u32,
        base_key: X25519PublicKey,
        identity_key: IdentityKey,
        message: SignalMessage,
    ) -> Self {
        let body = PreKeySignalMessageProto {
            pre_key_id,
            base_key: Some(base_key.to_bytes().to_vec()),
            identity_key: Some(identity_key.to_bytes().to_vec()),
            message: Some(message.serialized().to_vec()),
            registration_id: Some(registration_id),
            signed_pre_key_id: Some(signed_pre_key_id),
        };

        let mut serialized = Vec::with_capacity(1 + body.encoded_len());
        serialized.push(version_byte(message_version));
        serialized.extend_from_slice(&body.encode_to_vec());

        Self {
            message_version,
            registration_id,
            pre_key_id,
            signed_pre_key_id,
            base_key,
            identity_key,
            message,
            serialized,
        }
    }

    /// Parses a pre-key message received from the transport.
    pub fn try_from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let (message_version, body) = split_version(bytes)?;
        let proto = PreKeySignalMessageProto::decode(body)
            .map_err(|err| Error::InvalidMessage(err.to_string()))?;

        let base_key = X25519PublicKey::try_from_slice(&required(proto.base_key, "base key")?)?;
        let identity_key =
            IdentityKey::try_from_slice(&required(proto.identity_key, "identity key")?)?;
        let message = SignalMessage::try_from_bytes(&required(proto.message, "inner message")?)?;

        Ok(Self {
            message_version,
            registration_id: proto.registration_id.unwrap_or_default(),
            pre_key_id: proto.pre_key_id,
            signed_pre_key_id: required(proto.signed_pre_key_id, "signed pre-key id")?,
            base_key,
            identity_key,
            message,
            serialized: bytes.to_vec(),
        })
    }

    /// Version nibble of the sender.
    pub fn message_version(&self) -> u8 {
        self.message_version
    }

    /// The sender's registration id.
    pub fn registration_id(&self) -> u32 {
        self.registration_id
    }

    /// Id of the one-time pre-key used, if any.
    pub fn pre_key_id(&self) -> Option<u32> {
        self.pre_key_id
    }

    /// Id of the signed pre-key used.
    pub fn signed_pre_key_id(&self) -> u32 {
        self.signed_pre_key_id
    }

    /// The sender's handshake base key.
    pub fn base_key(&self) -> &X25519PublicKey {
        &self.base_key
    }

    /// The sender's identity key.
    pub fn identity_key(&self) -> &IdentityKey {
        &self.identity_key
    }

    /// The wrapped session message.
    pub fn message(&self) -> &SignalMessage {
        &self.message
    }

    /// The bytes to put on the wire.
    pub fn serialized(&self) -> &[u8] {
        &self.serialized
    }
}

impl TryFrom<&[u8]> for PreKeySignalMessage {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::try_from_bytes(bytes)
    }
}

/// Transport discriminant of a [`CiphertextMessage`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CiphertextMessageType {
    /// A [`SignalMessage`].
    Whisper = 1,
    /// A [`PreKeySignalMessage`].
    PreKey = 3,
}

impl TryFrom<u8> for CiphertextMessageType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Whisper),
            3 => Ok(Self::PreKey),
            other => Err(Error::InvalidMessage(format!(
                "Unknown message type: {other}"
            ))),
        }
    }
}

/// Output of encryption: what the transport carries along with its type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CiphertextMessage {
    Whisper(SignalMessage),
    PreKey(PreKeySignalMessage),
}

impl CiphertextMessage {
    /// Parses transport bytes tagged with their message type.
    pub fn from_bytes(message_type: CiphertextMessageType, bytes: &[u8]) -> Result<Self, Error> {
        match message_type {
            CiphertextMessageType::Whisper => SignalMessage::try_from_bytes(bytes).map(Self::Whisper),
            CiphertextMessageType::PreKey => {
                PreKeySignalMessage::try_from_bytes(bytes).map(Self::PreKey)
            }
        }
    }

    pub fn message_type(&self) -> CiphertextMessageType {
        match self {
            Self::Whisper(_) => CiphertextMessageType::Whisper,
            Self::PreKey(_) => CiphertextMessageType::PreKey,
        }
    }

    pub fn serialized(&self) -> &[u8] {
        match self {
            Self::Whisper(message) => message.serialized(),
            Self::PreKey(message) => message.serialized(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IdentityKeyPair;

    fn signal_message() -> SignalMessage {
        SignalMessage::new(3, X25519PublicKey::from([4u8; 32]), 7, 2, vec![1, 2, 3])
    }

    #[test]
    fn test_signal_message_parsing() {
        let message = signal_message();
        assert_eq!(message.serialized()[0], 0x33);

        let parsed = SignalMessage::try_from_bytes(message.serialized()).unwrap();
        assert_eq!(parsed, message);
        assert_eq!(parsed.counter(), 7);
        assert_eq!(parsed.previous_counter(), 2);
        assert_eq!(parsed.body(), &[1, 2, 3]);
    }

    #[test]
    fn test_pre_key_message_keeps_absent_one_time_id() {
        let identity = IdentityKeyPair::generate().unwrap().identity_key();
        let message = PreKeySignalMessage::new(
            3,
            42,
            None,
            9,
            X25519PublicKey::from([5u8; 32]),
            identity,
            signal_message(),
        );

        let parsed = PreKeySignalMessage::try_from_bytes(message.serialized()).unwrap();
        assert_eq!(parsed.pre_key_id(), None);
        assert_eq!(parsed.signed_pre_key_id(), 9);
        assert_eq!(parsed.registration_id(), 42);
        assert_eq!(parsed.identity_key(), &identity);
        assert_eq!(parsed.message(), &signal_message());
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let mut bytes = signal_message().serialized().to_vec();
        bytes[0] = 0x23;
        assert!(matches!(
            SignalMessage::try_from_bytes(&bytes),
            Err(Error::InvalidMessage(_))
        ));
        assert!(SignalMessage::try_from_bytes(&[]).is_err());
    }

    #[test]
    fn test_missing_fields_are_rejected() {
        let body = SignalMessageProto {
            ratchet_key: Some(vec![4u8; 32]),
            counter: Some(1),
            previous_counter: None,
            ciphertext: Some(vec![0u8; 16]),
        };
        let mut bytes = vec![0x33];
        bytes.extend_from_slice(&body.encode_to_vec());

        assert!(matches!(
            SignalMessage::try_from_bytes(&bytes),
            Err(Error::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_short_ratchet_key_is_rejected() {
        let body = SignalMessageProto {
            ratchet_key: Some(vec![4u8; 31]),
            counter: Some(1),
            previous_counter: Some(0),
            ciphertext: Some(vec![0u8; 16]),
        };
        let mut bytes = vec![0x33];
        bytes.extend_from_slice(&body.encode_to_vec());

        assert!(SignalMessage::try_from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_message_type_discriminants() {
        assert_eq!(CiphertextMessageType::Whisper as u8, 1);
        assert_eq!(CiphertextMessageType::PreKey as u8, 3);
        assert_eq!(
            CiphertextMessageType::try_from(3).unwrap(),
            CiphertextMessageType::PreKey
        );
        assert!(CiphertextMessageType::try_from(2).is_err());

        let message = CiphertextMessage::Whisper(signal_message());
        let parsed = CiphertextMessage::from_bytes(message.message_type(), message.serialized())
            .unwrap();
        assert_eq!(parsed, message);
    }
}
