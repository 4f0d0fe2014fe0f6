use crate::crypto::{aead_decrypt, aead_encrypt};
use crate::ratchet::{ChainKey, MessageKeys};
use crate::storage::Direction;
use crate::{
    CiphertextMessage, Error, IdentityKey, PreKeySignalMessage, ProtocolAddress, ProtocolStore,
    SessionConfig, SessionManager, SessionRecord, SessionState, SignalMessage, X25519PublicKey,
    X25519Secret,
};
use std::cell::RefCell;
use tracing::{debug, trace, warn};

thread_local! {
    static AD_BUFFER: RefCell<Vec<u8>> = RefCell::new(Vec::with_capacity(256));
}

fn with_ad_buffer<F, R>(f: F) -> R
where
    F: FnOnce(&mut Vec<u8>) -> R,
{
    AD_BUFFER.with(|buffer| {
        let mut buffer = buffer.borrow_mut();
        buffer.clear();
        f(&mut buffer)
    })
}

/// Header fields authenticated along with every ciphertext.
struct MessageHeader<'a> {
    version: u8,
    ratchet_key: &'a X25519PublicKey,
    counter: u32,
    previous_counter: u32,
}

impl MessageHeader<'_> {
    fn to_bytes(&self) -> [u8; 41] {
        let mut bytes = [0u8; 41];
        bytes[0] = self.version;
        bytes[1..33].copy_from_slice(self.ratchet_key.as_bytes());
        bytes[33..37].copy_from_slice(&self.counter.to_be_bytes());
        bytes[37..41].copy_from_slice(&self.previous_counter.to_be_bytes());

        bytes
    }

    /// Associated data: sender identity, receiver identity, then the header.
    fn write_associated_data(&self, buffer: &mut Vec<u8>, sender: &IdentityKey, receiver: &IdentityKey) {
        buffer.extend_from_slice(&sender.to_bytes());
        buffer.extend_from_slice(&receiver.to_bytes());
        buffer.extend_from_slice(&self.to_bytes());
    }
}

/// Encrypts and decrypts messages exchanged with one remote address.
pub struct SessionCipher<'a, S> {
    manager: &'a SessionManager<S>,
    remote_address: ProtocolAddress,
}

impl<'a, S: ProtocolStore> SessionCipher<'a, S> {
    pub(crate) fn new(manager: &'a SessionManager<S>, remote_address: ProtocolAddress) -> Self {
        Self {
            manager,
            remote_address,
        }
    }

    /// Encrypts `plaintext` under the current session and advances its sending chain.
    ///
    /// Returns a [`CiphertextMessage::PreKey`] while the session still waits
    /// for the peer's first reply, a [`CiphertextMessage::Whisper`] afterwards.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<CiphertextMessage, Error> {
        let lock = self.manager.lock_for(&self.remote_address);
        let _guard = lock.lock();

        let store = self.manager.store();
        let address = &self.remote_address;

        let mut record = store
            .load_session(address)?
            .ok_or_else(|| Error::NoSession(address.clone()))?;
        let state = record
            .session_state_mut()
            .ok_or_else(|| Error::NoSession(address.clone()))?;

        if !store.is_trusted_identity(address, state.remote_identity(), Direction::Sending)? {
            return Err(Error::UntrustedIdentity(address.clone()));
        }

        let chain_key = state.sender_chain_key().clone();
        let message_keys = chain_key.message_keys()?;
        let sender_ratchet_key = state.sender_ratchet_key();
        let header = MessageHeader {
            version: state.session_version(),
            ratchet_key: &sender_ratchet_key,
            counter: message_keys.counter(),
            previous_counter: state.previous_counter(),
        };

        let ciphertext = with_ad_buffer(|buffer| {
            header.write_associated_data(buffer, state.local_identity(), state.remote_identity());
            aead_encrypt(message_keys.cipher_key(), message_keys.nonce(), plaintext, buffer)
        })?;

        let signal_message = SignalMessage::new(
            header.version,
            sender_ratchet_key,
            header.counter,
            header.previous_counter,
            ciphertext,
        );
        let message = match state.pending_pre_key() {
            Some(pending) => CiphertextMessage::PreKey(PreKeySignalMessage::new(
                header.version,
                state.local_registration_id(),
                pending.pre_key_id(),
                pending.signed_pre_key_id(),
                *pending.base_key(),
                *state.local_identity(),
                signal_message,
            )),
            None => CiphertextMessage::Whisper(signal_message),
        };

        state.set_sender_chain_key(chain_key.next_chain_key()?);
        store.store_session(address, &record)?;

        trace!(%address, counter = header.counter, "Encrypted message");
        Ok(message)
    }

    /// Decrypts either kind of [`CiphertextMessage`].
    pub fn decrypt(&self, message: &CiphertextMessage) -> Result<Vec<u8>, Error> {
        match message {
            CiphertextMessage::Whisper(message) => self.decrypt_message(message),
            CiphertextMessage::PreKey(message) => self.decrypt_pre_key_message(message),
        }
    }

    /// Decrypts a handshake message, creating the responder session if needed.
    ///
    /// The consumed one-time pre-key is removed only after the message
    /// decrypts and the record is stored.
    pub fn decrypt_pre_key_message(&self, message: &PreKeySignalMessage) -> Result<Vec<u8>, Error> {
        let lock = self.manager.lock_for(&self.remote_address);
        let _guard = lock.lock();

        let store = self.manager.store();
        let address = &self.remote_address;

        let mut record = store.load_session(address)?.unwrap_or_default();
        let builder = self.manager.session_builder(address.clone());
        let consumed_pre_key_id = builder.process_pre_key(&mut record, message)?;
        let plaintext = self.decrypt_with_record(&mut record, message.message())?;

        store.save_identity(address, message.identity_key())?;
        store.store_session(address, &record)?;
        if let Some(id) = consumed_pre_key_id {
            store.remove_pre_key(id)?;
            debug!(%address, pre_key_id = id, "Removed consumed one-time pre-key");
        }

        Ok(plaintext)
    }

    /// Decrypts a message of an established session.
    pub fn decrypt_message(&self, message: &SignalMessage) -> Result<Vec<u8>, Error> {
        let lock = self.manager.lock_for(&self.remote_address);
        let _guard = lock.lock();

        let store = self.manager.store();
        let address = &self.remote_address;

        let mut record = store
            .load_session(address)?
            .ok_or_else(|| Error::NoSession(address.clone()))?;
        let plaintext = self.decrypt_with_record(&mut record, message)?;

        let remote_identity = *record
            .session_state()
            .ok_or_else(|| Error::NoSession(address.clone()))?
            .remote_identity();
        if !store.is_trusted_identity(address, &remote_identity, Direction::Receiving)? {
            return Err(Error::UntrustedIdentity(address.clone()));
        }

        store.save_identity(address, &remote_identity)?;
        store.store_session(address, &record)?;

        Ok(plaintext)
    }

    /// Whether a current session exists that can encrypt.
    pub fn has_open_session(&self) -> Result<bool, Error> {
        let lock = self.manager.lock_for(&self.remote_address);
        let _guard = lock.lock();

        Ok(self
            .manager
            .store()
            .load_session(&self.remote_address)?
            .is_some_and(|record| record.has_current_session_state()))
    }

    /// The peer's registration id from the current session.
    pub fn remote_registration_id(&self) -> Result<u32, Error> {
        let lock = self.manager.lock_for(&self.remote_address);
        let _guard = lock.lock();

        self.manager
            .store()
            .load_session(&self.remote_address)?
            .and_then(|record| record.session_state().map(SessionState::remote_registration_id))
            .ok_or_else(|| Error::NoSession(self.remote_address.clone()))
    }

    /// Archives the current session so that the next message needs a new
    /// handshake. Late messages of the archived session still decrypt.
    pub fn close_open_session(&self) -> Result<(), Error> {
        let lock = self.manager.lock_for(&self.remote_address);
        let _guard = lock.lock();

        let store = self.manager.store();
        let Some(mut record) = store.load_session(&self.remote_address)? else {
            return Ok(());
        };
        if !record.has_current_session_state() {
            return Ok(());
        }

        record.archive_current_state(self.manager.config().max_archived_states);
        store.store_session(&self.remote_address, &record)?;

        debug!(address = %self.remote_address, "Closed open session");
        Ok(())
    }

    /// Tries the current state, then every archived one, each on a working copy.
    fn decrypt_with_record(
        &self,
        record: &mut SessionRecord,
        message: &SignalMessage,
    ) -> Result<Vec<u8>, Error> {
        let config = self.manager.config();

        let current_error = match record.session_state() {
            Some(current) => {
                let mut state = current.clone();
                match decrypt_with_state(&mut state, message, config) {
                    Ok(plaintext) => {
                        record.set_session_state(state);
                        return Ok(plaintext);
                    }
                    Err(err) => Some(err),
                }
            }
            None => None,
        };

        let mut promoted = None;
        for (index, previous) in record.previous_session_states().enumerate() {
            let mut state = previous.clone();
            if let Ok(plaintext) = decrypt_with_state(&mut state, message, config) {
                promoted = Some((index, state, plaintext));
                break;
            }
        }

        if let Some((index, state, plaintext)) = promoted {
            debug!(address = %self.remote_address, index, "Promoted archived session state");
            record.promote_old_session(index, state, config.max_archived_states);
            return Ok(plaintext);
        }

        let err = current_error.unwrap_or_else(|| Error::NoSession(self.remote_address.clone()));
        warn!(
            address = %self.remote_address,
            counter = message.counter(),
            error = %err,
            "Rejected message"
        );
        Err(err)
    }
}

fn decrypt_with_state(
    state: &mut SessionState,
    message: &SignalMessage,
    config: &SessionConfig,
) -> Result<Vec<u8>, Error> {
    if message.message_version() != state.session_version() {
        return Err(Error::InvalidMessage(format!(
            "Message version {} does not match session version {}",
            message.message_version(),
            state.session_version()
        )));
    }

    let their_ratchet_key = message.ratchet_key();
    let chain_key = match state.receiver_chain_key(their_ratchet_key) {
        Some(chain_key) => chain_key.clone(),
        None => ratchet_step(state, their_ratchet_key, message.previous_counter(), config)?,
    };
    let message_keys =
        message_keys_for_counter(state, their_ratchet_key, chain_key, message.counter(), config)?;

    let header = MessageHeader {
        version: message.message_version(),
        ratchet_key: their_ratchet_key,
        counter: message.counter(),
        previous_counter: message.previous_counter(),
    };
    let plaintext = with_ad_buffer(|buffer| {
        header.write_associated_data(buffer, state.remote_identity(), state.local_identity());
        aead_decrypt(message_keys.cipher_key(), message_keys.nonce(), message.body(), buffer)
    })?;

    state.clear_pending_pre_key();
    Ok(plaintext)
}

/// Performs a DH ratchet step for a message carrying an unseen ratchet key.
///
/// Returns the new receiving chain. The sending chain is replaced as well.
fn ratchet_step(
    state: &mut SessionState,
    their_ratchet_key: &X25519PublicKey,
    previous_counter: u32,
    config: &SessionConfig,
) -> Result<ChainKey, Error> {
    // Late messages of the chain being replaced must stay decryptable.
    let last_chain = state.last_receiver_ratchet_key().and_then(|ratchet_key| {
        state
            .receiver_chain_key(&ratchet_key)
            .cloned()
            .map(|chain_key| (ratchet_key, chain_key))
    });
    if let Some((last_ratchet_key, chain_key)) = last_chain {
        let chain_key =
            skip_message_keys(state, &last_ratchet_key, chain_key, previous_counter, config)?;
        state.set_receiver_chain_key(&last_ratchet_key, chain_key);
    }

    let (root_key, receiver_chain_key) = state
        .root_key()
        .create_chain(their_ratchet_key, state.sender_ratchet_private())?;
    let our_ratchet_key = X25519Secret::generate()?;
    let (root_key, sender_chain_key) = root_key.create_chain(their_ratchet_key, &our_ratchet_key)?;

    let dropped_keys = state.add_receiver_chain(
        *their_ratchet_key,
        receiver_chain_key.clone(),
        config.max_receiver_chains,
    );
    state.replace_sender_chain(root_key, our_ratchet_key, sender_chain_key);

    debug!(
        previous_counter = state.previous_counter(),
        receiver_chains = state.receiver_chain_count(),
        dropped_keys,
        "Performed ratchet step"
    );
    Ok(receiver_chain_key)
}

/// Resolves the message keys for `counter` on the chain of `their_ratchet_key`.
fn message_keys_for_counter(
    state: &mut SessionState,
    their_ratchet_key: &X25519PublicKey,
    chain_key: ChainKey,
    counter: u32,
    config: &SessionConfig,
) -> Result<MessageKeys, Error> {
    if counter < chain_key.index() {
        return state
            .skipped_keys
            .take(their_ratchet_key, counter)
            .ok_or(Error::DuplicateMessage { counter });
    }

    let chain_key = skip_message_keys(state, their_ratchet_key, chain_key, counter, config)?;
    let message_keys = chain_key.message_keys()?;
    state.set_receiver_chain_key(their_ratchet_key, chain_key.next_chain_key()?);

    Ok(message_keys)
}

/// Caches the keys from the chain's index up to, not including, `until`.
///
/// Fails without caching anything if the jump alone exceeds the gap or the
/// cache bound. Otherwise the oldest cached keys make room for the new ones;
/// their messages then fail as duplicates.
fn skip_message_keys(
    state: &mut SessionState,
    ratchet_key: &X25519PublicKey,
    mut chain_key: ChainKey,
    until: u32,
    config: &SessionConfig,
) -> Result<ChainKey, Error> {
    let jump = until.saturating_sub(chain_key.index());
    if jump == 0 {
        return Ok(chain_key);
    }

    if jump > config.max_message_gap {
        return Err(Error::SkippedKeyLimitExceeded {
            requested: jump,
            limit: config.max_message_gap,
        });
    }
    if jump > config.max_skipped_message_keys {
        return Err(Error::SkippedKeyLimitExceeded {
            requested: jump,
            limit: config.max_skipped_message_keys,
        });
    }

    let cached = u32::try_from(state.skipped_message_key_count()).unwrap_or(u32::MAX);
    let overflow = cached
        .saturating_add(jump)
        .saturating_sub(config.max_skipped_message_keys);
    if overflow > 0 {
        let evicted = state
            .skipped_keys
            .evict_oldest(usize::try_from(overflow).unwrap_or(usize::MAX));
        debug!(evicted, "Evicted oldest skipped message keys");
    }

    while chain_key.index() < until {
        state
            .skipped_keys
            .insert(*ratchet_key, chain_key.message_keys()?);
        chain_key = chain_key.next_chain_key()?;
    }

    trace!(
        skipped = jump,
        cached = state.skipped_message_key_count(),
        "Cached skipped message keys"
    );
    Ok(chain_key)
}
