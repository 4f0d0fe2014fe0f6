use crate::ratchet::{initialize_alice_session, initialize_bob_session};
use crate::state::PendingPreKey;
use crate::storage::Direction;
use crate::{
    Error, PreKeyBundle, PreKeySignalMessage, ProtocolAddress, ProtocolStore, SessionManager,
    SessionRecord, X25519Secret,
};
use tracing::{debug, trace};

/// Establishes sessions with one remote address.
pub struct SessionBuilder<'a, S> {
    manager: &'a SessionManager<S>,
    remote_address: ProtocolAddress,
}

impl<'a, S: ProtocolStore> SessionBuilder<'a, S> {
    pub(crate) fn new(manager: &'a SessionManager<S>, remote_address: ProtocolAddress) -> Self {
        Self {
            manager,
            remote_address,
        }
    }

    /// Starts a session from the remote party's published bundle.
    ///
    /// Until the peer answers, every message encrypted under the new session
    /// is sent as a [`PreKeySignalMessage`]. A session already on record is
    /// archived rather than discarded.
    pub fn process_pre_key_bundle(&self, bundle: &PreKeyBundle) -> Result<(), Error> {
        let lock = self.manager.lock_for(&self.remote_address);
        let _guard = lock.lock();

        let store = self.manager.store();
        let address = &self.remote_address;

        if !store.is_trusted_identity(address, bundle.identity_key(), Direction::Sending)? {
            return Err(Error::UntrustedIdentity(address.clone()));
        }
        bundle.verify()?;

        let our_identity = store.identity_key_pair()?;
        let base_key = X25519Secret::generate()?;
        let mut state = initialize_alice_session(&our_identity, &base_key, bundle)?;

        let (signed_pre_key_id, _) = bundle.signed_pre_key();
        state.pending_pre_key = Some(PendingPreKey {
            pre_key_id: bundle.pre_key().map(|(id, _)| id),
            signed_pre_key_id,
            base_key: base_key.public_key(),
        });
        state.local_registration_id = store.local_registration_id()?;
        state.remote_registration_id = bundle.registration_id();

        let mut record = store.load_session(address)?.unwrap_or_default();
        record.promote_state(state, self.manager.config().max_archived_states);

        store.save_identity(address, bundle.identity_key())?;
        store.store_session(address, &record)?;

        debug!(
            %address,
            signed_pre_key_id,
            one_time_pre_key = bundle.pre_key().is_some(),
            "Built outbound session"
        );
        Ok(())
    }

    /// Runs the responder side of a handshake against `record`.
    ///
    /// Returns the id of the one-time pre-key the new state consumed, which
    /// the caller removes once the message has decrypted. The caller holds
    /// the address lock.
    pub(crate) fn process_pre_key(
        &self,
        record: &mut SessionRecord,
        message: &PreKeySignalMessage,
    ) -> Result<Option<u32>, Error> {
        let store = self.manager.store();
        let address = &self.remote_address;
        let max_archived = self.manager.config().max_archived_states;

        if !store.is_trusted_identity(address, message.identity_key(), Direction::Receiving)? {
            return Err(Error::UntrustedIdentity(address.clone()));
        }

        if record.promote_matching_session(message.message_version(), message.base_key(), max_archived)
        {
            trace!(%address, "Pre-key message for an existing session");
            return Ok(None);
        }

        let signed_pre_key_id = message.signed_pre_key_id();
        let signed_pre_key = store
            .load_signed_pre_key(signed_pre_key_id)?
            .ok_or(Error::InvalidKeyId(signed_pre_key_id))?;

        let one_time_pre_key = match message.pre_key_id() {
            Some(id) => Some(store.load_pre_key(id)?.ok_or(Error::InvalidKeyId(id))?),
            None => None,
        };

        let our_identity = store.identity_key_pair()?;
        let mut state = initialize_bob_session(
            &our_identity,
            &signed_pre_key,
            one_time_pre_key.as_ref(),
            message.identity_key(),
            message.base_key(),
        )?;
        state.local_registration_id = store.local_registration_id()?;
        state.remote_registration_id = message.registration_id();

        record.promote_state(state, max_archived);

        debug!(
            %address,
            signed_pre_key_id,
            one_time_pre_key = ?message.pre_key_id(),
            "Built inbound session"
        );
        Ok(message.pre_key_id())
    }
}
