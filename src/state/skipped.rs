use crate::X25519PublicKey;
use crate::ratchet::MessageKeys;
use std::collections::VecDeque;

/// Identifier for a skipped message key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct SkippedKeyId {
    pub(crate) ratchet_key: X25519PublicKey,
    pub(crate) counter: u32,
}

/// Message keys derived ahead of their messages, indexed by the remote
/// ratchet key of their chain and the message counter.
///
/// Entries are kept in insertion order, oldest first. Callers bound the size
/// before inserting; making room evicts from the front.
#[derive(Clone, Default)]
pub(crate) struct SkippedKeys {
    keys: VecDeque<(SkippedKeyId, MessageKeys)>,
}

impl SkippedKeys {
    pub(crate) fn len(&self) -> usize {
        self.keys.len()
    }

    pub(crate) fn insert(&mut self, ratchet_key: X25519PublicKey, message_keys: MessageKeys) {
        let id = SkippedKeyId {
            ratchet_key,
            counter: message_keys.counter(),
        };
        self.keys.push_back((id, message_keys));
    }

    /// Removes and returns the key, so that each cached key decrypts at most once.
    pub(crate) fn take(&mut self, ratchet_key: &X25519PublicKey, counter: u32) -> Option<MessageKeys> {
        let index = self
            .keys
            .iter()
            .position(|(id, _)| id.ratchet_key == *ratchet_key && id.counter == counter)?;
        self.keys.remove(index).map(|(_, message_keys)| message_keys)
    }

    /// Drops every key of the chain with `ratchet_key`. Returns how many were dropped.
    pub(crate) fn remove_chain(&mut self, ratchet_key: &X25519PublicKey) -> usize {
        let before = self.keys.len();
        self.keys.retain(|(id, _)| id.ratchet_key != *ratchet_key);
        before - self.keys.len()
    }

    /// Drops up to `count` of the oldest keys. Returns how many were dropped.
    pub(crate) fn evict_oldest(&mut self, count: usize) -> usize {
        let count = count.min(self.keys.len());
        self.keys.drain(..count);
        count
    }

    /// Oldest first.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&SkippedKeyId, &MessageKeys)> {
        self.keys.iter().map(|(id, message_keys)| (id, message_keys))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(counter: u32) -> MessageKeys {
        MessageKeys::new([2u8; 32], [3u8; 12], counter)
    }

    #[test]
    fn test_take_consumes_key() {
        let ratchet_key = X25519PublicKey::from([1u8; 32]);
        let mut skipped = SkippedKeys::default();
        skipped.insert(ratchet_key, keys(4));

        assert_eq!(skipped.len(), 1);
        assert!(skipped.take(&ratchet_key, 5).is_none());
        assert!(skipped.take(&X25519PublicKey::from([9u8; 32]), 4).is_none());
        assert_eq!(skipped.take(&ratchet_key, 4).unwrap().counter(), 4);
        assert!(skipped.take(&ratchet_key, 4).is_none());
        assert_eq!(skipped.len(), 0);
    }

    #[test]
    fn test_evicts_oldest_first() {
        let first = X25519PublicKey::from([1u8; 32]);
        let second = X25519PublicKey::from([2u8; 32]);
        let mut skipped = SkippedKeys::default();
        for counter in 0..3 {
            skipped.insert(first, keys(counter));
        }
        skipped.insert(second, keys(0));

        assert_eq!(skipped.evict_oldest(2), 2);
        assert!(skipped.take(&first, 0).is_none());
        assert!(skipped.take(&first, 1).is_none());
        assert!(skipped.take(&first, 2).is_some());
        assert_eq!(skipped.evict_oldest(5), 1);
        assert_eq!(skipped.len(), 0);
    }

    #[test]
    fn test_remove_chain_keeps_other_chains() {
        let first = X25519PublicKey::from([1u8; 32]);
        let second = X25519PublicKey::from([2u8; 32]);
        let mut skipped = SkippedKeys::default();
        skipped.insert(first, keys(0));
        skipped.insert(second, keys(0));
        skipped.insert(first, keys(1));

        assert_eq!(skipped.remove_chain(&first), 2);
        assert_eq!(skipped.len(), 1);
        assert!(skipped.take(&second, 0).is_some());
    }
}
