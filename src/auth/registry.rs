//! Identity Registry
//!
//! Maps peer ids to announced public keys. Entries are write-once: the
//! first valid announcement for an id wins and later conflicting ones are
//! refused. An announcement is only valid if its key derives the id.

use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info};

use crate::crypto::{decode_public_key, peer_id_for, PeerKey};
use crate::protocol::KeyAnnouncement;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Peer {0} already registered a different key")]
    AlreadyRegistered(String),
    #[error("Key does not belong to peer {0}")]
    KeyMismatch(String),
    #[error("Invalid public key for peer {0}")]
    InvalidKey(String),
}

/// Known peer public keys
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    keys: HashMap<String, PeerKey>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `key` for `peer_id`.
    ///
    /// Returns `Ok(true)` for a new entry and `Ok(false)` when the same key
    /// was already known.
    pub fn register(&mut self, peer_id: &str, key: PeerKey) -> Result<bool, RegistryError> {
        if peer_id_for(&key) != peer_id {
            return Err(RegistryError::KeyMismatch(peer_id.to_string()));
        }

        if let Some(existing) = self.keys.get(peer_id) {
            if *existing == key {
                return Ok(false);
            }
            return Err(RegistryError::AlreadyRegistered(peer_id.to_string()));
        }

        self.keys.insert(peer_id.to_string(), key);
        info!("Registered key for {}", peer_id);
        Ok(true)
    }

    /// Register a key announcement from the identity channel
    pub fn register_announcement(
        &mut self,
        announcement: &KeyAnnouncement,
    ) -> Result<bool, RegistryError> {
        let key = decode_public_key(&announcement.public_key)
            .map_err(|_| RegistryError::InvalidKey(announcement.user_id.clone()))?;
        let result = self.register(&announcement.user_id, key);
        if let Err(e) = &result {
            debug!("Refused key announcement: {}", e);
        }
        result
    }

    /// Public key of a peer, if announced
    pub fn get(&self, peer_id: &str) -> Option<&PeerKey> {
        self.keys.get(peer_id)
    }

    pub fn contains(&self, peer_id: &str) -> bool {
        self.keys.contains_key(peer_id)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{encode_public_key, LocalIdentity};

    fn identity(n: u8) -> LocalIdentity {
        LocalIdentity::from_secret([n; 32]).unwrap()
    }

    #[test]
    fn test_register_is_write_once() {
        let mut registry = IdentityRegistry::new();
        let a = identity(1);

        assert_eq!(registry.register(a.id(), a.public()), Ok(true));
        assert_eq!(registry.register(a.id(), a.public()), Ok(false));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_rejects_foreign_key() {
        let mut registry = IdentityRegistry::new();
        let a = identity(1);
        let b = identity(2);

        assert_eq!(
            registry.register(a.id(), b.public()),
            Err(RegistryError::KeyMismatch(a.id().to_string()))
        );
        assert!(!registry.contains(a.id()));
    }

    #[test]
    fn test_register_announcement() {
        let mut registry = IdentityRegistry::new();
        let a = identity(4);

        let ann = KeyAnnouncement {
            user_id: a.id().to_string(),
            public_key: encode_public_key(&a.public()),
        };
        assert_eq!(registry.register_announcement(&ann), Ok(true));
        assert_eq!(registry.get(a.id()), Some(&a.public()));

        let bad = KeyAnnouncement {
            user_id: "nobody".into(),
            public_key: "xyz".into(),
        };
        assert!(matches!(
            registry.register_announcement(&bad),
            Err(RegistryError::InvalidKey(_))
        ));
    }
}
