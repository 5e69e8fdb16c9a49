//! Peer key directory: peer id -> imported public key.
//!
//! An entry exists only after a peer's announcement was imported
//! successfully. At most one entry per peer; the latest announcement wins.
//! A missing entry is the normal state for a peer that has not announced yet.

use std::collections::HashMap;

use mb_crypto::{CryptoError, PublicKey};

#[derive(Debug, Clone, Default)]
pub struct PeerKeyDirectory {
    keys: HashMap<String, PublicKey>,
}

impl PeerKeyDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite; returns the key it replaced.
    pub fn add_public_key(&mut self, peer_id: impl Into<String>, key: PublicKey) -> Option<PublicKey> {
        self.keys.insert(peer_id.into(), key)
    }

    pub fn get_public_key(&self, peer_id: &str) -> Option<&PublicKey> {
        self.keys.get(peer_id)
    }

    /// Import a base64 SPKI announcement. The directory is left untouched
    /// if the key does not import.
    pub fn import_announcement(&mut self, peer_id: &str, encoded: &str) -> Result<bool, CryptoError> {
        let key = PublicKey::import(encoded)?;
        let replaced = self.add_public_key(peer_id, key);
        Ok(replaced.is_some())
    }

    pub fn contains(&self, peer_id: &str) -> bool {
        self.keys.contains_key(peer_id)
    }

    pub fn peers(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
