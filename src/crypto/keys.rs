//! Peer identities backed by ed25519 keypairs
//!
//! A peer id is the libp2p `PeerId` derived from the peer's public key,
//! so an announced key can be checked against the id it claims.
//! Signatures travel as lowercase hex.

use libp2p::identity::{self, ed25519};
use libp2p::PeerId;
use std::fmt;
use thiserror::Error;

/// Public half of a peer identity
pub type PeerKey = ed25519::PublicKey;

#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid secret key bytes")]
    InvalidSecret,
    #[error("Invalid public key encoding")]
    InvalidPublicKey,
}

/// The local peer's keypair. The secret never leaves this struct.
#[derive(Clone)]
pub struct LocalIdentity {
    keypair: ed25519::Keypair,
    id: String,
}

impl LocalIdentity {
    /// Generate a fresh random identity
    pub fn generate() -> Self {
        Self::from_keypair(ed25519::Keypair::generate())
    }

    /// Build a deterministic identity from 32 secret bytes
    pub fn from_secret(mut bytes: [u8; 32]) -> Result<Self, KeyError> {
        let secret =
            ed25519::SecretKey::try_from_bytes(&mut bytes).map_err(|_| KeyError::InvalidSecret)?;
        Ok(Self::from_keypair(ed25519::Keypair::from(secret)))
    }

    fn from_keypair(keypair: ed25519::Keypair) -> Self {
        let id = peer_id_for(&keypair.public());
        Self { keypair, id }
    }

    /// Peer id string of this identity
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Public key to announce
    pub fn public(&self) -> PeerKey {
        self.keypair.public()
    }

    /// Sign `message`, returning the signature as hex
    pub fn sign(&self, message: &[u8]) -> String {
        hex::encode(self.keypair.sign(message))
    }

    /// Secret bytes for persisting the identity
    pub fn secret_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(self.keypair.secret().as_ref());
        out
    }

    /// Same key as a libp2p transport identity
    pub fn to_libp2p(&self) -> identity::Keypair {
        identity::Keypair::from(self.keypair.clone())
    }
}

impl fmt::Debug for LocalIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalIdentity").field("id", &self.id).finish()
    }
}

/// Derive the peer id string a public key stands for
pub fn peer_id_for(key: &PeerKey) -> String {
    PeerId::from(identity::PublicKey::from(key.clone())).to_string()
}

/// Recover the public key embedded in an ed25519 peer id.
///
/// Ed25519 peer ids use the identity multihash, so the protobuf encoded key
/// is the digest itself.
pub fn key_from_peer_id(peer_id: &str) -> Option<PeerKey> {
    let peer_id: PeerId = peer_id.parse().ok()?;
    let bytes = peer_id.to_bytes();
    // identity code 0x00, then a single byte length for short keys
    let (&code, rest) = bytes.split_first()?;
    let (&len, digest) = rest.split_first()?;
    if code != 0x00 || len as usize != digest.len() {
        return None;
    }
    identity::PublicKey::try_decode_protobuf(digest)
        .ok()?
        .try_into_ed25519()
        .ok()
}

/// Check a hex signature over `message`. Malformed hex is a failed check.
pub fn verify_signature(key: &PeerKey, message: &[u8], signature_hex: &str) -> bool {
    match hex::decode(signature_hex) {
        Ok(sig) => key.verify(message, &sig),
        Err(_) => false,
    }
}

pub fn encode_public_key(key: &PeerKey) -> String {
    hex::encode(key.to_bytes())
}

pub fn decode_public_key(hex_str: &str) -> Result<PeerKey, KeyError> {
    let bytes = hex::decode(hex_str).map_err(|_| KeyError::InvalidPublicKey)?;
    ed25519::PublicKey::try_from_bytes(&bytes).map_err(|_| KeyError::InvalidPublicKey)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_identity() {
        let a = LocalIdentity::from_secret([7u8; 32]).unwrap();
        let b = LocalIdentity::from_secret([7u8; 32]).unwrap();
        assert_eq!(a.id(), b.id());
        assert_eq!(a.id(), peer_id_for(&a.public()));
    }

    #[test]
    fn test_sign_and_verify() {
        let id = LocalIdentity::from_secret([1u8; 32]).unwrap();
        let sig = id.sign(b"hello");
        assert!(verify_signature(&id.public(), b"hello", &sig));
        assert!(!verify_signature(&id.public(), b"hellO", &sig));
        assert!(!verify_signature(&id.public(), b"hello", "zz"));
    }

    #[test]
    fn test_key_recovered_from_peer_id() {
        let id = LocalIdentity::from_secret([5u8; 32]).unwrap();
        assert_eq!(key_from_peer_id(id.id()), Some(id.public()));
        assert_eq!(key_from_peer_id("not-a-peer"), None);
    }

    #[test]
    fn test_secret_roundtrip() {
        let id = LocalIdentity::generate();
        let restored = LocalIdentity::from_secret(id.secret_bytes()).unwrap();
        assert_eq!(restored.id(), id.id());
    }

    #[test]
    fn test_public_key_hex_roundtrip() {
        let id = LocalIdentity::from_secret([3u8; 32]).unwrap();
        let encoded = encode_public_key(&id.public());
        let decoded = decode_public_key(&encoded).unwrap();
        assert_eq!(decoded, id.public());
        assert!(decode_public_key("abcd").is_err());
    }
}
