//! Cryptography module for peer authentication
//!
//! Provides ed25519 peer identities, signature encoding, and content
//! addressing for leaderboard records.

pub mod hashing;
pub mod keys;

pub use hashing::RecordId;
pub use keys::{decode_public_key, encode_public_key, key_from_peer_id, peer_id_for, verify_signature, KeyError, LocalIdentity, PeerKey};
