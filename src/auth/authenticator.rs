//! Message Authenticator
//!
//! The single trust boundary of the core. Outgoing payloads are
//! serialized, suffixed with `@<timestamp>` and signed. Incoming envelopes
//! must carry a valid signature from a registered key, and their embedded
//! timestamp (translated into local time) must be newer than anything
//! accepted from that sender before and not older than the freshness
//! window.

use std::collections::HashMap;
use thiserror::Error;

use super::registry::IdentityRegistry;
use super::sync::ClockSync;
use crate::clock::Millis;
use crate::crypto::{verify_signature, LocalIdentity};
use crate::protocol::{Destination, Envelope, Payload};

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Envelope from {0} carries no signature")]
    MissingSignature(String),
    #[error("No public key registered for {0}")]
    UnknownSender(String),
    #[error("Signature check failed for envelope from {0}")]
    BadSignature(String),
    #[error("Malformed envelope data from {0}")]
    MalformedData(String),
    #[error("Replayed envelope from {sender}: {timestamp} <= {last}")]
    Replayed {
        sender: String,
        timestamp: Millis,
        last: Millis,
    },
    #[error("Stale envelope from {sender}: {timestamp} vs now {now}")]
    Stale {
        sender: String,
        timestamp: Millis,
        now: Millis,
    },
    #[error("Payload codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Payload that passed every check
#[derive(Debug, Clone, PartialEq)]
pub struct Verified {
    pub sender_id: String,
    pub payload: Payload,
    /// Send time translated into local time
    pub timestamp: Millis,
}

/// Signs outgoing and verifies incoming envelopes
#[derive(Debug)]
pub struct MessageAuthenticator {
    identity: LocalIdentity,
    freshness_window: Millis,
    last_sent: Millis,
    last_accepted: HashMap<String, Millis>,
}

impl MessageAuthenticator {
    pub fn new(identity: LocalIdentity, freshness_window: Millis) -> Self {
        Self {
            identity,
            freshness_window,
            last_sent: Millis::MIN,
            last_accepted: HashMap::new(),
        }
    }

    pub fn identity(&self) -> &LocalIdentity {
        &self.identity
    }

    pub fn local_id(&self) -> &str {
        self.identity.id()
    }

    /// Sign `payload` for `dest`.
    ///
    /// Send stamps are strictly increasing so two envelopes sent in the same
    /// millisecond do not look like a replay.
    pub fn send(
        &mut self,
        dest: Destination,
        payload: &Payload,
        now: Millis,
    ) -> Result<Envelope, AuthError> {
        let stamp = now.max(self.last_sent.saturating_add(1));
        self.last_sent = stamp;

        let data = format!("{}@{}", payload.to_json()?, stamp);
        let signature = self.identity.sign(data.as_bytes());

        Ok(Envelope {
            sender_id: self.identity.id().to_string(),
            dest_id: dest,
            action: payload.action(),
            data,
            signature: Some(signature),
        })
    }

    /// Verify and decode an incoming envelope
    pub fn receive(
        &mut self,
        envelope: &Envelope,
        registry: &IdentityRegistry,
        sync: &ClockSync,
        now: Millis,
    ) -> Result<Verified, AuthError> {
        let sender = &envelope.sender_id;

        let signature = envelope
            .signature
            .as_deref()
            .ok_or_else(|| AuthError::MissingSignature(sender.clone()))?;
        let key = registry
            .get(sender)
            .ok_or_else(|| AuthError::UnknownSender(sender.clone()))?;
        if !verify_signature(key, envelope.data.as_bytes(), signature) {
            return Err(AuthError::BadSignature(sender.clone()));
        }

        let (json, raw_stamp) = envelope
            .split_data()
            .ok_or_else(|| AuthError::MalformedData(sender.clone()))?;

        let is_self = sender == self.identity.id();
        let timestamp = if is_self {
            raw_stamp
        } else {
            sync.to_local(sender, raw_stamp)
        };

        if let Some(&last) = self.last_accepted.get(sender) {
            if timestamp <= last {
                return Err(AuthError::Replayed {
                    sender: sender.clone(),
                    timestamp,
                    last,
                });
            }
        }

        // Freshness needs a trustworthy translation, so it only applies
        // once the sender's offset is known
        if (is_self || sync.is_synchronized(sender))
            && now.saturating_sub(timestamp) > self.freshness_window
        {
            return Err(AuthError::Stale {
                sender: sender.clone(),
                timestamp,
                now,
            });
        }

        let payload = Payload::decode(envelope.action, json)
            .map_err(|_| AuthError::MalformedData(sender.clone()))?;

        self.last_accepted.insert(sender.clone(), timestamp);

        Ok(Verified {
            sender_id: sender.clone(),
            payload,
            timestamp,
        })
    }

    /// Move a peer's replay high-water mark into local time after its
    /// offset gets committed
    pub fn rebase(&mut self, peer_id: &str, offset: Millis) {
        if let Some(last) = self.last_accepted.get_mut(peer_id) {
            *last = last.saturating_sub(offset);
        }
    }

    /// Latest accepted (local) timestamp from a peer
    pub fn last_timestamp(&self, peer_id: &str) -> Option<Millis> {
        self.last_accepted.get(peer_id).copied()
    }
}
