//! Score attestation
//!
//! Witnessing, verification and the admitted leaderboard. A witness only
//! signs a record that matches its own view of the finished game, and a
//! record is admitted once valid signatures from more than half of its
//! declared participants are in the store.

use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use super::store::{ScoreStore, StoreError};
use super::{ScoreEntry, ScoreRecord};
use crate::auth::IdentityRegistry;
use crate::crypto::{key_from_peer_id, verify_signature, LocalIdentity, RecordId};

/// Local view of the finished game a witness compares a record against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WitnessContext {
    pub game_ended: bool,
    /// The publisher is in Lose state locally
    pub publisher_lost: bool,
    pub dominoes: u32,
    pub living: usize,
}

impl WitnessContext {
    pub fn agrees_with(&self, record: &ScoreRecord) -> bool {
        self.game_ended
            && !self.publisher_lost
            && record.dominoes == self.dominoes
            && record.participants == self.living
    }
}

/// Scoreboard state of one peer
pub struct ScoreAttestation {
    store: Box<dyn ScoreStore>,
    admitted: HashMap<RecordId, ScoreRecord>,
}

impl ScoreAttestation {
    pub fn new(store: Box<dyn ScoreStore>) -> Self {
        Self {
            store,
            admitted: HashMap::new(),
        }
    }

    /// Publish a record as its winner. The returned entry goes out on the
    /// scoreboard channel.
    pub fn publish(&mut self, publisher: &str, record: ScoreRecord) -> Result<ScoreEntry, StoreError> {
        let record_id = RecordId::derive(publisher, &record.canonical_bytes()?);
        let entry = ScoreEntry::Record {
            user_id: publisher.to_string(),
            record_id,
            record,
        };
        self.store.append(&entry)?;
        info!("Published score record {}", record_id);
        Ok(entry)
    }

    /// Sign a record announced by `publisher` if it matches the local view.
    ///
    /// Returns the signature entry to publish, or `None` when the record
    /// was declined or already signed.
    pub fn witness(
        &mut self,
        identity: &LocalIdentity,
        registry: &IdentityRegistry,
        publisher: &str,
        record_id: RecordId,
        record: &ScoreRecord,
        context: WitnessContext,
    ) -> Result<Option<ScoreEntry>, StoreError> {
        if !context.agrees_with(record) {
            debug!("Declined to witness {}: {:?} vs {:?}", record_id, record, context);
            return Ok(None);
        }

        let canonical = record.canonical_bytes()?;
        if RecordId::derive(publisher, &canonical) != record_id {
            debug!("Declined to witness {}: id does not match content", record_id);
            return Ok(None);
        }

        // Keep the record itself so the signature can be checked later even
        // if the publisher's entry never reaches us
        let record_entry = ScoreEntry::Record {
            user_id: publisher.to_string(),
            record_id,
            record: record.clone(),
        };
        self.append_once(&record_entry)?;

        let entry = ScoreEntry::Signature {
            user_id: identity.id().to_string(),
            record_id,
            signature: identity.sign(&canonical),
        };
        if !self.append_once(&entry)? {
            return Ok(None);
        }

        info!("Witnessed score record {}", record_id);
        self.try_admit(&record_id, record, registry)?;
        Ok(Some(entry))
    }

    /// Take in an entry from the scoreboard channel. Returns whether it was
    /// new.
    pub fn ingest(&mut self, entry: &ScoreEntry, registry: &IdentityRegistry) -> Result<bool, StoreError> {
        if let ScoreEntry::Record { user_id, record_id, record } = entry {
            if RecordId::derive(user_id, &record.canonical_bytes()?) != *record_id {
                warn!("Dropped score record {}: id does not match content", record_id);
                return Ok(false);
            }
        }

        if !self.append_once(entry)? {
            return Ok(false);
        }

        let record_id = *entry.record_id();
        if let Some(stored) = self.store.record(&record_id)? {
            self.try_admit(&record_id, &stored.record, registry)?;
        }
        Ok(true)
    }

    /// Whether more than half of the record's participants validly signed it
    pub fn verify(
        &self,
        record_id: &RecordId,
        record: &ScoreRecord,
        registry: &IdentityRegistry,
    ) -> Result<bool, StoreError> {
        let canonical = record.canonical_bytes()?;
        let mut witnesses = HashSet::new();

        for (signer, signature) in self.store.signatures(record_id)? {
            let key = registry.get(&signer).cloned().or_else(|| key_from_peer_id(&signer));
            match key {
                Some(key) if verify_signature(&key, &canonical, &signature) => {
                    witnesses.insert(signer);
                }
                _ => debug!("Invalid witness signature from {} on {}", signer, record_id),
            }
        }

        Ok(witnesses.len() >= record.required_witnesses())
    }

    /// Verify the `limit` most recent stored records and admit the
    /// authentic ones. Returns how many were admitted.
    pub fn load_leaderboard(&mut self, limit: usize, registry: &IdentityRegistry) -> Result<usize, StoreError> {
        let mut loaded = 0;
        for stored in self.store.recent_records(limit)? {
            let canonical = stored.record.canonical_bytes()?;
            if RecordId::derive(&stored.publisher, &canonical) != stored.record_id {
                warn!("Stored record {} does not match its id", stored.record_id);
                continue;
            }
            if self.try_admit(&stored.record_id, &stored.record, registry)? {
                loaded += 1;
            }
        }
        info!("Loaded {} verified score records", loaded);
        Ok(loaded)
    }

    /// Admitted records, newest first
    pub fn leaderboard(&self) -> Vec<ScoreRecord> {
        let mut records: Vec<_> = self.admitted.values().cloned().collect();
        records.sort_by(|a, b| b.time.cmp(&a.time));
        records
    }

    pub fn is_admitted(&self, record_id: &RecordId) -> bool {
        self.admitted.contains_key(record_id)
    }

    /// Make stored entries durable
    pub fn flush(&self) -> Result<(), StoreError> {
        self.store.flush()
    }

    fn try_admit(
        &mut self,
        record_id: &RecordId,
        record: &ScoreRecord,
        registry: &IdentityRegistry,
    ) -> Result<bool, StoreError> {
        if self.admitted.contains_key(record_id) {
            return Ok(false);
        }
        if !self.verify(record_id, record, registry)? {
            return Ok(false);
        }
        info!("Admitted score record {} ({} by {})", record_id, record.dominoes, record.name);
        self.admitted.insert(*record_id, record.clone());
        Ok(true)
    }

    /// Append, treating an already stored entry as a no-op
    fn append_once(&mut self, entry: &ScoreEntry) -> Result<bool, StoreError> {
        match self.store.append(entry) {
            Ok(()) => Ok(true),
            Err(StoreError::Duplicate(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for ScoreAttestation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoreAttestation")
            .field("admitted", &self.admitted.len())
            .finish()
    }
}
