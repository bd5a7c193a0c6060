//! Append-only scoreboard storage
//!
//! Two implementations: an in-memory store for tests and standalone
//! worlds, and a sled database for the node. Entries are never updated or
//! removed. A record id or a (record, signer) pair can only be written once.

use sled::{Db, Tree};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use super::{ScoreEntry, ScoreRecord};
use crate::crypto::RecordId;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("Entry already stored for record {0}")]
    Duplicate(RecordId),
}

/// A published record as stored
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub publisher: String,
    pub record_id: RecordId,
    pub record: ScoreRecord,
}

/// Append-only store of score records and witness signatures
pub trait ScoreStore: Send {
    /// Append one entry
    fn append(&mut self, entry: &ScoreEntry) -> Result<(), StoreError>;

    /// The `limit` most recently appended records, oldest first
    fn recent_records(&self, limit: usize) -> Result<Vec<StoredRecord>, StoreError>;

    fn record(&self, record_id: &RecordId) -> Result<Option<StoredRecord>, StoreError>;

    /// `(signer, signature)` pairs for a record
    fn signatures(&self, record_id: &RecordId) -> Result<Vec<(String, String)>, StoreError>;

    /// Make appended entries durable
    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Volatile store
#[derive(Debug, Default)]
pub struct MemoryScoreStore {
    records: Vec<StoredRecord>,
    index: HashMap<RecordId, usize>,
    signatures: HashMap<RecordId, BTreeMap<String, String>>,
}

impl MemoryScoreStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScoreStore for MemoryScoreStore {
    fn append(&mut self, entry: &ScoreEntry) -> Result<(), StoreError> {
        match entry {
            ScoreEntry::Record {
                user_id,
                record_id,
                record,
            } => {
                if self.index.contains_key(record_id) {
                    return Err(StoreError::Duplicate(*record_id));
                }
                self.index.insert(*record_id, self.records.len());
                self.records.push(StoredRecord {
                    publisher: user_id.clone(),
                    record_id: *record_id,
                    record: record.clone(),
                });
            }
            ScoreEntry::Signature {
                user_id,
                record_id,
                signature,
            } => {
                let signers = self.signatures.entry(*record_id).or_default();
                if signers.contains_key(user_id) {
                    return Err(StoreError::Duplicate(*record_id));
                }
                signers.insert(user_id.clone(), signature.clone());
            }
        }
        Ok(())
    }

    fn recent_records(&self, limit: usize) -> Result<Vec<StoredRecord>, StoreError> {
        let skip = self.records.len().saturating_sub(limit);
        Ok(self.records[skip..].to_vec())
    }

    fn record(&self, record_id: &RecordId) -> Result<Option<StoredRecord>, StoreError> {
        Ok(self.index.get(record_id).map(|&i| self.records[i].clone()))
    }

    fn signatures(&self, record_id: &RecordId) -> Result<Vec<(String, String)>, StoreError> {
        Ok(self
            .signatures
            .get(record_id)
            .map(|s| s.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }
}

/// Persistent store backed by sled.
///
/// Trees:
/// - `records`: append sequence (big endian u64) -> record entry json
/// - `record_index`: record id -> append sequence
/// - `signatures`: record id ++ signer -> signature hex
pub struct SledScoreStore {
    db: Db,
    records: Tree,
    record_index: Tree,
    signatures: Tree,
}

impl SledScoreStore {
    /// Open or create the store at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        let records = db.open_tree("records")?;
        let record_index = db.open_tree("record_index")?;
        let signatures = db.open_tree("signatures")?;

        Ok(Self {
            db,
            records,
            record_index,
            signatures,
        })
    }

    fn signature_key(record_id: &RecordId, signer: &str) -> Vec<u8> {
        let mut key = record_id.as_bytes().to_vec();
        key.extend_from_slice(signer.as_bytes());
        key
    }

    fn decode_record(bytes: &[u8]) -> Result<Option<StoredRecord>, StoreError> {
        match serde_json::from_slice::<ScoreEntry>(bytes)? {
            ScoreEntry::Record {
                user_id,
                record_id,
                record,
            } => Ok(Some(StoredRecord {
                publisher: user_id,
                record_id,
                record,
            })),
            ScoreEntry::Signature { .. } => Ok(None),
        }
    }
}

impl ScoreStore for SledScoreStore {
    fn append(&mut self, entry: &ScoreEntry) -> Result<(), StoreError> {
        match entry {
            ScoreEntry::Record { record_id, .. } => {
                if self.record_index.contains_key(record_id.as_bytes())? {
                    return Err(StoreError::Duplicate(*record_id));
                }
                let seq = self.db.generate_id()?.to_be_bytes();
                self.records.insert(seq, serde_json::to_vec(entry)?)?;
                self.record_index.insert(record_id.as_bytes(), seq.to_vec())?;
            }
            ScoreEntry::Signature {
                user_id,
                record_id,
                signature,
            } => {
                let key = Self::signature_key(record_id, user_id);
                let previous = self.signatures.compare_and_swap(
                    key,
                    None as Option<&[u8]>,
                    Some(signature.as_bytes()),
                )?;
                if previous.is_err() {
                    return Err(StoreError::Duplicate(*record_id));
                }
            }
        }
        debug!("Stored {:?}", entry.record_id());
        Ok(())
    }

    fn recent_records(&self, limit: usize) -> Result<Vec<StoredRecord>, StoreError> {
        let mut out = Vec::with_capacity(limit);
        for item in self.records.iter().rev().take(limit) {
            let (_, value) = item?;
            if let Some(record) = Self::decode_record(&value)? {
                out.push(record);
            }
        }
        out.reverse();
        Ok(out)
    }

    fn record(&self, record_id: &RecordId) -> Result<Option<StoredRecord>, StoreError> {
        let Some(seq) = self.record_index.get(record_id.as_bytes())? else {
            return Ok(None);
        };
        match self.records.get(seq)? {
            Some(value) => Self::decode_record(&value),
            None => Ok(None),
        }
    }

    fn signatures(&self, record_id: &RecordId) -> Result<Vec<(String, String)>, StoreError> {
        let mut out = Vec::new();
        for item in self.signatures.scan_prefix(record_id.as_bytes()) {
            let (key, value) = item?;
            let signer = String::from_utf8_lossy(&key[32..]).into_owned();
            let signature = String::from_utf8_lossy(&value).into_owned();
            out.push((signer, signature));
        }
        Ok(out)
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record_entry(publisher: &str, time: i64) -> ScoreEntry {
        let record = ScoreRecord {
            name: publisher.to_string(),
            dominoes: 2,
            time,
            participants: 3,
        };
        let record_id = RecordId::derive(publisher, &record.canonical_bytes().unwrap());
        ScoreEntry::Record {
            user_id: publisher.to_string(),
            record_id,
            record,
        }
    }

    fn signature_entry(signer: &str, record_id: RecordId) -> ScoreEntry {
        ScoreEntry::Signature {
            user_id: signer.to_string(),
            record_id,
            signature: format!("sig-{}", signer),
        }
    }

    fn exercise(store: &mut dyn ScoreStore) {
        let first = record_entry("a", 1);
        let second = record_entry("b", 2);
        let third = record_entry("c", 3);
        for e in [&first, &second, &third] {
            store.append(e).unwrap();
        }

        assert!(matches!(store.append(&first), Err(StoreError::Duplicate(_))));

        let recent = store.recent_records(2).unwrap();
        let names: Vec<_> = recent.iter().map(|r| r.publisher.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);

        let id = *first.record_id();
        store.append(&signature_entry("x", id)).unwrap();
        store.append(&signature_entry("y", id)).unwrap();
        assert!(matches!(
            store.append(&signature_entry("x", id)),
            Err(StoreError::Duplicate(_))
        ));

        let mut signers: Vec<_> = store
            .signatures(&id)
            .unwrap()
            .into_iter()
            .map(|(s, _)| s)
            .collect();
        signers.sort();
        assert_eq!(signers, vec!["x", "y"]);
        assert!(store.signatures(second.record_id()).unwrap().is_empty());

        assert_eq!(store.record(&id).unwrap().unwrap().publisher, "a");
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemoryScoreStore::new();
        exercise(&mut store);
    }

    #[test]
    fn test_sled_store() {
        let dir = tempdir().unwrap();
        let mut store = SledScoreStore::open(dir.path()).unwrap();
        exercise(&mut store);
    }

    #[test]
    fn test_sled_store_persists() {
        let dir = tempdir().unwrap();
        let entry = record_entry("a", 1);
        {
            let mut store = SledScoreStore::open(dir.path()).unwrap();
            store.append(&entry).unwrap();
            store.flush().unwrap();
        }

        let store = SledScoreStore::open(dir.path()).unwrap();
        let recent = store.recent_records(5).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(&recent[0].record_id, entry.record_id());
    }
}
