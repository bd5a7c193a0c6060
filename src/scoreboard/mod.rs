//! Scoreboard Module
//!
//! Score records are published by the winning peer into an append-only
//! store and witnessed by the other players, who sign the record's exact
//! canonical serialization. A record counts as authentic once more than
//! half of its declared participants have signed it.

mod attestation;
mod store;

pub use attestation::{ScoreAttestation, WitnessContext};
pub use store::{MemoryScoreStore, ScoreStore, SledScoreStore, StoreError, StoredRecord};

use serde::{Deserialize, Serialize};

use crate::clock::Millis;
use crate::crypto::RecordId;

/// Result of one game, immutable once published
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRecord {
    /// Winner display name
    pub name: String,
    /// Dominoes placed when the game ended
    pub dominoes: u32,
    /// Game end time
    pub time: Millis,
    /// Living players at game end
    pub participants: usize,
}

impl ScoreRecord {
    /// Bytes that witnesses sign. Field order is fixed by the struct.
    pub fn canonical_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Witness signatures needed for admission
    pub fn required_witnesses(&self) -> usize {
        self.participants / 2 + 1
    }
}

/// One entry of the append-only scoreboard store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ScoreEntry {
    Record {
        #[serde(rename = "userId")]
        user_id: String,
        #[serde(rename = "recordId")]
        record_id: RecordId,
        record: ScoreRecord,
    },
    Signature {
        #[serde(rename = "userId")]
        user_id: String,
        #[serde(rename = "recordId")]
        record_id: RecordId,
        /// Hex ed25519 signature over the record's canonical bytes
        signature: String,
    },
}

impl ScoreEntry {
    pub fn record_id(&self) -> &RecordId {
        match self {
            ScoreEntry::Record { record_id, .. } | ScoreEntry::Signature { record_id, .. } => {
                record_id
            }
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            ScoreEntry::Record { user_id, .. } | ScoreEntry::Signature { user_id, .. } => user_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ScoreRecord {
        ScoreRecord {
            name: "alice".into(),
            dominoes: 4,
            time: 1_700_000_000_000,
            participants: 3,
        }
    }

    #[test]
    fn test_canonical_bytes_are_stable() {
        let bytes = record().canonical_bytes().unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"name":"alice","dominoes":4,"time":1700000000000,"participants":3}"#
        );
    }

    #[test]
    fn test_required_witnesses_is_strict_majority() {
        let mut r = record();
        assert_eq!(r.required_witnesses(), 2);
        r.participants = 4;
        assert_eq!(r.required_witnesses(), 3);
        r.participants = 1;
        assert_eq!(r.required_witnesses(), 1);
    }

    #[test]
    fn test_entry_wire_shape() {
        let id = RecordId::derive("p", b"r");
        let entry = ScoreEntry::Signature {
            user_id: "p".into(),
            record_id: id,
            signature: "ab".into(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "signature");
        assert_eq!(json["userId"], "p");
        assert_eq!(json["recordId"], id.to_hex());

        let back: ScoreEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }
}
