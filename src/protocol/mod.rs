//! Wire protocol
//!
//! Three channels share one transport:
//! - `players`: signed [`Envelope`]s carrying game and trial traffic
//! - `public-keys`: [`KeyAnnouncement`]s, consumed in arrival order
//! - `scoreboard`: append-only score entries (see [`crate::scoreboard`])

pub mod envelope;
pub mod messages;

pub use envelope::{Action, Destination, Envelope, BROADCAST, BROADCAST_WITH_SELF};
pub use messages::{
    Acknowledgement, MoveUpdate, Payload, ScoreAnnouncement, TrialAction, TrialProposal,
};

use serde::{Deserialize, Serialize};

use crate::scoreboard::ScoreEntry;

/// Public key announcement on the identity channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyAnnouncement {
    pub user_id: String,
    /// Hex encoded ed25519 public key
    pub public_key: String,
}

/// Anything the core wants a transport to publish
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Envelope(Envelope),
    Key(KeyAnnouncement),
    Score(ScoreEntry),
}
