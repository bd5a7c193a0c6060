//! Domino Trust - serverless multiplayer coordination
//!
//! A trust and consensus engine for a real-time game with no server:
//! - Every peer signs its messages with an ed25519 key announced on a public channel
//! - Pairwise clock sync translates remote timestamps into local time
//! - Envelopes are rejected when forged, replayed or stale
//! - Contested actions (push, kill, expulsion) need a quorum of living players
//! - Final scores are admitted only once a majority of participants witnessed them

pub mod auth;
pub mod clock;
pub mod consensus;
pub mod crypto;
pub mod network;
pub mod protocol;
pub mod scoreboard;
pub mod world;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, Millis, SystemClock};
pub use crypto::{LocalIdentity, PeerKey, RecordId};
pub use network::{GameNode, LoopbackHub, NodeCommand, NodeConfig, NodeEvent};
pub use protocol::{Destination, Envelope, KeyAnnouncement, Outbound};

// Re-export authentication types
pub use auth::{AuthError, ClockSync, IdentityRegistry, MessageAuthenticator};

// Re-export consensus types
pub use consensus::{AckOutcome, ActionTrial, TrialCoordinator};

// Re-export scoreboard types
pub use scoreboard::{
    MemoryScoreStore, ScoreAttestation, ScoreEntry, ScoreRecord, ScoreStore, SledScoreStore,
};

// Re-export world types
pub use world::{
    ControlInput, Player, PlayerState, PlayerStateStore, World, WorldConfig, WorldEvent,
};
