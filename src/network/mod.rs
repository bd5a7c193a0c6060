//! P2P Networking Layer
//!
//! Carries the three game channels over libp2p gossipsub:
//! - `players` for signed envelopes
//! - `public-keys` for identity announcements
//! - `scoreboard` for score records and witness signatures
//!
//! Noise for encryption, Yamux for multiplexing. [`LoopbackHub`] offers the
//! same delivery semantics in-process.

pub mod behaviour;
pub mod loopback;
pub mod node;

pub use behaviour::{GameBehaviour, KEYS_TOPIC, PLAYERS_TOPIC, SCOREBOARD_TOPIC};
pub use loopback::{DeliveryFilter, LoopbackHub};
pub use node::{load_identity, GameNode, NodeCommand, NodeConfig, NodeError, NodeEvent};
