//! Combined network behaviour for the game node

use libp2p::{
    gossipsub, identify,
    identity::Keypair,
    ping,
    swarm::NetworkBehaviour,
};
use std::time::Duration;

/// Topic carrying signed game envelopes
pub const PLAYERS_TOPIC: &str = "players";
/// Topic carrying public key announcements
pub const KEYS_TOPIC: &str = "public-keys";
/// Topic carrying score records and witness signatures
pub const SCOREBOARD_TOPIC: &str = "scoreboard";

/// Combined network behaviour
#[derive(NetworkBehaviour)]
pub struct GameBehaviour {
    /// Pub/sub broadcast for the three game channels
    pub gossipsub: gossipsub::Behaviour,
    /// Identify protocol for peer info exchange
    pub identify: identify::Behaviour,
    /// Ping for connection keepalive
    pub ping: ping::Behaviour,
}

impl GameBehaviour {
    /// Create new game behaviour
    pub fn new(key: &Keypair) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        // Envelopes are small and latency bound
        let gossip_config = gossipsub::ConfigBuilder::default()
            .heartbeat_interval(Duration::from_millis(500))
            .validation_mode(gossipsub::ValidationMode::Strict)
            .build()
            .map_err(|e| e.to_string())?;

        let gossipsub = gossipsub::Behaviour::new(
            gossipsub::MessageAuthenticity::Signed(key.clone()),
            gossip_config,
        )?;

        let identify = identify::Behaviour::new(identify::Config::new(
            "/domino-trust/id/1.0.0".to_string(),
            key.public(),
        ));

        let ping = ping::Behaviour::new(ping::Config::new().with_interval(Duration::from_secs(15)));

        Ok(Self {
            gossipsub,
            identify,
            ping,
        })
    }
}
