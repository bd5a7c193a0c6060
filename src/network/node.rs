//! Game node: a [`World`] driven by a libp2p swarm

use futures::StreamExt;
use libp2p::{gossipsub, noise, swarm::SwarmEvent, yamux, Multiaddr, PeerId, Swarm};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::behaviour::{
    GameBehaviour, GameBehaviourEvent, KEYS_TOPIC, PLAYERS_TOPIC, SCOREBOARD_TOPIC,
};
use crate::clock::{Clock, SystemClock};
use crate::crypto::LocalIdentity;
use crate::protocol::{Envelope, KeyAnnouncement, Outbound};
use crate::scoreboard::{ScoreEntry, ScoreRecord, SledScoreStore, StoreError};
use crate::world::{ControlInput, World, WorldConfig};

/// Longest the loop sleeps when no timer is pending
const IDLE_TICK: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Dial error: {0}")]
    Dial(String),
    #[error("Subscribe error: {0}")]
    Subscribe(String),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Identity error: {0}")]
    Identity(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Node configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Port to listen on (0 for random)
    pub listen_port: u16,
    /// Peers to dial at startup
    pub bootstrap_peers: Vec<Multiaddr>,
    /// Holds the identity key and the scoreboard database
    pub data_dir: PathBuf,
    /// Display name of the local player
    pub name: String,
    pub world: WorldConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_port: 0,
            bootstrap_peers: vec![],
            data_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("domino-trust"),
            name: "player".to_string(),
            world: WorldConfig::default(),
        }
    }
}

/// Events emitted by the node
#[derive(Debug, Clone)]
pub enum NodeEvent {
    /// Node started listening
    Listening { address: Multiaddr },
    /// Connected to a peer
    PeerConnected { peer_id: PeerId },
    /// Disconnected from a peer
    PeerDisconnected { peer_id: PeerId },
}

/// Requests from the embedding application
#[derive(Debug)]
pub enum NodeCommand {
    Control(ControlInput),
    /// Reply with the admitted leaderboard
    Leaderboard(oneshot::Sender<Vec<ScoreRecord>>),
    /// Leave the game and stop the loop
    Shutdown,
}

/// Load the persisted identity from `data_dir`, creating one on first run
pub fn load_identity(data_dir: &Path) -> Result<LocalIdentity, NodeError> {
    let path = data_dir.join("identity.key");

    if path.exists() {
        let encoded = std::fs::read_to_string(&path)?;
        let bytes = hex::decode(encoded.trim()).map_err(|e| NodeError::Identity(e.to_string()))?;
        let secret: [u8; 32] = bytes
            .try_into()
            .map_err(|_| NodeError::Identity("identity key must be 32 bytes".to_string()))?;
        return LocalIdentity::from_secret(secret).map_err(|e| NodeError::Identity(e.to_string()));
    }

    let identity = LocalIdentity::generate();
    std::fs::create_dir_all(data_dir)?;
    std::fs::write(&path, hex::encode(identity.secret_bytes()))?;
    info!("Created new identity {}", identity.id());
    Ok(identity)
}

/// P2P game node
pub struct GameNode {
    swarm: Swarm<GameBehaviour>,
    world: World,
    clock: Arc<dyn Clock>,
    name: String,
    players_topic: gossipsub::IdentTopic,
    keys_topic: gossipsub::IdentTopic,
    scoreboard_topic: gossipsub::IdentTopic,
    event_tx: mpsc::Sender<NodeEvent>,
    command_tx: mpsc::Sender<NodeCommand>,
    command_rx: mpsc::Receiver<NodeCommand>,
    local_peer_id: PeerId,
}

impl GameNode {
    /// Create a new game node
    pub async fn new(config: NodeConfig) -> Result<(Self, mpsc::Receiver<NodeEvent>), NodeError> {
        let identity = load_identity(&config.data_dir)?;
        let local_key = identity.to_libp2p();
        let local_peer_id = PeerId::from(local_key.public());

        info!("Local peer ID: {}", local_peer_id);

        let store = SledScoreStore::open(config.data_dir.join("scoreboard"))?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let world = World::new(identity, config.world.clone(), Arc::clone(&clock), Box::new(store));

        let mut swarm = libp2p::SwarmBuilder::with_existing_identity(local_key)
            .with_tokio()
            .with_tcp(
                libp2p::tcp::Config::default(),
                noise::Config::new,
                yamux::Config::default,
            )
            .map_err(|e| NodeError::Transport(e.to_string()))?
            .with_quic()
            .with_behaviour(|key| GameBehaviour::new(key))
            .map_err(|e| NodeError::Transport(e.to_string()))?
            .with_swarm_config(|cfg| cfg.with_idle_connection_timeout(Duration::from_secs(60)))
            .build();

        let players_topic = gossipsub::IdentTopic::new(PLAYERS_TOPIC);
        let keys_topic = gossipsub::IdentTopic::new(KEYS_TOPIC);
        let scoreboard_topic = gossipsub::IdentTopic::new(SCOREBOARD_TOPIC);
        for topic in [&players_topic, &keys_topic, &scoreboard_topic] {
            swarm
                .behaviour_mut()
                .gossipsub
                .subscribe(topic)
                .map_err(|e| NodeError::Subscribe(e.to_string()))?;
        }

        let listen_addr: Multiaddr = format!("/ip4/0.0.0.0/tcp/{}", config.listen_port)
            .parse()
            .map_err(|e: libp2p::multiaddr::Error| NodeError::Transport(e.to_string()))?;
        swarm
            .listen_on(listen_addr)
            .map_err(|e| NodeError::Transport(e.to_string()))?;

        for addr in config.bootstrap_peers {
            swarm
                .dial(addr.clone())
                .map_err(|e| NodeError::Dial(e.to_string()))?;
            info!("Dialing {}", addr);
        }

        let (event_tx, event_rx) = mpsc::channel(100);
        let (command_tx, command_rx) = mpsc::channel(100);

        let node = Self {
            swarm,
            world,
            clock,
            name: config.name,
            players_topic,
            keys_topic,
            scoreboard_topic,
            event_tx,
            command_tx,
            command_rx,
            local_peer_id,
        };

        Ok((node, event_rx))
    }

    /// Get local peer ID
    pub fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    /// Get connected peer count
    pub fn peer_count(&self) -> usize {
        self.swarm.connected_peers().count()
    }

    /// Handle for sending commands into the running loop
    pub fn commands(&self) -> mpsc::Sender<NodeCommand> {
        self.command_tx.clone()
    }

    /// The world, for subscribing to events before [`GameNode::run`]
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Run the node event loop until shutdown
    pub async fn run(&mut self) {
        self.world.connect();
        self.world.begin(&self.name);
        self.world.load_leaderboard();
        self.flush_outbox();

        loop {
            let tick = self.until_next_timer();

            tokio::select! {
                event = self.swarm.select_next_some() => {
                    self.handle_swarm_event(event).await;
                }
                command = self.command_rx.recv() => match command {
                    Some(NodeCommand::Control(input)) => self.world.control(input),
                    Some(NodeCommand::Leaderboard(reply)) => {
                        let _ = reply.send(self.world.leaderboard());
                    }
                    Some(NodeCommand::Shutdown) | None => {
                        info!("Shutting down");
                        self.world.end();
                        self.flush_outbox();
                        break;
                    }
                },
                _ = tokio::time::sleep(tick) => {
                    self.world.poll_timers();
                }
            }

            self.flush_outbox();
        }
    }

    fn until_next_timer(&self) -> Duration {
        match self.world.next_deadline() {
            Some(due) => {
                let wait = (due - self.clock.now_ms()).max(0) as u64;
                Duration::from_millis(wait).min(IDLE_TICK)
            }
            None => IDLE_TICK,
        }
    }

    /// Publish everything the world queued
    fn flush_outbox(&mut self) {
        for outbound in self.world.drain_outbox() {
            let (topic, bytes) = match &outbound {
                Outbound::Envelope(envelope) => (self.players_topic.clone(), envelope.to_bytes()),
                Outbound::Key(announcement) => {
                    (self.keys_topic.clone(), serde_json::to_vec(announcement))
                }
                Outbound::Score(entry) => (self.scoreboard_topic.clone(), serde_json::to_vec(entry)),
            };

            let bytes = match bytes {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Failed to encode outbound message: {}", e);
                    continue;
                }
            };

            match self.swarm.behaviour_mut().gossipsub.publish(topic.clone(), bytes) {
                Ok(_) => {}
                Err(gossipsub::PublishError::InsufficientPeers) => {
                    debug!("No peers on {} yet", topic);
                }
                Err(e) => warn!("Publish to {} failed: {}", topic, e),
            }
        }
    }

    /// Handle swarm events
    async fn handle_swarm_event(&mut self, event: SwarmEvent<GameBehaviourEvent>) {
        match event {
            SwarmEvent::NewListenAddr { address, .. } => {
                info!("Listening on {}", address);
                let _ = self.event_tx.send(NodeEvent::Listening { address }).await;
            }
            SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                info!("Connected to {}", peer_id);
                let _ = self
                    .event_tx
                    .send(NodeEvent::PeerConnected { peer_id })
                    .await;
            }
            SwarmEvent::ConnectionClosed { peer_id, .. } => {
                info!("Disconnected from {}", peer_id);
                let _ = self
                    .event_tx
                    .send(NodeEvent::PeerDisconnected { peer_id })
                    .await;
            }
            SwarmEvent::Behaviour(behaviour_event) => {
                self.handle_behaviour_event(behaviour_event);
            }
            _ => {}
        }
    }

    /// Handle behaviour events
    fn handle_behaviour_event(&mut self, event: GameBehaviourEvent) {
        match event {
            GameBehaviourEvent::Gossipsub(gossipsub::Event::Message { message, .. }) => {
                self.handle_message(message);
            }
            GameBehaviourEvent::Gossipsub(gossipsub::Event::Subscribed { peer_id, topic }) => {
                // A peer that just joined the key channel missed our earlier announcement
                if topic == self.keys_topic.hash() {
                    debug!("{} subscribed to keys", peer_id);
                    self.world.connect();
                }
            }
            GameBehaviourEvent::Gossipsub(_) => {}
            GameBehaviourEvent::Identify(identify_event) => {
                if let libp2p::identify::Event::Received { peer_id, info, .. } = identify_event {
                    debug!("Identified peer {}: {}", peer_id, info.agent_version);
                }
            }
            GameBehaviourEvent::Ping(_) => {}
        }
    }

    /// Route a gossip message to the world by channel
    fn handle_message(&mut self, message: gossipsub::Message) {
        let topic = message.topic;

        if topic == self.players_topic.hash() {
            match Envelope::from_bytes(&message.data) {
                Ok(envelope) => self.world.handle_envelope(&envelope),
                Err(e) => debug!("Malformed envelope: {}", e),
            }
        } else if topic == self.keys_topic.hash() {
            match serde_json::from_slice::<KeyAnnouncement>(&message.data) {
                Ok(announcement) => self.world.on_key_announcement(&announcement),
                Err(e) => debug!("Malformed key announcement: {}", e),
            }
        } else if topic == self.scoreboard_topic.hash() {
            match serde_json::from_slice::<ScoreEntry>(&message.data) {
                Ok(entry) => self.world.on_score_entry(&entry),
                Err(e) => debug!("Malformed score entry: {}", e),
            }
        } else {
            debug!("Message on unknown topic {}", topic);
        }
    }
}
