//! In-process transport
//!
//! Connects several [`World`]s directly, delivering every published
//! message to every other world in publish order. Used for simulations
//! and multi-peer tests without sockets.

use tracing::warn;

use crate::protocol::Outbound;
use crate::world::World;

/// Upper bound on delivery rounds before `run_until_idle` gives up
const MAX_ROUNDS: usize = 10_000;

/// Decides per `(from, to, message)` whether to deliver. May rewrite the
/// message in place.
pub type DeliveryFilter = Box<dyn FnMut(usize, usize, &mut Outbound) -> bool + Send>;

/// Broadcast hub over a set of worlds
#[derive(Default)]
pub struct LoopbackHub {
    worlds: Vec<World>,
    filter: Option<DeliveryFilter>,
    delivered: usize,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a world, returning its index
    pub fn add(&mut self, world: World) -> usize {
        self.worlds.push(world);
        self.worlds.len() - 1
    }

    pub fn world(&self, index: usize) -> &World {
        &self.worlds[index]
    }

    pub fn world_mut(&mut self, index: usize) -> &mut World {
        &mut self.worlds[index]
    }

    pub fn len(&self) -> usize {
        self.worlds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.worlds.is_empty()
    }

    /// Messages delivered so far
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    pub fn set_filter(&mut self, filter: DeliveryFilter) {
        self.filter = Some(filter);
    }

    pub fn clear_filter(&mut self) {
        self.filter = None;
    }

    /// Connect every world and settle the resulting traffic
    pub fn connect_all(&mut self) -> bool {
        for world in &mut self.worlds {
            world.connect();
        }
        self.run_until_idle()
    }

    /// Deliver until no world has anything left to publish. Returns `false`
    /// if traffic did not settle.
    pub fn run_until_idle(&mut self) -> bool {
        for _ in 0..MAX_ROUNDS {
            let mut pending = Vec::new();
            for (from, world) in self.worlds.iter_mut().enumerate() {
                for outbound in world.drain_outbox() {
                    pending.push((from, outbound));
                }
            }

            if pending.is_empty() {
                return true;
            }

            for (from, outbound) in pending {
                self.broadcast(from, outbound);
            }
        }

        warn!("Loopback traffic did not settle after {} rounds", MAX_ROUNDS);
        false
    }

    /// Fire due timers everywhere, then settle traffic
    pub fn tick(&mut self) -> bool {
        for world in &mut self.worlds {
            world.poll_timers();
        }
        self.run_until_idle()
    }

    fn broadcast(&mut self, from: usize, outbound: Outbound) {
        for to in 0..self.worlds.len() {
            if to == from {
                continue;
            }

            let mut message = outbound.clone();
            if let Some(filter) = self.filter.as_mut() {
                if !filter(from, to, &mut message) {
                    continue;
                }
            }

            let world = &mut self.worlds[to];
            match &message {
                Outbound::Envelope(envelope) => world.handle_envelope(envelope),
                Outbound::Key(announcement) => world.on_key_announcement(announcement),
                Outbound::Score(entry) => world.on_score_entry(entry),
            }
            self.delivered += 1;
        }
    }
}

impl std::fmt::Debug for LoopbackHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackHub")
            .field("worlds", &self.worlds.len())
            .field("delivered", &self.delivered)
            .finish()
    }
}
