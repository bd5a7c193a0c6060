//! World Module
//!
//! The orchestrator. A `World` exclusively owns every piece of peer state
//! (players, keys, clock offsets, open trials, timers, scoreboard) and
//! mutates it synchronously from three entry points: verified inbound
//! envelopes, fired timers and local control input.
//!
//! The world performs no I/O. Everything it wants published is queued as
//! [`Outbound`] and drained by a transport. Envelopes addressed to every
//! peer including the sender are also fed back into the local world before
//! the entry point returns.

pub mod config;
pub mod events;
pub mod player;
pub mod timers;

pub use config::WorldConfig;
pub use events::{EventBus, WorldEvent};
pub use player::{Acceleration, Player, PlayerState, PlayerStateStore};
pub use timers::{Scheduler, Task, Timer, TimerPurpose};

use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::auth::{ClockSync, IdentityRegistry, MessageAuthenticator, SyncStep, Verified};
use crate::clock::{Clock, Millis};
use crate::consensus::{AckOutcome, ActionTrial, TrialCoordinator};
use crate::crypto::{encode_public_key, LocalIdentity};
use crate::protocol::{
    Acknowledgement, Destination, Envelope, KeyAnnouncement, MoveUpdate, Outbound, Payload,
    ScoreAnnouncement, TrialAction, TrialProposal,
};
use crate::scoreboard::{ScoreAttestation, ScoreEntry, ScoreRecord, ScoreStore, WitnessContext};

/// Synthetic local input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlInput {
    MoveLeft,
    MoveRight,
    /// Move key released
    Release,
    /// Push, place a domino or attack depending on speed and position
    Interact,
    Leave,
    /// Input focus lost
    Blur,
}

/// Timers that only make sense while the player is alive
const MOTION_TIMERS: [TimerPurpose; 4] = [
    TimerPurpose::Damping,
    TimerPurpose::Rallentando,
    TimerPurpose::Fall,
    TimerPurpose::AttackStrike,
];

/// One peer's view of the game
pub struct World {
    config: WorldConfig,
    clock: Arc<dyn Clock>,
    local_id: String,
    auth: MessageAuthenticator,
    registry: IdentityRegistry,
    sync: ClockSync,
    players: PlayerStateStore,
    trials: TrialCoordinator,
    scoreboard: ScoreAttestation,
    timers: Scheduler,
    events: EventBus,
    outbox: VecDeque<Outbound>,
    loopback: VecDeque<Envelope>,
    game_ended: bool,
    move_pressed: bool,
    last_move: Option<Millis>,
}

impl World {
    pub fn new(
        identity: LocalIdentity,
        config: WorldConfig,
        clock: Arc<dyn Clock>,
        store: Box<dyn ScoreStore>,
    ) -> Self {
        let local_id = identity.id().to_string();

        let mut registry = IdentityRegistry::new();
        if let Err(e) = registry.register(&local_id, identity.public()) {
            warn!("Could not register own key: {}", e);
        }

        Self {
            clock,
            local_id,
            auth: MessageAuthenticator::new(identity, config.freshness_window_ms),
            registry,
            sync: ClockSync::new(config.sync_rounds),
            players: PlayerStateStore::new(config.velocity_rate),
            trials: TrialCoordinator::new(config.trial_window_ms),
            scoreboard: ScoreAttestation::new(store),
            timers: Scheduler::new(),
            events: EventBus::new(),
            outbox: VecDeque::new(),
            loopback: VecDeque::new(),
            game_ended: false,
            move_pressed: false,
            last_move: None,
            config,
        }
    }

    /// Announce our key and start clock sync with every peer
    pub fn connect(&mut self) {
        self.announce_key();
        let samples = self.sync.start(self.now());
        self.send(Destination::All, Payload::Sync(samples));
    }

    /// Create the local player and announce it
    pub fn begin(&mut self, name: &str) {
        if self.players.contains(&self.local_id) {
            debug!("Local player already exists");
            return;
        }

        let dominoes = self.players.domino_count();
        let slot = if dominoes == 0 { 0 } else { dominoes + 1 };
        let position = slot as f64 * self.config.domino_interval;

        let player = Player::new(name, self.local_id.clone(), position, self.now());
        self.players.insert(player.clone());
        info!("Entered as {} at {:.2}", name, position);

        self.send(Destination::All, Payload::Join(player));
        let id = self.local_id.clone();
        self.emit(WorldEvent::PlayerEnter, &id);
        self.flush_loopback();
    }

    /// Leave the game
    pub fn end(&mut self) {
        self.leave();
        self.flush_loopback();
        if let Err(e) = self.scoreboard.flush() {
            warn!("Failed to flush scoreboard: {}", e);
        }
    }

    /// Process an envelope from the players channel
    pub fn handle_envelope(&mut self, envelope: &Envelope) {
        self.process(envelope);
        self.flush_loopback();
    }

    /// Process a public key from the identity channel
    pub fn on_key_announcement(&mut self, announcement: &KeyAnnouncement) {
        if announcement.user_id == self.local_id {
            return;
        }

        match self.registry.register_announcement(announcement) {
            Ok(true) => {
                // Late joiners never saw our first announcement
                self.announce_key();
                if !self.sync.is_synchronized(&announcement.user_id) {
                    let samples = self.sync.start(self.now());
                    self.send(
                        Destination::Peer(announcement.user_id.clone()),
                        Payload::Sync(samples),
                    );
                }
            }
            Ok(false) => {}
            Err(e) => debug!("Ignored key announcement: {}", e),
        }
        self.flush_loopback();
    }

    /// Process an entry from the scoreboard channel
    pub fn on_score_entry(&mut self, entry: &ScoreEntry) {
        if let Err(e) = self.scoreboard.ingest(entry, &self.registry) {
            warn!("Failed to store score entry: {}", e);
        }
    }

    /// Run every timer that is due
    pub fn poll_timers(&mut self) {
        let now = self.now();
        while let Some(timer) = self.timers.pop_due(now) {
            self.run_task(timer);
        }
        self.flush_loopback();
    }

    /// Earliest pending timer deadline
    pub fn next_deadline(&self) -> Option<Millis> {
        self.timers.next_deadline()
    }

    /// Take everything queued for the transport
    pub fn drain_outbox(&mut self) -> Vec<Outbound> {
        self.outbox.drain(..).collect()
    }

    pub fn control(&mut self, input: ControlInput) {
        let id = self.local_id.clone();
        let Some(me) = self.players.get(&id).cloned() else {
            debug!("Ignoring {:?} before the local player exists", input);
            return;
        };
        let now = self.now();

        match input {
            ControlInput::MoveLeft | ControlInput::MoveRight => {
                if me.state != PlayerState::Normal || self.move_pressed {
                    return;
                }
                let recent = self
                    .last_move
                    .map(|t| now - t < self.config.reaccelerate_window_ms)
                    .unwrap_or(false);
                if recent {
                    self.timers.cancel(&id, TimerPurpose::Rallentando);
                }
                let dv = if input == ControlInput::MoveLeft { -1 } else { 1 };
                self.accelerate(&id, dv, true, false);
                self.move_pressed = true;
            }
            ControlInput::Release => {
                self.rallentate(&id);
                self.last_move = Some(now);
                self.move_pressed = false;
            }
            ControlInput::Blur => {
                self.rallentate(&id);
                self.move_pressed = false;
            }
            ControlInput::Interact => {
                if me.state != PlayerState::Normal {
                    return;
                }
                if me.velocity.saturating_abs() <= self.config.max_push_attempt_velocity {
                    let at_trigger = self.players.push_plausible(
                        &id,
                        self.config.push_trigger_position,
                        self.config.player_width,
                    );
                    if !(at_trigger && self.try_action(&id, TrialAction::Push, now, Vec::new())) {
                        self.call(&id);
                    }
                } else {
                    self.attack(&id);
                }
            }
            ControlInput::Leave => self.leave(),
        }

        self.flush_loopback();
    }

    /// Register a collaborator handler
    pub fn subscribe<F>(&mut self, event: WorldEvent, handler: F)
    where
        F: FnMut(Option<&Player>) + Send + 'static,
    {
        self.events.subscribe(event, handler);
    }

    /// Verify and admit the most recent stored records
    pub fn load_leaderboard(&mut self) {
        if let Err(e) = self
            .scoreboard
            .load_leaderboard(self.config.leaderboard_limit, &self.registry)
        {
            warn!("Failed to load leaderboard: {}", e);
        }
    }

    /// Admitted score records, newest first
    pub fn leaderboard(&self) -> Vec<ScoreRecord> {
        self.scoreboard.leaderboard()
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.get(id)
    }

    pub fn local_player(&self) -> Option<&Player> {
        self.players.get(&self.local_id)
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.iter()
    }

    /// Extrapolated position of a player now
    pub fn position_of(&self, id: &str) -> Option<f64> {
        self.players.position_at(id, self.now())
    }

    pub fn living_count(&self) -> usize {
        self.players.living_count()
    }

    pub fn domino_count(&self) -> u32 {
        self.players.domino_count()
    }

    pub fn game_ended(&self) -> bool {
        self.game_ended
    }

    pub fn is_synchronized(&self, peer_id: &str) -> bool {
        self.sync.is_synchronized(peer_id)
    }

    pub fn clock_offset(&self, peer_id: &str) -> Option<Millis> {
        self.sync.offset(peer_id)
    }

    pub fn knows_key(&self, peer_id: &str) -> bool {
        self.registry.contains(peer_id)
    }

    pub fn open_trial(&self, origin: &str) -> Option<&ActionTrial> {
        self.trials.get(origin)
    }

    fn now(&self) -> Millis {
        self.clock.now_ms()
    }

    fn is_local(&self, id: &str) -> bool {
        id == self.local_id
    }

    fn process(&mut self, envelope: &Envelope) {
        if !envelope.dest_id.accepts(&envelope.sender_id, &self.local_id) {
            return;
        }

        let now = self.now();
        match self.auth.receive(envelope, &self.registry, &self.sync, now) {
            Ok(verified) => self.dispatch(verified),
            Err(e) => debug!("Dropped {} envelope: {}", envelope.action, e),
        }
    }

    fn dispatch(&mut self, verified: Verified) {
        let Verified {
            sender_id, payload, ..
        } = verified;
        debug!("{} from {}", payload.action(), sender_id);

        match payload {
            Payload::Join(player) => self.add_player(&sender_id, player),
            Payload::Sync(samples) => self.synchronize(&sender_id, samples),
            Payload::Move(update) => {
                if self.players.is_alive(&sender_id) {
                    self.update_position(&sender_id, update);
                }
            }
            Payload::Put => {
                if self.players.is_alive(&sender_id) {
                    self.call(&sender_id);
                }
            }
            Payload::Attack(_) => {
                if self.players.is_alive(&sender_id) {
                    self.attack(&sender_id);
                }
            }
            Payload::Proposal(proposal) => {
                self.try_action(&sender_id, proposal.action, proposal.time, proposal.victims);
            }
            Payload::Score(announcement) => self.sign_score(&sender_id, announcement),
            Payload::Exit => self.exit_player(&sender_id),
            Payload::Ack(ack) => self.ack_action(&sender_id, ack),
        }
    }

    fn send(&mut self, dest: Destination, payload: Payload) {
        let now = self.now();
        match self.auth.send(dest.clone(), &payload, now) {
            Ok(envelope) => {
                if dest == Destination::AllWithSelf {
                    self.loopback.push_back(envelope.clone());
                }
                self.outbox.push_back(Outbound::Envelope(envelope));
            }
            Err(e) => warn!("Failed to encode {}: {}", payload.action(), e),
        }
    }

    fn flush_loopback(&mut self) {
        while let Some(envelope) = self.loopback.pop_front() {
            self.process(&envelope);
        }
    }

    fn announce_key(&mut self) {
        let public_key = encode_public_key(&self.auth.identity().public());
        self.outbox.push_back(Outbound::Key(KeyAnnouncement {
            user_id: self.local_id.clone(),
            public_key,
        }));
    }

    fn emit(&mut self, event: WorldEvent, id: &str) {
        self.events.emit(event, self.players.get(id));
    }

    fn add_player(&mut self, sender: &str, player: Player) {
        if self.players.contains(sender) {
            return;
        }
        if player.user_id != sender {
            debug!("JOIN from {} carries player {}", sender, player.user_id);
            return;
        }

        if !self.motion_in_bounds(player.position, player.velocity) {
            debug!("JOIN from {} carries out of range motion", sender);
            return;
        }

        let last_order = self.sync.to_local(sender, player.last_order);
        let player = Player {
            last_order,
            ..player
        };
        info!("Player {} ({}) joined", player.name, sender);
        self.players.insert(player);
        self.emit(WorldEvent::PlayerEnter, sender);
    }

    fn synchronize(&mut self, sender: &str, samples: Vec<Millis>) {
        let now = self.now();
        match self.sync.step(sender, samples, now) {
            SyncStep::Continue { reply } => {
                self.send(Destination::Peer(sender.to_string()), Payload::Sync(reply));
            }
            SyncStep::Committed { reply, offset } => {
                self.auth.rebase(sender, offset);
                if let Some(reply) = reply {
                    self.send(Destination::Peer(sender.to_string()), Payload::Sync(reply));
                }
                // Tell the peer about us now that it can translate our times
                if let Some(me) = self.players.get(&self.local_id).cloned() {
                    self.send(Destination::Peer(sender.to_string()), Payload::Join(me));
                }
            }
            SyncStep::AlreadyCommitted => {}
        }
    }

    fn update_position(&mut self, id: &str, update: MoveUpdate) {
        if !self.motion_in_bounds(update.position, update.velocity) {
            warn!("Dropped out of range MOVE from {}: {:?}", id, update);
            return;
        }

        let local_time = self.sync.to_local(id, update.time);
        let Some(deviation) =
            self.players
                .apply_remote_motion(id, local_time, update.position, update.velocity)
        else {
            return;
        };

        if deviation > self.config.expulsion_border {
            warn!("Player {} desynced by {:.3}, calling for expulsion", id, deviation);
            self.send(
                Destination::AllWithSelf,
                Payload::Ack(Acknowledgement {
                    origin_id: id.to_string(),
                    action: TrialAction::Expelled,
                    ack: true,
                }),
            );
        }
    }

    /// Change a player's velocity and keep the timers that depend on it in step
    fn accelerate(&mut self, id: &str, dv: i32, steady: bool, conserve_sign: bool) {
        let now = self.now();
        let local = self.is_local(id);

        if local {
            self.timers.cancel(id, TimerPurpose::Fall);
        }

        let Some(acc) = self.players.accelerate(id, dv, conserve_sign, now) else {
            return;
        };

        if local && !steady && !acc.clamped {
            let delay = self.config.damping_delay(acc.after.unsigned_abs());
            self.timers
                .schedule(id, Task::Damping { dv: dv.saturating_neg() }, now + delay);
        }

        let Some(player) = self.players.get(id).cloned() else {
            return;
        };

        if local && player.velocity < 0 {
            let distance = self.config.fall_boundary() - player.position;
            let speed = player.velocity as f64 * self.config.velocity_rate;
            let delay = (distance / speed).max(0.0).ceil() as Millis;
            self.timers.schedule(id, Task::Fall, now + delay);
        }

        if local {
            self.send(
                Destination::All,
                Payload::Move(MoveUpdate {
                    time: now,
                    position: player.position,
                    velocity: player.velocity,
                }),
            );
        }
    }

    /// Start decelerating one step per damping delay
    fn rallentate(&mut self, id: &str) {
        let Some(player) = self.players.get(id) else {
            return;
        };
        if player.velocity == 0 {
            return;
        }
        let delay = self.config.damping_delay(player.velocity.unsigned_abs());
        let due = self.now() + delay;
        self.timers.schedule(id, Task::Rallentando, due);
    }

    fn attack(&mut self, id: &str) {
        let Some(velocity) = self.players.get(id).map(|p| p.velocity) else {
            return;
        };
        if velocity.saturating_abs() < self.config.dash_velocity {
            return;
        }

        let now = self.now();
        let local = self.is_local(id);

        if local {
            let boost = velocity.signum().saturating_mul(self.config.attack_boost);
            self.accelerate(id, boost, false, false);
        }
        self.players.set_state(id, PlayerState::Attack);

        if local {
            if let Some(me) = self.players.get(id).cloned() {
                self.send(Destination::All, Payload::Attack(me));
            }
            self.timers
                .schedule(id, Task::AttackStrike, now + self.config.attack_strike_delay_ms);
        }

        self.emit(WorldEvent::PlayerAttack, id);
        self.timers
            .schedule(id, Task::AttackRecover, now + self.config.attack_duration_ms);
    }

    /// Place a domino
    fn call(&mut self, id: &str) {
        let now = self.now();
        let Some(player) = self.players.get(id) else {
            return;
        };
        let pile_end = self.players.domino_count() as f64 * self.config.domino_interval;
        let position = player.position_at(now, self.config.velocity_rate);
        let velocity = player.velocity;

        if velocity.saturating_abs() > self.config.max_call_velocity
            || (position - pile_end).abs() > self.config.call_range
        {
            debug!("Call by {} out of reach", id);
            return;
        }

        if velocity != 0 {
            self.accelerate(id, velocity.saturating_neg(), true, true);
        }

        self.players.set_state(id, PlayerState::Call);
        self.players.add_domino(id);

        if self.is_local(id) {
            self.send(Destination::All, Payload::Put);
        }
        self.emit(WorldEvent::PlayerCall, id);
        self.timers
            .schedule(id, Task::CallRecover, now + self.config.call_duration_ms);
    }

    /// Apply an accepted PUSH: the game ends
    fn push(&mut self, id: &str) {
        let now = self.now();
        let dominoes = self.players.domino_count();

        self.players.set_state(id, PlayerState::Push);
        self.timers
            .schedule(id, Task::Collapse, now + self.config.collapse_duration(dominoes));
        self.players.mark_losers(id);
        self.game_ended = true;

        let Some(name) = self.players.get(id).map(|p| p.name.clone()) else {
            return;
        };
        info!("{} pushed {} dominoes", name, dominoes);

        if self.is_local(id) {
            let record = ScoreRecord {
                name,
                dominoes,
                time: now,
                participants: self.players.living_count(),
            };
            match self.scoreboard.publish(id, record.clone()) {
                Ok(entry) => {
                    let record_id = *entry.record_id();
                    self.outbox.push_back(Outbound::Score(entry));
                    self.send(
                        Destination::AllWithSelf,
                        Payload::Score(ScoreAnnouncement { record_id, record }),
                    );
                }
                Err(e) => warn!("Failed to publish score: {}", e),
            }
        }

        self.emit(WorldEvent::PlayerPush, id);
    }

    fn sign_score(&mut self, publisher: &str, announcement: ScoreAnnouncement) {
        let context = WitnessContext {
            game_ended: self.game_ended,
            publisher_lost: self
                .players
                .get(publisher)
                .map(|p| p.state == PlayerState::Lose)
                .unwrap_or(true),
            dominoes: self.players.domino_count(),
            living: self.players.living_count(),
        };

        match self.scoreboard.witness(
            self.auth.identity(),
            &self.registry,
            publisher,
            announcement.record_id,
            &announcement.record,
            context,
        ) {
            Ok(Some(entry)) => self.outbox.push_back(Outbound::Score(entry)),
            Ok(None) => {}
            Err(e) => warn!("Failed to store witness signature: {}", e),
        }
    }

    fn kill(&mut self, killer: &str, victim: &str) {
        if !self.players.is_alive(victim) {
            return;
        }
        let (Some(vk), Some(vv)) = (
            self.players.get(killer).map(|p| p.velocity),
            self.players.get(victim).map(|p| p.velocity),
        ) else {
            return;
        };

        info!("{} killed {}", killer, victim);
        self.accelerate(victim, vk.saturating_sub(vv), true, false);
        self.accelerate(killer, vk.signum().saturating_sub(vk), true, false);
        self.exit_player(victim);
    }

    /// Mark a player Dead. Idempotent.
    fn exit_player(&mut self, id: &str) {
        if !self.players.mark_dead(id) {
            return;
        }
        for purpose in MOTION_TIMERS {
            self.timers.cancel(id, purpose);
        }
        info!("Player {} exited", id);
        self.emit(WorldEvent::PlayerExit, id);
    }

    fn leave(&mut self) {
        let id = self.local_id.clone();
        if self.players.is_alive(&id) {
            self.exit_player(&id);
            self.send(Destination::All, Payload::Exit);
        }
    }

    /// Endorse (or deny) a contested action proposed by `id` about itself
    fn try_action(&mut self, id: &str, action: TrialAction, time: Millis, victims: Vec<String>) -> bool {
        let now = self.now();
        let local = self.is_local(id);

        if self.trials.is_open(id, now) {
            debug!("Trial for {} still open, ignoring {:?}", id, action);
            return false;
        }

        let trial_time = if local { time } else { self.sync.to_local(id, time) };
        let trial = ActionTrial::new(action, trial_time, victims.clone());

        if !local {
            self.open_trial_at(id, trial.clone(), now);
        }

        if !self.players.is_alive(id) {
            return false;
        }

        if !local && !self.plausible(id, action, &victims, now) {
            debug!("Denying implausible {:?} from {}", action, id);
            self.send(
                Destination::AllWithSelf,
                Payload::Ack(Acknowledgement {
                    origin_id: id.to_string(),
                    action,
                    ack: false,
                }),
            );
            return false;
        }

        if local {
            self.send(
                Destination::All,
                Payload::Proposal(TrialProposal {
                    action,
                    time,
                    victims,
                }),
            );
            self.open_trial_at(id, trial, now);
        }

        self.send(
            Destination::AllWithSelf,
            Payload::Ack(Acknowledgement {
                origin_id: id.to_string(),
                action,
                ack: true,
            }),
        );
        true
    }

    /// Whether a remote player's reported motion is representable
    fn motion_in_bounds(&self, position: f64, velocity: i32) -> bool {
        position.is_finite() && velocity.unsigned_abs() <= self.config.max_velocity.unsigned_abs()
    }

    fn plausible(&self, id: &str, action: TrialAction, victims: &[String], now: Millis) -> bool {
        match action {
            TrialAction::Push => self.players.push_plausible(
                id,
                self.config.push_trigger_position,
                self.config.player_width,
            ),
            TrialAction::Kill => self.players.victims_in_range(
                id,
                victims,
                self.config.attack_range,
                self.config.player_height,
                now,
            ),
            // Proposing one's own expulsion is just leaving
            TrialAction::Expelled => true,
        }
    }

    fn open_trial_at(&mut self, id: &str, trial: ActionTrial, now: Millis) {
        let expiry = trial.time + self.trials.window() + 1;
        if self.trials.open(id, trial, now) {
            self.timers.schedule(id, Task::TrialExpiry, expiry);
        }
    }

    fn ack_action(&mut self, responder: &str, ack: Acknowledgement) {
        let now = self.now();
        let living = self.players.living_count();
        let origin = ack.origin_id;

        match self
            .trials
            .acknowledge(&origin, responder, ack.action, ack.ack, living, now)
        {
            AckOutcome::Accepted(trial) => {
                self.timers.cancel(&origin, TimerPurpose::TrialExpiry);
                self.apply_trial(&origin, trial);
            }
            AckOutcome::Rejected(_) | AckOutcome::Expired(_) => {
                self.timers.cancel(&origin, TimerPurpose::TrialExpiry);
            }
            AckOutcome::Pending { .. } => {
                // Reactively opened expulsion trials need an expiry too
                if !self.timers.is_scheduled(&origin, TimerPurpose::TrialExpiry) {
                    if let Some(trial) = self.trials.get(&origin) {
                        let expiry = trial.time + self.trials.window() + 1;
                        self.timers.schedule(&origin, Task::TrialExpiry, expiry);
                    }
                }
            }
            AckOutcome::Ignored => {}
        }
    }

    fn apply_trial(&mut self, origin: &str, trial: ActionTrial) {
        info!("{:?} by {} accepted", trial.action, origin);
        match trial.action {
            TrialAction::Push => self.push(origin),
            TrialAction::Kill => {
                for victim in &trial.victims {
                    self.kill(origin, victim);
                }
            }
            TrialAction::Expelled => self.exit_player(origin),
        }
    }

    fn run_task(&mut self, timer: Timer) {
        let id = timer.player.as_str();
        let now = self.now();

        if MOTION_TIMERS.contains(&timer.task.purpose()) && !self.players.is_alive(id) {
            return;
        }

        match timer.task {
            Task::Damping { dv } => self.accelerate(id, dv, true, true),
            Task::Rallentando => {
                let Some(velocity) = self.players.get(id).map(|p| p.velocity) else {
                    return;
                };
                self.accelerate(id, -velocity.signum(), true, true);
                self.rallentate(id);
            }
            Task::Fall => {
                info!("{} fell off the bridge", id);
                if self.is_local(id) {
                    self.leave();
                } else {
                    self.exit_player(id);
                }
            }
            Task::AttackStrike => {
                let victims = self.players.find_nearby(
                    id,
                    self.config.attack_range,
                    self.config.player_height,
                    now,
                );
                if !victims.is_empty() {
                    self.try_action(id, TrialAction::Kill, now, victims);
                }
            }
            Task::AttackRecover => {
                self.players
                    .transition(id, PlayerState::Attack, PlayerState::Normal);
            }
            Task::CallRecover => {
                self.players.transition(id, PlayerState::Call, PlayerState::Normal);
            }
            Task::Collapse => {
                self.players.transition(id, PlayerState::Push, PlayerState::Normal);
                info!("Game ended");
                self.events.emit(WorldEvent::GameEnd, None);
            }
            Task::TrialExpiry => {
                self.trials.expire(id, now);
            }
        }
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("local_id", &self.local_id)
            .field("players", &self.players.len())
            .field("game_ended", &self.game_ended)
            .finish()
    }
}
