//! Player state and the motion model
//!
//! Positions live on a one-dimensional track and are advanced lazily: the
//! stored `(position, velocity, last_order)` triple stands for the line
//! `position + velocity * rate * (t - last_order)`. Every change of velocity
//! first folds the elapsed part of that line into `position`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::clock::Millis;

/// Lifecycle and action state of a player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerState {
    Normal,
    Attack,
    Call,
    /// Terminal
    Dead,
    Push,
    Lose,
}

impl PlayerState {
    pub fn is_alive(&self) -> bool {
        !matches!(self, PlayerState::Dead)
    }
}

/// One participant as seen locally
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub name: String,
    pub user_id: String,
    /// Local time the current velocity took effect
    pub last_order: Millis,
    pub position: f64,
    /// Signed velocity in steps
    pub velocity: i32,
    pub state: PlayerState,
    /// Dominoes placed by this player
    pub dominoes: u32,
}

impl Player {
    pub fn new(name: impl Into<String>, user_id: impl Into<String>, position: f64, now: Millis) -> Self {
        Self {
            name: name.into(),
            user_id: user_id.into(),
            last_order: now,
            position,
            velocity: 0,
            state: PlayerState::Normal,
            dominoes: 0,
        }
    }

    /// Position at local time `now` under the current velocity
    pub fn position_at(&self, now: Millis, rate: f64) -> f64 {
        self.position + self.velocity as f64 * rate * (now - self.last_order) as f64
    }
}

/// Result of a velocity change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acceleration {
    pub after: i32,
    /// Damping would have crossed zero and was clamped to a stop
    pub clamped: bool,
}

/// All known players keyed by peer id. Players are never removed; leaving
/// marks them Dead.
#[derive(Debug)]
pub struct PlayerStateStore {
    players: BTreeMap<String, Player>,
    velocity_rate: f64,
}

impl PlayerStateStore {
    pub fn new(velocity_rate: f64) -> Self {
        Self {
            players: BTreeMap::new(),
            velocity_rate,
        }
    }

    /// Insert a player; returns false if the id is already known
    pub fn insert(&mut self, player: Player) -> bool {
        if self.players.contains_key(&player.user_id) {
            return false;
        }
        self.players.insert(player.user_id.clone(), player);
        true
    }

    pub fn get(&self, id: &str) -> Option<&Player> {
        self.players.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.players.contains_key(id)
    }

    pub fn is_alive(&self, id: &str) -> bool {
        self.players.get(id).map(|p| p.state.is_alive()).unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Players not yet Dead
    pub fn living_count(&self) -> usize {
        self.players.values().filter(|p| p.state.is_alive()).count()
    }

    /// Dominoes placed by everybody
    pub fn domino_count(&self) -> u32 {
        self.players.values().map(|p| p.dominoes).sum()
    }

    /// Extrapolated position of a player at `now`
    pub fn position_at(&self, id: &str, now: Millis) -> Option<f64> {
        self.players.get(id).map(|p| p.position_at(now, self.velocity_rate))
    }

    /// Fold elapsed motion into the position and apply `dv`.
    ///
    /// With `conserve_sign` the change is a damping step: it is skipped for a
    /// stopped player and a result that reaches or crosses zero becomes a
    /// full stop.
    pub fn accelerate(
        &mut self,
        id: &str,
        dv: i32,
        conserve_sign: bool,
        now: Millis,
    ) -> Option<Acceleration> {
        let rate = self.velocity_rate;
        let player = self.players.get_mut(id)?;

        if conserve_sign && player.velocity == 0 {
            return None;
        }

        let before = player.velocity;
        player.position = player.position_at(now, rate);
        player.velocity = player.velocity.saturating_add(dv);
        player.last_order = now;

        let mut clamped = false;
        if conserve_sign && (player.velocity == 0 || before.signum() != player.velocity.signum()) {
            player.velocity = 0;
            clamped = true;
        }

        Some(Acceleration {
            after: player.velocity,
            clamped,
        })
    }

    /// Adopt an authoritative motion update and return how far it was from
    /// the local extrapolation at `local_time`
    pub fn apply_remote_motion(
        &mut self,
        id: &str,
        local_time: Millis,
        position: f64,
        velocity: i32,
    ) -> Option<f64> {
        let rate = self.velocity_rate;
        let player = self.players.get_mut(id)?;

        let expected = player.position_at(local_time, rate);
        let deviation = (position - expected).abs();

        player.last_order = local_time;
        player.position = position;
        player.velocity = velocity;

        Some(deviation)
    }

    pub fn set_state(&mut self, id: &str, state: PlayerState) {
        if let Some(p) = self.players.get_mut(id) {
            p.state = state;
        }
    }

    /// Set `id` to `state` only if it is currently `from`
    pub fn transition(&mut self, id: &str, from: PlayerState, to: PlayerState) -> bool {
        match self.players.get_mut(id) {
            Some(p) if p.state == from => {
                p.state = to;
                true
            }
            _ => false,
        }
    }

    /// Mark a player Dead. Returns false if unknown or already dead.
    pub fn mark_dead(&mut self, id: &str) -> bool {
        match self.players.get_mut(id) {
            Some(p) if p.state.is_alive() => {
                p.state = PlayerState::Dead;
                true
            }
            _ => false,
        }
    }

    /// Every living player other than `except` becomes Lose
    pub fn mark_losers(&mut self, except: &str) {
        for (id, p) in self.players.iter_mut() {
            if id != except && p.state.is_alive() {
                p.state = PlayerState::Lose;
            }
        }
    }

    pub fn add_domino(&mut self, id: &str) {
        if let Some(p) = self.players.get_mut(id) {
            p.dominoes += 1;
        }
    }

    /// Leading edge of an attacker: half a body ahead in its direction of travel
    fn strike_point(&self, id: &str, now: Millis, player_height: f64) -> Option<f64> {
        let p = self.players.get(id)?;
        Some(p.position_at(now, self.velocity_rate) + p.velocity.signum() as f64 * player_height / 2.0)
    }

    /// Living players within `range` of the attacker's strike point
    pub fn find_nearby(&self, id: &str, range: f64, player_height: f64, now: Millis) -> Vec<String> {
        let Some(strike) = self.strike_point(id, now, player_height) else {
            return Vec::new();
        };

        self.players
            .iter()
            .filter(|(key, p)| key.as_str() != id && p.state.is_alive())
            .filter(|(_, p)| (strike - p.position_at(now, self.velocity_rate)).abs() < range)
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Whether every claimed victim is within `range` of the attacker's
    /// strike point. Victims already dead are ignored; unknown ones fail.
    pub fn victims_in_range(
        &self,
        id: &str,
        victims: &[String],
        range: f64,
        player_height: f64,
        now: Millis,
    ) -> bool {
        let Some(strike) = self.strike_point(id, now, player_height) else {
            return false;
        };
        if victims.is_empty() {
            return false;
        }

        victims.iter().all(|victim| match self.players.get(victim) {
            None => false,
            Some(_) if victim == id => false,
            Some(p) if !p.state.is_alive() => true,
            Some(p) => (strike - p.position_at(now, self.velocity_rate)).abs() < range,
        })
    }

    /// Whether `id` stands still in Normal state at the push trigger
    pub fn push_plausible(&self, id: &str, trigger: f64, player_width: f64) -> bool {
        match self.players.get(id) {
            Some(p) => {
                p.state == PlayerState::Normal
                    && p.velocity == 0
                    && (p.position - trigger).abs() <= player_width / 2.0
            }
            None => false,
        }
    }
}
