//! World configuration
//!
//! Every tunable constant of the motion model, the trial protocol and the
//! authentication layer. Deserializable from JSON; missing fields fall back
//! to the defaults below.

use serde::{Deserialize, Serialize};

use crate::clock::Millis;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Track units per velocity step per millisecond
    pub velocity_rate: f64,
    /// Damping delay indexed by |velocity| (last entry for anything faster)
    pub damping_times_ms: Vec<Millis>,
    /// Lifetime of an action trial
    pub trial_window_ms: Millis,
    /// Oldest accepted envelope age
    pub freshness_window_ms: Millis,
    /// Timestamps exchanged per clock sync
    pub sync_rounds: usize,
    /// Tolerated deviation between a broadcast position and our extrapolation.
    /// Deviations above it raise an expulsion trial.
    pub expulsion_border: f64,
    /// Reach of an attack from the attacker's leading edge
    pub attack_range: f64,
    /// Maximum distance to the pile end for placing a domino
    pub call_range: f64,
    /// Minimum |velocity| to attack
    pub dash_velocity: i32,
    /// Velocity boost applied when attacking
    pub attack_boost: i32,
    pub attack_strike_delay_ms: Millis,
    pub attack_duration_ms: Millis,
    pub call_duration_ms: Millis,
    /// Maximum |velocity| to place a domino
    pub max_call_velocity: i32,
    /// Largest |velocity| a remote update may carry
    pub max_velocity: i32,
    /// Maximum |velocity| at which interacting tries a push instead of an attack
    pub max_push_attempt_velocity: i32,
    /// Where a player must stand still to push the dominoes
    pub push_trigger_position: f64,
    pub player_width: f64,
    pub player_height: f64,
    /// Track length left of the origin before the edge
    pub bridge_left_space: f64,
    pub domino_interval: f64,
    pub domino_width: f64,
    pub domino_height: f64,
    pub collapse_begin_ms: Millis,
    pub collapse_time_ms: Millis,
    /// Re-pressing a direction within this window cancels deceleration
    pub reaccelerate_window_ms: Millis,
    /// Stored records verified at startup
    pub leaderboard_limit: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            velocity_rate: 0.001,
            damping_times_ms: vec![0, 100, 200, 400, 600, 600],
            trial_window_ms: 300,
            freshness_window_ms: 1_000,
            sync_rounds: 8,
            expulsion_border: 0.5,
            attack_range: 0.7,
            call_range: 5.0,
            dash_velocity: 5,
            attack_boost: 3,
            attack_strike_delay_ms: 400,
            attack_duration_ms: 800,
            call_duration_ms: 500,
            max_call_velocity: 3,
            max_velocity: 64,
            max_push_attempt_velocity: 4,
            push_trigger_position: -1.8,
            player_width: 0.4,
            player_height: 3.4,
            bridge_left_space: 3.0,
            domino_interval: 1.2,
            domino_width: 0.5,
            domino_height: 3.0,
            collapse_begin_ms: 300,
            collapse_time_ms: 200,
            reaccelerate_window_ms: 300,
            leaderboard_limit: 5,
        }
    }
}

impl WorldConfig {
    /// Parse from JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Damping delay for a given speed
    pub fn damping_delay(&self, speed: u32) -> Millis {
        if self.damping_times_ms.is_empty() {
            return 0;
        }
        let idx = (speed as usize).min(self.damping_times_ms.len() - 1);
        self.damping_times_ms[idx]
    }

    /// Position at which a player falls off the left end of the track
    pub fn fall_boundary(&self) -> f64 {
        -(self.bridge_left_space + self.player_width / 2.0)
    }

    /// Delay between two neighbouring dominoes toppling
    pub fn collapse_interval_ms(&self) -> f64 {
        let critical_phi = (self.domino_width / self.domino_interval).acos();
        let tilt = ((self.domino_interval - self.domino_width) / self.domino_height).asin();
        tilt / critical_phi * self.collapse_time_ms as f64
    }

    /// Time from an accepted push to the end of the game for `dominoes` pieces
    pub fn collapse_duration(&self, dominoes: u32) -> Millis {
        let total = self.collapse_begin_ms as f64
            + dominoes as f64 * self.collapse_interval_ms()
            + self.collapse_time_ms as f64;
        total.round() as Millis
    }
}
