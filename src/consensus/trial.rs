//! Action Trials
//!
//! Quorum bookkeeping for contested actions. A trial is keyed by the peer
//! it is about and lives for a fixed window from its proposal time. Every
//! acknowledgment counts toward `ack`, every denial (or an ack for a
//! different action) toward `deny`. The trial is decided as soon as either
//! count exceeds half of the living players at that moment. Each responder
//! is counted once per trial.

use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::clock::Millis;
use crate::protocol::TrialAction;

/// One open trial
#[derive(Debug, Clone, PartialEq)]
pub struct ActionTrial {
    pub action: TrialAction,
    /// Proposal time in local time
    pub time: Millis,
    pub ack_count: usize,
    pub deny_count: usize,
    /// Claimed victims for KILL
    pub victims: Vec<String>,
    responders: HashSet<String>,
}

impl ActionTrial {
    pub fn new(action: TrialAction, time: Millis, victims: Vec<String>) -> Self {
        Self {
            action,
            time,
            ack_count: 0,
            deny_count: 0,
            victims,
            responders: HashSet::new(),
        }
    }
}

/// Result of counting one acknowledgment
#[derive(Debug, Clone, PartialEq)]
pub enum AckOutcome {
    /// No trial open for that peer
    Ignored,
    /// Trial outlived its window and was dropped
    Expired(ActionTrial),
    /// Still undecided
    Pending { ack_count: usize, deny_count: usize },
    /// Quorum acknowledged, apply the action
    Accepted(ActionTrial),
    /// Quorum denied
    Rejected(ActionTrial),
}

/// Strict majority of the living players
pub fn quorum_reached(count: usize, living: usize) -> bool {
    count * 2 > living
}

/// Open trials, at most one per peer
#[derive(Debug)]
pub struct TrialCoordinator {
    window: Millis,
    trials: HashMap<String, ActionTrial>,
}

impl TrialCoordinator {
    pub fn new(window: Millis) -> Self {
        Self {
            window,
            trials: HashMap::new(),
        }
    }

    pub fn window(&self) -> Millis {
        self.window
    }

    /// Whether a trial about `origin` is open and still within its window
    pub fn is_open(&self, origin: &str, now: Millis) -> bool {
        self.trials
            .get(origin)
            .map(|t| now - t.time < self.window)
            .unwrap_or(false)
    }

    /// Record a trial about `origin`. Refused while another one is open.
    pub fn open(&mut self, origin: &str, trial: ActionTrial, now: Millis) -> bool {
        if self.is_open(origin, now) {
            debug!("Trial for {} already open", origin);
            return false;
        }
        debug!("Trial opened for {}: {:?}", origin, trial.action);
        self.trials.insert(origin.to_string(), trial);
        true
    }

    /// Count an acknowledgment (or denial) from some responder
    pub fn acknowledge(
        &mut self,
        origin: &str,
        responder: &str,
        action: TrialAction,
        ack: bool,
        living: usize,
        now: Millis,
    ) -> AckOutcome {
        if !self.trials.contains_key(origin) {
            // An accusation may come from any peer, so the first one seen
            // opens the trial here
            if action != TrialAction::Expelled {
                return AckOutcome::Ignored;
            }
            self.trials
                .insert(origin.to_string(), ActionTrial::new(action, now, Vec::new()));
        }

        let Some(trial) = self.trials.get_mut(origin) else {
            return AckOutcome::Ignored;
        };

        if now > trial.time + self.window {
            info!("Trial time over for {}: {:?}", origin, trial.action);
            return self
                .trials
                .remove(origin)
                .map(AckOutcome::Expired)
                .unwrap_or(AckOutcome::Ignored);
        }

        if !trial.responders.insert(responder.to_string()) {
            debug!("Duplicate answer from {} on trial for {}", responder, origin);
            return AckOutcome::Pending {
                ack_count: trial.ack_count,
                deny_count: trial.deny_count,
            };
        }

        if ack && action == trial.action {
            trial.ack_count += 1;
        } else {
            trial.deny_count += 1;
        }

        let (ack_count, deny_count) = (trial.ack_count, trial.deny_count);

        if quorum_reached(ack_count, living) {
            info!("Trial accepted for {} ({} of {} living)", origin, ack_count, living);
            self.trials
                .remove(origin)
                .map(AckOutcome::Accepted)
                .unwrap_or(AckOutcome::Ignored)
        } else if quorum_reached(deny_count, living) {
            info!("Trial rejected for {} ({} of {} living)", origin, deny_count, living);
            self.trials
                .remove(origin)
                .map(AckOutcome::Rejected)
                .unwrap_or(AckOutcome::Ignored)
        } else {
            AckOutcome::Pending {
                ack_count,
                deny_count,
            }
        }
    }

    /// Drop the trial about `origin` if its window has passed
    pub fn expire(&mut self, origin: &str, now: Millis) -> Option<ActionTrial> {
        let expired = self
            .trials
            .get(origin)
            .map(|t| now > t.time + self.window)
            .unwrap_or(false);
        if expired {
            debug!("Trial for {} expired", origin);
            self.trials.remove(origin)
        } else {
            None
        }
    }

    pub fn get(&self, origin: &str) -> Option<&ActionTrial> {
        self.trials.get(origin)
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }
}
