//! Scheduled tasks
//!
//! Each task occupies one `(player, purpose)` slot. Scheduling into an
//! occupied slot cancels the previous task first, so there is at most one
//! outstanding timer per purpose per player. Due tasks pop in deadline
//! order, ties in scheduling order.

use std::collections::{BTreeMap, HashMap};

use crate::clock::Millis;

/// Slot kind of a scheduled task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerPurpose {
    Damping,
    Rallentando,
    Fall,
    AttackStrike,
    AttackRecover,
    CallRecover,
    Collapse,
    TrialExpiry,
}

/// Work to do when a timer fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// Counter-impulse after a non-steady acceleration
    Damping { dv: i32 },
    /// One deceleration step after a move key is released
    Rallentando,
    /// Predicted fall off the track edge
    Fall,
    /// Attacker looks for victims
    AttackStrike,
    AttackRecover,
    CallRecover,
    /// Dominoes finished falling, the game ends
    Collapse,
    /// Drop a trial that never reached quorum
    TrialExpiry,
}

impl Task {
    pub fn purpose(&self) -> TimerPurpose {
        match self {
            Task::Damping { .. } => TimerPurpose::Damping,
            Task::Rallentando => TimerPurpose::Rallentando,
            Task::Fall => TimerPurpose::Fall,
            Task::AttackStrike => TimerPurpose::AttackStrike,
            Task::AttackRecover => TimerPurpose::AttackRecover,
            Task::CallRecover => TimerPurpose::CallRecover,
            Task::Collapse => TimerPurpose::Collapse,
            Task::TrialExpiry => TimerPurpose::TrialExpiry,
        }
    }
}

/// A fired timer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timer {
    pub player: String,
    pub task: Task,
    pub due: Millis,
}

type Key = (Millis, u64);

/// Deadline-ordered task queue with per-slot cancellation
#[derive(Debug, Default)]
pub struct Scheduler {
    queue: BTreeMap<Key, Timer>,
    slots: HashMap<(String, TimerPurpose), Key>,
    next_seq: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `task` for `player` at `due`, replacing whatever occupied the slot
    pub fn schedule(&mut self, player: &str, task: Task, due: Millis) {
        self.cancel(player, task.purpose());

        let key = (due, self.next_seq);
        self.next_seq += 1;

        self.slots.insert((player.to_string(), task.purpose()), key);
        self.queue.insert(
            key,
            Timer {
                player: player.to_string(),
                task,
                due,
            },
        );
    }

    /// Cancel the task in a slot. Returns whether one was pending.
    pub fn cancel(&mut self, player: &str, purpose: TimerPurpose) -> bool {
        match self.slots.remove(&(player.to_string(), purpose)) {
            Some(key) => self.queue.remove(&key).is_some(),
            None => false,
        }
    }

    pub fn is_scheduled(&self, player: &str, purpose: TimerPurpose) -> bool {
        self.slots.contains_key(&(player.to_string(), purpose))
    }

    /// Remove and return the earliest task due at or before `now`
    pub fn pop_due(&mut self, now: Millis) -> Option<Timer> {
        let (&key, _) = self.queue.iter().next().filter(|((due, _), _)| *due <= now)?;
        let timer = self.queue.remove(&key)?;
        self.slots.remove(&(timer.player.clone(), timer.task.purpose()));
        Some(timer)
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<Millis> {
        self.queue.keys().next().map(|(due, _)| *due)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
