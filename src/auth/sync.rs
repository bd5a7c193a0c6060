//! Clock Synchronization
//!
//! Two peers bounce a growing list of timestamps back and forth, each side
//! appending its local send time. Once the list reaches the configured
//! number of rounds, every consecutive triple `(t[i], t[i+1], t[i+2])`
//! gives one estimate of the other clock's offset: the middle stamp against
//! the midpoint of its neighbours. Signs alternate with the round parity so
//! the estimate always reads remote-minus-local, and the median of the
//! estimates is committed. A committed offset is never recomputed.

use std::collections::HashMap;
use tracing::{debug, info};

use crate::clock::Millis;

/// What to do after one exchange step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStep {
    /// Exchange still running, send `reply` back
    Continue { reply: Vec<Millis> },
    /// Offset committed for the peer
    Committed {
        /// Final samples to send back, if the other side still needs them
        reply: Option<Vec<Millis>>,
        offset: Millis,
    },
    /// Offset was already committed, nothing to do
    AlreadyCommitted,
}

/// Per-peer clock offsets (remote minus local)
#[derive(Debug)]
pub struct ClockSync {
    rounds: usize,
    offsets: HashMap<String, Millis>,
}

impl ClockSync {
    pub fn new(rounds: usize) -> Self {
        Self {
            rounds: rounds.max(3),
            offsets: HashMap::new(),
        }
    }

    /// Samples that open an exchange
    pub fn start(&self, now: Millis) -> Vec<Millis> {
        vec![now]
    }

    /// Process samples received from `peer_id`
    pub fn step(&mut self, peer_id: &str, mut samples: Vec<Millis>, now: Millis) -> SyncStep {
        if self.offsets.contains_key(peer_id) {
            debug!("Ignoring sync from {}: offset already committed", peer_id);
            return SyncStep::AlreadyCommitted;
        }

        let n = samples.len();
        samples.push(now);

        if n + 1 < self.rounds {
            return SyncStep::Continue { reply: samples };
        }

        let reply = if n < self.rounds {
            Some(samples.clone())
        } else {
            None
        };

        let offset = match estimate_offset(&samples) {
            Some(offset) => offset,
            None => return SyncStep::Continue { reply: samples },
        };

        self.offsets.insert(peer_id.to_string(), offset);
        info!("Clock offset for {}: {} ms", peer_id, offset);

        SyncStep::Committed { reply, offset }
    }

    /// Committed offset for a peer
    pub fn offset(&self, peer_id: &str) -> Option<Millis> {
        self.offsets.get(peer_id).copied()
    }

    pub fn is_synchronized(&self, peer_id: &str) -> bool {
        self.offsets.contains_key(peer_id)
    }

    /// Translate a timestamp from `peer_id`'s clock into local time.
    /// Unsynchronized peers are taken at face value.
    pub fn to_local(&self, peer_id: &str, remote_time: Millis) -> Millis {
        remote_time.saturating_sub(self.offset(peer_id).unwrap_or(0))
    }
}

/// Median offset estimate from an alternating sample list.
///
/// The last sample is always local, so local samples sit at indices with
/// the parity of `len - 1`.
pub fn estimate_offset(samples: &[Millis]) -> Option<Millis> {
    if samples.len() < 3 {
        return None;
    }

    let local_parity = (samples.len() - 1) % 2;
    let mut estimates: Vec<f64> = samples
        .windows(3)
        .enumerate()
        .map(|(i, w)| {
            let middle = w[1] as f64;
            let midpoint = (w[0] as f64 + w[2] as f64) / 2.0;
            if (i + 1) % 2 == local_parity {
                midpoint - middle
            } else {
                middle - midpoint
            }
        })
        .collect();

    estimates.sort_by(|a, b| a.total_cmp(b));
    Some(estimates[estimates.len() / 2].round() as Millis)
}
