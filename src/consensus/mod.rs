//! Consensus Module
//!
//! Majority voting over contested actions (PUSH, KILL, EXPELLED). Each
//! peer proposes actions about itself; every peer answers with an
//! acknowledgment or denial, and every peer independently applies the
//! action once a strict majority of the currently living players agreed
//! within the trial window.

mod trial;

pub use trial::{quorum_reached, AckOutcome, ActionTrial, TrialCoordinator};
