//! Authentication Module
//!
//! Everything between the raw transport and the game logic: who holds
//! which key, how far each peer's clock is from ours, and whether an
//! envelope is genuine, fresh and not replayed.

mod authenticator;
mod registry;
mod sync;

pub use authenticator::{AuthError, MessageAuthenticator, Verified};
pub use registry::{IdentityRegistry, RegistryError};
pub use sync::{estimate_offset, ClockSync, SyncStep};
