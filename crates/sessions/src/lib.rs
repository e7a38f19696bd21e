//! Session lifecycle: registry, state machine and the controller that ties
//! them to a messaging engine.
//!
//! A session is created PENDING, moves to AWAITING_SCAN when the engine
//! issues its first QR challenge, then AUTHENTICATED and CONNECTED. Auth
//! failure, disconnect and explicit termination remove it from the registry.

pub mod error;
pub mod manager;
pub mod registry;
pub mod state;

pub use {
    error::SessionError,
    manager::{ManagerOptions, SessionManager},
    registry::{EventOutcome, RemovedSession, SessionRegistry, SessionSnapshot},
    state::{SessionStatus, Transition},
};
