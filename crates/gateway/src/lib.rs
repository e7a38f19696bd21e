//! Gateway: HTTP surface over the session manager.
//!
//! Lifecycle:
//! 1. Load config
//! 2. Build the messaging engine and session manager
//! 3. Serve the session endpoints until a shutdown signal arrives
//! 4. Destroy every remaining session
//!
//! Session semantics live in `wagate-sessions`; this crate only maps HTTP
//! requests onto `SessionManager` calls and errors onto status codes.

pub mod error;
pub mod routes;
pub mod server;
pub mod state;
