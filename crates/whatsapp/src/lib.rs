//! WhatsApp engine backed by a sidecar bridge process.
//!
//! Each session runs its own bridge (for example a small Node script around
//! a WhatsApp Web client). The bridge reports lifecycle events and answers
//! requests as JSON lines over stdio; see [`protocol`] for the frames.

pub mod bridge;
pub mod protocol;

pub use bridge::{BridgeClient, BridgeEngine};
