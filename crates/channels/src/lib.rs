//! Messaging engine seam.
//!
//! The gateway never speaks the messaging network's protocol itself. An
//! engine (see `wagate-whatsapp`) implements [`MessagingEngine`] to bring up
//! one client per session, reports lifecycle changes as [`EngineEvent`]s and
//! exposes outbound delivery through [`EngineClient`].

pub mod address;
pub mod engine;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use {
    address::qualify_recipient,
    engine::{EngineClient, EngineEvent, EventReceiver, EventSender, MessagingEngine, event_channel},
};
