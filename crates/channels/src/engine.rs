use std::sync::Arc;

use {anyhow::Result, async_trait::async_trait, tokio::sync::mpsc};

/// Lifecycle notification emitted by an engine client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A fresh authentication challenge (QR payload) is available.
    Challenge(String),
    /// Credentials were accepted; the link is still coming up.
    Authenticated,
    /// The link is fully operational.
    Ready,
    /// Credentials were rejected.
    AuthFailed(String),
    /// The link was lost.
    Disconnected(String),
}

impl EngineEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Challenge(_) => "challenge",
            Self::Authenticated => "authenticated",
            Self::Ready => "ready",
            Self::AuthFailed(_) => "auth_failed",
            Self::Disconnected(_) => "disconnected",
        }
    }
}

/// Sending half handed to the engine when a client is started.
///
/// Events are delivered to the session in the order they are emitted.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl EventSender {
    /// Returns false once the session stopped listening.
    pub fn emit(&self, event: EngineEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

pub type EventReceiver = mpsc::UnboundedReceiver<EngineEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, rx)
}

/// Factory for per-session clients.
#[async_trait]
pub trait MessagingEngine: Send + Sync {
    /// Engine identifier (e.g. "whatsapp-bridge").
    fn id(&self) -> &str;

    /// Bring up a client for `session_id`.
    ///
    /// The returned client reports its lifecycle through `events`. Returning
    /// an error means no client exists and nothing needs to be released.
    async fn start_client(
        &self,
        session_id: &str,
        events: EventSender,
    ) -> Result<Arc<dyn EngineClient>>;
}

/// One live session on the messaging network.
#[async_trait]
pub trait EngineClient: Send + Sync {
    /// Deliver a text message to a fully qualified recipient address.
    async fn send_text(&self, to: &str, text: &str) -> Result<()>;

    /// Tear the client down and release its resources.
    async fn destroy(&self) -> Result<()>;
}
