use crate::state::SessionStatus;

/// Failures surfaced by session lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("session '{0}' already exists")]
    AlreadyExists(String),

    #[error("session '{0}' not found")]
    NotFound(String),

    #[error("failed to initialize session: {0}")]
    Initialization(String),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("session '{id}' is not ready (status: {status})")]
    NotReady { id: String, status: SessionStatus },

    #[error("failed to render QR code: {0}")]
    Render(String),

    #[error("failed to deliver message: {0}")]
    Delivery(String),
}

impl SessionError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyExists(_) => "ALREADY_EXISTS",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Initialization(_) => "INITIALIZATION_ERROR",
            Self::AuthenticationFailed(_) => "AUTHENTICATION_FAILED",
            Self::NotReady { .. } => "NOT_READY",
            Self::Render(_) => "RENDER_ERROR",
            Self::Delivery(_) => "DELIVERY_ERROR",
        }
    }
}
