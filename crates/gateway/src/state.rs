use std::{sync::Arc, time::Instant};

use wagate_sessions::SessionManager;

/// Shared gateway runtime state, wrapped in Arc for use across handlers.
pub struct GatewayState {
    pub sessions: Arc<SessionManager>,
    /// Server version string.
    pub version: String,
    pub started_at: Instant,
}

impl GatewayState {
    pub fn new(sessions: Arc<SessionManager>) -> Arc<Self> {
        Arc::new(Self {
            sessions,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Instant::now(),
        })
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
