/// Config schema types (server, sessions, whatsapp bridge).
use std::{collections::HashMap, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WagateConfig {
    pub server: ServerConfig,
    pub sessions: SessionsConfig,
    pub whatsapp: WhatsAppConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 3000,
        }
    }
}

/// Session lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// How long `create-session` waits for the first QR challenge.
    pub start_timeout_secs: u64,

    /// Reject sends with `NotReady` until the session is CONNECTED.
    /// When false, the send is handed to the engine regardless of status.
    pub require_connected_for_send: bool,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            start_timeout_secs: 60,
            require_connected_for_send: true,
        }
    }
}

impl SessionsConfig {
    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }
}

/// WhatsApp engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhatsAppConfig {
    /// Domain suffix appended to bare phone numbers (e.g. "@c.us").
    pub recipient_suffix: String,

    pub bridge: BridgeConfig,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            recipient_suffix: "@c.us".into(),
            bridge: BridgeConfig::default(),
        }
    }
}

/// Sidecar process that owns the actual WhatsApp client, one per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Executable to spawn. Empty means no bridge is configured.
    pub command: String,

    pub args: Vec<String>,

    /// Root directory for per-session credential storage.
    /// Defaults to `~/.wagate/auth`.
    pub auth_dir: Option<PathBuf>,

    /// Timeout for a single request (send, destroy) to the bridge.
    pub request_timeout_secs: u64,

    /// Extra environment passed to the bridge process.
    pub env: HashMap<String, String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            args: Vec::new(),
            auth_dir: None,
            request_timeout_secs: 30,
            env: HashMap::new(),
        }
    }
}

impl BridgeConfig {
    pub fn is_configured(&self) -> bool {
        !self.command.trim().is_empty()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let cfg = WagateConfig::default();
        assert_eq!(cfg.server.port, 3000);
        assert_eq!(cfg.whatsapp.recipient_suffix, "@c.us");
        assert!(cfg.sessions.require_connected_for_send);
        assert!(!cfg.whatsapp.bridge.is_configured());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: WagateConfig = toml::from_str(
            r#"
            [server]
            port = 8080

            [whatsapp.bridge]
            command = "node"
            args = ["bridge.js"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.server.bind, "127.0.0.1");
        assert_eq!(cfg.whatsapp.bridge.args, vec!["bridge.js".to_string()]);
        assert_eq!(cfg.whatsapp.bridge.request_timeout_secs, 30);
        assert_eq!(cfg.sessions.start_timeout(), Duration::from_secs(60));
    }
}
