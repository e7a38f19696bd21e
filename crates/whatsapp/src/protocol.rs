//! JSON-lines frames exchanged with the bridge process.
//!
//! Bridge → gateway (stdout), one object per line:
//! - `{"event":"qr","data":"..."}`
//! - `{"event":"authenticated"}`
//! - `{"event":"ready"}`
//! - `{"event":"auth_failure","message":"..."}`
//! - `{"event":"disconnected","reason":"..."}`
//! - `{"id":N,"ok":true}` / `{"id":N,"ok":false,"error":"..."}`
//!
//! Gateway → bridge (stdin): `{"id":N,"method":"...","params":{...}}`.

use {
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

use wagate_channels::EngineEvent;

pub const METHOD_SEND_MESSAGE: &str = "send_message";
pub const METHOD_DESTROY: &str = "destroy";

const KNOWN_EVENTS: &[&str] = &[
    "qr",
    "authenticated",
    "ready",
    "auth_failure",
    "disconnected",
];

#[derive(Debug, Serialize)]
pub struct BridgeRequest<'a> {
    pub id: u64,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BridgeResponse {
    pub id: u64,
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BridgeEvent {
    Qr {
        data: String,
    },
    Authenticated,
    Ready,
    AuthFailure {
        #[serde(default)]
        message: String,
    },
    Disconnected {
        #[serde(default)]
        reason: String,
    },
}

impl From<BridgeEvent> for EngineEvent {
    fn from(event: BridgeEvent) -> Self {
        match event {
            BridgeEvent::Qr { data } => Self::Challenge(data),
            BridgeEvent::Authenticated => Self::Authenticated,
            BridgeEvent::Ready => Self::Ready,
            BridgeEvent::AuthFailure { message } => Self::AuthFailed(message),
            BridgeEvent::Disconnected { reason } => Self::Disconnected(reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BridgeFrame {
    Response(BridgeResponse),
    Event(BridgeEvent),
    /// Valid JSON the gateway does not act on (e.g. loading progress).
    Other(Value),
}

pub fn parse_frame(line: &str) -> serde_json::Result<BridgeFrame> {
    let value: Value = serde_json::from_str(line)?;
    if value.get("id").is_some() {
        return serde_json::from_value(value).map(BridgeFrame::Response);
    }
    match value.get("event").and_then(Value::as_str) {
        Some(name) if KNOWN_EVENTS.contains(&name) => {
            serde_json::from_value(value).map(BridgeFrame::Event)
        },
        _ => Ok(BridgeFrame::Other(value)),
    }
}
