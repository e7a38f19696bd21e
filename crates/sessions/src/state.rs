//! Session state machine.
//!
//! ```text
//! PENDING ──challenge──▶ AWAITING_SCAN ──authenticated──▶ AUTHENTICATED ──ready──▶ CONNECTED
//!                          │  ▲
//!                          └──┘ challenge (refresh)
//!
//! any non-terminal ──auth_failed──▶ AUTH_FAILED
//! any non-terminal ──disconnected─▶ DISCONNECTED
//! any non-terminal ──end-session──▶ TERMINATED
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use wagate_channels::EngineEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// Client initializing, no challenge yet.
    Pending,
    /// A QR challenge is available for scanning.
    AwaitingScan,
    /// Credentials accepted, link still coming up.
    Authenticated,
    /// Fully operational.
    Connected,
    AuthFailed,
    Disconnected,
    Terminated,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::AwaitingScan => "AWAITING_SCAN",
            Self::Authenticated => "AUTHENTICATED",
            Self::Connected => "CONNECTED",
            Self::AuthFailed => "AUTH_FAILED",
            Self::Disconnected => "DISCONNECTED",
            Self::Terminated => "TERMINATED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::AuthFailed | Self::Disconnected | Self::Terminated)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an engine event does to a session in a given state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Move to a new non-terminal state.
    Enter(SessionStatus),
    /// Replace the stored challenge, stay in AWAITING_SCAN.
    RefreshChallenge,
    /// Move to a terminal state; the record must be removed.
    Terminate(SessionStatus),
    /// Event has no edge from the current state.
    Ignore,
}

/// Decide the transition for `event` in state `status`. Pure.
pub fn transition(status: SessionStatus, event: &EngineEvent) -> Transition {
    use SessionStatus::*;

    if status.is_terminal() {
        return Transition::Ignore;
    }
    match (status, event) {
        (Pending, EngineEvent::Challenge(_)) => Transition::Enter(AwaitingScan),
        (AwaitingScan, EngineEvent::Challenge(_)) => Transition::RefreshChallenge,
        (AwaitingScan, EngineEvent::Authenticated) => Transition::Enter(Authenticated),
        (Authenticated, EngineEvent::Ready) => Transition::Enter(Connected),
        (_, EngineEvent::AuthFailed(_)) => Transition::Terminate(AuthFailed),
        (_, EngineEvent::Disconnected(_)) => Transition::Terminate(Disconnected),
        _ => Transition::Ignore,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn challenge() -> EngineEvent {
        EngineEvent::Challenge("QR".into())
    }

    #[test]
    fn happy_path() {
        use SessionStatus::*;
        assert_eq!(transition(Pending, &challenge()), Transition::Enter(AwaitingScan));
        assert_eq!(
            transition(AwaitingScan, &EngineEvent::Authenticated),
            Transition::Enter(Authenticated)
        );
        assert_eq!(
            transition(Authenticated, &EngineEvent::Ready),
            Transition::Enter(Connected)
        );
    }

    #[test]
    fn second_challenge_refreshes() {
        assert_eq!(
            transition(SessionStatus::AwaitingScan, &challenge()),
            Transition::RefreshChallenge
        );
    }

    #[test]
    fn authenticated_cannot_skip_the_challenge() {
        assert_eq!(
            transition(SessionStatus::Pending, &EngineEvent::Authenticated),
            Transition::Ignore
        );
    }

    #[test]
    fn no_edge_is_skipped() {
        use SessionStatus::*;
        assert_eq!(transition(Pending, &EngineEvent::Ready), Transition::Ignore);
        assert_eq!(transition(AwaitingScan, &EngineEvent::Ready), Transition::Ignore);
        assert_eq!(transition(Authenticated, &challenge()), Transition::Ignore);
        assert_eq!(transition(Connected, &challenge()), Transition::Ignore);
        assert_eq!(
            transition(Connected, &EngineEvent::Authenticated),
            Transition::Ignore
        );
    }

    #[test]
    fn failures_terminate_from_every_live_state() {
        use SessionStatus::*;
        for status in [Pending, AwaitingScan, Authenticated, Connected] {
            assert_eq!(
                transition(status, &EngineEvent::AuthFailed("x".into())),
                Transition::Terminate(AuthFailed)
            );
            assert_eq!(
                transition(status, &EngineEvent::Disconnected("x".into())),
                Transition::Terminate(Disconnected)
            );
        }
    }

    #[test]
    fn terminal_states_ignore_everything() {
        use SessionStatus::*;
        for status in [AuthFailed, Disconnected, Terminated] {
            assert!(status.is_terminal());
            assert_eq!(transition(status, &challenge()), Transition::Ignore);
            assert_eq!(
                transition(status, &EngineEvent::Disconnected("x".into())),
                Transition::Ignore
            );
        }
    }

    #[test]
    fn status_wire_names() {
        assert_eq!(
            serde_json::to_string(&SessionStatus::AwaitingScan).unwrap(),
            r#""AWAITING_SCAN""#
        );
        assert_eq!(SessionStatus::AuthFailed.to_string(), "AUTH_FAILED");
    }
}
