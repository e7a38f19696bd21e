//! Process-wide map of live sessions.
//!
//! Every read-modify-write runs inside one lock scope and never awaits the
//! engine while holding the lock. Records carry a generation number so that
//! events from a terminated session can never touch a newer record that
//! reuses the same id.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};

use {
    tokio::sync::{RwLock, oneshot},
    tracing::{debug, info},
};

use wagate_channels::{EngineClient, EngineEvent};

use crate::{
    error::SessionError,
    state::{SessionStatus, Transition, transition},
};

/// Resolves `create-session` with the first QR challenge payload.
type Completion = oneshot::Sender<Result<String, SessionError>>;

struct SessionRecord {
    generation: u64,
    status: SessionStatus,
    client: Option<Arc<dyn EngineClient>>,
    pending_challenge: Option<String>,
    created_at_ms: u64,
    /// Resolve-once signal for the caller waiting in `create-session`.
    creation: Option<Completion>,
}

impl SessionRecord {
    /// Fulfil the pending creation. Only the first call has any effect.
    fn resolve(&mut self, result: Result<String, SessionError>) -> bool {
        match self.creation.take() {
            Some(tx) => {
                let _ = tx.send(result);
                true
            },
            None => false,
        }
    }

    fn snapshot(&self, id: &str) -> SessionSnapshot {
        SessionSnapshot {
            id: id.to_string(),
            status: self.status,
            challenge: self.pending_challenge.clone(),
            created_at_ms: self.created_at_ms,
        }
    }
}

/// Read-only view of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub id: String,
    pub status: SessionStatus,
    pub challenge: Option<String>,
    pub created_at_ms: u64,
}

/// A freshly created record waiting to be wired to an engine client.
pub struct PendingSession {
    pub generation: u64,
    pub resolved: oneshot::Receiver<Result<String, SessionError>>,
}

/// A record taken out of the registry. The caller owns `client` and is
/// responsible for destroying it.
pub struct RemovedSession {
    pub id: String,
    pub status: SessionStatus,
    pub client: Option<Arc<dyn EngineClient>>,
}

/// Result of feeding one engine event to the state machine.
pub enum EventOutcome {
    Applied(SessionStatus),
    Ignored,
    /// The record the event was meant for no longer exists.
    Stale,
    Terminated(RemovedSession),
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionRecord>>,
    next_generation: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a PENDING record for `id`.
    pub async fn create(&self, id: &str) -> Result<PendingSession, SessionError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(id) {
            return Err(SessionError::AlreadyExists(id.to_string()));
        }
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = oneshot::channel();
        sessions.insert(id.to_string(), SessionRecord {
            generation,
            status: SessionStatus::Pending,
            client: None,
            pending_challenge: None,
            created_at_ms: now_ms(),
            creation: Some(tx),
        });
        debug!(session = %id, generation, "session record created");
        Ok(PendingSession {
            generation,
            resolved: rx,
        })
    }

    pub async fn get(&self, id: &str) -> Option<SessionSnapshot> {
        self.sessions.read().await.get(id).map(|r| r.snapshot(id))
    }

    /// Snapshot of every live session, ordered by id. Each call re-reads
    /// the registry.
    pub async fn list(&self) -> Vec<SessionSnapshot> {
        let mut all: Vec<_> = self
            .sessions
            .read()
            .await
            .iter()
            .map(|(id, r)| r.snapshot(id))
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Remove `id` only if it is still the record created as `generation`.
    pub async fn remove_generation(
        &self,
        id: &str,
        generation: u64,
        reason: SessionError,
    ) -> Option<RemovedSession> {
        let mut sessions = self.sessions.write().await;
        if sessions.get(id).map(|r| r.generation) != Some(generation) {
            return None;
        }
        let mut record = sessions.remove(id)?;
        drop(sessions);
        record.resolve(Err(reason));
        Some(RemovedSession {
            id: id.to_string(),
            status: record.status,
            client: record.client.take(),
        })
    }

    /// Remove `id` if present; a no-op otherwise. A waiting `create-session`
    /// fails.
    pub async fn remove(&self, id: &str) -> Option<RemovedSession> {
        let mut record = self.sessions.write().await.remove(id)?;
        record.resolve(Err(SessionError::Initialization(
            "session was ended before a QR code was issued".into(),
        )));
        Some(RemovedSession {
            id: id.to_string(),
            status: record.status,
            client: record.client.take(),
        })
    }

    /// Explicit termination requested by a caller.
    pub async fn terminate(&self, id: &str) -> Result<RemovedSession, SessionError> {
        let removed = self
            .remove(id)
            .await
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        info!(session = %id, from = %removed.status, to = SessionStatus::Terminated.as_str(), "session terminated");
        Ok(RemovedSession {
            status: SessionStatus::Terminated,
            ..removed
        })
    }

    /// Install the engine client. Returns false if the record is gone (or
    /// was replaced); the client is then dropped here and the caller must
    /// destroy its own handle.
    pub async fn attach_client(
        &self,
        id: &str,
        generation: u64,
        client: Arc<dyn EngineClient>,
    ) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(id) {
            Some(record) if record.generation == generation => {
                record.client = Some(client);
                true
            },
            _ => false,
        }
    }

    /// Run one state-machine step for the record `(id, generation)`.
    pub async fn apply_event(&self, id: &str, generation: u64, event: EngineEvent) -> EventOutcome {
        let mut sessions = self.sessions.write().await;
        let Some(record) = sessions.get_mut(id).filter(|r| r.generation == generation) else {
            debug!(session = %id, generation, event = event.kind(), "dropping event for stale session");
            return EventOutcome::Stale;
        };

        let from = record.status;
        match transition(from, &event) {
            Transition::Ignore => {
                debug!(session = %id, status = %from, event = event.kind(), "event has no transition");
                EventOutcome::Ignored
            },
            Transition::RefreshChallenge => {
                if let EngineEvent::Challenge(payload) = event {
                    record.pending_challenge = Some(payload);
                }
                debug!(session = %id, "QR challenge refreshed");
                EventOutcome::Applied(from)
            },
            Transition::Enter(to) => {
                record.status = to;
                match (to, event) {
                    (SessionStatus::AwaitingScan, EngineEvent::Challenge(payload)) => {
                        record.pending_challenge = Some(payload.clone());
                        record.resolve(Ok(payload));
                    },
                    (SessionStatus::Authenticated, _) => record.pending_challenge = None,
                    _ => {},
                }
                info!(session = %id, from = %from, to = %to, "session state changed");
                EventOutcome::Applied(to)
            },
            Transition::Terminate(to) => {
                let Some(mut record) = sessions.remove(id) else {
                    return EventOutcome::Stale;
                };
                drop(sessions);
                let failure = match event {
                    EngineEvent::AuthFailed(message) => SessionError::AuthenticationFailed(
                        if message.is_empty() {
                            "credentials rejected by the engine".into()
                        } else {
                            message
                        },
                    ),
                    EngineEvent::Disconnected(reason) => SessionError::Initialization(format!(
                        "disconnected before a QR code was issued: {reason}"
                    )),
                    other => SessionError::Initialization(format!(
                        "unexpected {} event",
                        other.kind()
                    )),
                };
                record.resolve(Err(failure));
                info!(session = %id, from = %from, to = %to, "session ended by engine");
                EventOutcome::Terminated(RemovedSession {
                    id: id.to_string(),
                    status: to,
                    client: record.client.take(),
                })
            },
        }
    }

    /// Client to deliver through, validated against the session status.
    pub async fn sending_client(
        &self,
        id: &str,
        require_connected: bool,
    ) -> Result<Arc<dyn EngineClient>, SessionError> {
        let sessions = self.sessions.read().await;
        let record = sessions
            .get(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        let not_ready = || SessionError::NotReady {
            id: id.to_string(),
            status: record.status,
        };
        if require_connected && record.status != SessionStatus::Connected {
            return Err(not_ready());
        }
        record.client.clone().ok_or_else(not_ready)
    }

    /// Empty the registry, handing every record back for teardown.
    pub async fn drain(&self) -> Vec<RemovedSession> {
        let drained: Vec<_> = self.sessions.write().await.drain().collect();
        drained
            .into_iter()
            .map(|(id, mut record)| {
                record.resolve(Err(SessionError::Initialization(
                    "gateway is shutting down".into(),
                )));
                RemovedSession {
                    id,
                    status: record.status,
                    client: record.client.take(),
                }
            })
            .collect()
    }
}
