//! Session controller: validates identifiers against the registry and
//! drives engine clients through the session state machine.

use std::{sync::Arc, time::Duration};

use {
    futures::future::join_all,
    tracing::{debug, info, warn},
};

use wagate_channels::{
    EngineEvent, EventReceiver, MessagingEngine, event_channel, qualify_recipient,
};

use crate::{
    error::SessionError,
    registry::{
        EventOutcome, PendingSession, RemovedSession, SessionRegistry, SessionSnapshot,
    },
    state::SessionStatus,
};

#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Upper bound on waiting for the first QR challenge.
    pub start_timeout: Duration,
    /// Refuse sends until the session is CONNECTED.
    pub require_connected_for_send: bool,
    /// Appended to bare phone numbers, e.g. "@c.us".
    pub recipient_suffix: String,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            start_timeout: Duration::from_secs(60),
            require_connected_for_send: true,
            recipient_suffix: "@c.us".into(),
        }
    }
}

pub struct SessionManager {
    registry: Arc<SessionRegistry>,
    engine: Arc<dyn MessagingEngine>,
    options: ManagerOptions,
}

impl SessionManager {
    pub fn new(engine: Arc<dyn MessagingEngine>, options: ManagerOptions) -> Self {
        Self::with_registry(Arc::new(SessionRegistry::new()), engine, options)
    }

    pub fn with_registry(
        registry: Arc<SessionRegistry>,
        engine: Arc<dyn MessagingEngine>,
        options: ManagerOptions,
    ) -> Self {
        Self {
            registry,
            engine,
            options,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn engine_id(&self) -> &str {
        self.engine.id()
    }

    /// Create a session and wait for its first QR challenge, returned as the
    /// raw payload.
    ///
    /// Wiring runs on its own task so an abandoned request cannot leave a
    /// half-initialized record behind.
    pub async fn start(&self, id: &str) -> Result<String, SessionError> {
        let pending = self.registry.create(id).await?;
        info!(session = %id, engine = self.engine.id(), "starting session");

        let task = tokio::spawn(wire_session(
            Arc::clone(&self.registry),
            Arc::clone(&self.engine),
            id.to_string(),
            pending,
            self.options.start_timeout,
        ));
        match task.await {
            Ok(result) => result,
            Err(e) => Err(SessionError::Initialization(format!(
                "session start task failed: {e}"
            ))),
        }
    }

    /// Current QR challenge payload.
    pub async fn challenge(&self, id: &str) -> Result<String, SessionError> {
        let snapshot = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        snapshot.challenge.ok_or_else(|| {
            SessionError::Render(format!(
                "no QR code pending for session '{id}' (status: {})",
                snapshot.status
            ))
        })
    }

    pub async fn status(&self, id: &str) -> Result<SessionStatus, SessionError> {
        self.registry
            .get(id)
            .await
            .map(|s| s.status)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    /// Explicit termination: remove the record and destroy its client.
    pub async fn end(&self, id: &str) -> Result<(), SessionError> {
        let removed = self.registry.terminate(id).await?;
        release(removed).await;
        Ok(())
    }

    /// Deliver `body` to `number` through session `id`.
    ///
    /// An in-flight delivery is not cancelled if the session ends meanwhile.
    pub async fn send(&self, id: &str, number: &str, body: &str) -> Result<(), SessionError> {
        let client = self
            .registry
            .sending_client(id, self.options.require_connected_for_send)
            .await?;
        let to = qualify_recipient(number, &self.options.recipient_suffix);
        debug!(session = %id, to = %to, "sending message");
        client.send_text(&to, body).await.map_err(|e| {
            warn!(session = %id, to = %to, error = %e, "message delivery failed");
            SessionError::Delivery(format!("{e:#}"))
        })
    }

    pub async fn list(&self) -> Vec<SessionSnapshot> {
        self.registry.list().await
    }

    /// Tear down every session. Called once on process shutdown.
    pub async fn shutdown(&self) {
        let drained = self.registry.drain().await;
        if drained.is_empty() {
            return;
        }
        info!(count = drained.len(), "destroying sessions");
        join_all(drained.into_iter().map(release)).await;
    }
}

/// Start the engine client, attach it, spawn the event pump and wait for
/// the creation to resolve.
async fn wire_session(
    registry: Arc<SessionRegistry>,
    engine: Arc<dyn MessagingEngine>,
    id: String,
    pending: PendingSession,
    start_timeout: Duration,
) -> Result<String, SessionError> {
    let PendingSession {
        generation,
        resolved,
    } = pending;
    let (events_tx, events_rx) = event_channel();

    let client = match engine.start_client(&id, events_tx).await {
        Ok(client) => client,
        Err(e) => {
            warn!(session = %id, error = %e, "engine failed to start client");
            let err = SessionError::Initialization(format!("{e:#}"));
            registry.remove_generation(&id, generation, err.clone()).await;
            return Err(err);
        },
    };

    if !registry
        .attach_client(&id, generation, Arc::clone(&client))
        .await
    {
        if let Err(e) = client.destroy().await {
            warn!(session = %id, error = %e, "failed to destroy orphaned client");
        }
        return Err(match resolved.await {
            Ok(Err(e)) => e,
            _ => SessionError::Initialization("session was removed during initialization".into()),
        });
    }

    tokio::spawn(drive_events(
        Arc::clone(&registry),
        id.clone(),
        generation,
        events_rx,
    ));

    match tokio::time::timeout(start_timeout, resolved).await {
        Ok(Ok(Ok(challenge))) => {
            info!(session = %id, "session started");
            Ok(challenge)
        },
        Ok(Ok(Err(e))) => {
            warn!(session = %id, error = %e, "session failed to start");
            Err(e)
        },
        Ok(Err(_)) => Err(SessionError::Initialization(
            "session was dropped before a QR code was issued".into(),
        )),
        Err(_) => {
            let err = SessionError::Initialization(format!(
                "no QR code issued within {}s",
                start_timeout.as_secs_f32()
            ));
            warn!(session = %id, "timed out waiting for QR code");
            if let Some(removed) = registry.remove_generation(&id, generation, err.clone()).await {
                release(removed).await;
            }
            Err(err)
        },
    }
}

/// Feed engine events to the state machine until the session ends.
async fn drive_events(
    registry: Arc<SessionRegistry>,
    id: String,
    generation: u64,
    mut events: EventReceiver,
) {
    while let Some(event) = events.recv().await {
        match registry.apply_event(&id, generation, event).await {
            EventOutcome::Applied(_) | EventOutcome::Ignored => {},
            EventOutcome::Stale => return,
            EventOutcome::Terminated(removed) => {
                release(removed).await;
                return;
            },
        }
    }
    let closed = EngineEvent::Disconnected("engine event stream closed".into());
    if let EventOutcome::Terminated(removed) = registry.apply_event(&id, generation, closed).await {
        release(removed).await;
    }
}

async fn release(removed: RemovedSession) {
    let Some(client) = removed.client else {
        return;
    };
    if let Err(e) = client.destroy().await {
        warn!(session = %removed.id, error = %e, "failed to destroy client");
    }
}

#[cfg(test)]
mod tests {
    use wagate_channels::testing::ScriptedEngine;

    use super::*;

    fn manager(engine: &ScriptedEngine) -> SessionManager {
        SessionManager::new(Arc::new(engine.clone()), ManagerOptions {
            start_timeout: Duration::from_millis(200),
            ..ManagerOptions::default()
        })
    }

    fn qr_engine() -> ScriptedEngine {
        ScriptedEngine::new().with_initial_events(vec![EngineEvent::Challenge("QR1".into())])
    }

    async fn wait_for(manager: &SessionManager, id: &str, want: Result<SessionStatus, SessionError>) {
        for _ in 0..200 {
            if manager.status(id).await == want {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("session {id} never reached {want:?}");
    }

    #[tokio::test]
    async fn alice_scans_connects_and_sends() {
        let engine = qr_engine();
        let manager = manager(&engine);

        assert_eq!(manager.start("alice").await, Ok("QR1".into()));
        assert_eq!(manager.status("alice").await, Ok(SessionStatus::AwaitingScan));
        assert_eq!(manager.challenge("alice").await, Ok("QR1".into()));

        let client = engine.client("alice").unwrap();
        client.emit(EngineEvent::Authenticated);
        client.emit(EngineEvent::Ready);
        wait_for(&manager, "alice", Ok(SessionStatus::Connected)).await;

        manager.send("alice", "5511999998888", "hi").await.unwrap();
        assert_eq!(client.sent(), vec![(
            "5511999998888@c.us".to_string(),
            "hi".to_string()
        )]);
    }

    #[tokio::test]
    async fn bob_fails_authentication_before_any_challenge() {
        let engine = ScriptedEngine::new()
            .with_initial_events(vec![EngineEvent::AuthFailed("bad credentials".into())]);
        let manager = manager(&engine);

        assert_eq!(
            manager.start("bob").await,
            Err(SessionError::AuthenticationFailed("bad credentials".into()))
        );
        wait_for(&manager, "bob", Err(SessionError::NotFound("bob".into()))).await;
        // The pump releases the client after removing the record.
        for _ in 0..200 {
            if engine.client("bob").unwrap().destroy_count() == 1 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("client was never destroyed");
    }

    #[tokio::test]
    async fn carol_ends_while_awaiting_scan() {
        let engine = qr_engine();
        let manager = manager(&engine);

        manager.start("carol").await.unwrap();
        manager.end("carol").await.unwrap();

        assert_eq!(
            manager.status("carol").await,
            Err(SessionError::NotFound("carol".into()))
        );
        assert_eq!(engine.client("carol").unwrap().destroy_count(), 1);
        assert_eq!(
            manager.end("carol").await,
            Err(SessionError::NotFound("carol".into()))
        );
    }

    #[tokio::test]
    async fn duplicate_start_is_rejected() {
        let engine = qr_engine();
        let manager = manager(&engine);

        manager.start("alice").await.unwrap();
        assert_eq!(
            manager.start("alice").await,
            Err(SessionError::AlreadyExists("alice".into()))
        );
        assert_eq!(engine.started(), 1);
    }

    #[tokio::test]
    async fn concurrent_starts_create_one_session() {
        let engine = qr_engine();
        let manager = manager(&engine);

        let (a, b) = tokio::join!(manager.start("x"), manager.start("x"));
        let results = [a, b];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.contains(&Err(SessionError::AlreadyExists("x".into()))));
        assert_eq!(engine.started(), 1);
        assert_eq!(manager.list().await.len(), 1);
    }

    #[tokio::test]
    async fn in_flight_send_completes_after_end() {
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        let engine = ScriptedEngine::new()
            .with_initial_events(vec![
                EngineEvent::Challenge("QR1".into()),
                EngineEvent::Authenticated,
                EngineEvent::Ready,
            ])
            .with_send_gate(Arc::clone(&gate));
        let manager = Arc::new(manager(&engine));
        manager.start("alice").await.unwrap();
        wait_for(&manager, "alice", Ok(SessionStatus::Connected)).await;
        let client = engine.client("alice").unwrap();

        let sending = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.send("alice", "1", "hi").await }
        });
        for _ in 0..200 {
            if client.sends_started() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(client.sends_started(), 1);

        manager.end("alice").await.unwrap();
        gate.add_permits(1);

        assert_eq!(sending.await.unwrap(), Ok(()));
        assert_eq!(client.sent(), vec![("1@c.us".to_string(), "hi".to_string())]);
        assert_eq!(client.destroy_count(), 1);
        assert_eq!(
            manager.send("alice", "1", "again").await,
            Err(SessionError::NotFound("alice".into()))
        );
    }

    #[tokio::test]
    async fn absent_sessions_are_not_found() {
        let manager = manager(&qr_engine());
        let missing = Err(SessionError::NotFound("ghost".into()));

        assert_eq!(manager.status("ghost").await, missing);
        assert_eq!(manager.end("ghost").await, Err(SessionError::NotFound("ghost".into())));
        assert_eq!(
            manager.challenge("ghost").await,
            Err(SessionError::NotFound("ghost".into()))
        );
        assert_eq!(
            manager.send("ghost", "1", "hi").await,
            Err(SessionError::NotFound("ghost".into()))
        );
    }

    #[tokio::test]
    async fn second_challenge_only_refreshes() {
        let engine = ScriptedEngine::new().with_initial_events(vec![
            EngineEvent::Challenge("QR1".into()),
            EngineEvent::Challenge("QR2".into()),
        ]);
        let manager = manager(&engine);

        assert_eq!(manager.start("alice").await, Ok("QR1".into()));
        for _ in 0..200 {
            if manager.challenge("alice").await == Ok("QR2".into()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(manager.challenge("alice").await, Ok("QR2".into()));
        assert_eq!(manager.status("alice").await, Ok(SessionStatus::AwaitingScan));
    }

    #[tokio::test]
    async fn authenticated_without_challenge_never_resolves_creation() {
        let engine = ScriptedEngine::new()
            .with_initial_events(vec![EngineEvent::Authenticated, EngineEvent::Ready]);
        let manager = manager(&engine);

        assert!(matches!(
            manager.start("alice").await,
            Err(SessionError::Initialization(_))
        ));
        assert_eq!(
            manager.status("alice").await,
            Err(SessionError::NotFound("alice".into()))
        );
        assert!(manager.registry().is_empty().await);
        assert_eq!(engine.client("alice").unwrap().destroy_count(), 1);
    }

    #[tokio::test]
    async fn start_timeout_cleans_up() {
        let engine = ScriptedEngine::new();
        let manager = manager(&engine);

        assert!(matches!(
            manager.start("slow").await,
            Err(SessionError::Initialization(_))
        ));
        assert_eq!(
            manager.status("slow").await,
            Err(SessionError::NotFound("slow".into()))
        );
        assert_eq!(engine.client("slow").unwrap().destroy_count(), 1);
    }

    #[tokio::test]
    async fn engine_start_failure_leaves_no_record() {
        let engine = ScriptedEngine::new().failing_start("chromium missing");
        let manager = manager(&engine);

        let err = manager.start("alice").await.unwrap_err();
        assert_eq!(err, SessionError::Initialization("chromium missing".into()));
        assert!(manager.registry().is_empty().await);
        // The id is free again.
        assert!(matches!(
            manager.start("alice").await,
            Err(SessionError::Initialization(_))
        ));
    }

    #[tokio::test]
    async fn send_before_connected_is_not_ready() {
        let engine = qr_engine();
        let manager = manager(&engine);
        manager.start("alice").await.unwrap();

        assert_eq!(
            manager.send("alice", "1", "hi").await,
            Err(SessionError::NotReady {
                id: "alice".into(),
                status: SessionStatus::AwaitingScan,
            })
        );
        assert!(engine.client("alice").unwrap().sent().is_empty());
    }

    #[tokio::test]
    async fn lenient_send_delegates_to_engine() {
        let engine = qr_engine();
        let manager = SessionManager::new(Arc::new(engine.clone()), ManagerOptions {
            require_connected_for_send: false,
            recipient_suffix: "@s.whatsapp.net".into(),
            ..ManagerOptions::default()
        });
        manager.start("alice").await.unwrap();

        manager.send("alice", "+1 555", "hi").await.unwrap();
        assert_eq!(engine.client("alice").unwrap().sent()[0].0, "1555@s.whatsapp.net");
    }

    #[tokio::test]
    async fn delivery_failure_is_reported() {
        let engine = ScriptedEngine::new()
            .with_initial_events(vec![
                EngineEvent::Challenge("QR1".into()),
                EngineEvent::Authenticated,
                EngineEvent::Ready,
            ])
            .failing_send("number not on network");
        let manager = manager(&engine);
        manager.start("alice").await.unwrap();
        wait_for(&manager, "alice", Ok(SessionStatus::Connected)).await;

        assert_eq!(
            manager.send("alice", "1", "hi").await,
            Err(SessionError::Delivery("number not on network".into()))
        );
    }

    #[tokio::test]
    async fn disconnect_after_start_removes_record() {
        let engine = qr_engine();
        let manager = manager(&engine);
        manager.start("alice").await.unwrap();

        engine
            .client("alice")
            .unwrap()
            .emit(EngineEvent::Disconnected("logged out".into()));
        wait_for(&manager, "alice", Err(SessionError::NotFound("alice".into()))).await;
    }

    #[tokio::test]
    async fn restarted_session_ignores_old_events() {
        let engine = qr_engine();
        let manager = manager(&engine);
        manager.start("alice").await.unwrap();
        let old_client = engine.client("alice").unwrap();
        manager.end("alice").await.unwrap();

        manager.start("alice").await.unwrap();
        old_client.emit(EngineEvent::Disconnected("late".into()));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(manager.status("alice").await, Ok(SessionStatus::AwaitingScan));
    }

    #[tokio::test]
    async fn shutdown_destroys_every_client() {
        let engine = qr_engine();
        let manager = manager(&engine);
        manager.start("alice").await.unwrap();
        manager.start("bob").await.unwrap();

        manager.shutdown().await;

        assert!(manager.list().await.is_empty());
        assert_eq!(engine.client("alice").unwrap().destroy_count(), 1);
        assert_eq!(engine.client("bob").unwrap().destroy_count(), 1);
    }
}
