//! In-memory engine driven by test code.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicUsize, Ordering},
    },
};

use {
    anyhow::{Result, bail},
    async_trait::async_trait,
    tokio::sync::Semaphore,
};

use crate::engine::{EngineClient, EngineEvent, EventSender, MessagingEngine};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Default)]
struct Script {
    initial_events: Vec<EngineEvent>,
    fail_start: Option<String>,
    fail_send: Option<String>,
    send_gate: Option<Arc<Semaphore>>,
    clients: HashMap<String, Arc<ScriptedClient>>,
    started: usize,
}

/// Engine whose clients emit a fixed list of events on start and then
/// whatever the test pushes through [`ScriptedClient::emit`].
#[derive(Clone, Default)]
pub struct ScriptedEngine {
    script: Arc<Mutex<Script>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events every new client emits right after it is started.
    pub fn with_initial_events(self, events: Vec<EngineEvent>) -> Self {
        lock(&self.script).initial_events = events;
        self
    }

    pub fn failing_start(self, message: &str) -> Self {
        lock(&self.script).fail_start = Some(message.to_string());
        self
    }

    pub fn failing_send(self, message: &str) -> Self {
        lock(&self.script).fail_send = Some(message.to_string());
        self
    }

    /// Every `send_text` waits for one permit from `gate` before delivering.
    pub fn with_send_gate(self, gate: Arc<Semaphore>) -> Self {
        lock(&self.script).send_gate = Some(gate);
        self
    }

    /// Most recent client started for `session_id`.
    pub fn client(&self, session_id: &str) -> Option<Arc<ScriptedClient>> {
        lock(&self.script).clients.get(session_id).cloned()
    }

    /// Number of `start_client` calls that produced a client.
    pub fn started(&self) -> usize {
        lock(&self.script).started
    }
}

#[async_trait]
impl MessagingEngine for ScriptedEngine {
    fn id(&self) -> &str {
        "scripted"
    }

    async fn start_client(
        &self,
        session_id: &str,
        events: EventSender,
    ) -> Result<Arc<dyn EngineClient>> {
        let mut script = lock(&self.script);
        if let Some(message) = &script.fail_start {
            bail!("{message}");
        }
        for event in &script.initial_events {
            events.emit(event.clone());
        }
        let client = Arc::new(ScriptedClient {
            events,
            fail_send: script.fail_send.clone(),
            send_gate: script.send_gate.clone(),
            sends_started: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
            destroyed: AtomicUsize::new(0),
        });
        script
            .clients
            .insert(session_id.to_string(), Arc::clone(&client));
        script.started += 1;
        Ok(client)
    }
}

pub struct ScriptedClient {
    events: EventSender,
    fail_send: Option<String>,
    send_gate: Option<Arc<Semaphore>>,
    sends_started: AtomicUsize,
    sent: Mutex<Vec<(String, String)>>,
    destroyed: AtomicUsize,
}

impl ScriptedClient {
    pub fn emit(&self, event: EngineEvent) -> bool {
        self.events.emit(event)
    }

    /// Messages delivered so far as `(to, text)` pairs.
    pub fn sent(&self) -> Vec<(String, String)> {
        lock(&self.sent).clone()
    }

    /// `send_text` calls entered, including ones still waiting on the gate.
    pub fn sends_started(&self) -> usize {
        self.sends_started.load(Ordering::SeqCst)
    }

    pub fn destroy_count(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineClient for ScriptedClient {
    async fn send_text(&self, to: &str, text: &str) -> Result<()> {
        self.sends_started.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.send_gate {
            gate.acquire().await?.forget();
        }
        if let Some(message) = &self.fail_send {
            bail!("{message}");
        }
        lock(&self.sent).push((to.to_string(), text.to_string()));
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
