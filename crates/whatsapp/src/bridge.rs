//! Bridge process management: spawn one sidecar per session and talk to it
//! over stdin/stdout.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    process::Stdio,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    anyhow::{Context, Result, bail},
    async_trait::async_trait,
    tokio::{
        io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
        process::{Child, ChildStdin, ChildStdout, Command},
        sync::{Mutex, oneshot},
        task::JoinHandle,
    },
    tracing::{debug, info, trace, warn},
};

use {
    wagate_channels::{EngineClient, EventSender, MessagingEngine},
    wagate_config::BridgeConfig,
};

use crate::protocol::{
    BridgeFrame, BridgeRequest, BridgeResponse, METHOD_DESTROY, METHOD_SEND_MESSAGE, parse_frame,
};

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<BridgeResponse>>>>;

/// How long `destroy` waits for the bridge to acknowledge before killing it.
const DESTROY_TIMEOUT: Duration = Duration::from_secs(3);

/// Engine that spawns the configured bridge command for every session.
pub struct BridgeEngine {
    config: BridgeConfig,
    auth_root: PathBuf,
}

impl BridgeEngine {
    pub fn new(config: BridgeConfig) -> Result<Self> {
        if !config.is_configured() {
            bail!("no WhatsApp bridge configured (set whatsapp.bridge.command)");
        }
        let auth_root = config
            .auth_dir
            .clone()
            .unwrap_or_else(|| wagate_config::data_dir().join("auth"));
        Ok(Self { config, auth_root })
    }

    pub fn auth_root(&self) -> &Path {
        &self.auth_root
    }
}

#[async_trait]
impl MessagingEngine for BridgeEngine {
    fn id(&self) -> &str {
        "whatsapp-bridge"
    }

    async fn start_client(
        &self,
        session_id: &str,
        events: EventSender,
    ) -> Result<Arc<dyn EngineClient>> {
        tokio::fs::create_dir_all(&self.auth_root)
            .await
            .with_context(|| format!("failed to create {}", self.auth_root.display()))?;
        let client = BridgeClient::spawn(&self.config, &self.auth_root, session_id, events).await?;
        Ok(client)
    }
}

/// A running bridge process bound to one session.
pub struct BridgeClient {
    session_id: String,
    child: Mutex<Child>,
    stdin: Mutex<ChildStdin>,
    pending: PendingMap,
    next_id: AtomicU64,
    request_timeout: Duration,
    destroyed: AtomicBool,
    /// Handle to the reader task so we can abort on destroy.
    reader_handle: Mutex<Option<JoinHandle<()>>>,
}

impl BridgeClient {
    /// Spawn the bridge and start forwarding its events to `events`.
    pub async fn spawn(
        config: &BridgeConfig,
        auth_root: &Path,
        session_id: &str,
        events: EventSender,
    ) -> Result<Arc<Self>> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .env("WAGATE_SESSION", session_id)
            .env("WAGATE_AUTH_DIR", auth_root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn WhatsApp bridge: {}", config.command))?;

        let stdin = child.stdin.take().context("failed to capture stdin")?;
        let stdout = child.stdout.take().context("failed to capture stdout")?;

        if let Some(stderr) = child.stderr.take() {
            let session = session_id.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(session = %session, "bridge: {line}");
                }
            });
        }

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let handle = tokio::spawn(read_frames(
            session_id.to_string(),
            stdout,
            events,
            Arc::clone(&pending),
        ));

        info!(session = %session_id, pid = ?child.id(), "WhatsApp bridge started");

        Ok(Arc::new(Self {
            session_id: session_id.to_string(),
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            pending,
            next_id: AtomicU64::new(1),
            request_timeout: config.request_timeout(),
            destroyed: AtomicBool::new(false),
            reader_handle: Mutex::new(Some(handle)),
        }))
    }

    /// Send a request and wait for the matching response.
    async fn request(&self, method: &str, params: Option<serde_json::Value>) -> Result<()> {
        self.request_within(method, params, self.request_timeout).await
    }

    async fn request_within(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        timeout: Duration,
    ) -> Result<()> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let req = BridgeRequest { id, method, params };

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let mut payload = serde_json::to_string(&req)?;
        payload.push('\n');

        trace!(session = %self.session_id, method, id, "gateway -> bridge");

        let written = {
            let mut stdin = self.stdin.lock().await;
            match stdin.write_all(payload.as_bytes()).await {
                Ok(()) => stdin.flush().await,
                Err(e) => Err(e),
            }
        };
        if let Err(e) = written {
            self.pending.lock().await.remove(&id);
            return Err(e).context("failed to write to WhatsApp bridge");
        }

        let resp = match tokio::time::timeout(timeout, rx).await {
            Ok(resp) => resp.context("WhatsApp bridge exited before responding")?,
            Err(_) => {
                self.pending.lock().await.remove(&id);
                bail!("WhatsApp bridge request '{method}' timed out");
            },
        };

        if !resp.ok {
            bail!(
                "WhatsApp bridge error: {}",
                resp.error.as_deref().unwrap_or("unknown error")
            );
        }
        Ok(())
    }

    /// Check if the bridge process is still running.
    pub async fn is_alive(&self) -> bool {
        let mut child = self.child.lock().await;
        matches!(child.try_wait(), Ok(None))
    }
}

#[async_trait]
impl EngineClient for BridgeClient {
    async fn send_text(&self, to: &str, text: &str) -> Result<()> {
        self.request(
            METHOD_SEND_MESSAGE,
            Some(serde_json::json!({ "to": to, "text": text })),
        )
        .await
    }

    async fn destroy(&self) -> Result<()> {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let timeout = DESTROY_TIMEOUT.min(self.request_timeout);
        if self.is_alive().await
            && let Err(e) = self.request_within(METHOD_DESTROY, None, timeout).await
        {
            debug!(session = %self.session_id, error = %e, "bridge did not acknowledge destroy");
        }
        if let Some(handle) = self.reader_handle.lock().await.take() {
            handle.abort();
        }
        let mut child = self.child.lock().await;
        if let Err(e) = child.kill().await {
            debug!(session = %self.session_id, error = %e, "bridge already exited");
        }
        info!(session = %self.session_id, "WhatsApp bridge stopped");
        Ok(())
    }
}

/// Reader loop: route responses to waiting requests, forward lifecycle
/// events. Returning drops `events`, which the session sees as a closed
/// event stream.
async fn read_frames(
    session_id: String,
    stdout: ChildStdout,
    events: EventSender,
    pending: PendingMap,
) {
    let mut reader = BufReader::new(stdout);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!(session = %session_id, "bridge stdout closed");
                break;
            },
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                trace!(session = %session_id, raw = %trimmed, "bridge -> gateway");
                match parse_frame(trimmed) {
                    Ok(BridgeFrame::Response(resp)) => {
                        let mut map = pending.lock().await;
                        if let Some(tx) = map.remove(&resp.id) {
                            let _ = tx.send(resp);
                        } else {
                            warn!(session = %session_id, id = resp.id, "response for unknown request id");
                        }
                    },
                    Ok(BridgeFrame::Event(event)) => {
                        if !events.emit(event.into()) {
                            trace!(session = %session_id, "session no longer listening");
                        }
                    },
                    Ok(BridgeFrame::Other(_)) => {},
                    Err(e) => {
                        warn!(session = %session_id, error = %e, "unparseable bridge frame");
                    },
                }
            },
            Err(e) => {
                warn!(session = %session_id, error = %e, "error reading from bridge stdout");
                break;
            },
        }
    }
    // Fail outstanding requests instead of letting them run into the timeout.
    pending.lock().await.clear();
}
