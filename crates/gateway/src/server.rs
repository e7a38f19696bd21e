use std::sync::Arc;

use {
    axum::{
        Router,
        routing::{get, post},
    },
    tower_http::{
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::info,
};

use {
    wagate_channels::MessagingEngine,
    wagate_config::WagateConfig,
    wagate_sessions::{ManagerOptions, SessionManager},
    wagate_whatsapp::BridgeEngine,
};

use crate::{routes, state::GatewayState};

// ── Router ───────────────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: Arc<GatewayState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health))
        .route("/sessions", get(routes::list_sessions))
        .route("/create-session", post(routes::create_session))
        .route("/qrcode-base64", get(routes::qrcode_base64))
        .route("/qrcode-png", get(routes::qrcode_png))
        .route("/status-session", get(routes::status_session))
        .route("/end-session", post(routes::end_session))
        .route("/send-message", post(routes::send_message))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub fn manager_options(config: &WagateConfig) -> ManagerOptions {
    ManagerOptions {
        start_timeout: config.sessions.start_timeout(),
        require_connected_for_send: config.sessions.require_connected_for_send,
        recipient_suffix: config.whatsapp.recipient_suffix.clone(),
    }
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Start the gateway with the WhatsApp bridge engine from `config`.
pub async fn start_gateway(config: WagateConfig) -> anyhow::Result<()> {
    let engine = BridgeEngine::new(config.whatsapp.bridge.clone())?;
    info!(auth_dir = %engine.auth_root().display(), "WhatsApp bridge configured");
    serve_with_engine(config, Arc::new(engine)).await
}

/// Serve the HTTP surface until ctrl-c / SIGTERM, then destroy every session.
pub async fn serve_with_engine(
    config: WagateConfig,
    engine: Arc<dyn MessagingEngine>,
) -> anyhow::Result<()> {
    let sessions = Arc::new(SessionManager::new(engine, manager_options(&config)));
    let state = GatewayState::new(Arc::clone(&sessions));
    let app = build_gateway_app(Arc::clone(&state));

    let bind = config.server.bind.as_str();
    let listener = tokio::net::TcpListener::bind((bind, config.server.port)).await?;
    let addr = listener.local_addr()?;

    // Startup banner.
    let lines = [
        format!("wagate gateway v{}", state.version),
        format!("listening on {addr}"),
        format!("engine: {}", sessions.engine_id()),
        format!(
            "start timeout: {}s, require connected for send: {}",
            config.sessions.start_timeout_secs, config.sessions.require_connected_for_send
        ),
    ];
    let width = lines.iter().map(|l| l.len()).max().unwrap_or(0) + 4;
    info!("┌{}┐", "─".repeat(width));
    for line in &lines {
        info!("│  {:<w$}│", line, w = width - 2);
    }
    info!("└{}┘", "─".repeat(width));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sessions.shutdown().await;
    info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            },
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
