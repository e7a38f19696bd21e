//! HTTP handlers for the session endpoints.

use std::sync::Arc;

use {
    axum::{
        extract::{Query, State},
        http::header,
        response::{IntoResponse, Json, Response},
    },
    serde::Deserialize,
    serde_json::json,
    tracing::warn,
};

use wagate_sessions::SessionError;

use crate::{error::ApiError, state::GatewayState};

type AppState = State<Arc<GatewayState>>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionQuery {
    pub session_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendQuery {
    pub session_name: String,
    pub number: String,
    pub message: String,
}

/// Session names are registry keys and are used verbatim; only the empty
/// string is rejected.
fn session_name(raw: &str) -> Result<&str, ApiError> {
    if raw.is_empty() {
        return Err(ApiError::BadRequest("sessionName must not be empty".into()));
    }
    Ok(raw)
}

pub async fn create_session(
    State(state): AppState,
    Query(q): Query<SessionQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = session_name(&q.session_name)?;
    let qrcode = state.sessions.start(id).await?;
    Ok(Json(json!({ "qrcode": qrcode })))
}

pub async fn qrcode_base64(
    State(state): AppState,
    Query(q): Query<SessionQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = session_name(&q.session_name)?;
    let payload = state.sessions.challenge(id).await?;
    let url = wagate_media::render_data_url(&payload).map_err(|e| render_error(id, e))?;
    Ok(Json(json!({ "qrcode": url })))
}

pub async fn qrcode_png(
    State(state): AppState,
    Query(q): Query<SessionQuery>,
) -> Result<Response, ApiError> {
    let id = session_name(&q.session_name)?;
    let payload = state.sessions.challenge(id).await?;
    let png = wagate_media::render_png(&payload).map_err(|e| render_error(id, e))?;
    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}

pub async fn status_session(
    State(state): AppState,
    Query(q): Query<SessionQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = session_name(&q.session_name)?;
    let status = state.sessions.status(id).await?;
    Ok(Json(json!({ "status": status })))
}

pub async fn end_session(
    State(state): AppState,
    Query(q): Query<SessionQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = session_name(&q.session_name)?;
    state.sessions.end(id).await?;
    Ok(Json(json!({ "status": "ended" })))
}

pub async fn send_message(
    State(state): AppState,
    Query(q): Query<SendQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = session_name(&q.session_name)?;
    if q.number.trim().is_empty() {
        return Err(ApiError::BadRequest("number must not be empty".into()));
    }
    state.sessions.send(id, &q.number, &q.message).await?;
    Ok(Json(json!({ "status": "sent" })))
}

pub async fn list_sessions(State(state): AppState) -> Json<serde_json::Value> {
    let sessions: Vec<_> = state
        .sessions
        .list()
        .await
        .into_iter()
        .map(|s| {
            json!({
                "sessionName": s.id,
                "status": s.status,
                "createdAt": s.created_at_ms,
            })
        })
        .collect();
    Json(json!({ "sessions": sessions }))
}

pub async fn health(State(state): AppState) -> Json<serde_json::Value> {
    let count = state.sessions.registry().len().await;
    Json(json!({
        "status": "ok",
        "version": state.version,
        "engine": state.sessions.engine_id(),
        "sessions": count,
        "uptimeSecs": state.uptime_secs(),
    }))
}

fn render_error(id: &str, e: anyhow::Error) -> ApiError {
    warn!(session = %id, error = %e, "QR rendering failed");
    ApiError::Session(SessionError::Render(format!("{e:#}")))
}
