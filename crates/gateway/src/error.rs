use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use wagate_sessions::SessionError;

/// Error returned by HTTP handlers, rendered as `{ "error": ..., "code": ... }`.
#[derive(Debug)]
pub enum ApiError {
    Session(SessionError),
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Session(e) => match e {
                SessionError::AlreadyExists(_) => StatusCode::BAD_REQUEST,
                SessionError::NotFound(_) => StatusCode::NOT_FOUND,
                SessionError::NotReady { .. } => StatusCode::CONFLICT,
                SessionError::Initialization(_)
                | SessionError::AuthenticationFailed(_)
                | SessionError::Render(_)
                | SessionError::Delivery(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Session(e) => e.code(),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        Self::Session(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let message = match &self {
            Self::Session(e) => e.to_string(),
            Self::BadRequest(m) => m.clone(),
        };
        (
            status,
            Json(serde_json::json!({ "error": message, "code": code })),
        )
            .into_response()
    }
}
