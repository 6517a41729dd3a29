use {
    axum::{
        Json,
        http::{HeaderValue, StatusCode, header::RETRY_AFTER},
        response::{IntoResponse, Response},
    },
    serde_json::json,
    tracing::warn,
    wabridge_config::ConfigError,
    wabridge_driver::DriverError,
    wabridge_sessions::SessionError,
};

use crate::media::MediaError;

/// Errors returned by gateway handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("you must send valid token")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error("client is not logged in")]
    NotLoggedIn,

    #[error("client {0} is busy, try again later")]
    Busy(String),

    #[error("For some reason, browser for client {0} has closed. Please, try get QrCode again")]
    BrowserClosed(String),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::InvalidClient(client) => {
                Self::BadRequest(format!("invalid client id: {client}"))
            },
            SessionError::SemaphoreTimeout { client_id, .. } => Self::Busy(client_id),
            SessionError::Recreate { client_id, source } => {
                warn!(client_id = %client_id, error = %source, "browser restart failed");
                Self::BrowserClosed(client_id)
            },
            SessionError::Driver(e) => Self::Driver(e),
            SessionError::Io(e) => Self::Io(e),
        }
    }
}

impl From<MediaError> for ApiError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::Io(e) => Self::Io(e),
            other => Self::BadRequest(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotLoggedIn => StatusCode::CONFLICT,
            Self::Busy(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::BrowserClosed(_) | Self::Driver(_) => StatusCode::BAD_GATEWAY,
            Self::Config(_) | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() && !matches!(self, Self::Busy(_)) {
            warn!(%status, error = %self, "request failed");
        }

        let body = match &self {
            Self::BrowserClosed(_) => json!({ "success": false, "message": self.to_string() }),
            _ => json!({ "error": self.to_string() }),
        };
        let mut response = (status, Json(body)).into_response();
        if matches!(self, Self::Busy(_)) {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}
