//! Crate-wide error taxonomy.
//!
//! Four kinds, matching the external error body shape exactly:
//! `{"error":{"code":<http-status>,"message":"..."}}`. Config errors are
//! fatal at startup; upstream errors surface per-request; client errors are
//! caller mistakes; everything else is internal and opaque to the caller.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("client error: {0}")]
    Client(#[from] ClientError),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Whether the failure is worth a caller retrying unmodified.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Upstream(UpstreamError {
                kind: UpstreamErrorKind::Timeout,
                ..
            })
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Upstream(e) => e.status_code(),
            Error::Client(e) => e.status_code(),
            Error::Internal(_) | Error::Io(_) | Error::Json(_) | Error::Http(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }

    /// Body text for the external error envelope. Unlike `Display` (which
    /// carries the `"client error: "`/`"upstream error: "` wrapper prefix
    /// useful in logs), a `ClientError`'s own message is surfaced
    /// unprefixed — callers see `"Server not found: echo"`, not
    /// `"client error: Server not found: echo"`.
    fn response_message(&self) -> String {
        match self {
            Error::Client(e) => e.to_string(),
            other => other.to_string(),
        }
    }
}

/// Failure of `resolve(path, env) -> ResolvedConfig`. A single taxonomy
/// value, never a partial config.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {detail}{}", path.as_deref().map(|p| format!(" (at {p})")).unwrap_or_default())]
pub struct ConfigError {
    pub kind: ConfigErrorKind,
    pub path: Option<String>,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigErrorKind {
    #[error("not found")]
    NotFound,
    #[error("invalid json")]
    InvalidJson,
    #[error("schema violation")]
    SchemaViolation,
    #[error("missing environment variable")]
    MissingEnvVar,
}

impl ConfigError {
    pub fn new(kind: ConfigErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            path: None,
            detail: detail.into(),
        }
    }

    pub fn at(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// Failure of a driver's `listTools`/`callTool` round trip.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct UpstreamError {
    pub kind: UpstreamErrorKind,
    pub message: String,
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamErrorKind {
    #[error("unavailable")]
    Unavailable,
    #[error("timeout")]
    Timeout,
    #[error("protocol")]
    Protocol,
    #[error("remote")]
    Remote,
}

impl UpstreamError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: UpstreamErrorKind::Unavailable,
            message: message.into(),
            data: None,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: UpstreamErrorKind::Timeout,
            message: message.into(),
            data: None,
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self {
            kind: UpstreamErrorKind::Protocol,
            message: message.into(),
            data: None,
        }
    }

    pub fn remote(code: i32, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            kind: UpstreamErrorKind::Remote,
            message: format!("{} ({code})", message.into()),
            data,
        }
    }

    fn status_code(&self) -> StatusCode {
        match self.kind {
            UpstreamErrorKind::Unavailable => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// A caller mistake: bad request body or an unknown upstream name.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Server not found: {0}")]
    NotFound(String),
}

impl ClientError {
    fn status_code(&self) -> StatusCode {
        match self {
            ClientError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ClientError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: u16,
    message: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: ErrorDetail {
                code: status.as_u16(),
                message: self.response_message(),
            },
        };
        (status, Json(body)).into_response()
    }
}
