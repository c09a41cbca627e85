//! Error types for the rebooker.
//!
//! `BotError` is the taxonomy used by the core (client, executor, loop).
//! `ApiError` is the control-surface error type; it implements `IntoResponse`
//! so handlers can use `?` and still return a JSON body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Transport-level failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// The request did not complete within its timeout
    Timeout,
    /// Connection reset, aborted, or closed before a full response arrived
    ConnectionReset,
    /// Could not establish a connection at all
    Connect,
    Other,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TransportKind::Timeout => "timeout",
            TransportKind::ConnectionReset => "connection reset",
            TransportKind::Connect => "connect failure",
            TransportKind::Other => "transport failure",
        };
        f.write_str(label)
    }
}

/// Errors raised while talking to the scheduling site.
///
/// Every variant names the endpoint that produced it so log lines can be
/// diagnosed without credentials or cookies.
#[derive(Debug, Clone, Error)]
pub enum BotError {
    /// Credentials rejected or authentication artifacts unobtainable
    #[error("authentication failed at {endpoint}: {message}")]
    Auth {
        endpoint: &'static str,
        message: String,
    },

    /// Response shape was not what the endpoint is expected to return
    #[error("unexpected response from {endpoint}: {message}")]
    Protocol {
        endpoint: &'static str,
        message: String,
    },

    /// The site explicitly reported an error payload
    #[error("{endpoint} reported an error: {message}")]
    Remote {
        endpoint: &'static str,
        message: String,
    },

    #[error("{kind} while calling {endpoint}: {message}")]
    Transport {
        endpoint: &'static str,
        kind: TransportKind,
        message: String,
    },
}

impl BotError {
    pub fn auth(endpoint: &'static str, message: impl Into<String>) -> Self {
        BotError::Auth {
            endpoint,
            message: message.into(),
        }
    }

    pub fn protocol(endpoint: &'static str, message: impl Into<String>) -> Self {
        BotError::Protocol {
            endpoint,
            message: message.into(),
        }
    }

    pub fn remote(endpoint: &'static str, message: impl Into<String>) -> Self {
        BotError::Remote {
            endpoint,
            message: message.into(),
        }
    }

    pub fn transport(endpoint: &'static str, kind: TransportKind, message: impl Into<String>) -> Self {
        BotError::Transport {
            endpoint,
            kind,
            message: message.into(),
        }
    }

    /// Wrap a reqwest failure, classifying it by walking the source chain.
    pub fn from_reqwest(endpoint: &'static str, err: reqwest::Error) -> Self {
        let kind = classify_transport(&err);
        // reqwest includes the URL in its Display; keep only the cause chain
        let message = error_chain(&err.without_url());
        BotError::transport(endpoint, kind, message)
    }

    pub fn endpoint(&self) -> &'static str {
        match self {
            BotError::Auth { endpoint, .. }
            | BotError::Protocol { endpoint, .. }
            | BotError::Remote { endpoint, .. }
            | BotError::Transport { endpoint, .. } => endpoint,
        }
    }

    pub fn transport_kind(&self) -> Option<TransportKind> {
        match self {
            BotError::Transport { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Failures worth retrying a booking submission for.
    ///
    /// A timed-out submission is treated like a reset connection.
    pub fn is_retryable_submit(&self) -> bool {
        matches!(
            self.transport_kind(),
            Some(TransportKind::Timeout | TransportKind::ConnectionReset)
        )
    }

    /// Failures that mean the session (or its connection) is dead and the
    /// polling loop has to log in again.
    pub fn requires_reauth(&self) -> bool {
        matches!(self, BotError::Auth { .. })
            || self.transport_kind() == Some(TransportKind::ConnectionReset)
    }
}

fn classify_transport(err: &reqwest::Error) -> TransportKind {
    if err.is_timeout() {
        return TransportKind::Timeout;
    }

    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = source {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            use std::io::ErrorKind;
            match io.kind() {
                ErrorKind::TimedOut => return TransportKind::Timeout,
                ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::BrokenPipe
                | ErrorKind::UnexpectedEof => return TransportKind::ConnectionReset,
                ErrorKind::ConnectionRefused => return TransportKind::Connect,
                _ => {}
            }
        }
        // hyper reports a dropped keep-alive connection this way
        let text = e.to_string();
        if text.contains("connection closed before message completed")
            || text.contains("connection reset")
        {
            return TransportKind::ConnectionReset;
        }
        source = e.source();
    }

    if err.is_connect() {
        TransportKind::Connect
    } else {
        TransportKind::Other
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(e) = source {
        text.push_str(": ");
        text.push_str(&e.to_string());
        source = e.source();
    }
    text
}

/// Startup configuration problems. These are fatal before the loop starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable must be set")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Unified error type for control-surface handlers
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request data
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// The scheduling site failed the request
    #[error("{0}")]
    Upstream(#[from] BotError),

    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Create a bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message, details) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            ApiError::Upstream(e) => {
                tracing::warn!("Upstream error: {}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    "Scheduling site request failed".to_string(),
                    Some(e.to_string()),
                )
            }
            ApiError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    Some(e.to_string()),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_message,
            details,
        });

        (status, body).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
