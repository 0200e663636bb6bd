//! Error taxonomy for console operations
//!
//! Every failure is scoped to the action that triggered it. Server text is
//! kept verbatim so it can be shown to the user as-is.

use std::time::Duration;
use thiserror::Error;

/// Console error type
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConsoleError {
    /// Connection refused, reset, DNS failure, broken stream
    #[error("Network error: {0}")]
    Network(String),
    /// Non-2xx response; `body` is the raw response text
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    /// Error reported by the task itself on its progress stream
    #[error("{0}")]
    Application(String),
    #[error("Malformed payload: {0}")]
    Malformed(String),
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    #[error("Observation cancelled")]
    Cancelled,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type for console operations
pub type Result<T> = std::result::Result<T, ConsoleError>;

impl ConsoleError {
    /// Text suitable for a log line or an alert
    pub fn user_message(&self) -> String {
        match self {
            ConsoleError::Http { body, status } if body.trim().is_empty() => {
                format!("HTTP {}", status)
            }
            ConsoleError::Http { body, .. } => body.clone(),
            ConsoleError::Application(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for ConsoleError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ConsoleError::Malformed(e.to_string())
        } else {
            ConsoleError::Network(e.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ConsoleError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match e {
            WsError::Http(resp) => {
                let status = resp.status().as_u16();
                let body = resp
                    .body()
                    .as_ref()
                    .map(|b| String::from_utf8_lossy(b).into_owned())
                    .unwrap_or_default();
                ConsoleError::Http { status, body }
            }
            WsError::Url(e) => ConsoleError::Config(e.to_string()),
            other => ConsoleError::Network(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ConsoleError {
    fn from(e: serde_json::Error) -> Self {
        ConsoleError::Malformed(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::http::header::InvalidHeaderValue> for ConsoleError {
    fn from(e: tokio_tungstenite::tungstenite::http::header::InvalidHeaderValue) -> Self {
        ConsoleError::Config(format!("Invalid session cookie: {}", e))
    }
}
