// ── Core error types ──
//
// User-facing errors from onair-core. Consumers never see frame-level
// or JSON-RPC envelope failures directly; the `From<onair_api::Error>`
// impl folds them into the variants below.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    /// The handshake was refused. Never retried.
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// No live session, or the session went away mid-request.
    #[error("Not connected")]
    Disconnected,

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Output not found: {id}")]
    OutputNotFound { id: String },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Operation rejected by server: {message}")]
    Rejected { message: String },

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// `true` when the server refused the credentials. The supervisor
    /// never retries these.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, Self::AuthenticationFailed { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<onair_api::Error> for CoreError {
    fn from(err: onair_api::Error) -> Self {
        match err {
            onair_api::Error::Connect { endpoint, reason } => {
                CoreError::ConnectionFailed { endpoint, reason }
            }
            onair_api::Error::Transport(reason) => CoreError::ConnectionFailed {
                endpoint: "<session>".into(),
                reason,
            },
            onair_api::Error::Crypto(reason) => CoreError::ConnectionFailed {
                endpoint: "<session>".into(),
                reason: format!("frame could not be opened: {reason}"),
            },
            onair_api::Error::Closed => CoreError::Disconnected,
            onair_api::Error::InvalidEndpoint(e) => CoreError::Config {
                message: format!("invalid endpoint: {e}"),
            },
            onair_api::Error::Handshake { message } => CoreError::AuthenticationFailed { message },
            onair_api::Error::Protocol(message) => CoreError::Protocol { message },
            onair_api::Error::Rpc { code, message } => CoreError::Rejected {
                message: format!("{message} (code {code})"),
            },
            onair_api::Error::Deserialization { message, body } => {
                tracing::debug!(body = %body, "undecodable server payload");
                CoreError::Protocol {
                    message: format!("unexpected payload: {message}"),
                }
            }
        }
    }
}
