use thiserror::Error;

/// Top-level error type for the `onair-api` crate.
///
/// Covers every failure mode at the collaborator boundary: opening the
/// transport, the handshake, frame sealing, and the JSON-RPC session.
/// `onair-core` maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// Opening the transport failed (connection refused, DNS failure, etc.)
    #[error("Connection to {endpoint} failed: {reason}")]
    Connect { endpoint: String, reason: String },

    /// Error reported by an open transport.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The transport was closed, or a request was abandoned because the
    /// session driver went away.
    #[error("Connection closed")]
    Closed,

    /// Endpoint could not be turned into a URL.
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    // ── Handshake ───────────────────────────────────────────────────
    /// The server rejected the handshake (bad password, protocol mismatch).
    #[error("Handshake rejected: {message}")]
    Handshake { message: String },

    /// Sealing or opening a frame failed. The stream state is unusable.
    #[error("Frame crypto failure: {0}")]
    Crypto(String),

    // ── JSON-RPC ────────────────────────────────────────────────────
    /// The peer sent something that violates the JSON-RPC contract.
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// The server answered a request with a JSON-RPC error object.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if the handshake was refused by the server.
    ///
    /// Retrying with the same credentials can never succeed.
    pub fn is_handshake_rejection(&self) -> bool {
        matches!(self, Self::Handshake { .. })
    }

    /// Returns `true` if this is a transport-level failure that a fresh
    /// connection may cure.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. } | Self::Transport(_) | Self::Closed | Self::Crypto(_)
        )
    }

    pub(crate) fn deserialization(err: &serde_json::Error, body: &[u8]) -> Self {
        Self::Deserialization {
            message: err.to_string(),
            body: String::from_utf8_lossy(body).into_owned(),
        }
    }
}
