//! Error types for rust-netconf

use thiserror::Error;

/// Main error type for NETCONF client operations
#[derive(Debug, Error)]
pub enum NetconfError {
    /// Value does not match the lexical form of its YANG type
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Value is well-formed but violates a range, length or pattern restriction
    #[error("Restriction violated: {0}")]
    RestrictionViolation(String),

    /// Malformed or duplicate schema descriptor
    #[error("Schema load error: {0}")]
    SchemaLoad(String),

    /// Invalid XML or JSON document
    #[error("Parse error: {0}")]
    Parse(String),

    /// Reply envelope missing, unparsable, or without a message-id
    #[error("Malformed reply: {0}")]
    MalformedReply(String),

    /// Hello exchange failed; the session never reached `Established`
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// I/O or framing failure on the session transport
    #[error("Transport error: {0}")]
    Transport(String),

    /// No reply arrived within the configured window
    #[error("Request {message_id} timed out")]
    Timeout {
        /// Message id of the abandoned request
        message_id: u64,
    },

    /// The session was closed before the request completed
    #[error("Session closed")]
    SessionClosed,

    /// Operation not allowed in the current session or device state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// No session with the given name exists on the device
    #[error("Unknown session: {0}")]
    UnknownSession(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (file operations, sockets)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing/serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl NetconfError {
    /// True for errors that terminate the session they occurred on
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            Self::Handshake(_) | Self::Transport(_) | Self::SessionClosed | Self::Io(_)
        )
    }
}

/// Result type alias for NETCONF operations
pub type Result<T> = std::result::Result<T, NetconfError>;
