//! Error types for the render server.

/// Server error type.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// IO error on the listener or a connection.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Core engine error.
    #[error("engine error: {0}")]
    Engine(#[from] dotrender_core::Error),

    /// JSON encoding/decoding of a protocol frame failed.
    #[error("protocol encoding error: {0}")]
    Json(#[from] serde_json::Error),

    /// A frame violated the protocol (too large, wrong reply type).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The configured port is already bound and the policy forbids reuse.
    #[error("port {0} is already in use by another listener")]
    PortInUse(u16),
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
