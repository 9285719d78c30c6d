use naia_protocol::ErrorShape;

pub type Result<T, E = ClientError> = std::result::Result<T, E>;

/// Failures surfaced to callers of the gateway client.
///
/// Transport and correlation errors are returned to the immediate caller and
/// never retried by the client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("gateway client is not connected")]
    NotConnected,

    #[error("gateway client is already connected")]
    AlreadyConnected,

    #[error("request {method} timed out after {timeout_ms}ms")]
    Timeout { method: String, timeout_ms: u64 },

    #[error("gateway error {code}: {message}")]
    Remote { code: String, message: String },

    #[error("connection closed")]
    ConnectionClosed,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("approval {0} already resolved")]
    AlreadyResolved(String),

    #[error("failed to encode request: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unexpected payload for {method}: {source}")]
    UnexpectedPayload {
        method: String,
        source: serde_json::Error,
    },
}

impl From<ErrorShape> for ClientError {
    fn from(shape: ErrorShape) -> Self {
        Self::Remote {
            code: shape.code,
            message: shape.message,
        }
    }
}

impl From<naia_protocol::ProtocolError> for ClientError {
    fn from(err: naia_protocol::ProtocolError) -> Self {
        match err {
            naia_protocol::ProtocolError::Malformed(e) => Self::Serialization(e),
        }
    }
}
