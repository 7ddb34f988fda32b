//! Runtime error types.

/// Errors of the production runtime (transport, configuration, glue).
///
/// Driver-level errors live in [`crate::DriverError`]; recoverable game
/// errors never surface here at all - they travel back to clients as
/// structured error frames.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Invalid configuration (bind address, TLS material).
    #[error("configuration error: {0}")]
    Config(String),

    /// Low-level transport failure (QUIC endpoint, streams).
    ///
    /// May be transient (network issues) or fatal (endpoint closed).
    #[error("transport error: {0}")]
    Transport(String),

    /// Frame encoding/decoding failed at the runtime boundary.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Internal glue failure that should not happen in normal operation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<geoduel_proto::ProtocolError> for ServerError {
    fn from(err: geoduel_proto::ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<crate::DriverError> for ServerError {
    fn from(err: crate::DriverError) -> Self {
        Self::Internal(err.to_string())
    }
}
