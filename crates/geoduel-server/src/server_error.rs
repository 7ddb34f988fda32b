//! Driver error types.

use std::fmt;

/// Errors that can escape the server driver.
///
/// These are contract violations between the runtime and the driver, not
/// game-level failures: every recoverable game error is converted into a
/// structured error frame inside the driver and never propagates.
#[derive(Debug)]
pub enum DriverError {
    /// No connection state machine exists for the session id.
    ///
    /// Indicates the runtime delivered a frame for a connection it never
    /// announced (or already closed). May be transient during teardown
    /// races; the runtime drops the frame.
    SessionNotFound(u64),

    /// The driver produced or received a frame violating the protocol.
    ///
    /// Fatal for that frame; indicates a bug or a hostile peer that
    /// slipped past frame validation.
    Protocol(String),
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionNotFound(id) => write!(f, "session not found: {id}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
        }
    }
}

impl std::error::Error for DriverError {}

impl From<geoduel_proto::ProtocolError> for DriverError {
    fn from(err: geoduel_proto::ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}
