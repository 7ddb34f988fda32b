//! Core error types.
//!
//! [`GameError`] covers every recoverable protocol failure: each variant
//! maps to one structured error code reported back to the originating
//! connection. None of them ever crash the dispatcher or disturb other
//! sessions and rooms. [`ConnectionError`] covers the session layer.

use crate::connection::ConnectionState;

/// Recoverable failures of game-level operations.
///
/// These are the error kinds of the protocol contract: the driver converts
/// each into a structured error frame naming the failing event. A
/// disconnect mid-operation is NOT an error - it is handled as an implicit
/// quit by the disconnect cascade.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    /// The targeted user is already in an active room.
    #[error("user {0} is already in a room")]
    TargetBusy(u64),

    /// The targeted user has no live session.
    #[error("user {0} is offline")]
    TargetOffline(u64),

    /// No pending invitation names the caller.
    #[error("no pending invitation for user {0}")]
    NoPendingInvitation(u64),

    /// The caller is not a participant of the room (or the room is gone).
    #[error("user {user_id} is not a participant of room {room_id:032x}")]
    NotInRoom {
        /// The offending caller
        user_id: u64,
        /// The room the action was scoped to
        room_id: u128,
    },

    /// The room already moved past the submittable state for the current
    /// question; the competing transition committed first.
    #[error("stale submission for room {0:032x}")]
    StaleSubmission(u128),

    /// A participant attempted a room-scoped action reserved for the other
    /// participant, or a non-participant attempted one at all.
    #[error("user {user_id} may not perform this action in room {room_id:032x}")]
    Unauthorized {
        /// The offending caller
        user_id: u64,
        /// The room the action was scoped to
        room_id: u128,
    },

    /// Malformed or semantically invalid request payload.
    #[error("validation failed: {0}")]
    Validation(String),
}

/// Failures of the session-layer connection state machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// Operation is not valid in the current connection state.
    #[error("invalid operation '{operation}' in state {state:?}")]
    InvalidState {
        /// State the connection was in
        state: ConnectionState,
        /// Operation that was attempted
        operation: String,
    },

    /// Client speaks an unsupported protocol version.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u16),

    /// Frame opcode is not valid for the current state.
    #[error("unexpected frame {opcode:#06x} in state {state:?}")]
    UnexpectedFrame {
        /// State the connection was in
        state: ConnectionState,
        /// Raw opcode of the offending frame
        opcode: u16,
    },

    /// Frame payload did not match the expected type.
    #[error("invalid payload: expected {expected} for opcode {opcode:#06x}")]
    InvalidPayload {
        /// Expected payload type name
        expected: &'static str,
        /// Raw opcode of the offending frame
        opcode: u16,
    },

    /// Session-layer protocol contract violated.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<geoduel_proto::ProtocolError> for ConnectionError {
    fn from(err: geoduel_proto::ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}
