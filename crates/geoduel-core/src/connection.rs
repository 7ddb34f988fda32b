//! Session-layer state machine.
//!
//! Manages one connection's lifecycle: handshake, heartbeats, timeouts, and
//! graceful shutdown. Uses the action pattern - methods take time as input
//! and return actions for the driver to execute - so the machine is pure
//! and testable without a transport.
//!
//! # State Machine
//!
//! ```text
//! ┌──────┐   Hello    ┌───────────────┐  Goodbye/Timeout  ┌────────┐
//! │ Init │───────────>│ Authenticated │──────────────────>│ Closed │
//! └──────┘            └───────────────┘                   └────────┘
//!     │ handshake timeout                                     ↑
//!     └───────────────────────────────────────────────────────┘
//! ```
//!
//! The `Hello` frame carries the externally-issued user id; the machine
//! records it but performs no token validation (that is the auth
//! collaborator's job at the boundary).

use std::{
    ops::Sub,
    time::{Duration, Instant},
};

use geoduel_proto::{
    Frame, FrameHeader, Opcode, Payload,
    payloads::session::{Goodbye, HelloReply},
};

use crate::error::ConnectionError;

/// Time allowed to complete the Hello handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum time without any activity before the connection is closed.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Interval at which the server sends Ping frames while authenticated.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);

/// Actions returned by the connection state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Send this frame to the peer
    SendFrame(Frame),

    /// Close the connection with this reason
    Close {
        /// Reason for closing the connection
        reason: String,
    },
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No handshake received yet
    Init,
    /// Hello received, identity bound to the connection
    Authenticated,
    /// Connection closed (graceful or error)
    Closed,
}

/// Connection configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Timeout for completing the handshake
    pub handshake_timeout: Duration,
    /// Idle timeout before disconnecting
    pub idle_timeout: Duration,
    /// Heartbeat interval (should be < `idle_timeout` / 2)
    pub heartbeat_interval: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

/// Server-side connection state machine.
///
/// Pure state machine: no I/O, no stored environment. Time is passed as a
/// parameter to the methods that need it, and the machine is generic over
/// `Instant` so tests can drive it with computed instants.
#[derive(Debug, Clone)]
pub struct Connection<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Current state
    state: ConnectionState,
    /// Configuration
    config: ConnectionConfig,
    /// Last activity timestamp
    last_activity: I,
    /// Last heartbeat sent timestamp
    last_heartbeat: Option<I>,
    /// Session id (assigned by the server before the handshake)
    session_id: Option<u64>,
    /// User id bound by the Hello frame
    user_id: Option<u64>,
}

impl<I> Connection<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create a new connection in [`ConnectionState::Init`].
    pub fn new(now: I, config: ConnectionConfig) -> Self {
        Self {
            state: ConnectionState::Init,
            config,
            last_activity: now,
            last_heartbeat: None,
            session_id: None,
            user_id: None,
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Session id assigned by the server.
    #[must_use]
    pub fn session_id(&self) -> Option<u64> {
        self.session_id
    }

    /// User id bound by the handshake. `None` until authenticated.
    #[must_use]
    pub fn user_id(&self) -> Option<u64> {
        self.user_id
    }

    /// Whether the handshake is complete.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state == ConnectionState::Authenticated
    }

    /// Assign the session id (server use, before handling Hello).
    ///
    /// The server generates a random session id per connection; the state
    /// machine echoes it back in the `HelloReply`.
    pub fn set_session_id(&mut self, session_id: u64) {
        self.session_id = Some(session_id);
    }

    /// Mark the connection as closed.
    pub fn close(&mut self) {
        self.state = ConnectionState::Closed;
    }

    /// Mark the connection as active (call when receiving frames).
    pub fn update_activity(&mut self, now: I) {
        self.last_activity = now;
    }

    /// Elapsed time since last activity, if a timeout was exceeded.
    #[must_use]
    pub fn check_timeout(&self, now: I) -> Option<Duration> {
        let elapsed = now - self.last_activity;

        let timeout = match self.state {
            ConnectionState::Init => self.config.handshake_timeout,
            ConnectionState::Authenticated => self.config.idle_timeout,
            ConnectionState::Closed => return None,
        };

        if elapsed > timeout { Some(elapsed) } else { None }
    }

    /// Process periodic maintenance (timeouts and heartbeats).
    pub fn tick(&mut self, now: I) -> Vec<ConnectionAction> {
        let mut actions = Vec::new();

        if let Some(elapsed) = self.check_timeout(now) {
            let reason = match self.state {
                ConnectionState::Init => format!("handshake timeout after {elapsed:?}"),
                _ => format!("idle timeout after {elapsed:?}"),
            };

            self.close();
            actions.push(ConnectionAction::Close { reason });
            return actions;
        }

        if self.state == ConnectionState::Authenticated {
            let should_send = match self.last_heartbeat {
                None => true,
                Some(last) => now - last >= self.config.heartbeat_interval,
            };

            if should_send {
                let ping_frame = Frame::new(FrameHeader::new(Opcode::Ping), Vec::new());

                actions.push(ConnectionAction::SendFrame(ping_frame));
                self.last_heartbeat = Some(now);
                self.last_activity = now;
            }
        }

        actions
    }

    /// Process an incoming session-layer frame and update state.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::UnexpectedFrame` if the opcode is invalid for
    ///   the current state
    /// - `ConnectionError::InvalidPayload` if deserialization fails
    /// - `ConnectionError::UnsupportedVersion` if the Hello version ≠ 1
    /// - `ConnectionError::Protocol` for handshake contract violations
    pub fn handle_frame(
        &mut self,
        frame: &Frame,
        now: I,
    ) -> Result<Vec<ConnectionAction>, ConnectionError> {
        self.last_activity = now;

        let Some(opcode) = frame.header.opcode_enum() else {
            return Err(ConnectionError::UnexpectedFrame {
                state: self.state,
                opcode: frame.header.opcode(),
            });
        };

        match (self.state, opcode) {
            // Handshake: Hello in Init state binds the user id
            (ConnectionState::Init, Opcode::Hello) => {
                let payload = Payload::from_frame(frame)?;

                let Payload::Hello(hello) = payload else {
                    return Err(ConnectionError::InvalidPayload {
                        expected: "Hello",
                        opcode: Opcode::Hello.to_u16(),
                    });
                };

                if hello.version != 1 {
                    return Err(ConnectionError::UnsupportedVersion(hello.version));
                }

                if hello.user_id == 0 {
                    return Err(ConnectionError::Protocol(
                        "hello must carry a nonzero user id".to_string(),
                    ));
                }

                let Some(session_id) = self.session_id else {
                    return Err(ConnectionError::Protocol(
                        "server must set session_id before handling Hello".to_string(),
                    ));
                };

                self.user_id = Some(hello.user_id);
                self.state = ConnectionState::Authenticated;

                let reply = Payload::HelloReply(HelloReply { session_id });
                let frame = reply.into_frame(FrameHeader::new(Opcode::HelloReply))?;

                Ok(vec![ConnectionAction::SendFrame(frame)])
            },

            // Ping when authenticated: answer with Pong
            (ConnectionState::Authenticated, Opcode::Ping) => {
                let pong_frame = Frame::new(FrameHeader::new(Opcode::Pong), Vec::new());
                Ok(vec![ConnectionAction::SendFrame(pong_frame)])
            },

            // Pong when authenticated: activity already updated
            (ConnectionState::Authenticated, Opcode::Pong) => Ok(vec![]),

            // Goodbye in any state except Closed
            (state, Opcode::Goodbye) if state != ConnectionState::Closed => {
                let payload = Payload::from_frame(frame)?;

                let Payload::Goodbye(goodbye) = payload else {
                    return Err(ConnectionError::InvalidPayload {
                        expected: "Goodbye",
                        opcode: Opcode::Goodbye.to_u16(),
                    });
                };

                self.state = ConnectionState::Closed;

                let reply = Payload::Goodbye(Goodbye { reason: "ack".to_string() });
                let frame = reply.into_frame(FrameHeader::new(Opcode::Goodbye))?;

                Ok(vec![ConnectionAction::SendFrame(frame), ConnectionAction::Close {
                    reason: format!("peer goodbye: {}", goodbye.reason),
                }])
            },

            // Default: unexpected frame for current state
            (state, opcode) => {
                Err(ConnectionError::UnexpectedFrame { state, opcode: opcode.to_u16() })
            },
        }
    }
}
