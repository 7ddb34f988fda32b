//! Server driver.
//!
//! Ties together the connection state machines (session layer), the
//! `SessionRegistry` (who is online, where, in which room), and the
//! `RoomManager` (invitations, rooms, quiz engine).
//!
//! ## Event/Action Pattern
//!
//! The driver follows a Sans-IO pattern:
//! 1. The external runtime produces [`ServerEvent`]s
//! 2. [`ServerDriver::process_event`] returns [`ServerAction`]s
//! 3. Runtime-specific code executes the actions
//!
//! Each inbound event is one atomic unit: the driver mutates the shared
//! registries to completion before the next event is processed, so two
//! transitions on the same room never interleave. The loser of a race
//! (verify vs. quit, duplicate submissions) observes stale state and gets
//! a structured error frame - recoverable failures never escape as `Err`.

use std::collections::HashMap;

use geoduel_core::{
    connection::{Connection, ConnectionAction, ConnectionConfig},
    env::Environment,
    error::GameError,
    quiz::QuestionSource,
    rooms::{RoomConfig, RoomEvent, RoomManager},
    session::SessionRegistry,
};
use geoduel_proto::{
    ErrorPayload, Frame, FrameHeader, Opcode, Payload,
    payloads::{chat, game, map},
};

use crate::{
    archive::{MatchArchive, MatchSummary},
    server_error::DriverError,
};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Connection configuration (timeouts, heartbeat interval)
    pub connection: ConnectionConfig,
    /// Room lifecycle configuration (invitation expiry)
    pub rooms: RoomConfig,
    /// Maximum concurrent connections
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            rooms: RoomConfig::default(),
            max_connections: 10_000,
        }
    }
}

/// Events that the server driver processes.
///
/// Produced by the external runtime (production transport or tests).
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A new connection was accepted
    ConnectionAccepted {
        /// Unique connection id assigned by the runtime
        session_id: u64,
    },

    /// A frame was received from a connection
    FrameReceived {
        /// Connection that sent the frame
        session_id: u64,
        /// The received frame
        frame: Frame,
    },

    /// A connection was closed (by peer or error)
    ConnectionClosed {
        /// Connection that was closed
        session_id: u64,
        /// Reason for closure
        reason: String,
    },

    /// Periodic tick for timeout and expiry checking
    Tick,
}

/// Actions that the server driver produces.
///
/// Executed by runtime-specific code.
#[derive(Debug, Clone)]
pub enum ServerAction {
    /// Send a frame to a specific session
    SendToSession {
        /// Target session id
        session_id: u64,
        /// Frame to send
        frame: Frame,
    },

    /// Broadcast a frame to every registered session
    Broadcast {
        /// Frame to broadcast
        frame: Frame,
    },

    /// Close a connection
    CloseConnection {
        /// Session to close
        session_id: u64,
        /// Reason for closure
        reason: String,
    },

    /// Log a message
    Log {
        /// Log level
        level: LogLevel,
        /// Message to log
        message: String,
    },
}

/// Log levels for server actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// Informational message
    Info,
    /// Warning
    Warn,
    /// Error
    Error,
}

/// Action-based server driver.
///
/// Orchestrates connection management, the location broadcast, and the
/// room lifecycle. Pure logic, no I/O.
pub struct ServerDriver<E, Q, A>
where
    E: Environment,
    Q: QuestionSource,
    A: MatchArchive,
{
    /// Connection state machines (session id -> Connection)
    connections: HashMap<u64, Connection<E::Instant>>,
    /// Live user sessions
    registry: SessionRegistry,
    /// Invitations, rooms, quiz engine
    rooms: RoomManager<E>,
    /// Question content collaborator
    questions: Q,
    /// Finished-match sink
    archive: A,
    /// Environment (time, RNG)
    env: E,
    /// Server configuration
    config: ServerConfig,
}

impl<E, Q, A> ServerDriver<E, Q, A>
where
    E: Environment,
    Q: QuestionSource,
    A: MatchArchive,
{
    /// Create a new server driver.
    pub fn new(env: E, questions: Q, archive: A, config: ServerConfig) -> Self {
        Self {
            connections: HashMap::new(),
            registry: SessionRegistry::new(),
            rooms: RoomManager::new(config.rooms.clone()),
            questions,
            archive,
            env,
            config,
        }
    }

    /// Process a server event and return actions to execute.
    ///
    /// This is the driver's single entry point.
    ///
    /// # Errors
    ///
    /// Only runtime contract violations escape as [`DriverError`]; every
    /// recoverable game failure is converted into a structured error frame.
    pub fn process_event(&mut self, event: ServerEvent) -> Result<Vec<ServerAction>, DriverError> {
        match event {
            ServerEvent::ConnectionAccepted { session_id } => {
                Ok(self.handle_connection_accepted(session_id))
            },
            ServerEvent::FrameReceived { session_id, frame } => {
                self.handle_frame_received(session_id, &frame)
            },
            ServerEvent::ConnectionClosed { session_id, reason } => {
                Ok(self.handle_connection_closed(session_id, &reason))
            },
            ServerEvent::Tick => Ok(self.handle_tick()),
        }
    }

    /// Handle a new connection being accepted.
    fn handle_connection_accepted(&mut self, session_id: u64) -> Vec<ServerAction> {
        let now = self.env.now();

        if self.connections.len() >= self.config.max_connections {
            return vec![ServerAction::CloseConnection {
                session_id,
                reason: "max connections exceeded".to_string(),
            }];
        }

        let mut conn = Connection::new(now, self.config.connection.clone());
        conn.set_session_id(session_id);
        self.connections.insert(session_id, conn);

        vec![ServerAction::Log {
            level: LogLevel::Debug,
            message: format!("connection accepted, session_id={session_id}"),
        }]
    }

    /// Handle a frame received from a connection.
    fn handle_frame_received(
        &mut self,
        session_id: u64,
        frame: &Frame,
    ) -> Result<Vec<ServerAction>, DriverError> {
        let Some(opcode) = frame.header.opcode_enum() else {
            let payload = ErrorPayload {
                code: ErrorPayload::VALIDATION_ERROR,
                event: frame.header.opcode(),
                message: format!("unknown opcode {:#06x}", frame.header.opcode()),
            };
            return Ok(self.error_actions(session_id, payload));
        };

        match opcode {
            Opcode::Hello | Opcode::Ping | Opcode::Pong | Opcode::Goodbye => {
                self.handle_session_frame(session_id, opcode, frame)
            },

            Opcode::UpdateLocation => Ok(self.handle_update_location(session_id, frame)),

            Opcode::ApplyQuizGame
            | Opcode::AcceptGame
            | Opcode::RejectGame
            | Opcode::QuitGame
            | Opcode::SendQuizAnswer
            | Opcode::VerifyAnswer
            | Opcode::SendMessage => Ok(self.handle_game_frame(session_id, opcode, frame)),

            // Server-to-client opcodes arriving inbound are protocol abuse.
            _ => Ok(self.error_actions(
                session_id,
                ErrorPayload::validation(opcode, "event is not accepted from clients"),
            )),
        }
    }

    /// Route a session-layer frame through the connection state machine.
    ///
    /// Completing the handshake registers the session; a duplicate login
    /// evicts the prior session (last writer wins) and tears down any room
    /// the evicted session was in.
    fn handle_session_frame(
        &mut self,
        session_id: u64,
        opcode: Opcode,
        frame: &Frame,
    ) -> Result<Vec<ServerAction>, DriverError> {
        let now = self.env.now();
        let mut actions = Vec::new();

        let conn = self
            .connections
            .get_mut(&session_id)
            .ok_or(DriverError::SessionNotFound(session_id))?;

        let was_authenticated = conn.is_authenticated();

        let conn_result = conn.handle_frame(frame, now);
        let newly_authenticated = !was_authenticated && conn.is_authenticated();
        let user_id = conn.user_id();

        match conn_result {
            Ok(conn_actions) => {
                for action in conn_actions {
                    match action {
                        ConnectionAction::SendFrame(f) => {
                            actions.push(ServerAction::SendToSession {
                                session_id,
                                frame: self.stamp(f),
                            });
                        },
                        ConnectionAction::Close { reason } => {
                            actions.push(ServerAction::CloseConnection { session_id, reason });
                        },
                    }
                }
            },
            Err(err) => {
                // Session-layer violations surface as a structured error
                // frame, then the connection is closed.
                actions.extend(self.error_actions(
                    session_id,
                    ErrorPayload::validation(opcode, err.to_string()),
                ));
                actions.push(ServerAction::CloseConnection {
                    session_id,
                    reason: err.to_string(),
                });
                if let Some(conn) = self.connections.get_mut(&session_id) {
                    conn.close();
                }
                return Ok(actions);
            },
        }

        if newly_authenticated {
            // INVARIANT: an authenticated connection always has a user id;
            // the handshake is the only path to the Authenticated state.
            let Some(user_id) = user_id else {
                return Err(DriverError::Protocol(
                    "authenticated connection without user id".to_string(),
                ));
            };

            if let Some(evicted) = self.registry.register(session_id, user_id) {
                actions.push(ServerAction::CloseConnection {
                    session_id: evicted.session_id,
                    reason: "superseded by a newer login".to_string(),
                });

                // The evicted session may have been mid-game; its room is
                // torn down exactly as if it had quit.
                if let Some(room_id) = evicted.room {
                    let events = self
                        .rooms
                        .quit_game(&mut self.registry, room_id, user_id)
                        .unwrap_or_default();
                    actions.extend(self.convert_room_events(&events));
                }
            }

            actions.push(ServerAction::Log {
                level: LogLevel::Info,
                message: format!("user {user_id} authenticated on session {session_id}"),
            });
        }

        Ok(actions)
    }

    /// Handle a location update: mutate the session, fan out to everyone.
    fn handle_update_location(&mut self, session_id: u64, frame: &Frame) -> Vec<ServerAction> {
        let opcode = Opcode::UpdateLocation;

        let Some(user_id) = self.authenticated_user(session_id) else {
            return self.error_actions(
                session_id,
                ErrorPayload::validation(opcode, "handshake not complete"),
            );
        };

        let update = match Payload::from_frame(frame) {
            Ok(Payload::UpdateLocation(update)) => update,
            Ok(_) | Err(_) => {
                return self.error_actions(
                    session_id,
                    ErrorPayload::validation(opcode, "malformed location payload"),
                );
            },
        };

        if !update.lat.is_finite()
            || !update.lon.is_finite()
            || !(-90.0..=90.0).contains(&update.lat)
            || !(-180.0..=180.0).contains(&update.lon)
        {
            return self.error_actions(
                session_id,
                ErrorPayload::validation(opcode, "coordinates out of range"),
            );
        }

        // Unknown user here means the update raced a disconnect: drop it
        // silently per the registry contract.
        let has_recent_message =
            match self.registry.update_location(user_id, update.lat, update.lon) {
                Some(session) => session.has_recent_message(),
                None => {
                    return vec![ServerAction::Log {
                        level: LogLevel::Debug,
                        message: format!(
                            "location update from unregistered user {user_id} dropped"
                        ),
                    }];
                },
            };

        let broadcast = Payload::Location(map::Location {
            user_id,
            lat: update.lat,
            lon: update.lon,
            has_recent_message,
        });

        match self.build_frame(broadcast, 0) {
            Ok(frame) => vec![ServerAction::Broadcast { frame }],
            Err(e) => vec![ServerAction::Log {
                level: LogLevel::Error,
                message: format!("failed to encode location broadcast: {e}"),
            }],
        }
    }

    /// Route a game-level frame to the room lifecycle manager.
    fn handle_game_frame(
        &mut self,
        session_id: u64,
        opcode: Opcode,
        frame: &Frame,
    ) -> Vec<ServerAction> {
        let Some(user_id) = self.authenticated_user(session_id) else {
            return self.error_actions(
                session_id,
                ErrorPayload::validation(opcode, "handshake not complete"),
            );
        };

        let room_id = frame.header.room_id();

        let payload = match Payload::from_frame(frame) {
            Ok(payload) => payload,
            Err(e) => {
                return self
                    .error_actions(session_id, ErrorPayload::validation(opcode, e.to_string()));
            },
        };

        let result: Result<Vec<RoomEvent>, GameError> = match payload {
            Payload::ApplyQuizGame(apply) => self.rooms.apply_game(
                &self.registry,
                user_id,
                apply.opponent_user_id,
                &self.env,
            ),
            Payload::AcceptGame => self.rooms.accept_game(
                &mut self.registry,
                user_id,
                &mut self.questions,
                &self.env,
            ),
            Payload::RejectGame => self.rooms.reject_game(user_id),
            Payload::QuitGame => self.rooms.quit_game(&mut self.registry, room_id, user_id),
            Payload::SendQuizAnswer(submit) => {
                self.rooms.submit_answer(room_id, user_id, submit.answer, &self.env)
            },
            Payload::VerifyAnswer(verify) => self.rooms.verify_answer(
                &mut self.registry,
                room_id,
                user_id,
                verify.correct,
                &mut self.questions,
            ),
            Payload::SendMessage(message) => {
                self.rooms.send_message(&mut self.registry, room_id, user_id, message.text)
            },
            _ => Err(GameError::Validation("payload does not match opcode".to_string())),
        };

        match result {
            Ok(events) => self.convert_room_events(&events),
            Err(err) => self.error_actions(session_id, game_error_payload(opcode, &err)),
        }
    }

    /// Handle a connection being closed: run the disconnect cascade.
    ///
    /// A disconnect is not an error - any room the session was in is torn
    /// down exactly as if the user had quit, and pending invitations are
    /// withdrawn. No cleanup step is skipped even under abrupt loss.
    fn handle_connection_closed(&mut self, session_id: u64, reason: &str) -> Vec<ServerAction> {
        let mut actions = Vec::new();

        if let Some(mut conn) = self.connections.remove(&session_id) {
            conn.close();
        }

        // None here means the handle was never authenticated or was already
        // evicted by a newer login; either way there is nothing to cascade.
        if let Some((user_id, room)) = self.registry.unregister(session_id) {
            let events = self.rooms.handle_disconnect(&mut self.registry, user_id, room);
            actions.extend(self.convert_room_events(&events));

            actions.push(ServerAction::Log {
                level: LogLevel::Info,
                message: format!(
                    "session {session_id} (user {user_id}) closed: {reason}, was in {} room(s)",
                    usize::from(room.is_some())
                ),
            });
        } else {
            actions.push(ServerAction::Log {
                level: LogLevel::Debug,
                message: format!("unauthenticated session {session_id} closed: {reason}"),
            });
        }

        actions
    }

    /// Handle the periodic tick: connection timeouts, heartbeats, and
    /// invitation expiry.
    fn handle_tick(&mut self) -> Vec<ServerAction> {
        let now = self.env.now();
        let mut actions = Vec::new();

        let session_ids: Vec<u64> = self.connections.keys().copied().collect();

        for session_id in session_ids {
            let Some(conn) = self.connections.get_mut(&session_id) else {
                continue;
            };

            for action in conn.tick(now) {
                match action {
                    ConnectionAction::SendFrame(f) => {
                        actions.push(ServerAction::SendToSession {
                            session_id,
                            frame: self.stamp(f),
                        });
                    },
                    ConnectionAction::Close { reason } => {
                        actions.push(ServerAction::CloseConnection { session_id, reason });
                    },
                }
            }
        }

        let events = self.rooms.expire_invitations(&self.env);
        actions.extend(self.convert_room_events(&events));

        actions
    }

    /// Translate domain events into outbound frames.
    fn convert_room_events(&self, events: &[RoomEvent]) -> Vec<ServerAction> {
        let mut actions = Vec::new();

        for event in events {
            match event {
                RoomEvent::Invited { inviter, invitee } => {
                    let payload =
                        Payload::GameInvited(game::GameInvited { inviter_id: *inviter });
                    self.push_to_user(&mut actions, *invitee, payload, 0);
                },

                RoomEvent::Accepted { room_id, host, guest } => {
                    let to_host =
                        Payload::GameAccepted(game::GameAccepted { opponent_id: *guest });
                    let to_guest =
                        Payload::GameAccepted(game::GameAccepted { opponent_id: *host });
                    self.push_to_user(&mut actions, *host, to_host, *room_id);
                    self.push_to_user(&mut actions, *guest, to_guest, *room_id);
                },

                RoomEvent::Rejected { inviter, invitee } => {
                    let payload =
                        Payload::GameRejected(game::GameRejected { invitee_id: *invitee });
                    self.push_to_user(&mut actions, *inviter, payload, 0);
                },

                RoomEvent::QuestionDealt { room_id, participants, answerer, question } => {
                    for user in participants {
                        let payload = Payload::Question(game::Question {
                            index: question.index,
                            total: question.total,
                            text: question.text.clone(),
                            answerer_id: *answerer,
                        });
                        self.push_to_user(&mut actions, *user, payload, *room_id);
                    }
                },

                RoomEvent::AnswerRelayed { room_id, verifier, answerer, answer } => {
                    let payload = Payload::AnswerSubmitted(game::AnswerSubmitted {
                        user_id: *answerer,
                        answer: answer.clone(),
                    });
                    self.push_to_user(&mut actions, *verifier, payload, *room_id);
                },

                RoomEvent::ScoreBoard { room_id, participants, scores, match_over } => {
                    for user in participants {
                        let payload = Payload::ScoreBoard(game::ScoreBoard {
                            scores: scores
                                .iter()
                                .map(|&(user_id, score)| game::ScoreEntry { user_id, score })
                                .collect(),
                            match_over: *match_over,
                        });
                        self.push_to_user(&mut actions, *user, payload, *room_id);
                    }
                },

                RoomEvent::Ended { room_id, notify, by } => {
                    let payload = Payload::GameQuit(game::GameQuit { user_id: *by });
                    self.push_to_user(&mut actions, *notify, payload, *room_id);
                },

                RoomEvent::Chat { room_id, to, sender, text } => {
                    let payload = Payload::Message(chat::Message {
                        sender_id: *sender,
                        text: text.clone(),
                    });
                    self.push_to_user(&mut actions, *to, payload, *room_id);
                },

                RoomEvent::MatchFinished {
                    room_id,
                    participants,
                    scores,
                    questions_completed,
                } => {
                    let summary = MatchSummary {
                        room_id: *room_id,
                        participants: *participants,
                        scores: *scores,
                        questions_completed: *questions_completed,
                        ended_at_millis: self.env.wall_clock_millis(),
                    };

                    // The protocol never depends on this write succeeding.
                    if let Err(e) = self.archive.record(summary) {
                        actions.push(ServerAction::Log {
                            level: LogLevel::Warn,
                            message: format!("match archive write failed: {e}"),
                        });
                    }
                },
            }
        }

        actions
    }

    /// Queue a frame to one user's session; offline users are skipped
    /// (delivery is best-effort).
    fn push_to_user(
        &self,
        actions: &mut Vec<ServerAction>,
        user_id: u64,
        payload: Payload,
        room_id: u128,
    ) {
        let opcode = payload.opcode();

        match self.build_frame(payload, room_id) {
            Ok(frame) => {
                if let Some(session_id) = self.registry.session_id_for_user(user_id) {
                    actions.push(ServerAction::SendToSession { session_id, frame });
                } else {
                    actions.push(ServerAction::Log {
                        level: LogLevel::Debug,
                        message: format!("user {user_id} offline, dropping {opcode:?}"),
                    });
                }
            },
            Err(e) => {
                actions.push(ServerAction::Log {
                    level: LogLevel::Error,
                    message: format!("failed to encode {opcode:?}: {e}"),
                });
            },
        }
    }

    /// Build a structured error response plus its warning log line.
    fn error_actions(&self, session_id: u64, payload: ErrorPayload) -> Vec<ServerAction> {
        let log = ServerAction::Log {
            level: LogLevel::Warn,
            message: format!(
                "rejected event {:#06x} from session {session_id}: {}",
                payload.event, payload.message
            ),
        };

        match self.build_frame(Payload::Error(payload), 0) {
            Ok(frame) => vec![ServerAction::SendToSession { session_id, frame }, log],
            Err(e) => vec![ServerAction::Log {
                level: LogLevel::Error,
                message: format!("failed to encode error response: {e}"),
            }],
        }
    }

    /// Build an outbound frame with room id and timestamp stamped.
    fn build_frame(
        &self,
        payload: Payload,
        room_id: u128,
    ) -> Result<Frame, geoduel_proto::ProtocolError> {
        let mut header = FrameHeader::new(payload.opcode());
        header.set_room_id(room_id);
        header.set_timestamp(self.env.wall_clock_millis());
        payload.into_frame(header)
    }

    /// Stamp the send time onto a frame built elsewhere.
    fn stamp(&self, mut frame: Frame) -> Frame {
        frame.header.set_timestamp(self.env.wall_clock_millis());
        frame
    }

    /// The authenticated user behind a session, if the handshake completed.
    fn authenticated_user(&self, session_id: u64) -> Option<u64> {
        self.connections.get(&session_id).and_then(Connection::user_id)
    }

    /// Live user sessions (read-only).
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Room lifecycle state (read-only).
    pub fn rooms(&self) -> &RoomManager<E> {
        &self.rooms
    }

    /// Finished-match sink (read-only).
    pub fn archive(&self) -> &A {
        &self.archive
    }

    /// Connection handles of every registered session (broadcast targets).
    pub fn session_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.registry.session_ids()
    }

    /// Number of live connections (including unauthenticated ones).
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

/// Map a recoverable game error onto its wire error payload.
fn game_error_payload(event: Opcode, err: &GameError) -> ErrorPayload {
    match err {
        GameError::TargetBusy(user_id) => ErrorPayload::target_busy(event, *user_id),
        GameError::TargetOffline(user_id) => ErrorPayload::target_offline(event, *user_id),
        GameError::NoPendingInvitation(_) => ErrorPayload::no_pending_invitation(event),
        GameError::NotInRoom { room_id, .. } => ErrorPayload::not_in_room(event, *room_id),
        GameError::StaleSubmission(room_id) => ErrorPayload::stale_submission(event, *room_id),
        GameError::Unauthorized { room_id, .. } => ErrorPayload::unauthorized(event, *room_id),
        GameError::Validation(message) => ErrorPayload::validation(event, message.clone()),
    }
}

impl<E, Q, A> std::fmt::Debug for ServerDriver<E, Q, A>
where
    E: Environment,
    Q: QuestionSource,
    A: MatchArchive,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerDriver")
            .field("connection_count", &self.connections.len())
            .field("session_count", &self.registry.len())
            .field("rooms", &self.rooms)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicU64, Ordering},
        },
        time::{Duration, Instant},
    };

    use geoduel_core::FixedDeck;
    use geoduel_proto::payloads::session::Hello;

    use super::*;
    use crate::archive::MemoryArchive;

    #[derive(Clone)]
    struct TestEnv {
        counter: Arc<AtomicU64>,
    }

    impl TestEnv {
        fn new() -> Self {
            Self { counter: Arc::new(AtomicU64::new(1)) }
        }
    }

    impl Environment for TestEnv {
        type Instant = Instant;

        #[allow(clippy::disallowed_methods)]
        fn now(&self) -> Instant {
            Instant::now()
        }

        fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            async {}
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            let seed = self.counter.fetch_add(1, Ordering::Relaxed);
            for (i, byte) in buffer.iter_mut().enumerate() {
                *byte = (seed as u8).wrapping_add(i as u8);
            }
        }

        fn wall_clock_millis(&self) -> u64 {
            1_700_000_000_000
        }
    }

    type TestDriver = ServerDriver<TestEnv, FixedDeck, MemoryArchive>;

    fn driver() -> TestDriver {
        ServerDriver::new(
            TestEnv::new(),
            FixedDeck::with_match_length(2),
            MemoryArchive::new(),
            ServerConfig::default(),
        )
    }

    fn hello_frame(user_id: u64) -> Frame {
        Payload::Hello(Hello { version: 1, user_id, auth_token: None })
            .into_frame(FrameHeader::new(Opcode::Hello))
            .unwrap()
    }

    fn connect(driver: &mut TestDriver, session_id: u64, user_id: u64) {
        driver.process_event(ServerEvent::ConnectionAccepted { session_id }).unwrap();
        driver
            .process_event(ServerEvent::FrameReceived {
                session_id,
                frame: hello_frame(user_id),
            })
            .unwrap();
    }

    #[test]
    fn accepts_connection() {
        let mut driver = driver();

        let actions =
            driver.process_event(ServerEvent::ConnectionAccepted { session_id: 1 }).unwrap();

        assert_eq!(driver.connection_count(), 1);
        assert!(matches!(actions[0], ServerAction::Log { level: LogLevel::Debug, .. }));
    }

    #[test]
    fn rejects_when_max_connections_exceeded() {
        let mut driver = ServerDriver::new(
            TestEnv::new(),
            FixedDeck::default(),
            MemoryArchive::new(),
            ServerConfig { max_connections: 2, ..Default::default() },
        );

        driver.process_event(ServerEvent::ConnectionAccepted { session_id: 1 }).unwrap();
        driver.process_event(ServerEvent::ConnectionAccepted { session_id: 2 }).unwrap();

        let actions =
            driver.process_event(ServerEvent::ConnectionAccepted { session_id: 3 }).unwrap();

        assert_eq!(driver.connection_count(), 2);
        assert!(matches!(actions[0], ServerAction::CloseConnection { .. }));
    }

    #[test]
    fn handshake_registers_the_session() {
        let mut driver = driver();
        connect(&mut driver, 1, 42);

        assert_eq!(driver.registry().session_id_for_user(42), Some(1));
    }

    #[test]
    fn duplicate_login_closes_the_old_connection() {
        let mut driver = driver();
        connect(&mut driver, 1, 42);

        driver.process_event(ServerEvent::ConnectionAccepted { session_id: 2 }).unwrap();
        let actions = driver
            .process_event(ServerEvent::FrameReceived { session_id: 2, frame: hello_frame(42) })
            .unwrap();

        assert!(actions.iter().any(|a| matches!(
            a,
            ServerAction::CloseConnection { session_id: 1, .. }
        )));
        assert_eq!(driver.registry().session_id_for_user(42), Some(2));
    }

    #[test]
    fn game_frame_before_handshake_is_rejected() {
        let mut driver = driver();
        driver.process_event(ServerEvent::ConnectionAccepted { session_id: 1 }).unwrap();

        let frame = Payload::ApplyQuizGame(game::ApplyQuizGame { opponent_user_id: 9 })
            .into_frame(FrameHeader::new(Opcode::ApplyQuizGame))
            .unwrap();
        let actions =
            driver.process_event(ServerEvent::FrameReceived { session_id: 1, frame }).unwrap();

        let frame = sent_frame(&actions, 1);
        let payload = Payload::from_frame(frame).unwrap();
        match payload {
            Payload::Error(err) => assert_eq!(err.code, ErrorPayload::VALIDATION_ERROR),
            other => panic!("expected Error payload, got {other:?}"),
        }
    }

    #[test]
    fn location_update_broadcasts_to_everyone() {
        let mut driver = driver();
        connect(&mut driver, 1, 42);
        connect(&mut driver, 2, 43);

        let frame = Payload::UpdateLocation(map::UpdateLocation { lat: 37.5, lon: 127.0 })
            .into_frame(FrameHeader::new(Opcode::UpdateLocation))
            .unwrap();
        let actions =
            driver.process_event(ServerEvent::FrameReceived { session_id: 1, frame }).unwrap();

        let ServerAction::Broadcast { frame } = &actions[0] else {
            panic!("expected Broadcast, got {:?}", actions[0]);
        };

        match Payload::from_frame(frame).unwrap() {
            Payload::Location(loc) => {
                assert_eq!(loc.user_id, 42);
                assert!(!loc.has_recent_message);
            },
            other => panic!("expected Location, got {other:?}"),
        }
    }

    #[test]
    fn out_of_range_coordinates_are_rejected() {
        let mut driver = driver();
        connect(&mut driver, 1, 42);

        let frame = Payload::UpdateLocation(map::UpdateLocation { lat: 99.0, lon: 0.0 })
            .into_frame(FrameHeader::new(Opcode::UpdateLocation))
            .unwrap();
        let actions =
            driver.process_event(ServerEvent::FrameReceived { session_id: 1, frame }).unwrap();

        let frame = sent_frame(&actions, 1);
        match Payload::from_frame(frame).unwrap() {
            Payload::Error(err) => {
                assert_eq!(err.code, ErrorPayload::VALIDATION_ERROR);
                assert_eq!(err.event, Opcode::UpdateLocation.to_u16());
            },
            other => panic!("expected Error, got {other:?}"),
        }
    }

    /// First frame sent to the given session among the actions.
    fn sent_frame(actions: &[ServerAction], session: u64) -> &Frame {
        actions
            .iter()
            .find_map(|a| match a {
                ServerAction::SendToSession { session_id, frame } if *session_id == session => {
                    Some(frame)
                },
                _ => None,
            })
            .expect("expected a frame sent to the session")
    }
}
