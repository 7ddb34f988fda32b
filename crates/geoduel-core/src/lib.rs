//! GeoDuel protocol core.
//!
//! Sans-IO domain logic for the realtime session and room-lifecycle
//! protocol: the session registry, the per-connection session-layer state
//! machine, the room lifecycle manager with its invitation handshake, the
//! per-room quiz state machine, and the in-room message relay.
//!
//! # Design
//!
//! Every operation is a pure transition: `(state, input) -> (state',
//! events)`. Nothing in this crate performs I/O, spawns tasks, or reads the
//! clock - time and randomness come in through the [`env::Environment`]
//! trait, and outbound traffic leaves as [`rooms::RoomEvent`] /
//! [`connection::ConnectionAction`] values for a driver to execute. This
//! keeps the state machines deterministic and testable without a live
//! transport.
//!
//! # Shared state
//!
//! The [`session::SessionRegistry`] and the [`rooms::RoomManager`]'s
//! active-room set are the only shared mutable resources; all mutation
//! passes through their narrow contracts. No other component holds a direct
//! mutable reference to a session or room.

pub mod connection;
pub mod env;
pub mod error;
pub mod quiz;
pub mod room;
pub mod rooms;
pub mod session;

pub use connection::{Connection, ConnectionAction, ConnectionConfig, ConnectionState};
pub use env::Environment;
pub use error::{ConnectionError, GameError};
pub use quiz::{FixedDeck, Question, QuestionSource};
pub use room::{AnswerOutcome, AnswerRecord, ChatLine, QuizPhase, Room, RoomState, Verdict};
pub use rooms::{RoomConfig, RoomEvent, RoomManager};
pub use session::{EvictedSession, Location, Session, SessionRegistry};
