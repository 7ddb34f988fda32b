//! CBOR-encoded protocol messages.
//!
//! Frame headers are raw binary for routing performance; payloads use CBOR
//! for type safety and forward compatibility. The [`Payload`] enum covers
//! every message type: session management, location broadcast, game
//! lifecycle, quiz traffic, chat, and structured errors.
//!
//! # Invariants
//!
//! Each payload variant maps to exactly one opcode (enforced by match
//! exhaustiveness). The variant discriminator is NOT serialized - the frame
//! header's opcode identifies the payload type, which prevents mismatched
//! opcode/payload pairs. Round-trip encoding must produce identical values.

pub mod chat;
pub mod game;
pub mod map;
pub mod session;

use bytes::BufMut;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    Frame, FrameHeader, Opcode,
    errors::{ProtocolError, Result},
};

/// All possible frame payloads.
///
/// Zero-byte payloads (`Ping`, `Pong`, `AcceptGame`, `RejectGame`,
/// `QuitGame`) are unit variants; for the latter three the room context
/// travels in the frame header.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    // Session management
    /// Initial handshake with the externally-issued identity
    Hello(session::Hello),
    /// Server response to Hello
    HelloReply(session::HelloReply),
    /// Graceful disconnect
    Goodbye(session::Goodbye),
    /// Keepalive probe
    Ping,
    /// Keepalive response
    Pong,

    // Location broadcast
    /// Client coordinate report
    UpdateLocation(map::UpdateLocation),
    /// Server coordinate fan-out
    Location(map::Location),

    // Game lifecycle
    /// Invite another user to a duel
    ApplyQuizGame(game::ApplyQuizGame),
    /// Pending invitation notice to the invitee
    GameInvited(game::GameInvited),
    /// Invitee accepts the pending invitation
    AcceptGame,
    /// Invitee rejects the pending invitation
    RejectGame,
    /// Room created notice to both participants
    GameAccepted(game::GameAccepted),
    /// Invitation declined notice to the inviter
    GameRejected(game::GameRejected),
    /// Participant leaves the room
    QuitGame,
    /// Room ended notice to the remaining participant
    GameQuit(game::GameQuit),

    // Quiz
    /// Current question, dealt to both participants
    Question(game::Question),
    /// Answer submission for the current question
    SendQuizAnswer(game::SendQuizAnswer),
    /// Accepted answer relayed to the verifier
    AnswerSubmitted(game::AnswerSubmitted),
    /// Verifier's judgment of the submitted answer
    VerifyAnswer(game::VerifyAnswer),
    /// Score tally to both participants
    ScoreBoard(game::ScoreBoard),

    // Chat
    /// In-room chat message from a participant
    SendMessage(chat::SendMessage),
    /// Chat message relayed to the other participant
    Message(chat::Message),

    // Error frame
    /// Structured error response
    Error(ErrorPayload),
}

/// Error payload for error frames.
///
/// Every validation failure on an inbound event surfaces as one of these,
/// naming the failing event's opcode and an error code - never as a raw
/// unhandled failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Error code identifying the kind of failure.
    pub code: u16,
    /// Opcode of the inbound event that failed.
    pub event: u16,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorPayload {
    /// Target user is already in a room.
    pub const TARGET_BUSY: u16 = 0x0001;
    /// Target user has no live session.
    pub const TARGET_OFFLINE: u16 = 0x0002;
    /// No pending invitation names the caller.
    pub const NO_PENDING_INVITATION: u16 = 0x0003;
    /// Caller is not a participant of the room.
    pub const NOT_IN_ROOM: u16 = 0x0004;
    /// The room already moved past the submitted state.
    pub const STALE_SUBMISSION: u16 = 0x0005;
    /// Caller may not perform this room-scoped action.
    pub const UNAUTHORIZED: u16 = 0x0006;
    /// Malformed or invalid payload.
    pub const VALIDATION_ERROR: u16 = 0x0007;

    /// Create an error payload for a failing event.
    pub fn new(code: u16, event: Opcode, message: impl Into<String>) -> Self {
        Self { code, event: event.to_u16(), message: message.into() }
    }

    /// Target user is already in a room.
    pub fn target_busy(event: Opcode, user_id: u64) -> Self {
        Self::new(Self::TARGET_BUSY, event, format!("user {user_id} is already in a room"))
    }

    /// Target user has no live session.
    pub fn target_offline(event: Opcode, user_id: u64) -> Self {
        Self::new(Self::TARGET_OFFLINE, event, format!("user {user_id} is offline"))
    }

    /// No pending invitation names the caller.
    pub fn no_pending_invitation(event: Opcode) -> Self {
        Self::new(Self::NO_PENDING_INVITATION, event, "no pending invitation")
    }

    /// Caller is not a participant of the room.
    pub fn not_in_room(event: Opcode, room_id: u128) -> Self {
        Self::new(Self::NOT_IN_ROOM, event, format!("not a participant of room {room_id:032x}"))
    }

    /// The room already moved past the submitted state.
    pub fn stale_submission(event: Opcode, room_id: u128) -> Self {
        Self::new(
            Self::STALE_SUBMISSION,
            event,
            format!("stale submission for room {room_id:032x}"),
        )
    }

    /// Caller may not perform this room-scoped action.
    pub fn unauthorized(event: Opcode, room_id: u128) -> Self {
        Self::new(Self::UNAUTHORIZED, event, format!("unauthorized for room {room_id:032x}"))
    }

    /// Malformed or invalid payload.
    pub fn validation(event: Opcode, message: impl Into<String>) -> Self {
        Self::new(Self::VALIDATION_ERROR, event, message)
    }
}

fn to_cbor(value: &impl Serialize, dst: &mut impl BufMut) -> Result<()> {
    ciborium::ser::into_writer(value, dst.writer())
        .map_err(|e| ProtocolError::CborEncode(e.to_string()))
}

fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::CborDecode(e.to_string()))
}

impl Payload {
    /// Opcode corresponding to this payload type.
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Hello(_) => Opcode::Hello,
            Self::HelloReply(_) => Opcode::HelloReply,
            Self::Goodbye(_) => Opcode::Goodbye,
            Self::Ping => Opcode::Ping,
            Self::Pong => Opcode::Pong,
            Self::UpdateLocation(_) => Opcode::UpdateLocation,
            Self::Location(_) => Opcode::Location,
            Self::ApplyQuizGame(_) => Opcode::ApplyQuizGame,
            Self::GameInvited(_) => Opcode::GameInvited,
            Self::AcceptGame => Opcode::AcceptGame,
            Self::RejectGame => Opcode::RejectGame,
            Self::GameAccepted(_) => Opcode::GameAccepted,
            Self::GameRejected(_) => Opcode::GameRejected,
            Self::QuitGame => Opcode::QuitGame,
            Self::GameQuit(_) => Opcode::GameQuit,
            Self::Question(_) => Opcode::Question,
            Self::SendQuizAnswer(_) => Opcode::SendQuizAnswer,
            Self::AnswerSubmitted(_) => Opcode::AnswerSubmitted,
            Self::VerifyAnswer(_) => Opcode::VerifyAnswer,
            Self::ScoreBoard(_) => Opcode::ScoreBoard,
            Self::SendMessage(_) => Opcode::SendMessage,
            Self::Message(_) => Opcode::Message,
            Self::Error(_) => Opcode::Error,
        }
    }

    /// Encode the payload to a buffer.
    ///
    /// Serializes only the inner struct, NOT the variant tag - the frame
    /// header's opcode already identifies the payload type.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborEncode` if serialization fails
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        match self {
            Self::Hello(inner) => to_cbor(inner, dst),
            Self::HelloReply(inner) => to_cbor(inner, dst),
            Self::Goodbye(inner) => to_cbor(inner, dst),
            // Zero-byte payloads
            Self::Ping | Self::Pong | Self::AcceptGame | Self::RejectGame | Self::QuitGame => {
                Ok(())
            },
            Self::UpdateLocation(inner) => to_cbor(inner, dst),
            Self::Location(inner) => to_cbor(inner, dst),
            Self::ApplyQuizGame(inner) => to_cbor(inner, dst),
            Self::GameInvited(inner) => to_cbor(inner, dst),
            Self::GameAccepted(inner) => to_cbor(inner, dst),
            Self::GameRejected(inner) => to_cbor(inner, dst),
            Self::GameQuit(inner) => to_cbor(inner, dst),
            Self::Question(inner) => to_cbor(inner, dst),
            Self::SendQuizAnswer(inner) => to_cbor(inner, dst),
            Self::AnswerSubmitted(inner) => to_cbor(inner, dst),
            Self::VerifyAnswer(inner) => to_cbor(inner, dst),
            Self::ScoreBoard(inner) => to_cbor(inner, dst),
            Self::SendMessage(inner) => to_cbor(inner, dst),
            Self::Message(inner) => to_cbor(inner, dst),
            Self::Error(inner) => to_cbor(inner, dst),
        }
    }

    /// Decode a payload from bytes based on the opcode.
    ///
    /// Size validation happens BEFORE CBOR parsing so the parser never
    /// processes oversized inputs. Unknown opcodes are rejected rather than
    /// silently ignored.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::PayloadTooLarge` if bytes exceed the 64 KiB limit
    /// - `ProtocolError::CborDecode` if deserialization fails or the opcode
    ///   is unsupported
    pub fn decode(opcode: Opcode, bytes: &[u8]) -> Result<Self> {
        if bytes.len() > FrameHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: bytes.len(),
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }

        let payload = match opcode {
            Opcode::Hello => Self::Hello(from_cbor(bytes)?),
            Opcode::HelloReply => Self::HelloReply(from_cbor(bytes)?),
            Opcode::Goodbye => Self::Goodbye(from_cbor(bytes)?),
            Opcode::Ping => Self::Ping,
            Opcode::Pong => Self::Pong,
            Opcode::UpdateLocation => Self::UpdateLocation(from_cbor(bytes)?),
            Opcode::Location => Self::Location(from_cbor(bytes)?),
            Opcode::ApplyQuizGame => Self::ApplyQuizGame(from_cbor(bytes)?),
            Opcode::GameInvited => Self::GameInvited(from_cbor(bytes)?),
            Opcode::AcceptGame => Self::AcceptGame,
            Opcode::RejectGame => Self::RejectGame,
            Opcode::GameAccepted => Self::GameAccepted(from_cbor(bytes)?),
            Opcode::GameRejected => Self::GameRejected(from_cbor(bytes)?),
            Opcode::QuitGame => Self::QuitGame,
            Opcode::GameQuit => Self::GameQuit(from_cbor(bytes)?),
            Opcode::Question => Self::Question(from_cbor(bytes)?),
            Opcode::SendQuizAnswer => Self::SendQuizAnswer(from_cbor(bytes)?),
            Opcode::AnswerSubmitted => Self::AnswerSubmitted(from_cbor(bytes)?),
            Opcode::VerifyAnswer => Self::VerifyAnswer(from_cbor(bytes)?),
            Opcode::ScoreBoard => Self::ScoreBoard(from_cbor(bytes)?),
            Opcode::SendMessage => Self::SendMessage(from_cbor(bytes)?),
            Opcode::Message => Self::Message(from_cbor(bytes)?),
            Opcode::Error => Self::Error(from_cbor(bytes)?),
        };

        Ok(payload)
    }

    /// Convert the payload into a transport frame.
    ///
    /// Encodes the payload to CBOR, stamps the correct opcode into the
    /// header, and sets the payload size automatically.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborEncode` if serialization fails
    pub fn into_frame(self, mut header: FrameHeader) -> Result<Frame> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        header.opcode = self.opcode().to_u16().to_be_bytes();
        Ok(Frame::new(header, buf))
    }

    /// Parse a payload from a raw transport frame.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborDecode` if the opcode is invalid or
    ///   deserialization fails
    /// - `ProtocolError::PayloadTooLarge` if the payload exceeds the limit
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let opcode = frame.header.opcode_enum().ok_or_else(|| {
            ProtocolError::CborDecode(format!("invalid opcode: {:#06x}", frame.header.opcode()))
        })?;
        Self::decode(opcode, &frame.payload)
    }
}
