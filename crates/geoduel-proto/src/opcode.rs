//! Operation codes for frame routing.

/// Frame operation code.
///
/// The opcode lives in the raw header so routing decisions never require
/// payload deserialization. Opcodes are grouped by layer:
///
/// - `0x000x` session management
/// - `0x001x` map / location broadcast
/// - `0x002x` game invitation and room lifecycle
/// - `0x003x` quiz state machine
/// - `0x004x` in-room chat
/// - `0x00FF` structured error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    /// Client handshake carrying the externally-issued identity
    Hello = 0x0001,
    /// Server handshake response with the assigned session id
    HelloReply = 0x0002,
    /// Graceful disconnect
    Goodbye = 0x0003,
    /// Keepalive probe
    Ping = 0x0004,
    /// Keepalive response
    Pong = 0x0005,

    /// Client reports its current coordinates
    UpdateLocation = 0x0010,
    /// Server fans a user's coordinates out to every session
    Location = 0x0011,

    /// Client invites another user to a quiz duel
    ApplyQuizGame = 0x0020,
    /// Server notifies the invitee of a pending invitation
    GameInvited = 0x0021,
    /// Invitee accepts the pending invitation
    AcceptGame = 0x0022,
    /// Invitee rejects the pending invitation
    RejectGame = 0x0023,
    /// Server notifies both participants that the room was created
    GameAccepted = 0x0024,
    /// Server notifies the inviter that the invitation was declined
    GameRejected = 0x0025,
    /// Participant leaves the room
    QuitGame = 0x0026,
    /// Server notifies the remaining participant that the room ended
    GameQuit = 0x0027,

    /// Server deals the current question to both participants
    Question = 0x0030,
    /// Participant submits an answer for the current question
    SendQuizAnswer = 0x0031,
    /// Server relays the accepted answer to the verifying participant
    AnswerSubmitted = 0x0032,
    /// Verifier judges the submitted answer
    VerifyAnswer = 0x0033,
    /// Server publishes the score tally to both participants
    ScoreBoard = 0x0034,

    /// Participant sends an in-room chat message
    SendMessage = 0x0040,
    /// Server relays a chat message to the other participant
    Message = 0x0041,

    /// Structured error response naming the failing event
    Error = 0x00FF,
}

impl Opcode {
    /// Raw wire value of this opcode.
    #[must_use]
    pub const fn to_u16(self) -> u16 {
        self as u16
    }

    /// Parse a wire value. `None` for unrecognized opcodes.
    #[must_use]
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(Self::Hello),
            0x0002 => Some(Self::HelloReply),
            0x0003 => Some(Self::Goodbye),
            0x0004 => Some(Self::Ping),
            0x0005 => Some(Self::Pong),
            0x0010 => Some(Self::UpdateLocation),
            0x0011 => Some(Self::Location),
            0x0020 => Some(Self::ApplyQuizGame),
            0x0021 => Some(Self::GameInvited),
            0x0022 => Some(Self::AcceptGame),
            0x0023 => Some(Self::RejectGame),
            0x0024 => Some(Self::GameAccepted),
            0x0025 => Some(Self::GameRejected),
            0x0026 => Some(Self::QuitGame),
            0x0027 => Some(Self::GameQuit),
            0x0030 => Some(Self::Question),
            0x0031 => Some(Self::SendQuizAnswer),
            0x0032 => Some(Self::AnswerSubmitted),
            0x0033 => Some(Self::VerifyAnswer),
            0x0034 => Some(Self::ScoreBoard),
            0x0040 => Some(Self::SendMessage),
            0x0041 => Some(Self::Message),
            0x00FF => Some(Self::Error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: &[Opcode] = &[
        Opcode::Hello,
        Opcode::HelloReply,
        Opcode::Goodbye,
        Opcode::Ping,
        Opcode::Pong,
        Opcode::UpdateLocation,
        Opcode::Location,
        Opcode::ApplyQuizGame,
        Opcode::GameInvited,
        Opcode::AcceptGame,
        Opcode::RejectGame,
        Opcode::GameAccepted,
        Opcode::GameRejected,
        Opcode::QuitGame,
        Opcode::GameQuit,
        Opcode::Question,
        Opcode::SendQuizAnswer,
        Opcode::AnswerSubmitted,
        Opcode::VerifyAnswer,
        Opcode::ScoreBoard,
        Opcode::SendMessage,
        Opcode::Message,
        Opcode::Error,
    ];

    #[test]
    fn opcode_round_trip() {
        for &opcode in ALL {
            assert_eq!(Opcode::from_u16(opcode.to_u16()), Some(opcode));
        }
    }

    #[test]
    fn unknown_opcode_rejected() {
        assert_eq!(Opcode::from_u16(0xBEEF), None);
        assert_eq!(Opcode::from_u16(0x0000), None);
    }
}
