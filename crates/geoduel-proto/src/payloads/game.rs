//! Game lifecycle and quiz payload types.
//!
//! Room-scoped frames (`QuitGame`, quiz traffic, scoreboard) carry the room
//! id in the frame header; the payloads here hold only the fields the
//! header cannot express.

use serde::{Deserialize, Serialize};

/// Client invites another user to a quiz duel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyQuizGame {
    /// User id of the desired opponent.
    pub opponent_user_id: u64,
}

/// Server notifies the invitee of a pending invitation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameInvited {
    /// User who sent the invitation.
    pub inviter_id: u64,
}

/// Server notifies both participants that the room was created.
///
/// The new room id travels in the frame header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameAccepted {
    /// The other participant of the room, from the receiver's perspective.
    pub opponent_id: u64,
}

/// Server notifies the inviter that the invitation was declined or expired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRejected {
    /// User who declined (or let the invitation expire).
    pub invitee_id: u64,
}

/// Server notifies the remaining participant that the room ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameQuit {
    /// User whose quit or disconnect ended the room.
    pub user_id: u64,
}

/// The current question, dealt to both participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Zero-based question index within the match.
    pub index: u32,
    /// Total number of questions in the match.
    pub total: u32,
    /// Question text.
    pub text: String,
    /// User designated to answer this question.
    pub answerer_id: u64,
}

/// Participant submits an answer for the current question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendQuizAnswer {
    /// Submitted answer text.
    pub answer: String,
}

/// Server relays the accepted answer to the verifying participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerSubmitted {
    /// Participant the answer came from.
    pub user_id: u64,
    /// The submitted answer text.
    pub answer: String,
}

/// Verifier judges the submitted answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyAnswer {
    /// `true` if the verifier accepts the answer as correct.
    pub correct: bool,
}

/// One participant's running score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreEntry {
    /// Participant the score belongs to.
    pub user_id: u64,
    /// Number of correctly answered questions.
    pub score: u32,
}

/// Score tally published to both participants after each verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBoard {
    /// Both participants' scores.
    pub scores: Vec<ScoreEntry>,
    /// `true` on the final scoreboard of the match.
    pub match_over: bool,
}
