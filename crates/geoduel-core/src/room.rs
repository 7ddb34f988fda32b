//! A paired two-participant game room and its quiz sub-state machine.
//!
//! # State Machine
//!
//! ```text
//! ┌────────────────┐ answerer  ┌─────────────────┐ verify  ┌───────────┐
//! │ QuestionActive │──────────>│ AnswerSubmitted │────────>│ Verifying │
//! └────────────────┘ submits   └─────────────────┘         └─────┬─────┘
//!         ↑                                                      │
//!         │ next question                ┌─────────┐             │
//!         ├──────────────────────────────│ Scoring │<────────────┘
//!         │                              └────┬────┘
//!         │                                   │ deck exhausted
//!         │                              ┌────▼─────┐
//!         └─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ │ Finished │
//!                                        └──────────┘
//! ```
//!
//! `Verifying` and `Scoring` are traversed inside the atomic
//! `verify_answer` + `advance` pair - a room is never observable between
//! events in either state - but both exist in the enum so the transition
//! order is explicit and checkable.
//!
//! Concurrency is optimistic: the first submission or verification to
//! commit wins, and the loser observes [`GameError::StaleSubmission`]
//! instead of corrupting the room.

use std::collections::HashMap;

use crate::{error::GameError, quiz::Question};

/// Room lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomState {
    /// Match in progress.
    InGame,
    /// Terminal: quit, disconnect, or deck exhausted.
    Finished,
}

/// Quiz sub-state within an in-game room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizPhase {
    /// Waiting for the designated answerer to submit.
    QuestionActive,
    /// Answer recorded; waiting for the verifier's judgment.
    AnswerSubmitted,
    /// Judgment being applied (transient, inside `verify_answer`).
    Verifying,
    /// Score tallied (transient, before `advance`).
    Scoring,
    /// Match over.
    Finished,
}

/// Verification outcome of one answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOutcome {
    /// Awaiting the verifier.
    Pending,
    /// Verifier accepted the answer.
    Correct,
    /// Verifier rejected the answer.
    Incorrect,
}

/// One participant's submitted answer for the current question.
///
/// Cleared when the next question starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerRecord {
    /// Submitted answer text.
    pub answer: String,
    /// Submission time, Unix milliseconds.
    pub submitted_at: u64,
    /// Verification outcome.
    pub outcome: AnswerOutcome,
}

/// One line of the room's ephemeral chat transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine {
    /// Participant the message came from.
    pub sender_id: u64,
    /// Message text.
    pub text: String,
}

/// Result of a committed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    /// Participant whose answer was judged.
    pub answerer: u64,
    /// Whether the answer was accepted.
    pub correct: bool,
}

/// A two-participant quiz duel room.
///
/// # Invariants
///
/// - Exactly two distinct participants (host = inviter, guest = invitee),
///   fixed for the room's lifetime.
/// - The designated answerer is always a participant; the verifier is
///   always the other participant.
#[derive(Debug, Clone)]
pub struct Room {
    id: u128,
    host: u64,
    guest: u64,
    state: RoomState,
    phase: QuizPhase,
    question: Question,
    answerer: u64,
    answers: HashMap<u64, AnswerRecord>,
    scores: HashMap<u64, u32>,
    completed_questions: u32,
    transcript: Vec<ChatLine>,
}

impl Room {
    /// Create a room entering its first question.
    ///
    /// The host answers first; roles alternate each question.
    #[must_use]
    pub fn new(id: u128, host: u64, guest: u64, first_question: Question) -> Self {
        debug_assert_ne!(host, guest, "invariant: a room has two distinct participants");

        Self {
            id,
            host,
            guest,
            state: RoomState::InGame,
            phase: QuizPhase::QuestionActive,
            question: first_question,
            answerer: host,
            answers: HashMap::new(),
            scores: HashMap::from([(host, 0), (guest, 0)]),
            completed_questions: 0,
            transcript: Vec::new(),
        }
    }

    /// Room id.
    #[must_use]
    pub fn id(&self) -> u128 {
        self.id
    }

    /// Inviter.
    #[must_use]
    pub fn host(&self) -> u64 {
        self.host
    }

    /// Invitee.
    #[must_use]
    pub fn guest(&self) -> u64 {
        self.guest
    }

    /// Both participants, host first.
    #[must_use]
    pub fn participants(&self) -> [u64; 2] {
        [self.host, self.guest]
    }

    /// Whether `user_id` is one of the two participants.
    #[must_use]
    pub fn is_participant(&self, user_id: u64) -> bool {
        user_id == self.host || user_id == self.guest
    }

    /// The other participant. `None` if `user_id` is not a participant.
    #[must_use]
    pub fn other_participant(&self, user_id: u64) -> Option<u64> {
        if user_id == self.host {
            Some(self.guest)
        } else if user_id == self.guest {
            Some(self.host)
        } else {
            None
        }
    }

    /// Lifecycle state.
    #[must_use]
    pub fn state(&self) -> RoomState {
        self.state
    }

    /// Current quiz phase.
    #[must_use]
    pub fn phase(&self) -> QuizPhase {
        self.phase
    }

    /// Current question.
    #[must_use]
    pub fn question(&self) -> &Question {
        &self.question
    }

    /// Participant designated to answer the current question.
    #[must_use]
    pub fn answerer(&self) -> u64 {
        self.answerer
    }

    /// Participant designated to verify the current question.
    #[must_use]
    pub fn verifier(&self) -> u64 {
        if self.answerer == self.host { self.guest } else { self.host }
    }

    /// A participant's score. Zero for non-participants.
    #[must_use]
    pub fn score_of(&self, user_id: u64) -> u32 {
        self.scores.get(&user_id).copied().unwrap_or(0)
    }

    /// Both scores as `(user_id, score)` pairs, host first.
    #[must_use]
    pub fn scores(&self) -> [(u64, u32); 2] {
        [(self.host, self.score_of(self.host)), (self.guest, self.score_of(self.guest))]
    }

    /// The answer record a participant submitted for the current question.
    #[must_use]
    pub fn answer_of(&self, user_id: u64) -> Option<&AnswerRecord> {
        self.answers.get(&user_id)
    }

    /// Number of questions that have been fully verified.
    #[must_use]
    pub fn completed_questions(&self) -> u32 {
        self.completed_questions
    }

    /// Record an answer submission.
    ///
    /// Valid in `QuestionActive` and `AnswerSubmitted` (the non-designated
    /// participant may still be typing). The room advances to
    /// `AnswerSubmitted` when the designated answerer submits; the return
    /// value is `true` exactly then.
    ///
    /// # Errors
    ///
    /// - `GameError::NotInRoom` if `user_id` is not a participant
    /// - `GameError::StaleSubmission` if the room moved past
    ///   `AnswerSubmitted` for this question, the match is over, or this
    ///   participant already submitted (first accepted submission wins)
    pub fn submit_answer(
        &mut self,
        user_id: u64,
        answer: String,
        now_millis: u64,
    ) -> Result<bool, GameError> {
        if !self.is_participant(user_id) {
            return Err(GameError::NotInRoom { user_id, room_id: self.id });
        }

        if !matches!(self.phase, QuizPhase::QuestionActive | QuizPhase::AnswerSubmitted) {
            return Err(GameError::StaleSubmission(self.id));
        }

        if self.answers.contains_key(&user_id) {
            return Err(GameError::StaleSubmission(self.id));
        }

        self.answers.insert(user_id, AnswerRecord {
            answer,
            submitted_at: now_millis,
            outcome: AnswerOutcome::Pending,
        });

        if user_id == self.answerer && self.phase == QuizPhase::QuestionActive {
            self.phase = QuizPhase::AnswerSubmitted;
            return Ok(true);
        }

        Ok(false)
    }

    /// Apply the verifier's judgment to the designated answer.
    ///
    /// Traverses `Verifying` and `Scoring`; the caller must follow up with
    /// [`Room::advance`] to deal the next question or finish the match.
    ///
    /// # Errors
    ///
    /// - `GameError::Unauthorized` if the caller is not a participant, or
    ///   is the answerer judging their own answer. Room state unchanged.
    /// - `GameError::StaleSubmission` if no answer is awaiting judgment.
    pub fn verify_answer(&mut self, verifier: u64, correct: bool) -> Result<Verdict, GameError> {
        if !self.is_participant(verifier) || verifier == self.answerer {
            return Err(GameError::Unauthorized { user_id: verifier, room_id: self.id });
        }

        if self.phase != QuizPhase::AnswerSubmitted {
            return Err(GameError::StaleSubmission(self.id));
        }

        self.phase = QuizPhase::Verifying;

        // INVARIANT: AnswerSubmitted implies the designated answerer has a
        // pending record; submit_answer is the only way into that phase.
        let Some(record) = self.answers.get_mut(&self.answerer) else {
            debug_assert!(false, "invariant: AnswerSubmitted without an answer record");
            self.phase = QuizPhase::AnswerSubmitted;
            return Err(GameError::StaleSubmission(self.id));
        };

        record.outcome = if correct { AnswerOutcome::Correct } else { AnswerOutcome::Incorrect };

        self.phase = QuizPhase::Scoring;

        if correct {
            if let Some(score) = self.scores.get_mut(&self.answerer) {
                *score += 1;
            }
        }

        self.completed_questions += 1;

        Ok(Verdict { answerer: self.answerer, correct })
    }

    /// Move on after scoring: deal the next question or finish the match.
    ///
    /// Clears the answer records; the answerer role alternates. Only valid
    /// immediately after a committed [`Room::verify_answer`].
    pub fn advance(&mut self, next: Option<Question>) {
        debug_assert_eq!(self.phase, QuizPhase::Scoring, "advance follows verify_answer");

        self.answers.clear();

        match next {
            Some(question) => {
                self.question = question;
                self.answerer = self.verifier();
                self.phase = QuizPhase::QuestionActive;
            },
            None => {
                self.phase = QuizPhase::Finished;
                self.state = RoomState::Finished;
            },
        }
    }

    /// Terminally close the room (quit or disconnect).
    pub fn finish(&mut self) {
        self.state = RoomState::Finished;
        self.phase = QuizPhase::Finished;
    }

    /// Append a chat line to the ephemeral transcript.
    ///
    /// The transcript lives and dies with the room; it is never persisted.
    pub fn push_chat(&mut self, sender_id: u64, text: String) {
        self.transcript.push(ChatLine { sender_id, text });
    }

    /// The room's chat transcript so far.
    #[must_use]
    pub fn transcript(&self) -> &[ChatLine] {
        &self.transcript
    }
}
