//! Room lifecycle manager.
//!
//! Owns the invitation handshake and the active-room set, and drives the
//! per-room quiz state machine.
//!
//! ## Architecture
//!
//! ```text
//! ServerDriver
//!   ├─ Connections (session layer)
//!   ├─ SessionRegistry (who is online, where, in which room)
//!   └─ RoomManager (this module)
//!       ├─ pending invitations
//!       └─ active rooms (per-room quiz state machine)
//! ```
//!
//! ## Responsibilities
//!
//! 1. **Invitation handshake**: apply / accept / reject / expire, one
//!    pending invitation per ordered (inviter, invitee) pair
//! 2. **Room lifecycle**: create on acceptance, tear down on quit, match
//!    completion, or disconnect - all three paths share one teardown
//! 3. **Quiz routing**: submissions and verifications to the right room
//! 4. **Event generation**: return [`RoomEvent`]s for the driver to send
//!
//! Session room references are mutated exclusively here, through the
//! registry's narrow contract. Every operation is an atomic unit: two
//! transitions on the same room cannot interleave, and the loser of a race
//! observes a stale-state error instead of a corrupted room.

use std::{collections::HashMap, time::Duration};

use crate::{
    env::Environment,
    error::GameError,
    quiz::{Question, QuestionSource},
    room::Room,
    session::SessionRegistry,
};

/// Room lifecycle configuration.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// How long an invitation may stay pending before it expires.
    pub invite_timeout: Duration,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self { invite_timeout: Duration::from_secs(30) }
    }
}

/// A pending game invitation.
///
/// Transient: exists only between `apply_game` and accept/reject/expiry,
/// never stored once resolved.
#[derive(Debug, Clone)]
struct Invitation<I> {
    inviter: u64,
    invitee: u64,
    created_at: I,
}

/// Domain events produced by room operations.
///
/// The driver translates each event into outbound frames; the manager
/// itself never touches a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    /// Notify the invitee of a pending invitation.
    Invited {
        /// User who sent the invitation
        inviter: u64,
        /// User being invited
        invitee: u64,
    },

    /// Notify both participants that their room was created.
    Accepted {
        /// New room id
        room_id: u128,
        /// Inviter
        host: u64,
        /// Invitee
        guest: u64,
    },

    /// Notify the inviter that the invitation was declined or expired.
    Rejected {
        /// User whose invitation was declined
        inviter: u64,
        /// User who declined (or let it expire)
        invitee: u64,
    },

    /// Deal the current question to both participants.
    QuestionDealt {
        /// Room the question belongs to
        room_id: u128,
        /// Both participants
        participants: [u64; 2],
        /// Participant designated to answer
        answerer: u64,
        /// The question
        question: Question,
    },

    /// Relay the accepted answer to the verifying participant.
    AnswerRelayed {
        /// Room the answer belongs to
        room_id: u128,
        /// Participant who judges the answer
        verifier: u64,
        /// Participant the answer came from
        answerer: u64,
        /// Submitted answer text
        answer: String,
    },

    /// Publish the score tally to both participants.
    ScoreBoard {
        /// Room the scores belong to
        room_id: u128,
        /// Both participants
        participants: [u64; 2],
        /// `(user_id, score)` pairs, host first
        scores: [(u64, u32); 2],
        /// `true` on the final scoreboard of the match
        match_over: bool,
    },

    /// Notify the remaining participant that the room ended.
    Ended {
        /// Room that ended
        room_id: u128,
        /// Participant to notify
        notify: u64,
        /// Participant whose quit or disconnect ended the room
        by: u64,
    },

    /// Relay an in-room chat message to the other participant.
    Chat {
        /// Room the message belongs to
        room_id: u128,
        /// Receiving participant
        to: u64,
        /// Sending participant
        sender: u64,
        /// Message text
        text: String,
    },

    /// A match reached a terminal state; the archive boundary reacts to
    /// this (and only this) event.
    MatchFinished {
        /// Room that finished
        room_id: u128,
        /// Both participants
        participants: [u64; 2],
        /// Final `(user_id, score)` pairs, host first
        scores: [(u64, u32); 2],
        /// Number of fully verified questions
        questions_completed: u32,
    },
}

/// Owns pending invitations and the active-room set.
///
/// # Invariants
///
/// - Every room in the active set has exactly two distinct participants,
///   and each participant's session references that room.
/// - A user appears in at most one active room.
/// - At most one invitation per ordered (inviter, invitee) pair is pending.
pub struct RoomManager<E>
where
    E: Environment,
{
    /// Active rooms by id. Finished rooms are removed immediately.
    rooms: HashMap<u128, Room>,
    /// Pending invitations, oldest first.
    invitations: Vec<Invitation<E::Instant>>,
    /// Lifecycle configuration.
    config: RoomConfig,
}

impl<E> RoomManager<E>
where
    E: Environment,
{
    /// Create a new manager with the given configuration.
    #[must_use]
    pub fn new(config: RoomConfig) -> Self {
        Self { rooms: HashMap::new(), invitations: Vec::new(), config }
    }

    /// Look up an active room.
    #[must_use]
    pub fn room(&self, room_id: u128) -> Option<&Room> {
        self.rooms.get(&room_id)
    }

    /// Whether a room is in the active set.
    #[must_use]
    pub fn has_room(&self, room_id: u128) -> bool {
        self.rooms.contains_key(&room_id)
    }

    /// Number of active rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// All active rooms.
    pub fn active_rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    /// Number of pending invitations.
    #[must_use]
    pub fn pending_invitations(&self) -> usize {
        self.invitations.len()
    }

    /// Record an invitation from `inviter` to `invitee`.
    ///
    /// A second application for the same ordered pair replaces the pending
    /// invitation (no queueing).
    ///
    /// # Errors
    ///
    /// - `GameError::Validation` for a self-invitation
    /// - `GameError::TargetOffline` if the invitee has no live session
    /// - `GameError::TargetBusy` if either party is already in a room
    pub fn apply_game(
        &mut self,
        registry: &SessionRegistry,
        inviter: u64,
        invitee: u64,
        env: &E,
    ) -> Result<Vec<RoomEvent>, GameError> {
        if inviter == invitee {
            return Err(GameError::Validation("cannot invite yourself".to_string()));
        }

        let Some(target) = registry.get(invitee) else {
            return Err(GameError::TargetOffline(invitee));
        };

        if target.room().is_some() {
            return Err(GameError::TargetBusy(invitee));
        }

        if registry.get(inviter).is_some_and(|s| s.room().is_some()) {
            return Err(GameError::TargetBusy(inviter));
        }

        // Replace, never queue: one pending invitation per ordered pair.
        self.invitations.retain(|inv| !(inv.inviter == inviter && inv.invitee == invitee));
        self.invitations.push(Invitation { inviter, invitee, created_at: env.now() });

        tracing::debug!(inviter, invitee, "game invitation recorded");

        Ok(vec![RoomEvent::Invited { inviter, invitee }])
    }

    /// Accept the most recent pending invitation naming `invitee`.
    ///
    /// Creates the room, sets both sessions' room references, and deals the
    /// first question. The invitation is consumed even when acceptance
    /// fails a precondition - it was resolved either way.
    ///
    /// # Errors
    ///
    /// - `GameError::NoPendingInvitation` if none names the invitee
    /// - `GameError::TargetOffline` if the inviter disconnected meanwhile
    /// - `GameError::TargetBusy` if either party entered a room meanwhile
    /// - `GameError::Validation` if the question source is empty
    pub fn accept_game(
        &mut self,
        registry: &mut SessionRegistry,
        invitee: u64,
        source: &mut dyn QuestionSource,
        env: &E,
    ) -> Result<Vec<RoomEvent>, GameError> {
        let inviter = self.take_invitation_for(invitee)?;

        if registry.get(inviter).is_none() {
            return Err(GameError::TargetOffline(inviter));
        }

        if registry.get(inviter).is_some_and(|s| s.room().is_some()) {
            return Err(GameError::TargetBusy(inviter));
        }

        if registry.get(invitee).is_some_and(|s| s.room().is_some()) {
            return Err(GameError::TargetBusy(invitee));
        }

        let room_id = env.random_u128();

        let Some(question) = source.next_question(room_id, 0) else {
            return Err(GameError::Validation("question source is empty".to_string()));
        };

        let room = Room::new(room_id, inviter, invitee, question.clone());
        let answerer = room.answerer();
        self.rooms.insert(room_id, room);

        let host_linked = registry.set_room(inviter, Some(room_id));
        let guest_linked = registry.set_room(invitee, Some(room_id));
        debug_assert!(
            host_linked && guest_linked,
            "invariant: both participants hold live sessions at room creation"
        );

        tracing::info!("room {room_id:032x} created for {inviter} and {invitee}");

        Ok(vec![
            RoomEvent::Accepted { room_id, host: inviter, guest: invitee },
            RoomEvent::QuestionDealt {
                room_id,
                participants: [inviter, invitee],
                answerer,
                question,
            },
        ])
    }

    /// Reject the most recent pending invitation naming `invitee`.
    ///
    /// # Errors
    ///
    /// - `GameError::NoPendingInvitation` if none names the invitee
    pub fn reject_game(&mut self, invitee: u64) -> Result<Vec<RoomEvent>, GameError> {
        let inviter = self.take_invitation_for(invitee)?;

        tracing::debug!(inviter, invitee, "game invitation rejected");

        Ok(vec![RoomEvent::Rejected { inviter, invitee }])
    }

    /// Leave a room, notifying the other participant.
    ///
    /// Idempotent: quitting a room that is unknown or already finished is a
    /// benign no-op, not an error escalation.
    ///
    /// # Errors
    ///
    /// - `GameError::Unauthorized` if the caller exists but is not a
    ///   participant of the (still active) room
    pub fn quit_game(
        &mut self,
        registry: &mut SessionRegistry,
        room_id: u128,
        user_id: u64,
    ) -> Result<Vec<RoomEvent>, GameError> {
        let Some(room) = self.rooms.get(&room_id) else {
            // Already finished (or never existed): no-op.
            return Ok(Vec::new());
        };

        if !room.is_participant(user_id) {
            return Err(GameError::Unauthorized { user_id, room_id });
        }

        Ok(self.teardown_room(registry, room_id, user_id))
    }

    /// Run the disconnect cascade for a user.
    ///
    /// Identical observable effect to an explicit quit on any room the user
    /// was in, plus withdrawal of every invitation the user sent or
    /// received. Infallible - cleanup is never skipped, even under abrupt
    /// connection loss.
    pub fn handle_disconnect(
        &mut self,
        registry: &mut SessionRegistry,
        user_id: u64,
        room: Option<u128>,
    ) -> Vec<RoomEvent> {
        let mut events = Vec::new();

        // Invitations the user received expire silently toward the user but
        // notify the inviter; invitations the user sent simply vanish.
        self.invitations.retain(|inv| {
            if inv.invitee == user_id {
                events.push(RoomEvent::Rejected { inviter: inv.inviter, invitee: user_id });
                return false;
            }
            inv.inviter != user_id
        });

        if let Some(room_id) = room {
            if self.rooms.get(&room_id).is_some_and(|r| r.is_participant(user_id)) {
                events.extend(self.teardown_room(registry, room_id, user_id));
            }
        }

        events
    }

    /// Discard invitations that outlived the configured window.
    ///
    /// Each expiry notifies the inviter the same way an explicit reject
    /// does.
    pub fn expire_invitations(&mut self, env: &E) -> Vec<RoomEvent> {
        let now = env.now();
        let timeout = self.config.invite_timeout;
        let mut events = Vec::new();

        self.invitations.retain(|inv| {
            if now - inv.created_at > timeout {
                tracing::debug!(
                    inviter = inv.inviter,
                    invitee = inv.invitee,
                    "game invitation expired"
                );
                events.push(RoomEvent::Rejected { inviter: inv.inviter, invitee: inv.invitee });
                return false;
            }
            true
        });

        events
    }

    /// Record an answer submission for a room's current question.
    ///
    /// # Errors
    ///
    /// - `GameError::NotInRoom` if the room is gone or the caller is not a
    ///   participant
    /// - `GameError::StaleSubmission` per the room state machine
    pub fn submit_answer(
        &mut self,
        room_id: u128,
        user_id: u64,
        answer: String,
        env: &E,
    ) -> Result<Vec<RoomEvent>, GameError> {
        let Some(room) = self.rooms.get_mut(&room_id) else {
            return Err(GameError::NotInRoom { user_id, room_id });
        };

        let advanced = room.submit_answer(user_id, answer.clone(), env.wall_clock_millis())?;

        if advanced {
            return Ok(vec![RoomEvent::AnswerRelayed {
                room_id,
                verifier: room.verifier(),
                answerer: user_id,
                answer,
            }]);
        }

        Ok(Vec::new())
    }

    /// Apply a verification, publish the scoreboard, and move the match on.
    ///
    /// Deals the next question, or finishes the match when the question
    /// source is exhausted (the final scoreboard is flagged `match_over`
    /// and the room leaves the active set).
    ///
    /// # Errors
    ///
    /// - `GameError::NotInRoom` if the room is gone
    /// - `GameError::Unauthorized` / `GameError::StaleSubmission` per the
    ///   room state machine (room state unchanged on failure)
    pub fn verify_answer(
        &mut self,
        registry: &mut SessionRegistry,
        room_id: u128,
        verifier: u64,
        correct: bool,
        source: &mut dyn QuestionSource,
    ) -> Result<Vec<RoomEvent>, GameError> {
        let Some(room) = self.rooms.get_mut(&room_id) else {
            return Err(GameError::NotInRoom { user_id: verifier, room_id });
        };

        room.verify_answer(verifier, correct)?;

        let next_index = room.question().index + 1;
        let next = source.next_question(room_id, next_index);
        let match_over = next.is_none();

        room.advance(next);

        let participants = room.participants();
        let scores = room.scores();
        let completed = room.completed_questions();

        let mut events =
            vec![RoomEvent::ScoreBoard { room_id, participants, scores, match_over }];

        if match_over {
            self.rooms.remove(&room_id);
            for user in participants {
                registry.set_room(user, None);
            }

            tracing::info!("match complete in room {room_id:032x}, room removed");

            events.push(RoomEvent::MatchFinished {
                room_id,
                participants,
                scores,
                questions_completed: completed,
            });
        } else if let Some(room) = self.rooms.get(&room_id) {
            events.push(RoomEvent::QuestionDealt {
                room_id,
                participants,
                answerer: room.answerer(),
                question: room.question().clone(),
            });
        }

        Ok(events)
    }

    /// Relay an in-room chat message to the other participant.
    ///
    /// Appends to the room's ephemeral transcript and flags the recipient
    /// as having an unread message; sending a message clears the sender's
    /// own flag.
    ///
    /// # Errors
    ///
    /// - `GameError::NotInRoom` if the room is gone or the sender is not a
    ///   participant
    pub fn send_message(
        &mut self,
        registry: &mut SessionRegistry,
        room_id: u128,
        sender: u64,
        text: String,
    ) -> Result<Vec<RoomEvent>, GameError> {
        let Some(room) = self.rooms.get_mut(&room_id) else {
            return Err(GameError::NotInRoom { user_id: sender, room_id });
        };

        let Some(recipient) = room.other_participant(sender) else {
            return Err(GameError::NotInRoom { user_id: sender, room_id });
        };

        room.push_chat(sender, text.clone());

        registry.set_message_flag(recipient, true);
        registry.set_message_flag(sender, false);

        Ok(vec![RoomEvent::Chat { room_id, to: recipient, sender, text }])
    }

    /// Remove and return the inviter of the most recent pending invitation
    /// naming `invitee`.
    fn take_invitation_for(&mut self, invitee: u64) -> Result<u64, GameError> {
        let index = self
            .invitations
            .iter()
            .rposition(|inv| inv.invitee == invitee)
            .ok_or(GameError::NoPendingInvitation(invitee))?;

        Ok(self.invitations.remove(index).inviter)
    }

    /// Shared teardown for quit, disconnect, and duplicate-login eviction.
    ///
    /// Removes the room, clears both room references, notifies the other
    /// participant, and emits the archive event.
    fn teardown_room(
        &mut self,
        registry: &mut SessionRegistry,
        room_id: u128,
        by: u64,
    ) -> Vec<RoomEvent> {
        let Some(mut room) = self.rooms.remove(&room_id) else {
            return Vec::new();
        };

        room.finish();

        let participants = room.participants();
        for user in participants {
            registry.set_room(user, None);
        }

        tracing::info!("room {room_id:032x} torn down by {by}");

        let mut events = Vec::new();
        if let Some(other) = room.other_participant(by) {
            events.push(RoomEvent::Ended { room_id, notify: other, by });
        }

        events.push(RoomEvent::MatchFinished {
            room_id,
            participants,
            scores: room.scores(),
            questions_completed: room.completed_questions(),
        });

        events
    }
}

impl<E> std::fmt::Debug for RoomManager<E>
where
    E: Environment,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomManager")
            .field("room_count", &self.rooms.len())
            .field("pending_invitations", &self.invitations.len())
            .finish()
    }
}
