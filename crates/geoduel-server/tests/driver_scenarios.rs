//! End-to-end driver scenario tests.
//!
//! Drives the full protocol through `ServerEvent`s and inspects the
//! produced `ServerAction`s, without a live transport: handshake, location
//! fan-out, invitation handshake, quiz rounds, chat, disconnect cascade,
//! and the match archive boundary.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use geoduel_core::{Environment, FixedDeck};
use geoduel_proto::{
    ErrorPayload, Frame, FrameHeader, Opcode, Payload,
    payloads::{chat, game, map, session::Hello},
};
use geoduel_server::{
    DriverConfig, MemoryArchive, ServerAction, ServerDriver, ServerEvent,
};

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
            *byte = (seed as u8).wrapping_add(i as u8).wrapping_mul(17);
        }
    }

    fn wall_clock_millis(&self) -> u64 {
        1_700_000_000_000
    }
}

type TestDriver = ServerDriver<TestEnv, FixedDeck, MemoryArchive>;

/// Driver with a two-question deck and a shared archive handle.
fn driver() -> (TestDriver, MemoryArchive) {
    let archive = MemoryArchive::new();
    let driver = ServerDriver::new(
        TestEnv::new(),
        FixedDeck::with_match_length(2),
        archive.clone(),
        DriverConfig::default(),
    );
    (driver, archive)
}

fn client_frame(payload: Payload, room_id: u128) -> Frame {
    let mut header = FrameHeader::new(payload.opcode());
    header.set_room_id(room_id);
    payload.into_frame(header).unwrap()
}

fn connect(driver: &mut TestDriver, session_id: u64, user_id: u64) {
    driver.process_event(ServerEvent::ConnectionAccepted { session_id }).unwrap();
    let hello = Payload::Hello(Hello { version: 1, user_id, auth_token: None });
    driver
        .process_event(ServerEvent::FrameReceived {
            session_id,
            frame: client_frame(hello, 0),
        })
        .unwrap();
}

fn send(driver: &mut TestDriver, session_id: u64, payload: Payload, room_id: u128) -> Vec<ServerAction> {
    driver
        .process_event(ServerEvent::FrameReceived {
            session_id,
            frame: client_frame(payload, room_id),
        })
        .unwrap()
}

/// Frames sent to `session` with the given opcode, in action order.
fn frames_to(actions: &[ServerAction], session: u64, opcode: Opcode) -> Vec<Frame> {
    actions
        .iter()
        .filter_map(|a| match a {
            ServerAction::SendToSession { session_id, frame }
                if *session_id == session && frame.header.opcode_enum() == Some(opcode) =>
            {
                Some(frame.clone())
            },
            _ => None,
        })
        .collect()
}

fn error_to(actions: &[ServerAction], session: u64) -> ErrorPayload {
    let frames = frames_to(actions, session, Opcode::Error);
    assert_eq!(frames.len(), 1, "expected exactly one error frame");
    match Payload::from_frame(&frames[0]).unwrap() {
        Payload::Error(err) => err,
        other => panic!("expected Error payload, got {other:?}"),
    }
}

/// Runs the apply/accept handshake for sessions 1 (user 1) and 2 (user 2)
/// and returns the room id both participants were notified with.
fn start_duel(driver: &mut TestDriver) -> u128 {
    let apply = Payload::ApplyQuizGame(game::ApplyQuizGame { opponent_user_id: 2 });
    let actions = send(driver, 1, apply, 0);
    assert_eq!(frames_to(&actions, 2, Opcode::GameInvited).len(), 1);

    let actions = send(driver, 2, Payload::AcceptGame, 0);

    let to_host = frames_to(&actions, 1, Opcode::GameAccepted);
    let to_guest = frames_to(&actions, 2, Opcode::GameAccepted);
    assert_eq!(to_host.len(), 1);
    assert_eq!(to_guest.len(), 1);

    let room_id = to_host[0].header.room_id();
    assert_ne!(room_id, 0);
    assert_eq!(to_guest[0].header.room_id(), room_id, "both receive the same room id");

    // The first question goes out to both participants.
    assert_eq!(frames_to(&actions, 1, Opcode::Question).len(), 1);
    assert_eq!(frames_to(&actions, 2, Opcode::Question).len(), 1);

    room_id
}

#[test]
fn duel_round_trip_scores_and_redeal() {
    let (mut driver, _) = driver();
    connect(&mut driver, 1, 1);
    connect(&mut driver, 2, 2);

    let room_id = start_duel(&mut driver);

    // User 1 submits "42"; the verifier (user 2) receives the answer.
    let submit = Payload::SendQuizAnswer(game::SendQuizAnswer { answer: "42".to_string() });
    let actions = send(&mut driver, 1, submit, room_id);

    let relayed = frames_to(&actions, 2, Opcode::AnswerSubmitted);
    assert_eq!(relayed.len(), 1);
    match Payload::from_frame(&relayed[0]).unwrap() {
        Payload::AnswerSubmitted(answer) => {
            assert_eq!(answer.user_id, 1);
            assert_eq!(answer.answer, "42");
        },
        other => panic!("expected AnswerSubmitted, got {other:?}"),
    }

    // User 2 verifies as correct: both receive a scoreboard with user 1's
    // score incremented by one, then the next question.
    let verify = Payload::VerifyAnswer(game::VerifyAnswer { correct: true });
    let actions = send(&mut driver, 2, verify, room_id);

    for session in [1, 2] {
        let boards = frames_to(&actions, session, Opcode::ScoreBoard);
        assert_eq!(boards.len(), 1);
        match Payload::from_frame(&boards[0]).unwrap() {
            Payload::ScoreBoard(board) => {
                assert!(!board.match_over);
                assert_eq!(board.scores.len(), 2);
                assert_eq!(board.scores[0].user_id, 1);
                assert_eq!(board.scores[0].score, 1);
                assert_eq!(board.scores[1].score, 0);
            },
            other => panic!("expected ScoreBoard, got {other:?}"),
        }

        // The room transitioned back to QuestionActive: a fresh question.
        assert_eq!(frames_to(&actions, session, Opcode::Question).len(), 1);
    }

    assert!(driver.rooms().has_room(room_id));
}

#[test]
fn apply_to_busy_target_fails_and_room_is_untouched() {
    let (mut driver, _) = driver();
    connect(&mut driver, 1, 1);
    connect(&mut driver, 2, 2);
    connect(&mut driver, 3, 3);

    // Users 2 and 3 pair up first.
    let apply = Payload::ApplyQuizGame(game::ApplyQuizGame { opponent_user_id: 3 });
    send(&mut driver, 2, apply, 0);
    let actions = send(&mut driver, 3, Payload::AcceptGame, 0);
    let room_x = frames_to(&actions, 2, Opcode::GameAccepted)[0].header.room_id();

    // User 1 applies to the busy user 2.
    let apply = Payload::ApplyQuizGame(game::ApplyQuizGame { opponent_user_id: 2 });
    let actions = send(&mut driver, 1, apply, 0);

    let err = error_to(&actions, 1);
    assert_eq!(err.code, ErrorPayload::TARGET_BUSY);
    assert_eq!(err.event, Opcode::ApplyQuizGame.to_u16());

    // Room X is untouched.
    assert!(driver.rooms().has_room(room_x));
    assert_eq!(driver.registry().get(2).unwrap().room(), Some(room_x));
    assert_eq!(driver.registry().get(3).unwrap().room(), Some(room_x));
}

#[test]
fn apply_to_offline_target_fails() {
    let (mut driver, _) = driver();
    connect(&mut driver, 1, 1);

    let apply = Payload::ApplyQuizGame(game::ApplyQuizGame { opponent_user_id: 9 });
    let actions = send(&mut driver, 1, apply, 0);

    let err = error_to(&actions, 1);
    assert_eq!(err.code, ErrorPayload::TARGET_OFFLINE);
}

#[test]
fn accept_without_invitation_fails() {
    let (mut driver, _) = driver();
    connect(&mut driver, 1, 1);

    let actions = send(&mut driver, 1, Payload::AcceptGame, 0);

    let err = error_to(&actions, 1);
    assert_eq!(err.code, ErrorPayload::NO_PENDING_INVITATION);
}

#[test]
fn reject_notifies_the_inviter_with_no_room() {
    let (mut driver, _) = driver();
    connect(&mut driver, 1, 1);
    connect(&mut driver, 2, 2);

    let apply = Payload::ApplyQuizGame(game::ApplyQuizGame { opponent_user_id: 2 });
    send(&mut driver, 1, apply, 0);
    let actions = send(&mut driver, 2, Payload::RejectGame, 0);

    let rejected = frames_to(&actions, 1, Opcode::GameRejected);
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].header.room_id(), 0, "no room materializes on rejection");
    assert_eq!(driver.rooms().room_count(), 0);
}

#[test]
fn disconnect_mid_room_notifies_and_cleans_up() {
    let (mut driver, archive) = driver();
    connect(&mut driver, 1, 1);
    connect(&mut driver, 2, 2);

    let room_id = start_duel(&mut driver);

    // User 1's connection drops abruptly.
    let actions = driver
        .process_event(ServerEvent::ConnectionClosed {
            session_id: 1,
            reason: "peer reset".to_string(),
        })
        .unwrap();

    // The other participant is notified exactly as for an explicit quit.
    let quit = frames_to(&actions, 2, Opcode::GameQuit);
    assert_eq!(quit.len(), 1);
    assert_eq!(quit[0].header.room_id(), room_id);
    match Payload::from_frame(&quit[0]).unwrap() {
        Payload::GameQuit(notice) => assert_eq!(notice.user_id, 1),
        other => panic!("expected GameQuit, got {other:?}"),
    }

    // The room left the active set; B's room reference is cleared.
    assert!(!driver.rooms().has_room(room_id));
    assert_eq!(driver.registry().get(2).unwrap().room(), None);

    // The archive saw the terminal transition.
    assert_eq!(archive.len(), 1);
    assert_eq!(archive.records()[0].room_id, room_id);
}

#[test]
fn quit_twice_is_idempotent() {
    let (mut driver, _) = driver();
    connect(&mut driver, 1, 1);
    connect(&mut driver, 2, 2);

    let room_id = start_duel(&mut driver);

    let actions = send(&mut driver, 1, Payload::QuitGame, room_id);
    assert_eq!(frames_to(&actions, 2, Opcode::GameQuit).len(), 1);
    assert!(!driver.rooms().has_room(room_id));

    // Second quit: benign no-op. No error frame, no notification.
    let actions = send(&mut driver, 1, Payload::QuitGame, room_id);
    assert!(frames_to(&actions, 1, Opcode::Error).is_empty());
    assert!(frames_to(&actions, 2, Opcode::GameQuit).is_empty());
}

#[test]
fn verify_by_non_participant_is_unauthorized() {
    let (mut driver, _) = driver();
    connect(&mut driver, 1, 1);
    connect(&mut driver, 2, 2);
    connect(&mut driver, 9, 9);

    let room_id = start_duel(&mut driver);

    let submit = Payload::SendQuizAnswer(game::SendQuizAnswer { answer: "42".to_string() });
    send(&mut driver, 1, submit, room_id);

    let verify = Payload::VerifyAnswer(game::VerifyAnswer { correct: true });
    let actions = send(&mut driver, 9, verify, room_id);

    let err = error_to(&actions, 9);
    assert_eq!(err.code, ErrorPayload::UNAUTHORIZED);

    // The room is unchanged: the real verifier can still judge.
    let verify = Payload::VerifyAnswer(game::VerifyAnswer { correct: true });
    let actions = send(&mut driver, 2, verify, room_id);
    assert_eq!(frames_to(&actions, 1, Opcode::ScoreBoard).len(), 1);
}

#[test]
fn completing_the_match_archives_final_scores() {
    let (mut driver, archive) = driver();
    connect(&mut driver, 1, 1);
    connect(&mut driver, 2, 2);

    let room_id = start_duel(&mut driver); // two-question match

    // Round 1: user 1 answers correctly.
    let submit = Payload::SendQuizAnswer(game::SendQuizAnswer { answer: "a".to_string() });
    send(&mut driver, 1, submit, room_id);
    let verify = Payload::VerifyAnswer(game::VerifyAnswer { correct: true });
    send(&mut driver, 2, verify, room_id);

    // Round 2: user 2 answers incorrectly; the deck is exhausted.
    let submit = Payload::SendQuizAnswer(game::SendQuizAnswer { answer: "b".to_string() });
    send(&mut driver, 2, submit, room_id);
    let verify = Payload::VerifyAnswer(game::VerifyAnswer { correct: false });
    let actions = send(&mut driver, 1, verify, room_id);

    for session in [1, 2] {
        let boards = frames_to(&actions, session, Opcode::ScoreBoard);
        assert_eq!(boards.len(), 1);
        match Payload::from_frame(&boards[0]).unwrap() {
            Payload::ScoreBoard(board) => assert!(board.match_over),
            other => panic!("expected ScoreBoard, got {other:?}"),
        }
    }

    assert!(!driver.rooms().has_room(room_id));

    let records = archive.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].scores, [(1, 1), (2, 0)]);
    assert_eq!(records[0].questions_completed, 2);
}

#[test]
fn chat_relays_and_location_carries_the_message_flag() {
    let (mut driver, _) = driver();
    connect(&mut driver, 1, 1);
    connect(&mut driver, 2, 2);

    let room_id = start_duel(&mut driver);

    let message = Payload::SendMessage(chat::SendMessage { text: "hi there".to_string() });
    let actions = send(&mut driver, 1, message, room_id);

    let relayed = frames_to(&actions, 2, Opcode::Message);
    assert_eq!(relayed.len(), 1);
    match Payload::from_frame(&relayed[0]).unwrap() {
        Payload::Message(msg) => {
            assert_eq!(msg.sender_id, 1);
            assert_eq!(msg.text, "hi there");
        },
        other => panic!("expected Message, got {other:?}"),
    }

    // User 2's next location broadcast advertises the unread message.
    let update = Payload::UpdateLocation(map::UpdateLocation { lat: 1.0, lon: 2.0 });
    let actions = send(&mut driver, 2, update, 0);

    let ServerAction::Broadcast { frame } = &actions[0] else {
        panic!("expected Broadcast, got {:?}", actions[0]);
    };
    match Payload::from_frame(frame).unwrap() {
        Payload::Location(loc) => {
            assert_eq!(loc.user_id, 2);
            assert!(loc.has_recent_message);
        },
        other => panic!("expected Location, got {other:?}"),
    }
}

#[test]
fn chat_outside_a_room_fails() {
    let (mut driver, _) = driver();
    connect(&mut driver, 1, 1);

    let message = Payload::SendMessage(chat::SendMessage { text: "hello?".to_string() });
    let actions = send(&mut driver, 1, message, 0xDEAD);

    let err = error_to(&actions, 1);
    assert_eq!(err.code, ErrorPayload::NOT_IN_ROOM);
}

#[test]
fn repeated_location_updates_broadcast_in_order() {
    let (mut driver, _) = driver();
    connect(&mut driver, 1, 1);
    connect(&mut driver, 2, 2);

    let mut broadcasts = Vec::new();
    for lon in [10.0, 11.0] {
        let update = Payload::UpdateLocation(map::UpdateLocation { lat: 5.0, lon });
        let actions = send(&mut driver, 1, update, 0);

        let ServerAction::Broadcast { frame } = &actions[0] else {
            panic!("expected Broadcast, got {:?}", actions[0]);
        };
        broadcasts.push(frame.clone());
    }

    // Each update produced a fresh broadcast, in the order received.
    assert_eq!(broadcasts.len(), 2);
    for (frame, expected_lon) in broadcasts.iter().zip([10.0, 11.0]) {
        match Payload::from_frame(frame).unwrap() {
            Payload::Location(loc) => {
                assert_eq!(loc.user_id, 1);
                assert!((loc.lon - expected_lon).abs() < f64::EPSILON);
            },
            other => panic!("expected Location, got {other:?}"),
        }
    }
}

#[test]
fn duplicate_login_tears_down_the_old_sessions_room() {
    let (mut driver, _) = driver();
    connect(&mut driver, 1, 1);
    connect(&mut driver, 2, 2);

    let room_id = start_duel(&mut driver);

    // User 1 signs in again from a new connection.
    connect(&mut driver, 7, 1);

    // The room died with the old session; user 2 was notified.
    assert!(!driver.rooms().has_room(room_id));
    assert_eq!(driver.registry().get(1).unwrap().room(), None);
    assert_eq!(driver.registry().get(2).unwrap().room(), None);
    assert_eq!(driver.registry().session_id_for_user(1), Some(7));
}

#[test]
fn stale_submission_after_verification_began() {
    let (mut driver, _) = driver();
    connect(&mut driver, 1, 1);
    connect(&mut driver, 2, 2);

    let room_id = start_duel(&mut driver);

    // User 1 answers and user 2 verifies; round 2 begins with user 2 as
    // the designated answerer.
    let submit = Payload::SendQuizAnswer(game::SendQuizAnswer { answer: "a".to_string() });
    send(&mut driver, 1, submit, room_id);
    let verify = Payload::VerifyAnswer(game::VerifyAnswer { correct: true });
    send(&mut driver, 2, verify, room_id);

    // User 1 resubmits for the judged round: the competing transition
    // already committed, so the submission is stale... unless it lands in
    // the new round, where user 1 may submit once as the non-answerer.
    let submit = Payload::SendQuizAnswer(game::SendQuizAnswer { answer: "late".to_string() });
    let first = send(&mut driver, 1, submit, room_id);
    assert!(frames_to(&first, 1, Opcode::Error).is_empty());

    // A second resubmission in the same round is unambiguously stale.
    let submit = Payload::SendQuizAnswer(game::SendQuizAnswer { answer: "later".to_string() });
    let actions = send(&mut driver, 1, submit, room_id);
    let err = error_to(&actions, 1);
    assert_eq!(err.code, ErrorPayload::STALE_SUBMISSION);
}
