//! Fuzz target for Payload::from_frame
//!
//! This fuzzer tests payload deserialization (CBOR decoding) with:
//! - Malformed CBOR data
//! - Type confusion attacks (wrong payload type for opcode)
//! - Oversized strings or collections
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error.

#![no_main]

use bytes::Bytes;
use geoduel_proto::{Frame, FrameHeader, Opcode, Payload};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // A valid frame header is needed to exercise payload decoding.
    // Try all opcodes to cover every payload type.
    let opcodes = [
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

    for opcode in opcodes {
        let mut header = FrameHeader::new(opcode);
        header.set_room_id(1);
        header.set_sender_id(1);

        let frame = Frame::new(header, Bytes::copy_from_slice(data));

        // Attempt to deserialize the payload
        // This should never panic, only return Err for invalid CBOR
        let _ = Payload::from_frame(&frame);
    }
});
