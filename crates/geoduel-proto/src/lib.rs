//! GeoDuel wire protocol.
//!
//! One long-lived bidirectional channel per client carries every protocol
//! event: session handshake, location broadcasts, the game invitation
//! handshake, quiz answers, and in-room chat. Each event travels as a
//! [`Frame`]: a fixed 64-byte raw binary header (Big Endian) followed by a
//! CBOR payload.
//!
//! Headers are raw binary so the server can route a frame (opcode, room id,
//! sender) without deserializing the payload; payloads are CBOR for type
//! safety and forward compatibility. The payload type is selected by the
//! header opcode alone - no variant tag is serialized, so mismatched
//! opcode/payload pairs cannot be smuggled.

mod errors;
mod frame;
mod header;
mod opcode;
pub mod payloads;

pub use errors::{ProtocolError, Result};
pub use frame::Frame;
pub use header::{FrameFlags, FrameHeader};
pub use opcode::Opcode;
pub use payloads::{ErrorPayload, Payload};

/// ALPN identifier negotiated during the TLS handshake.
pub const ALPN_PROTOCOL: &[u8] = b"geoduel";
