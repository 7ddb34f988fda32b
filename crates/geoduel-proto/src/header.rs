//! Frame header implementation with zero-copy parsing.
//!
//! The `FrameHeader` is a fixed 64-byte structure serialized as raw binary
//! (Big Endian). Routing fields (opcode, room id, sender) are available
//! without deserialization, so the dispatcher can route frames in O(1).

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    Opcode,
    errors::{ProtocolError, Result},
};

/// Frame processing flags (reserved bitfield, currently unused).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameFlags(u8);

impl FrameFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);

    /// Construct from a raw header byte.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        Self(byte)
    }

    /// Raw header byte.
    #[must_use]
    pub const fn to_byte(self) -> u8 {
        self.0
    }
}

/// Fixed 64-byte frame header (Big Endian network byte order).
///
/// All multi-byte integers are stored Big Endian; fields are raw byte
/// arrays to avoid alignment issues. The header fits a single 64-byte CPU
/// cache line so the dispatch hot path touches exactly one line per frame.
///
/// # Layout
///
/// | bytes | field |
/// |---|---|
/// | 0-3 | magic |
/// | 4 | version |
/// | 5 | flags |
/// | 6-7 | opcode |
/// | 8-11 | request id |
/// | 12-15 | payload size |
/// | 16-31 | room id |
/// | 32-39 | sender id |
/// | 40-47 | timestamp (Unix ms) |
/// | 48-63 | reserved |
///
/// # Security
///
/// The `#[repr(C, packed)]` layout with zerocopy traits ensures this struct
/// can be safely cast from untrusted network bytes: every 64-byte pattern
/// is a valid bit pattern, so parsing cannot cause undefined behavior.
/// Structural validation (magic, version, size limit) happens in
/// [`FrameHeader::from_bytes`]; the sender id is only trusted after the
/// session handshake binds it to the connection.
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct FrameHeader {
    // Protocol identification (bytes 0-7)
    magic: [u8; 4],             // 0x4744554C ("GDUL" in ASCII)
    version: u8,                // 0x01
    flags: u8,                  // FrameFlags bitfield
    pub(crate) opcode: [u8; 2], // u16 operation code

    // Request/payload metadata (bytes 8-15)
    request_id: [u8; 4],              // u32 client nonce
    pub(crate) payload_size: [u8; 4], // u32 payload length

    // Routing context (bytes 16-39)
    room_id: [u8; 16],  // UUID (128-bit), zero when not room-scoped
    sender_id: [u8; 8], // u64 user id, zero before authentication

    // Server-stamped send time (bytes 40-47)
    timestamp: [u8; 8], // u64 Unix milliseconds

    // Reserved for future revisions (bytes 48-63)
    reserved: [u8; 16],
}

impl FrameHeader {
    /// Size of the serialized header (64 bytes, one cache line).
    pub const SIZE: usize = 64;

    /// Magic number: "GDUL" in ASCII (0x4744554C).
    pub const MAGIC: u32 = 0x4744_554C;

    /// Current protocol version.
    pub const VERSION: u8 = 0x01;

    /// Maximum payload size (64 KiB).
    ///
    /// Payloads are short CBOR records (coordinates, answers, chat lines);
    /// anything larger indicates a malformed or hostile frame.
    pub const MAX_PAYLOAD_SIZE: u32 = 64 * 1024;

    /// Create a new header with the specified opcode.
    ///
    /// All routing fields start zeroed; callers set room id, sender id,
    /// and timestamp as needed before sending.
    #[must_use]
    pub fn new(opcode: Opcode) -> Self {
        Self {
            magic: Self::MAGIC.to_be_bytes(),
            version: Self::VERSION,
            flags: 0,
            opcode: opcode.to_u16().to_be_bytes(),
            request_id: [0; 4],
            payload_size: [0; 4],
            room_id: [0; 16],
            sender_id: [0; 8],
            timestamp: [0; 8],
            reserved: [0; 16],
        }
    }

    /// Parse a header from network bytes (zero-copy, safe).
    ///
    /// Validates magic, version, and payload-size limit. Does NOT verify
    /// the sender id - identity binding happens at the session layer.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FrameTooShort` if the buffer is under 64 bytes
    /// - `ProtocolError::InvalidMagic` if the magic number is wrong
    /// - `ProtocolError::UnsupportedVersion` for unknown versions
    /// - `ProtocolError::PayloadTooLarge` if the claimed size exceeds the
    ///   limit
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let header = Self::ref_from_prefix(bytes)
            .map_err(|_| ProtocolError::FrameTooShort {
                expected: Self::SIZE,
                actual: bytes.len(),
            })?
            .0;

        if u32::from_be_bytes(header.magic) != Self::MAGIC {
            return Err(ProtocolError::InvalidMagic);
        }

        if header.version != Self::VERSION {
            return Err(ProtocolError::UnsupportedVersion(header.version));
        }

        let payload_size = u32::from_be_bytes(header.payload_size);
        if payload_size > Self::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_size as usize,
                max: Self::MAX_PAYLOAD_SIZE as usize,
            });
        }

        Ok(header)
    }

    /// Serialize the header to bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let bytes = IntoBytes::as_bytes(self);
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(bytes);
        arr
    }

    /// Protocol magic number (0x4744554C = "GDUL").
    #[must_use]
    pub fn magic(&self) -> u32 {
        u32::from_be_bytes(self.magic)
    }

    /// Protocol version byte (currently 0x01).
    #[must_use]
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Frame processing flags.
    #[must_use]
    pub fn flags(&self) -> FrameFlags {
        FrameFlags::from_byte(self.flags)
    }

    /// Operation code as raw u16.
    #[must_use]
    pub fn opcode(&self) -> u16 {
        u16::from_be_bytes(self.opcode)
    }

    /// Operation code as enum. `None` if unrecognized.
    #[must_use]
    pub fn opcode_enum(&self) -> Option<Opcode> {
        Opcode::from_u16(self.opcode())
    }

    /// Client-assigned nonce for request/response correlation.
    #[must_use]
    pub fn request_id(&self) -> u32 {
        u32::from_be_bytes(self.request_id)
    }

    /// 128-bit room UUID. Zero for frames that are not room-scoped.
    #[must_use]
    pub fn room_id(&self) -> u128 {
        u128::from_be_bytes(self.room_id)
    }

    /// Stable user identifier bound during the session handshake.
    #[must_use]
    pub fn sender_id(&self) -> u64 {
        u64::from_be_bytes(self.sender_id)
    }

    /// Server-stamped send time, Unix milliseconds.
    #[must_use]
    pub fn timestamp(&self) -> u64 {
        u64::from_be_bytes(self.timestamp)
    }

    /// Payload size in bytes (max 64 KiB).
    #[must_use]
    pub fn payload_size(&self) -> u32 {
        u32::from_be_bytes(self.payload_size)
    }

    /// Update the room UUID.
    pub fn set_room_id(&mut self, room_id: u128) {
        self.room_id = room_id.to_be_bytes();
    }

    /// Update the sender identifier.
    pub fn set_sender_id(&mut self, sender_id: u64) {
        self.sender_id = sender_id.to_be_bytes();
    }

    /// Set the send timestamp (Unix milliseconds).
    pub fn set_timestamp(&mut self, timestamp: u64) {
        self.timestamp = timestamp.to_be_bytes();
    }

    /// Set the client request nonce for response correlation.
    pub fn set_request_id(&mut self, request_id: u32) {
        self.request_id = request_id.to_be_bytes();
    }

    /// Update frame processing flags.
    pub fn set_flags(&mut self, flags: FrameFlags) {
        self.flags = flags.to_byte();
    }

    /// Set the payload size.
    pub fn set_payload_size(&mut self, size: u32) {
        self.payload_size = size.to_be_bytes();
    }
}

// Manual Debug implementation (can't derive due to packed repr)
impl std::fmt::Debug for FrameHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameHeader")
            .field("magic", &format!("{:#010x}", self.magic()))
            .field("version", &self.version())
            .field("flags", &self.flags())
            .field("opcode", &format!("{:#06x}", self.opcode()))
            .field("request_id", &self.request_id())
            .field("room_id", &format!("{:#034x}", self.room_id()))
            .field("sender_id", &self.sender_id())
            .field("timestamp", &self.timestamp())
            .field("payload_size", &self.payload_size())
            .finish_non_exhaustive()
    }
}

// Manual PartialEq implementation (can't derive due to packed repr)
impl PartialEq for FrameHeader {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for FrameHeader {}
