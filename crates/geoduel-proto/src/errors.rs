//! Protocol error types.

/// Convenience alias for protocol results.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding or decoding frames.
///
/// All variants are recoverable at the connection level: a malformed frame
/// is rejected and reported, it never takes the server down.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Buffer is shorter than a frame header.
    #[error("frame too short: expected {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Minimum number of bytes required
        expected: usize,
        /// Number of bytes available
        actual: usize,
    },

    /// Header claims more payload bytes than the buffer holds.
    #[error("frame truncated: header claims {expected} payload bytes, got {actual}")]
    FrameTruncated {
        /// Payload size claimed by the header
        expected: usize,
        /// Payload bytes actually present
        actual: usize,
    },

    /// Magic number did not match.
    #[error("invalid magic number")]
    InvalidMagic,

    /// Protocol version is not supported by this build.
    #[error("unsupported protocol version: {0:#04x}")]
    UnsupportedVersion(u8),

    /// Payload exceeds the protocol size limit.
    #[error("payload too large: {size} bytes exceeds maximum {max}")]
    PayloadTooLarge {
        /// Actual payload size
        size: usize,
        /// Maximum allowed size
        max: usize,
    },

    /// CBOR serialization failed.
    #[error("CBOR encode error: {0}")]
    CborEncode(String),

    /// CBOR deserialization failed or the opcode is unknown.
    #[error("CBOR decode error: {0}")]
    CborDecode(String),
}
