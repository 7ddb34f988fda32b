//! Frame type combining header and payload.
//!
//! A `Frame` is the transport-layer packet: a 64-byte raw binary header
//! followed by variable-length payload bytes (already CBOR-encoded). This
//! is a pure data holder; for high-level logic see
//! [`crate::Payload::into_frame`] and [`crate::Payload::from_frame`].

use bytes::{BufMut, Bytes};

use crate::{
    FrameHeader,
    errors::{ProtocolError, Result},
};

/// Complete protocol frame (transport layer).
///
/// Layout on the wire: `[FrameHeader: 64 bytes] + [payload: variable]`.
///
/// Holds raw bytes, NOT the `Payload` enum - the dispatcher routes frames
/// without deserializing the payload.
///
/// # Invariants
///
/// - `payload.len()` matches `header.payload_size()`. Enforced by
///   [`Frame::new`] and verified by [`Frame::decode`].
/// - `payload.len()` never exceeds [`FrameHeader::MAX_PAYLOAD_SIZE`].
///   Violations are rejected during encoding and decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame header (64 bytes)
    pub header: FrameHeader,

    /// Raw payload bytes (already CBOR-encoded)
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame, setting the header's payload size automatically.
    ///
    /// # Panics
    ///
    /// Panics if `payload.len() > u32::MAX`, which cannot happen in
    /// practice: `Bytes` is bounded by `isize::MAX` and the protocol limit
    /// is 64 KiB.
    #[must_use]
    pub fn new(mut header: FrameHeader, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();

        // INVARIANT: payload length always fits in u32; allocations near
        // u32::MAX are rejected long before this point.
        #[allow(clippy::expect_used)]
        let payload_len = u32::try_from(payload.len())
            .expect("invariant: payload length fits in u32 (bounded by protocol limit)");

        header.payload_size = payload_len.to_be_bytes();

        debug_assert_eq!(header.payload_size(), payload_len);

        Self { header, payload }
    }

    /// Encode the frame into a buffer.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::PayloadTooLarge` if the payload exceeds the
    ///   64 KiB protocol limit
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        debug_assert_eq!(self.payload.len(), self.header.payload_size() as usize);

        if self.payload.len() > FrameHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: self.payload.len(),
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }

        dst.put_slice(&self.header.to_bytes());
        dst.put_slice(&self.payload);

        Ok(())
    }

    /// Decode a frame from wire format.
    ///
    /// Returns a `Frame` with raw payload bytes (does NOT deserialize the
    /// payload). All validation happens before allocating for the payload,
    /// and only exactly `payload_size` bytes are read - trailing data is
    /// ignored.
    ///
    /// # Errors
    ///
    /// - `ProtocolError` if header parsing fails (magic, version, size)
    /// - `ProtocolError::FrameTruncated` if fewer payload bytes are present
    ///   than the header claims
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = FrameHeader::from_bytes(bytes)?;

        let payload_size = header.payload_size() as usize;
        let total_size = FrameHeader::SIZE + payload_size;

        if bytes.len() < total_size {
            return Err(ProtocolError::FrameTruncated {
                expected: payload_size,
                actual: bytes.len().saturating_sub(FrameHeader::SIZE),
            });
        }

        // INVARIANT: bytes.len() >= total_size was checked above, so the
        // slice below cannot be out of bounds.
        #[allow(clippy::expect_used)]
        let payload = Bytes::copy_from_slice(
            bytes.get(FrameHeader::SIZE..total_size).expect("invariant: bounds checked above"),
        );

        debug_assert_eq!(payload.len(), payload_size);

        Ok(Self { header: *header, payload })
    }
}
