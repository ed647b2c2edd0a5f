//! Nine-byte frame that precedes every message on the wire.
//!
//! ```text
//! +-----+----------------+----------------+---------+-------+
//! | 'F' | msg len u32 BE | val len u32 BE | message | value |
//! +-----+----------------+----------------+---------+-------+
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ProtoError, ProtoResult};

/// Magic byte that opens every frame.
pub const FRAME_MAGIC: u8 = b'F';

/// Size of the frame header in bytes.
pub const FRAME_HEADER_LEN: usize = 9;

/// Upper bounds enforced when decoding frame headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLimits {
    /// Largest accepted message section.
    pub max_message_len: u32,
    /// Largest accepted value section.
    pub max_value_len: u32,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            max_message_len: 1024 * 1024,
            max_value_len: 16 * 1024 * 1024,
        }
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Length of the encoded message that follows.
    pub message_len: u32,
    /// Length of the raw value that follows the message.
    pub value_len: u32,
}

impl FrameHeader {
    /// Serialize into the fixed nine-byte layout.
    #[must_use]
    pub fn encode(&self) -> [u8; FRAME_HEADER_LEN] {
        let mut out = [0u8; FRAME_HEADER_LEN];
        let mut cursor = &mut out[..];
        cursor.put_u8(FRAME_MAGIC);
        cursor.put_u32(self.message_len);
        cursor.put_u32(self.value_len);
        out
    }

    /// Parse a header, checking only the magic byte.
    pub fn decode(raw: &[u8; FRAME_HEADER_LEN]) -> ProtoResult<Self> {
        let mut cursor = &raw[..];
        let magic = cursor.get_u8();
        if magic != FRAME_MAGIC {
            return Err(ProtoError::BadMagic(magic));
        }
        Ok(Self {
            message_len: cursor.get_u32(),
            value_len: cursor.get_u32(),
        })
    }

    /// Reject lengths above `limits`.
    pub fn validate(&self, limits: &FrameLimits) -> ProtoResult<()> {
        if self.message_len > limits.max_message_len {
            return Err(ProtoError::FrameTooLarge {
                section: "message",
                len: u64::from(self.message_len),
                limit: u64::from(limits.max_message_len),
            });
        }
        if self.value_len > limits.max_value_len {
            return Err(ProtoError::FrameTooLarge {
                section: "value",
                len: u64::from(self.value_len),
                limit: u64::from(limits.max_value_len),
            });
        }
        Ok(())
    }
}

/// A complete frame: encoded message plus raw value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    /// Encoded [`crate::Message`].
    pub message: Bytes,
    /// Raw value bytes, possibly empty.
    pub value: Bytes,
}

impl Frame {
    /// Create a frame.
    #[must_use]
    pub fn new(message: Bytes, value: Bytes) -> Self {
        Self { message, value }
    }

    /// Header describing this frame, or an error if a section does not fit
    /// in 32 bits.
    pub fn header(&self) -> ProtoResult<FrameHeader> {
        Ok(FrameHeader {
            message_len: section_len("message", self.message.len())?,
            value_len: section_len("value", self.value.len())?,
        })
    }

    /// Serialize header, message and value into one buffer.
    pub fn encode(&self) -> ProtoResult<Bytes> {
        let header = self.header()?;
        let mut buf =
            BytesMut::with_capacity(FRAME_HEADER_LEN + self.message.len() + self.value.len());
        buf.put_slice(&header.encode());
        buf.put_slice(&self.message);
        buf.put_slice(&self.value);
        Ok(buf.freeze())
    }

    /// Parse one complete frame from `buf`.
    pub fn decode(mut buf: Bytes, limits: &FrameLimits) -> ProtoResult<Self> {
        if buf.len() < FRAME_HEADER_LEN {
            return Err(ProtoError::Truncated {
                context: "frame header",
            });
        }
        let mut raw = [0u8; FRAME_HEADER_LEN];
        buf.copy_to_slice(&mut raw);
        let header = FrameHeader::decode(&raw)?;
        header.validate(limits)?;
        let message_len = header.message_len as usize;
        let value_len = header.value_len as usize;
        if buf.len() < message_len + value_len {
            return Err(ProtoError::Truncated {
                context: "frame body",
            });
        }
        let message = buf.split_to(message_len);
        let value = buf.split_to(value_len);
        Ok(Self { message, value })
    }
}

fn section_len(section: &'static str, len: usize) -> ProtoResult<u32> {
    u32::try_from(len).map_err(|_| ProtoError::FrameTooLarge {
        section,
        len: len as u64,
        limit: u64::from(u32::MAX),
    })
}
