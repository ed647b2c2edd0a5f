//! Codec error types.

use crate::wire::WireType;

/// Errors produced while encoding or decoding device protocol messages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtoError {
    /// The input ended before a complete value could be read.
    #[error("unexpected end of input while decoding {context}")]
    Truncated {
        /// What was being decoded when the input ran out.
        context: &'static str,
    },

    /// A varint used more than ten bytes.
    #[error("varint exceeds 64 bits")]
    VarintOverflow,

    /// The tag carried a wire type this codec does not understand.
    #[error("unsupported wire type {0}")]
    UnsupportedWireType(u64),

    /// Field number zero (or one above the protobuf maximum) was seen.
    #[error("invalid field number {0}")]
    InvalidFieldNumber(u64),

    /// A known field arrived with the wrong wire type.
    #[error("field {field} has wire type {found:?}, expected {expected:?}")]
    WireTypeMismatch {
        /// Field number.
        field: u32,
        /// Wire type the schema declares.
        expected: WireType,
        /// Wire type found in the input.
        found: WireType,
    },

    /// An enum field carried a value outside the declared set.
    #[error("unknown {name} value {value}")]
    UnknownEnumValue {
        /// Enum type name.
        name: &'static str,
        /// Offending numeric value.
        value: i32,
    },

    /// A string field was not valid UTF-8.
    #[error("invalid utf-8 in field {0}")]
    InvalidUtf8(&'static str),

    /// A field the protocol requires was absent.
    #[error("missing required field {0}")]
    MissingField(&'static str),

    /// The frame did not start with the `'F'` magic byte.
    #[error("bad frame magic byte {0:#04x}")]
    BadMagic(u8),

    /// A frame section exceeds the negotiated limit.
    #[error("{section} length {len} exceeds limit {limit}")]
    FrameTooLarge {
        /// `"message"` or `"value"`.
        section: &'static str,
        /// Announced length.
        len: u64,
        /// Configured maximum.
        limit: u64,
    },

    /// The HMAC key was rejected by the MAC implementation.
    #[error("invalid hmac key")]
    InvalidHmacKey,

    /// The HMAC carried by a message does not match its command bytes.
    #[error("hmac verification failed")]
    HmacMismatch,
}

/// Convenience alias for codec results.
pub type ProtoResult<T> = Result<T, ProtoError>;
