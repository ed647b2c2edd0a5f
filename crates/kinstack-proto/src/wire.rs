//! Protobuf wire-format primitives.
//!
//! The device speaks proto2. Only the subset it needs is implemented here:
//! varints, length-delimited fields, and fixed32 floats. Fields are written
//! in ascending field-number order and absent optionals are omitted, so a
//! decoded message re-encodes to the exact same bytes.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ProtoError, ProtoResult};

/// Largest field number protobuf allows.
const MAX_FIELD_NUMBER: u64 = (1 << 29) - 1;

/// Protobuf wire types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    /// Base-128 varint.
    Varint,
    /// Little-endian 8 bytes.
    Fixed64,
    /// Varint length followed by that many bytes.
    LengthDelimited,
    /// Little-endian 4 bytes.
    Fixed32,
}

impl WireType {
    fn bits(self) -> u64 {
        match self {
            Self::Varint => 0,
            Self::Fixed64 => 1,
            Self::LengthDelimited => 2,
            Self::Fixed32 => 5,
        }
    }

    fn from_bits(bits: u64) -> ProtoResult<Self> {
        match bits {
            0 => Ok(Self::Varint),
            1 => Ok(Self::Fixed64),
            2 => Ok(Self::LengthDelimited),
            5 => Ok(Self::Fixed32),
            other => Err(ProtoError::UnsupportedWireType(other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Varints
// ---------------------------------------------------------------------------

/// Append `value` as a base-128 varint.
#[allow(clippy::cast_possible_truncation)]
pub fn encode_varint(mut value: u64, buf: &mut impl BufMut) {
    while value >= 0x80 {
        buf.put_u8((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Read one base-128 varint.
pub fn decode_varint(buf: &mut impl Buf) -> ProtoResult<u64> {
    let mut value = 0u64;
    for i in 0..10 {
        if !buf.has_remaining() {
            return Err(ProtoError::Truncated { context: "varint" });
        }
        let byte = buf.get_u8();
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(ProtoError::VarintOverflow)
}

/// Number of bytes `value` occupies as a varint.
#[must_use]
pub fn varint_len(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

// ---------------------------------------------------------------------------
// Field writers
// ---------------------------------------------------------------------------

fn put_tag(field: u32, wire_type: WireType, buf: &mut impl BufMut) {
    encode_varint((u64::from(field) << 3) | wire_type.bits(), buf);
}

/// Write an unsigned varint field.
pub fn put_uint(field: u32, value: u64, buf: &mut impl BufMut) {
    put_tag(field, WireType::Varint, buf);
    encode_varint(value, buf);
}

/// Write a signed `int64` field (two's complement, not zigzag).
#[allow(clippy::cast_sign_loss)]
pub fn put_int(field: u32, value: i64, buf: &mut impl BufMut) {
    put_uint(field, value as u64, buf);
}

/// Write an enum field.
#[allow(clippy::cast_sign_loss)]
pub fn put_enum(field: u32, value: i32, buf: &mut impl BufMut) {
    put_uint(field, i64::from(value) as u64, buf);
}

/// Write a bool field.
pub fn put_bool(field: u32, value: bool, buf: &mut impl BufMut) {
    put_uint(field, u64::from(value), buf);
}

/// Write a bytes or string field.
pub fn put_bytes(field: u32, value: &[u8], buf: &mut impl BufMut) {
    put_tag(field, WireType::LengthDelimited, buf);
    encode_varint(value.len() as u64, buf);
    buf.put_slice(value);
}

/// Write a `float` field.
pub fn put_float(field: u32, value: f32, buf: &mut impl BufMut) {
    put_tag(field, WireType::Fixed32, buf);
    buf.put_u32_le(value.to_bits());
}

/// Write a packed repeated varint field. Nothing is written for an empty slice.
pub fn put_packed(field: u32, values: &[u64], buf: &mut impl BufMut) {
    if values.is_empty() {
        return;
    }
    let len: usize = values.iter().map(|v| varint_len(*v)).sum();
    put_tag(field, WireType::LengthDelimited, buf);
    encode_varint(len as u64, buf);
    for value in values {
        encode_varint(*value, buf);
    }
}

/// Write an embedded message field.
pub fn put_message<M: WireMessage>(field: u32, message: &M, buf: &mut BytesMut) {
    let mut nested = BytesMut::new();
    message.encode_raw(&mut nested);
    put_bytes(field, &nested, buf);
}

// ---------------------------------------------------------------------------
// Field reader
// ---------------------------------------------------------------------------

/// A decoded field payload, still untyped.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Varint payload.
    Varint(u64),
    /// Fixed64 payload.
    Fixed64(u64),
    /// Length-delimited payload.
    Bytes(Bytes),
    /// Fixed32 payload.
    Fixed32(u32),
}

impl FieldValue {
    fn wire_type(&self) -> WireType {
        match self {
            Self::Varint(_) => WireType::Varint,
            Self::Fixed64(_) => WireType::Fixed64,
            Self::Bytes(_) => WireType::LengthDelimited,
            Self::Fixed32(_) => WireType::Fixed32,
        }
    }

    fn mismatch(&self, field: u32, expected: WireType) -> ProtoError {
        ProtoError::WireTypeMismatch {
            field,
            expected,
            found: self.wire_type(),
        }
    }

    /// Interpret as `uint64`.
    pub fn into_u64(self, field: u32) -> ProtoResult<u64> {
        match self {
            Self::Varint(v) => Ok(v),
            other => Err(other.mismatch(field, WireType::Varint)),
        }
    }

    /// Interpret as `uint32` (upper bits are discarded as protobuf does).
    #[allow(clippy::cast_possible_truncation)]
    pub fn into_u32(self, field: u32) -> ProtoResult<u32> {
        self.into_u64(field).map(|v| v as u32)
    }

    /// Interpret as `int64`.
    #[allow(clippy::cast_possible_wrap)]
    pub fn into_i64(self, field: u32) -> ProtoResult<i64> {
        self.into_u64(field).map(|v| v as i64)
    }

    /// Interpret as an enum's numeric value.
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn into_enum(self, field: u32) -> ProtoResult<i32> {
        self.into_u64(field).map(|v| v as i32)
    }

    /// Interpret as `bool`.
    pub fn into_bool(self, field: u32) -> ProtoResult<bool> {
        self.into_u64(field).map(|v| v != 0)
    }

    /// Interpret as `bytes`.
    pub fn into_bytes(self, field: u32) -> ProtoResult<Bytes> {
        match self {
            Self::Bytes(b) => Ok(b),
            other => Err(other.mismatch(field, WireType::LengthDelimited)),
        }
    }

    /// Interpret as `string`.
    pub fn into_string(self, field: u32, name: &'static str) -> ProtoResult<String> {
        let bytes = self.into_bytes(field)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ProtoError::InvalidUtf8(name))
    }

    /// Interpret as `float`.
    pub fn into_f32(self, field: u32) -> ProtoResult<f32> {
        match self {
            Self::Fixed32(bits) => Ok(f32::from_bits(bits)),
            other => Err(other.mismatch(field, WireType::Fixed32)),
        }
    }

    /// Interpret as a repeated varint, accepting packed and unpacked forms.
    pub fn into_packed(self, field: u32) -> ProtoResult<Vec<u64>> {
        match self {
            Self::Varint(v) => Ok(vec![v]),
            Self::Bytes(mut b) => {
                let mut values = Vec::new();
                while b.has_remaining() {
                    values.push(decode_varint(&mut b)?);
                }
                Ok(values)
            }
            other => Err(other.mismatch(field, WireType::Varint)),
        }
    }

    /// Decode an embedded message.
    pub fn into_message<M: WireMessage>(self, field: u32) -> ProtoResult<M> {
        M::decode(self.into_bytes(field)?)
    }
}

/// Iterates over the fields of one encoded message.
#[derive(Debug)]
pub struct FieldReader {
    buf: Bytes,
}

impl FieldReader {
    /// Start reading `buf`.
    #[must_use]
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    /// Read the next `(field number, payload)` pair, or `None` at the end.
    #[allow(clippy::cast_possible_truncation)]
    pub fn next_field(&mut self) -> ProtoResult<Option<(u32, FieldValue)>> {
        if !self.buf.has_remaining() {
            return Ok(None);
        }
        let tag = decode_varint(&mut self.buf)?;
        let field = tag >> 3;
        if field == 0 || field > MAX_FIELD_NUMBER {
            return Err(ProtoError::InvalidFieldNumber(field));
        }
        let value = match WireType::from_bits(tag & 0x7)? {
            WireType::Varint => FieldValue::Varint(decode_varint(&mut self.buf)?),
            WireType::Fixed64 => {
                if self.buf.remaining() < 8 {
                    return Err(ProtoError::Truncated { context: "fixed64" });
                }
                FieldValue::Fixed64(self.buf.get_u64_le())
            }
            WireType::Fixed32 => {
                if self.buf.remaining() < 4 {
                    return Err(ProtoError::Truncated { context: "fixed32" });
                }
                FieldValue::Fixed32(self.buf.get_u32_le())
            }
            WireType::LengthDelimited => {
                let len = decode_varint(&mut self.buf)?;
                if len > self.buf.remaining() as u64 {
                    return Err(ProtoError::Truncated {
                        context: "length-delimited field",
                    });
                }
                FieldValue::Bytes(self.buf.split_to(len as usize))
            }
        };
        Ok(Some((field as u32, value)))
    }
}

// ---------------------------------------------------------------------------
// WireMessage
// ---------------------------------------------------------------------------

/// A protocol message with a protobuf encoding.
pub trait WireMessage: Sized {
    /// Append the encoded fields to `buf`.
    fn encode_raw(&self, buf: &mut BytesMut);

    /// Decode a message from its encoded bytes.
    fn decode(buf: Bytes) -> ProtoResult<Self>;

    /// Encode into a fresh buffer.
    fn encode_to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode_raw(&mut buf);
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_round_trip_varint_boundaries() {
        for value in [0, 1, 127, 128, 300, 16_383, 16_384, u64::from(u32::MAX), u64::MAX] {
            let mut buf = BytesMut::new();
            encode_varint(value, &mut buf);
            assert_eq!(buf.len(), varint_len(value));
            let mut bytes = buf.freeze();
            assert_eq!(decode_varint(&mut bytes).unwrap(), value);
            assert!(!bytes.has_remaining());
        }
    }

    #[test]
    fn test_should_encode_300_as_protobuf_reference() {
        let mut buf = BytesMut::new();
        encode_varint(300, &mut buf);
        assert_eq!(&buf[..], &[0xac, 0x02]);
    }

    #[test]
    fn test_should_reject_truncated_varint() {
        let mut bytes = Bytes::from_static(&[0x80, 0x80]);
        assert_eq!(
            decode_varint(&mut bytes),
            Err(ProtoError::Truncated { context: "varint" })
        );
    }

    #[test]
    fn test_should_reject_overlong_varint() {
        let mut bytes = Bytes::from_static(&[0xff; 11]);
        assert_eq!(decode_varint(&mut bytes), Err(ProtoError::VarintOverflow));
    }

    #[test]
    fn test_should_read_mixed_fields() {
        let mut buf = BytesMut::new();
        put_uint(1, 42, &mut buf);
        put_bytes(2, b"key", &mut buf);
        put_float(3, 0.5, &mut buf);
        put_packed(4, &[1, 2, 300], &mut buf);

        let mut reader = FieldReader::new(buf.freeze());
        let (f, v) = reader.next_field().unwrap().unwrap();
        assert_eq!((f, v.into_u64(1).unwrap()), (1, 42));
        let (f, v) = reader.next_field().unwrap().unwrap();
        assert_eq!((f, v.into_bytes(2).unwrap()), (2, Bytes::from_static(b"key")));
        let (f, v) = reader.next_field().unwrap().unwrap();
        assert_eq!(f, 3);
        assert!((v.into_f32(3).unwrap() - 0.5).abs() < f32::EPSILON);
        let (f, v) = reader.next_field().unwrap().unwrap();
        assert_eq!((f, v.into_packed(4).unwrap()), (4, vec![1, 2, 300]));
        assert!(reader.next_field().unwrap().is_none());
    }

    #[test]
    fn test_should_report_wire_type_mismatch() {
        let mut buf = BytesMut::new();
        put_bytes(7, b"x", &mut buf);
        let (_, v) = FieldReader::new(buf.freeze()).next_field().unwrap().unwrap();
        assert_eq!(
            v.into_u64(7),
            Err(ProtoError::WireTypeMismatch {
                field: 7,
                expected: WireType::Varint,
                found: WireType::LengthDelimited,
            })
        );
    }

    #[test]
    fn test_should_reject_length_past_end() {
        let mut buf = BytesMut::new();
        put_tag(1, WireType::LengthDelimited, &mut buf);
        encode_varint(10, &mut buf);
        buf.put_slice(b"abc");
        let err = FieldReader::new(buf.freeze()).next_field().unwrap_err();
        assert!(matches!(err, ProtoError::Truncated { .. }));
    }

    #[test]
    fn test_should_encode_negative_enum_as_ten_bytes() {
        let mut buf = BytesMut::new();
        put_enum(1, -1, &mut buf);
        assert_eq!(buf.len(), 11);
        let (_, v) = FieldReader::new(buf.freeze()).next_field().unwrap().unwrap();
        assert_eq!(v.into_enum(1).unwrap(), -1);
    }
}
