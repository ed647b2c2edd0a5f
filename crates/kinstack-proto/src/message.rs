//! Authentication envelope around encoded command bytes.

use bytes::{BufMut, Bytes, BytesMut};
use hmac::{Hmac, KeyInit, Mac};
use sha1::Sha1;

use crate::command::Command;
use crate::error::{ProtoError, ProtoResult};
use crate::types::AuthType;
use crate::wire::{FieldReader, WireMessage, put_bytes, put_enum, put_int, put_message};

type HmacSha1 = Hmac<Sha1>;

/// Identity and tag of an HMAC-authenticated message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HmacAuth {
    /// Identity whose key produced the tag.
    pub identity: Option<i64>,
    /// HMAC-SHA1 tag.
    pub hmac: Option<Bytes>,
}

impl WireMessage for HmacAuth {
    fn encode_raw(&self, buf: &mut BytesMut) {
        if let Some(v) = self.identity {
            put_int(1, v, buf);
        }
        if let Some(v) = &self.hmac {
            put_bytes(2, v, buf);
        }
    }

    fn decode(buf: Bytes) -> ProtoResult<Self> {
        let mut auth = Self::default();
        let mut reader = FieldReader::new(buf);
        while let Some((field, value)) = reader.next_field()? {
            match field {
                1 => auth.identity = Some(value.into_i64(field)?),
                2 => auth.hmac = Some(value.into_bytes(field)?),
                _ => {}
            }
        }
        Ok(auth)
    }
}

/// PIN of a PIN-authenticated message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PinAuth {
    /// PIN in the clear; only sent over TLS in production.
    pub pin: Option<Bytes>,
}

impl WireMessage for PinAuth {
    fn encode_raw(&self, buf: &mut BytesMut) {
        if let Some(v) = &self.pin {
            put_bytes(1, v, buf);
        }
    }

    fn decode(buf: Bytes) -> ProtoResult<Self> {
        let mut auth = Self::default();
        let mut reader = FieldReader::new(buf);
        while let Some((field, value)) = reader.next_field()? {
            if field == 1 {
                auth.pin = Some(value.into_bytes(field)?);
            }
        }
        Ok(auth)
    }
}

/// Top-level protocol message.
///
/// The command is kept as raw bytes because the HMAC covers exactly those
/// bytes; decoding them is a separate step ([`Message::decode_command`]).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    /// How the message is authenticated.
    pub auth_type: Option<AuthType>,
    /// Set for [`AuthType::Hmac`].
    pub hmac_auth: Option<HmacAuth>,
    /// Set for [`AuthType::Pin`].
    pub pin_auth: Option<PinAuth>,
    /// Encoded [`Command`].
    pub command_bytes: Option<Bytes>,
}

impl Message {
    /// Encode `command` and sign it with `key` on behalf of `identity`.
    pub fn hmac(identity: i64, key: &[u8], command: &Command) -> ProtoResult<Self> {
        let command_bytes = command.encode_to_bytes();
        let tag = compute_hmac(key, &command_bytes)?;
        Ok(Self {
            auth_type: Some(AuthType::Hmac),
            hmac_auth: Some(HmacAuth {
                identity: Some(identity),
                hmac: Some(tag),
            }),
            pin_auth: None,
            command_bytes: Some(command_bytes),
        })
    }

    /// Encode `command` and attach `pin`.
    #[must_use]
    pub fn pin(pin: Bytes, command: &Command) -> Self {
        Self {
            auth_type: Some(AuthType::Pin),
            hmac_auth: None,
            pin_auth: Some(PinAuth { pin: Some(pin) }),
            command_bytes: Some(command.encode_to_bytes()),
        }
    }

    /// An unauthenticated device-initiated status message.
    #[must_use]
    pub fn unsolicited(command: &Command) -> Self {
        Self {
            auth_type: Some(AuthType::UnsolicitedStatus),
            hmac_auth: None,
            pin_auth: None,
            command_bytes: Some(command.encode_to_bytes()),
        }
    }

    /// Decode the carried command.
    pub fn decode_command(&self) -> ProtoResult<Command> {
        let bytes = self
            .command_bytes
            .clone()
            .ok_or(ProtoError::MissingField("commandBytes"))?;
        Command::decode(bytes)
    }

    /// Check the HMAC against `key`. Fails if the message is not HMAC
    /// authenticated or the tag does not match.
    pub fn verify_hmac(&self, key: &[u8]) -> ProtoResult<()> {
        let tag = self
            .hmac_auth
            .as_ref()
            .and_then(|a| a.hmac.as_ref())
            .ok_or(ProtoError::MissingField("hmacAuth.hmac"))?;
        let command_bytes = self
            .command_bytes
            .as_ref()
            .ok_or(ProtoError::MissingField("commandBytes"))?;
        let mac = keyed_mac(key, command_bytes)?;
        mac.verify_slice(tag).map_err(|_| ProtoError::HmacMismatch)
    }
}

impl WireMessage for Message {
    fn encode_raw(&self, buf: &mut BytesMut) {
        if let Some(v) = self.auth_type {
            put_enum(4, v.as_i32(), buf);
        }
        if let Some(v) = &self.hmac_auth {
            put_message(5, v, buf);
        }
        if let Some(v) = &self.pin_auth {
            put_message(6, v, buf);
        }
        if let Some(v) = &self.command_bytes {
            put_bytes(7, v, buf);
        }
    }

    fn decode(buf: Bytes) -> ProtoResult<Self> {
        let mut message = Self::default();
        let mut reader = FieldReader::new(buf);
        while let Some((field, value)) = reader.next_field()? {
            match field {
                4 => message.auth_type = Some(AuthType::try_from(value.into_enum(field)?)?),
                5 => message.hmac_auth = Some(value.into_message(field)?),
                6 => message.pin_auth = Some(value.into_message(field)?),
                7 => message.command_bytes = Some(value.into_bytes(field)?),
                _ => {}
            }
        }
        Ok(message)
    }
}

/// HMAC-SHA1 of `u32_be(len(command_bytes)) || command_bytes`.
pub fn compute_hmac(key: &[u8], command_bytes: &[u8]) -> ProtoResult<Bytes> {
    let mac = keyed_mac(key, command_bytes)?;
    Ok(Bytes::from(mac.finalize().into_bytes().to_vec()))
}

#[allow(clippy::cast_possible_truncation)]
fn keyed_mac(key: &[u8], command_bytes: &[u8]) -> ProtoResult<HmacSha1> {
    let mut mac = HmacSha1::new_from_slice(key).map_err(|_| ProtoError::InvalidHmacKey)?;
    let mut prefix = BytesMut::with_capacity(4);
    prefix.put_u32(command_bytes.len() as u32);
    mac.update(&prefix);
    mac.update(command_bytes);
    Ok(mac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Header;
    use crate::types::MessageType;

    fn noop() -> Command {
        Command {
            header: Some(Header {
                sequence: Some(1),
                message_type: Some(MessageType::Noop),
                ..Header::default()
            }),
            ..Command::default()
        }
    }

    #[test]
    fn test_should_sign_and_verify_hmac() {
        let message = Message::hmac(1, b"asdfasdf", &noop()).unwrap();
        assert!(message.verify_hmac(b"asdfasdf").is_ok());
        assert_eq!(
            message.verify_hmac(b"wrong key"),
            Err(ProtoError::HmacMismatch)
        );
    }

    #[test]
    fn test_should_prefix_length_before_hashing() {
        let bytes = noop().encode_to_bytes();
        let mut mac = HmacSha1::new_from_slice(b"asdfasdf").unwrap();
        mac.update(&bytes);
        let unprefixed = mac.finalize().into_bytes().to_vec();
        let prefixed = compute_hmac(b"asdfasdf", &bytes).unwrap();
        assert_eq!(prefixed.len(), 20);
        assert_ne!(&prefixed[..], &unprefixed[..]);
    }

    #[test]
    fn test_should_detect_tampered_command_bytes() {
        let mut message = Message::hmac(1, b"asdfasdf", &noop()).unwrap();
        let mut tampered = message.command_bytes.clone().unwrap().to_vec();
        tampered.push(0x00);
        message.command_bytes = Some(Bytes::from(tampered));
        assert_eq!(
            message.verify_hmac(b"asdfasdf"),
            Err(ProtoError::HmacMismatch)
        );
    }

    #[test]
    fn test_should_round_trip_envelope() {
        let message = Message::pin(Bytes::from_static(b"1234"), &noop());
        let decoded = Message::decode(message.encode_to_bytes()).unwrap();
        assert_eq!(decoded, message);
        assert_eq!(decoded.decode_command().unwrap(), noop());
        assert_eq!(
            decoded.verify_hmac(b"asdfasdf"),
            Err(ProtoError::MissingField("hmacAuth.hmac"))
        );
    }

    #[test]
    fn test_should_fail_without_command_bytes() {
        assert_eq!(
            Message::default().decode_command(),
            Err(ProtoError::MissingField("commandBytes"))
        );
    }
}
