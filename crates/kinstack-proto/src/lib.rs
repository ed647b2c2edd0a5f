//! Wire codec for the Kinetic key-value device protocol.
//!
//! Pure transformations, no I/O: protobuf wire primitives, the typed
//! [`Command`] model, the authenticated [`Message`] envelope and the
//! nine-byte [`FrameHeader`] that precedes every message on a stream.
//!
//! ```text
//! Command --encode--> commandBytes --HMAC-SHA1--> Message --encode--> Frame
//! ```
//!
//! # Example
//!
//! ```
//! use kinstack_proto::{Command, Header, Message, MessageType, WireMessage};
//!
//! let command = Command {
//!     header: Some(Header {
//!         sequence: Some(1),
//!         message_type: Some(MessageType::Noop),
//!         ..Header::default()
//!     }),
//!     ..Command::default()
//! };
//! let message = Message::hmac(1, b"asdfasdf", &command).unwrap();
//! let decoded = Message::decode(message.encode_to_bytes()).unwrap();
//! assert!(decoded.verify_hmac(b"asdfasdf").is_ok());
//! assert_eq!(decoded.decode_command().unwrap(), command);
//! ```

pub mod command;
pub mod error;
pub mod frame;
pub mod message;
pub mod types;
pub mod wire;

pub use command::{
    Batch, Body, Capacity, Command, GetLog, Header, KeyValue, Limits, PinOperation, Power, Range,
    Security, Status, Temperature, Utilization,
};
pub use error::{ProtoError, ProtoResult};
pub use frame::{FRAME_HEADER_LEN, FRAME_MAGIC, Frame, FrameHeader, FrameLimits};
pub use message::{HmacAuth, Message, PinAuth, compute_hmac};
pub use types::{
    Algorithm, AuthType, LogType, MessageType, PinOpType, PowerLevel, Priority, SecurityOpType,
    StatusCode, Synchronization,
};
pub use wire::WireMessage;
