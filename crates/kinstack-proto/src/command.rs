//! Typed command model.
//!
//! A [`Command`] is the authenticated unit of the protocol: a header that
//! identifies and orders the request, a body with the operation arguments,
//! and (in responses) a status. All proto2 optionals are `Option`s so that a
//! decoded command re-encodes byte for byte.

use bytes::{Bytes, BytesMut};

use crate::error::ProtoResult;
use crate::types::{
    Algorithm, LogType, MessageType, PinOpType, PowerLevel, Priority, SecurityOpType, StatusCode,
    Synchronization,
};
use crate::wire::{
    FieldReader, WireMessage, put_bool, put_bytes, put_enum, put_float, put_int, put_message,
    put_packed, put_uint,
};

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// Request/response header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    /// Cluster version the client believes the device is at.
    pub cluster_version: Option<i64>,
    /// Connection id assigned by the device at sign-on.
    pub connection_id: Option<i64>,
    /// Request sequence number, strictly increasing per connection.
    pub sequence: Option<u64>,
    /// In responses, the sequence number being acknowledged.
    pub ack_sequence: Option<u64>,
    /// Operation type.
    pub message_type: Option<MessageType>,
    /// Milliseconds the device may queue the request.
    pub timeout: Option<u64>,
    /// Fail instead of waiting when the device is busy.
    pub early_exit: Option<bool>,
    /// Scheduling priority.
    pub priority: Option<Priority>,
    /// Time quantum for background work.
    pub time_quanta: Option<u64>,
    /// Batch this command belongs to.
    pub batch_id: Option<u32>,
}

impl WireMessage for Header {
    fn encode_raw(&self, buf: &mut BytesMut) {
        if let Some(v) = self.cluster_version {
            put_int(1, v, buf);
        }
        if let Some(v) = self.connection_id {
            put_int(3, v, buf);
        }
        if let Some(v) = self.sequence {
            put_uint(4, v, buf);
        }
        if let Some(v) = self.ack_sequence {
            put_uint(6, v, buf);
        }
        if let Some(v) = self.message_type {
            put_enum(7, v.as_i32(), buf);
        }
        if let Some(v) = self.timeout {
            put_uint(9, v, buf);
        }
        if let Some(v) = self.early_exit {
            put_bool(10, v, buf);
        }
        if let Some(v) = self.priority {
            put_enum(12, v.as_i32(), buf);
        }
        if let Some(v) = self.time_quanta {
            put_uint(13, v, buf);
        }
        if let Some(v) = self.batch_id {
            put_uint(14, u64::from(v), buf);
        }
    }

    fn decode(buf: Bytes) -> ProtoResult<Self> {
        let mut header = Self::default();
        let mut reader = FieldReader::new(buf);
        while let Some((field, value)) = reader.next_field()? {
            match field {
                1 => header.cluster_version = Some(value.into_i64(field)?),
                3 => header.connection_id = Some(value.into_i64(field)?),
                4 => header.sequence = Some(value.into_u64(field)?),
                6 => header.ack_sequence = Some(value.into_u64(field)?),
                7 => header.message_type = Some(MessageType::try_from(value.into_enum(field)?)?),
                9 => header.timeout = Some(value.into_u64(field)?),
                10 => header.early_exit = Some(value.into_bool(field)?),
                12 => header.priority = Some(Priority::try_from(value.into_enum(field)?)?),
                13 => header.time_quanta = Some(value.into_u64(field)?),
                14 => header.batch_id = Some(value.into_u32(field)?),
                _ => {}
            }
        }
        Ok(header)
    }
}

// ---------------------------------------------------------------------------
// KeyValue
// ---------------------------------------------------------------------------

/// Arguments of GET/PUT/DELETE-family commands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyValue {
    /// Version to store with a PUT.
    pub new_version: Option<Bytes>,
    /// Target key.
    pub key: Option<Bytes>,
    /// Version the stored entry must currently have.
    pub db_version: Option<Bytes>,
    /// Integrity tag of the value.
    pub tag: Option<Bytes>,
    /// Algorithm the tag was computed with.
    pub algorithm: Option<Algorithm>,
    /// Return only metadata on GET.
    pub metadata_only: Option<bool>,
    /// Ignore version checks.
    pub force: Option<bool>,
    /// Durability mode.
    pub synchronization: Option<Synchronization>,
}

impl WireMessage for KeyValue {
    fn encode_raw(&self, buf: &mut BytesMut) {
        if let Some(v) = &self.new_version {
            put_bytes(1, v, buf);
        }
        if let Some(v) = &self.key {
            put_bytes(3, v, buf);
        }
        if let Some(v) = &self.db_version {
            put_bytes(4, v, buf);
        }
        if let Some(v) = &self.tag {
            put_bytes(5, v, buf);
        }
        if let Some(v) = self.algorithm {
            put_enum(6, v.as_i32(), buf);
        }
        if let Some(v) = self.metadata_only {
            put_bool(7, v, buf);
        }
        if let Some(v) = self.force {
            put_bool(8, v, buf);
        }
        if let Some(v) = self.synchronization {
            put_enum(9, v.as_i32(), buf);
        }
    }

    fn decode(buf: Bytes) -> ProtoResult<Self> {
        let mut kv = Self::default();
        let mut reader = FieldReader::new(buf);
        while let Some((field, value)) = reader.next_field()? {
            match field {
                1 => kv.new_version = Some(value.into_bytes(field)?),
                3 => kv.key = Some(value.into_bytes(field)?),
                4 => kv.db_version = Some(value.into_bytes(field)?),
                5 => kv.tag = Some(value.into_bytes(field)?),
                6 => kv.algorithm = Some(Algorithm::try_from(value.into_enum(field)?)?),
                7 => kv.metadata_only = Some(value.into_bool(field)?),
                8 => kv.force = Some(value.into_bool(field)?),
                9 => {
                    kv.synchronization =
                        Some(Synchronization::try_from(value.into_enum(field)?)?);
                }
                _ => {}
            }
        }
        Ok(kv)
    }
}

// ---------------------------------------------------------------------------
// Range
// ---------------------------------------------------------------------------

/// Key range arguments (GETKEYRANGE, MEDIASCAN, MEDIAOPTIMIZE) and results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Range {
    /// First key of the range.
    pub start_key: Option<Bytes>,
    /// Last key of the range.
    pub end_key: Option<Bytes>,
    /// Whether `start_key` itself may be returned.
    pub start_key_inclusive: Option<bool>,
    /// Whether `end_key` itself may be returned.
    pub end_key_inclusive: Option<bool>,
    /// Upper bound on returned keys.
    pub max_returned: Option<u32>,
    /// Walk the range from the end.
    pub reverse: Option<bool>,
    /// Keys returned by the device.
    pub keys: Vec<Bytes>,
}

impl WireMessage for Range {
    fn encode_raw(&self, buf: &mut BytesMut) {
        if let Some(v) = &self.start_key {
            put_bytes(1, v, buf);
        }
        if let Some(v) = &self.end_key {
            put_bytes(2, v, buf);
        }
        if let Some(v) = self.start_key_inclusive {
            put_bool(3, v, buf);
        }
        if let Some(v) = self.end_key_inclusive {
            put_bool(4, v, buf);
        }
        if let Some(v) = self.max_returned {
            put_uint(5, u64::from(v), buf);
        }
        if let Some(v) = self.reverse {
            put_bool(6, v, buf);
        }
        for key in &self.keys {
            put_bytes(8, key, buf);
        }
    }

    fn decode(buf: Bytes) -> ProtoResult<Self> {
        let mut range = Self::default();
        let mut reader = FieldReader::new(buf);
        while let Some((field, value)) = reader.next_field()? {
            match field {
                1 => range.start_key = Some(value.into_bytes(field)?),
                2 => range.end_key = Some(value.into_bytes(field)?),
                3 => range.start_key_inclusive = Some(value.into_bool(field)?),
                4 => range.end_key_inclusive = Some(value.into_bool(field)?),
                5 => range.max_returned = Some(value.into_u32(field)?),
                6 => range.reverse = Some(value.into_bool(field)?),
                8 => range.keys.push(value.into_bytes(field)?),
                _ => {}
            }
        }
        Ok(range)
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Outcome carried by responses and unsolicited messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Status {
    /// Result code.
    pub code: Option<StatusCode>,
    /// Human readable message.
    pub status_message: Option<String>,
    /// Opaque vendor detail.
    pub detailed_message: Option<Bytes>,
}

impl Status {
    /// A status with only a code.
    #[must_use]
    pub fn with_code(code: StatusCode) -> Self {
        Self {
            code: Some(code),
            ..Self::default()
        }
    }

    /// A status with a code and message.
    #[must_use]
    pub fn with_message(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            status_message: Some(message.into()),
            detailed_message: None,
        }
    }
}

impl WireMessage for Status {
    fn encode_raw(&self, buf: &mut BytesMut) {
        if let Some(v) = self.code {
            put_enum(1, v.as_i32(), buf);
        }
        if let Some(v) = &self.status_message {
            put_bytes(2, v.as_bytes(), buf);
        }
        if let Some(v) = &self.detailed_message {
            put_bytes(3, v, buf);
        }
    }

    fn decode(buf: Bytes) -> ProtoResult<Self> {
        let mut status = Self::default();
        let mut reader = FieldReader::new(buf);
        while let Some((field, value)) = reader.next_field()? {
            match field {
                1 => status.code = Some(StatusCode::try_from(value.into_enum(field)?)?),
                2 => status.status_message = Some(value.into_string(field, "statusMessage")?),
                3 => status.detailed_message = Some(value.into_bytes(field)?),
                _ => {}
            }
        }
        Ok(status)
    }
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// END_BATCH arguments and results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    /// Number of operations the batch contains.
    pub count: Option<u32>,
    /// Sequence numbers of the committed operations.
    pub sequence: Vec<u64>,
    /// Sequence number of the operation that failed the batch.
    pub failed_sequence: Option<u64>,
}

impl WireMessage for Batch {
    fn encode_raw(&self, buf: &mut BytesMut) {
        if let Some(v) = self.count {
            put_uint(1, u64::from(v), buf);
        }
        put_packed(2, &self.sequence, buf);
        if let Some(v) = self.failed_sequence {
            put_uint(3, v, buf);
        }
    }

    fn decode(buf: Bytes) -> ProtoResult<Self> {
        let mut batch = Self::default();
        let mut reader = FieldReader::new(buf);
        while let Some((field, value)) = reader.next_field()? {
            match field {
                1 => batch.count = Some(value.into_u32(field)?),
                2 => batch.sequence.extend(value.into_packed(field)?),
                3 => batch.failed_sequence = Some(value.into_u64(field)?),
                _ => {}
            }
        }
        Ok(batch)
    }
}

// ---------------------------------------------------------------------------
// GetLog
// ---------------------------------------------------------------------------

/// One utilization figure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Utilization {
    /// Component name, e.g. `"HDA"`.
    pub name: Option<String>,
    /// Fraction in `0.0..=1.0`.
    pub value: Option<f32>,
}

impl WireMessage for Utilization {
    fn encode_raw(&self, buf: &mut BytesMut) {
        if let Some(v) = &self.name {
            put_bytes(1, v.as_bytes(), buf);
        }
        if let Some(v) = self.value {
            put_float(2, v, buf);
        }
    }

    fn decode(buf: Bytes) -> ProtoResult<Self> {
        let mut util = Self::default();
        let mut reader = FieldReader::new(buf);
        while let Some((field, value)) = reader.next_field()? {
            match field {
                1 => util.name = Some(value.into_string(field, "utilization.name")?),
                2 => util.value = Some(value.into_f32(field)?),
                _ => {}
            }
        }
        Ok(util)
    }
}

/// One temperature sensor reading, in degrees Celsius.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Temperature {
    /// Sensor name.
    pub name: Option<String>,
    /// Current reading.
    pub current: Option<f32>,
    /// Minimum safe temperature.
    pub minimum: Option<f32>,
    /// Maximum safe temperature.
    pub maximum: Option<f32>,
    /// Target temperature.
    pub target: Option<f32>,
}

impl WireMessage for Temperature {
    fn encode_raw(&self, buf: &mut BytesMut) {
        if let Some(v) = &self.name {
            put_bytes(1, v.as_bytes(), buf);
        }
        for (field, v) in [
            (2, self.current),
            (3, self.minimum),
            (4, self.maximum),
            (5, self.target),
        ] {
            if let Some(v) = v {
                put_float(field, v, buf);
            }
        }
    }

    fn decode(buf: Bytes) -> ProtoResult<Self> {
        let mut temp = Self::default();
        let mut reader = FieldReader::new(buf);
        while let Some((field, value)) = reader.next_field()? {
            match field {
                1 => temp.name = Some(value.into_string(field, "temperature.name")?),
                2 => temp.current = Some(value.into_f32(field)?),
                3 => temp.minimum = Some(value.into_f32(field)?),
                4 => temp.maximum = Some(value.into_f32(field)?),
                5 => temp.target = Some(value.into_f32(field)?),
                _ => {}
            }
        }
        Ok(temp)
    }
}

/// Device capacity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Capacity {
    /// Usable bytes.
    pub nominal_capacity_in_bytes: Option<u64>,
    /// Fraction of capacity in use.
    pub portion_full: Option<f32>,
}

impl WireMessage for Capacity {
    fn encode_raw(&self, buf: &mut BytesMut) {
        if let Some(v) = self.nominal_capacity_in_bytes {
            put_uint(4, v, buf);
        }
        if let Some(v) = self.portion_full {
            put_float(5, v, buf);
        }
    }

    fn decode(buf: Bytes) -> ProtoResult<Self> {
        let mut cap = Self::default();
        let mut reader = FieldReader::new(buf);
        while let Some((field, value)) = reader.next_field()? {
            match field {
                4 => cap.nominal_capacity_in_bytes = Some(value.into_u64(field)?),
                5 => cap.portion_full = Some(value.into_f32(field)?),
                _ => {}
            }
        }
        Ok(cap)
    }
}

/// Protocol limits advertised by the device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct Limits {
    pub max_key_size: Option<u32>,
    pub max_value_size: Option<u32>,
    pub max_version_size: Option<u32>,
    pub max_tag_size: Option<u32>,
    pub max_connections: Option<u32>,
    pub max_outstanding_read_requests: Option<u32>,
    pub max_outstanding_write_requests: Option<u32>,
    pub max_message_size: Option<u32>,
    pub max_key_range_count: Option<u32>,
    pub max_identity_count: Option<u32>,
    pub max_pin_size: Option<u32>,
    pub max_operation_count_per_batch: Option<u32>,
    pub max_batch_count_per_device: Option<u32>,
}

impl Limits {
    fn fields(&self) -> [Option<u32>; 13] {
        [
            self.max_key_size,
            self.max_value_size,
            self.max_version_size,
            self.max_tag_size,
            self.max_connections,
            self.max_outstanding_read_requests,
            self.max_outstanding_write_requests,
            self.max_message_size,
            self.max_key_range_count,
            self.max_identity_count,
            self.max_pin_size,
            self.max_operation_count_per_batch,
            self.max_batch_count_per_device,
        ]
    }

    fn slot(&mut self, field: u32) -> Option<&mut Option<u32>> {
        Some(match field {
            1 => &mut self.max_key_size,
            2 => &mut self.max_value_size,
            3 => &mut self.max_version_size,
            4 => &mut self.max_tag_size,
            5 => &mut self.max_connections,
            6 => &mut self.max_outstanding_read_requests,
            7 => &mut self.max_outstanding_write_requests,
            8 => &mut self.max_message_size,
            9 => &mut self.max_key_range_count,
            10 => &mut self.max_identity_count,
            11 => &mut self.max_pin_size,
            12 => &mut self.max_operation_count_per_batch,
            13 => &mut self.max_batch_count_per_device,
            _ => return None,
        })
    }
}

impl WireMessage for Limits {
    fn encode_raw(&self, buf: &mut BytesMut) {
        for (field, value) in (1u32..).zip(self.fields()) {
            if let Some(v) = value {
                put_uint(field, u64::from(v), buf);
            }
        }
    }

    fn decode(buf: Bytes) -> ProtoResult<Self> {
        let mut limits = Self::default();
        let mut reader = FieldReader::new(buf);
        while let Some((field, value)) = reader.next_field()? {
            if let Some(slot) = limits.slot(field) {
                *slot = Some(value.into_u32(field)?);
            }
        }
        Ok(limits)
    }
}

/// GETLOG arguments and results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetLog {
    /// Requested sections.
    pub types: Vec<LogType>,
    /// Utilization section.
    pub utilizations: Vec<Utilization>,
    /// Temperature section.
    pub temperatures: Vec<Temperature>,
    /// Capacity section.
    pub capacity: Option<Capacity>,
    /// Message log section.
    pub messages: Option<Bytes>,
    /// Limits section.
    pub limits: Option<Limits>,
}

impl WireMessage for GetLog {
    fn encode_raw(&self, buf: &mut BytesMut) {
        for t in &self.types {
            put_enum(1, t.as_i32(), buf);
        }
        for u in &self.utilizations {
            put_message(2, u, buf);
        }
        for t in &self.temperatures {
            put_message(3, t, buf);
        }
        if let Some(v) = &self.capacity {
            put_message(4, v, buf);
        }
        if let Some(v) = &self.messages {
            put_bytes(7, v, buf);
        }
        if let Some(v) = &self.limits {
            put_message(8, v, buf);
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn decode(buf: Bytes) -> ProtoResult<Self> {
        let mut log = Self::default();
        let mut reader = FieldReader::new(buf);
        while let Some((field, value)) = reader.next_field()? {
            match field {
                1 => {
                    for raw in value.into_packed(field)? {
                        log.types.push(LogType::try_from(raw as i32)?);
                    }
                }
                2 => log.utilizations.push(value.into_message(field)?),
                3 => log.temperatures.push(value.into_message(field)?),
                4 => log.capacity = Some(value.into_message(field)?),
                7 => log.messages = Some(value.into_bytes(field)?),
                8 => log.limits = Some(value.into_message(field)?),
                _ => {}
            }
        }
        Ok(log)
    }
}

// ---------------------------------------------------------------------------
// Security, PinOperation, Power
// ---------------------------------------------------------------------------

/// SECURITY arguments (PIN changes; ACLs are not modelled).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Security {
    /// Current lock PIN.
    pub old_lock_pin: Option<Bytes>,
    /// Replacement lock PIN.
    pub new_lock_pin: Option<Bytes>,
    /// Current erase PIN.
    pub old_erase_pin: Option<Bytes>,
    /// Replacement erase PIN.
    pub new_erase_pin: Option<Bytes>,
    /// Which security operation this is.
    pub op_type: Option<SecurityOpType>,
}

impl WireMessage for Security {
    fn encode_raw(&self, buf: &mut BytesMut) {
        for (field, v) in [
            (3, &self.old_lock_pin),
            (4, &self.new_lock_pin),
            (5, &self.old_erase_pin),
            (6, &self.new_erase_pin),
        ] {
            if let Some(v) = v {
                put_bytes(field, v, buf);
            }
        }
        if let Some(v) = self.op_type {
            put_enum(7, v.as_i32(), buf);
        }
    }

    fn decode(buf: Bytes) -> ProtoResult<Self> {
        let mut sec = Self::default();
        let mut reader = FieldReader::new(buf);
        while let Some((field, value)) = reader.next_field()? {
            match field {
                3 => sec.old_lock_pin = Some(value.into_bytes(field)?),
                4 => sec.new_lock_pin = Some(value.into_bytes(field)?),
                5 => sec.old_erase_pin = Some(value.into_bytes(field)?),
                6 => sec.new_erase_pin = Some(value.into_bytes(field)?),
                7 => sec.op_type = Some(SecurityOpType::try_from(value.into_enum(field)?)?),
                _ => {}
            }
        }
        Ok(sec)
    }
}

/// PINOP arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PinOperation {
    /// Which PIN operation to run.
    pub op_type: Option<PinOpType>,
}

impl WireMessage for PinOperation {
    fn encode_raw(&self, buf: &mut BytesMut) {
        if let Some(v) = self.op_type {
            put_enum(1, v.as_i32(), buf);
        }
    }

    fn decode(buf: Bytes) -> ProtoResult<Self> {
        let mut op = Self::default();
        let mut reader = FieldReader::new(buf);
        while let Some((field, value)) = reader.next_field()? {
            if field == 1 {
                op.op_type = Some(PinOpType::try_from(value.into_enum(field)?)?);
            }
        }
        Ok(op)
    }
}

/// SET_POWER_LEVEL arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Power {
    /// Requested level.
    pub level: Option<PowerLevel>,
}

impl WireMessage for Power {
    fn encode_raw(&self, buf: &mut BytesMut) {
        if let Some(v) = self.level {
            put_enum(1, v.as_i32(), buf);
        }
    }

    fn decode(buf: Bytes) -> ProtoResult<Self> {
        let mut power = Self::default();
        let mut reader = FieldReader::new(buf);
        while let Some((field, value)) = reader.next_field()? {
            if field == 1 {
                power.level = Some(PowerLevel::try_from(value.into_enum(field)?)?);
            }
        }
        Ok(power)
    }
}

// ---------------------------------------------------------------------------
// Body / Command
// ---------------------------------------------------------------------------

/// Operation arguments; at most one section is normally set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Body {
    /// GET/PUT/DELETE family.
    pub key_value: Option<KeyValue>,
    /// GETKEYRANGE and media operations.
    pub range: Option<Range>,
    /// GETLOG.
    pub get_log: Option<GetLog>,
    /// SECURITY.
    pub security: Option<Security>,
    /// PINOP.
    pub pin_op: Option<PinOperation>,
    /// END_BATCH.
    pub batch: Option<Batch>,
    /// SET_POWER_LEVEL.
    pub power: Option<Power>,
}

impl WireMessage for Body {
    fn encode_raw(&self, buf: &mut BytesMut) {
        if let Some(v) = &self.key_value {
            put_message(1, v, buf);
        }
        if let Some(v) = &self.range {
            put_message(2, v, buf);
        }
        if let Some(v) = &self.get_log {
            put_message(6, v, buf);
        }
        if let Some(v) = &self.security {
            put_message(7, v, buf);
        }
        if let Some(v) = &self.pin_op {
            put_message(8, v, buf);
        }
        if let Some(v) = &self.batch {
            put_message(9, v, buf);
        }
        if let Some(v) = &self.power {
            put_message(10, v, buf);
        }
    }

    fn decode(buf: Bytes) -> ProtoResult<Self> {
        let mut body = Self::default();
        let mut reader = FieldReader::new(buf);
        while let Some((field, value)) = reader.next_field()? {
            match field {
                1 => body.key_value = Some(value.into_message(field)?),
                2 => body.range = Some(value.into_message(field)?),
                6 => body.get_log = Some(value.into_message(field)?),
                7 => body.security = Some(value.into_message(field)?),
                8 => body.pin_op = Some(value.into_message(field)?),
                9 => body.batch = Some(value.into_message(field)?),
                10 => body.power = Some(value.into_message(field)?),
                _ => {}
            }
        }
        Ok(body)
    }
}

/// The authenticated command carried in a message's `commandBytes`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Command {
    /// Header.
    pub header: Option<Header>,
    /// Arguments.
    pub body: Option<Body>,
    /// Outcome, in responses.
    pub status: Option<Status>,
}

impl Command {
    /// Message type from the header, if present.
    #[must_use]
    pub fn message_type(&self) -> Option<MessageType> {
        self.header.as_ref().and_then(|h| h.message_type)
    }

    /// Status code, treating an absent status as [`StatusCode::NotAttempted`].
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        self.status
            .as_ref()
            .and_then(|s| s.code)
            .unwrap_or(StatusCode::NotAttempted)
    }
}

impl WireMessage for Command {
    fn encode_raw(&self, buf: &mut BytesMut) {
        if let Some(v) = &self.header {
            put_message(1, v, buf);
        }
        if let Some(v) = &self.body {
            put_message(2, v, buf);
        }
        if let Some(v) = &self.status {
            put_message(3, v, buf);
        }
    }

    fn decode(buf: Bytes) -> ProtoResult<Self> {
        let mut command = Self::default();
        let mut reader = FieldReader::new(buf);
        while let Some((field, value)) = reader.next_field()? {
            match field {
                1 => command.header = Some(value.into_message(field)?),
                2 => command.body = Some(value.into_message(field)?),
                3 => command.status = Some(value.into_message(field)?),
                _ => {}
            }
        }
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtoError;

    fn put_command() -> Command {
        Command {
            header: Some(Header {
                cluster_version: Some(0),
                connection_id: Some(1_700_000_000_123),
                sequence: Some(42),
                message_type: Some(MessageType::Put),
                timeout: Some(60_000),
                priority: Some(Priority::Normal),
                ..Header::default()
            }),
            body: Some(Body {
                key_value: Some(KeyValue {
                    key: Some(Bytes::from_static(b"bucket/object")),
                    tag: Some(Bytes::from_static(&[0])),
                    algorithm: Some(Algorithm::Sha1),
                    force: Some(true),
                    synchronization: Some(Synchronization::WriteBack),
                    ..KeyValue::default()
                }),
                ..Body::default()
            }),
            status: None,
        }
    }

    #[test]
    fn test_should_round_trip_put_command() {
        let command = put_command();
        let bytes = command.encode_to_bytes();
        let decoded = Command::decode(bytes.clone()).unwrap();
        assert_eq!(decoded, command);
        assert_eq!(decoded.encode_to_bytes(), bytes);
    }

    #[test]
    fn test_should_encode_header_fields_in_schema_order() {
        let header = Header {
            sequence: Some(1),
            message_type: Some(MessageType::Get),
            ..Header::default()
        };
        // field 4 varint 1, field 7 varint 2
        assert_eq!(&header.encode_to_bytes()[..], &[0x20, 0x01, 0x38, 0x02]);
    }

    #[test]
    fn test_should_decode_range_response_keys() {
        let range = Range {
            keys: vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")],
            ..Range::default()
        };
        let command = Command {
            header: Some(Header {
                ack_sequence: Some(3),
                message_type: Some(MessageType::GetKeyRangeResponse),
                ..Header::default()
            }),
            body: Some(Body {
                range: Some(range),
                ..Body::default()
            }),
            status: Some(Status::with_code(StatusCode::Success)),
        };
        let decoded = Command::decode(command.encode_to_bytes()).unwrap();
        let keys = decoded.body.unwrap().range.unwrap().keys;
        assert_eq!(keys, vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")]);
        assert_eq!(decoded.status.unwrap().code, Some(StatusCode::Success));
    }

    #[test]
    fn test_should_report_missing_status_as_not_attempted() {
        assert_eq!(Command::default().status_code(), StatusCode::NotAttempted);
    }

    #[test]
    fn test_should_skip_unknown_fields() {
        let mut buf = BytesMut::new();
        put_uint(99, 7, &mut buf);
        put_uint(4, 5, &mut buf);
        let header = Header::decode(buf.freeze()).unwrap();
        assert_eq!(header.sequence, Some(5));
    }

    #[test]
    fn test_should_reject_unknown_status_code() {
        let mut buf = BytesMut::new();
        put_enum(1, 99, &mut buf);
        assert_eq!(
            Status::decode(buf.freeze()),
            Err(ProtoError::UnknownEnumValue {
                name: "StatusCode",
                value: 99
            })
        );
    }

    #[test]
    fn test_should_round_trip_get_log_sections() {
        let log = GetLog {
            types: vec![LogType::Capacities, LogType::Limits, LogType::Utilizations],
            utilizations: vec![Utilization {
                name: Some("HDA".to_owned()),
                value: Some(0.25),
            }],
            capacity: Some(Capacity {
                nominal_capacity_in_bytes: Some(4_000_000_000_000),
                portion_full: Some(0.5),
            }),
            limits: Some(Limits {
                max_key_size: Some(4096),
                max_value_size: Some(1024 * 1024),
                max_key_range_count: Some(800),
                ..Limits::default()
            }),
            ..GetLog::default()
        };
        let decoded = GetLog::decode(log.encode_to_bytes()).unwrap();
        assert_eq!(decoded, log);
    }

    #[test]
    fn test_should_pack_batch_sequences() {
        let batch = Batch {
            count: Some(3),
            sequence: vec![10, 11, 12],
            failed_sequence: None,
        };
        let bytes = batch.encode_to_bytes();
        // count, then one packed field rather than three tags
        assert_eq!(&bytes[..], &[0x08, 0x03, 0x12, 0x03, 10, 11, 12]);
        assert_eq!(Batch::decode(bytes).unwrap(), batch);
    }
}
