//! Device client over a framed TCP/TLS connection.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use kinstack_proto::{
    AuthType, Batch, Body, Command, GetLog, Header, KeyValue, LogType, Message, MessageType,
    PinOpType, PinOperation, Power, PowerLevel, Range, Security, SecurityOpType,
};
use tracing::{debug, info, trace, warn};

use crate::config::DeviceConfig;
use crate::device::{KvDevice, Record};
use crate::error::{DeviceError, DeviceResult};
use crate::options::{CmdOpts, KeyRange, MAX_KEY_SIZE, validate_key};
use crate::transport::{DeviceStream, FramedTransport, connect_tcp, connect_tls, tls_client_config};

/// How an outgoing message is authenticated.
enum Auth {
    Hmac,
    Pin(Bytes),
}

/// An open batch on a [`NetworkClient`].
///
/// Operations added with [`NetworkClient::batch_put`] and
/// [`NetworkClient::batch_delete`] take effect together when the batch is
/// ended, or not at all.
#[derive(Debug)]
pub struct BatchHandle {
    id: u32,
    operations: u32,
}

impl BatchHandle {
    /// Batch id carried in every batched command header.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Number of operations queued so far.
    #[must_use]
    pub fn operations(&self) -> u32 {
        self.operations
    }
}

/// One authenticated session with a device.
///
/// Requests are strictly sequential: each call consumes the next sequence
/// number, sends one frame and waits for the response that acknowledges it.
#[derive(Debug)]
pub struct NetworkClient {
    transport: FramedTransport,
    identity: i64,
    hmac_key: Bytes,
    connection_id: i64,
    next_sequence: u64,
    next_batch_id: u32,
    max_value_size: usize,
    request_timeout: Duration,
    usable: bool,
    /// Set while a request is on the wire. A caller that drops the future
    /// mid-request leaves it set, and the client then reports unusable.
    in_flight: bool,
}

impl NetworkClient {
    /// Connect to the device described by `config` and complete sign-on.
    pub async fn connect(config: &DeviceConfig) -> DeviceResult<Self> {
        let addr = config.address();
        if config.use_tls {
            let tls = tls_client_config(config.tls_ca_file.as_deref(), config.tls_skip_verify)?;
            let stream = connect_tls(&addr, &config.host, tls, config.connect_timeout()).await?;
            Self::sign_on(stream, config, addr).await
        } else {
            let stream = connect_tcp(&addr, config.connect_timeout()).await?;
            Self::sign_on(stream, config, addr).await
        }
    }

    /// Complete sign-on over an already connected stream.
    ///
    /// The device speaks first: an unsolicited status message carrying the
    /// connection id every later request must echo.
    pub async fn sign_on(
        stream: impl DeviceStream + 'static,
        config: &DeviceConfig,
        peer: impl Into<String>,
    ) -> DeviceResult<Self> {
        let mut transport = FramedTransport::new(stream, config.frame_limits(), peer);
        match Self::read_sign_on(&mut transport, config).await {
            Ok((connection_id, max_value_size)) => {
                info!(peer = %transport.peer(), connection_id, "signed on to device");
                Ok(Self {
                    transport,
                    identity: config.identity,
                    hmac_key: Bytes::from(config.hmac_key.clone().into_bytes()),
                    connection_id,
                    next_sequence: 1,
                    next_batch_id: 1,
                    max_value_size,
                    request_timeout: config.request_timeout(),
                    usable: true,
                    in_flight: false,
                })
            }
            Err(e) => {
                transport.close().await;
                Err(e)
            }
        }
    }

    async fn read_sign_on(
        transport: &mut FramedTransport,
        config: &DeviceConfig,
    ) -> DeviceResult<(i64, usize)> {
        let (message, _) = tokio::time::timeout(config.connect_timeout(), transport.recv())
            .await
            .map_err(|_| DeviceError::Timeout("sign-on"))??;
        if message.auth_type != Some(AuthType::UnsolicitedStatus) {
            return Err(DeviceError::Protocol(format!(
                "expected unsolicited status at sign-on, got {:?}",
                message.auth_type
            )));
        }
        let command = message.decode_command()?;
        if let Some(status) = &command.status {
            if let Some(code) = status.code.filter(|c| !c.is_success()) {
                return Err(DeviceError::status(
                    code,
                    status.status_message.clone().unwrap_or_default(),
                ));
            }
        }
        let connection_id = command
            .header
            .as_ref()
            .and_then(|h| h.connection_id)
            .ok_or_else(|| DeviceError::Protocol("sign-on without connection id".to_owned()))?;
        let advertised = command
            .body
            .as_ref()
            .and_then(|b| b.get_log.as_ref())
            .and_then(|l| l.limits.as_ref())
            .and_then(|l| l.max_value_size)
            .map(|n| n as usize);
        let max_value_size = advertised.map_or(config.max_value_size, |n| n.min(config.max_value_size));
        Ok((connection_id, max_value_size))
    }

    /// Connection id assigned at sign-on.
    #[must_use]
    pub fn connection_id(&self) -> i64 {
        self.connection_id
    }

    /// Sequence number the next request will carry.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Largest value this session will send or accept.
    #[must_use]
    pub fn max_value_size(&self) -> usize {
        self.max_value_size
    }

    // -----------------------------------------------------------------------
    // Batches
    // -----------------------------------------------------------------------

    /// Open a batch. The device does not acknowledge START_BATCH.
    pub async fn start_batch(&mut self) -> DeviceResult<BatchHandle> {
        let id = self.next_batch_id;
        self.next_batch_id = self.next_batch_id.wrapping_add(1).max(1);
        let mut header = self.next_header(MessageType::StartBatch, &CmdOpts::default());
        header.batch_id = Some(id);
        self.send_only(header, None, Bytes::new()).await?;
        debug!(connection_id = self.connection_id, batch_id = id, "batch started");
        Ok(BatchHandle { id, operations: 0 })
    }

    /// Queue a PUT in `batch`.
    pub async fn batch_put(
        &mut self,
        batch: &mut BatchHandle,
        key: &[u8],
        value: Bytes,
        opts: &CmdOpts,
    ) -> DeviceResult<()> {
        opts.validate(key, value.len(), self.max_value_size)?;
        let mut header = self.next_header(MessageType::Put, opts);
        header.batch_id = Some(batch.id);
        self.send_only(header, Some(put_body(key, opts)), value).await?;
        batch.operations += 1;
        Ok(())
    }

    /// Queue a DELETE in `batch`.
    pub async fn batch_delete(
        &mut self,
        batch: &mut BatchHandle,
        key: &[u8],
        opts: &CmdOpts,
    ) -> DeviceResult<()> {
        opts.validate(key, 0, self.max_value_size)?;
        let mut header = self.next_header(MessageType::Delete, opts);
        header.batch_id = Some(batch.id);
        self.send_only(header, Some(delete_body(key, opts)), Bytes::new())
            .await?;
        batch.operations += 1;
        Ok(())
    }

    /// Commit `batch`; the device applies every queued operation or none.
    pub async fn end_batch(&mut self, batch: BatchHandle) -> DeviceResult<Batch> {
        let mut header = self.next_header(MessageType::EndBatch, &CmdOpts::default());
        header.batch_id = Some(batch.id);
        let body = Body {
            batch: Some(Batch {
                count: Some(batch.operations),
                ..Batch::default()
            }),
            ..Body::default()
        };
        let (response, _) = self
            .round_trip(header, Some(body), Bytes::new(), Auth::Hmac)
            .await?;
        debug!(
            connection_id = self.connection_id,
            batch_id = batch.id,
            operations = batch.operations,
            "batch committed"
        );
        Ok(response.body.and_then(|b| b.batch).unwrap_or_default())
    }

    /// Discard `batch`.
    pub async fn abort_batch(&mut self, batch: BatchHandle) -> DeviceResult<()> {
        let mut header = self.next_header(MessageType::AbortBatch, &CmdOpts::default());
        header.batch_id = Some(batch.id);
        self.round_trip(header, None, Bytes::new(), Auth::Hmac)
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Security and PIN operations
    // -----------------------------------------------------------------------

    /// Change the lock PIN.
    pub async fn set_lock_pin(&mut self, old_pin: Bytes, new_pin: Bytes) -> DeviceResult<()> {
        let security = Security {
            old_lock_pin: Some(old_pin),
            new_lock_pin: Some(new_pin),
            op_type: Some(SecurityOpType::LockPin),
            ..Security::default()
        };
        self.security(security).await
    }

    /// Change the erase PIN.
    pub async fn set_erase_pin(&mut self, old_pin: Bytes, new_pin: Bytes) -> DeviceResult<()> {
        let security = Security {
            old_erase_pin: Some(old_pin),
            new_erase_pin: Some(new_pin),
            op_type: Some(SecurityOpType::ErasePin),
            ..Security::default()
        };
        self.security(security).await
    }

    async fn security(&mut self, security: Security) -> DeviceResult<()> {
        let header = self.next_header(MessageType::Security, &CmdOpts::default());
        let body = Body {
            security: Some(security),
            ..Body::default()
        };
        self.round_trip(header, Some(body), Bytes::new(), Auth::Hmac)
            .await?;
        Ok(())
    }

    /// Lock the device.
    pub async fn lock(&mut self, pin: Bytes) -> DeviceResult<()> {
        self.pin_op(PinOpType::Lock, pin).await
    }

    /// Unlock the device.
    pub async fn unlock(&mut self, pin: Bytes) -> DeviceResult<()> {
        self.pin_op(PinOpType::Unlock, pin).await
    }

    /// Erase every entry.
    pub async fn erase(&mut self, pin: Bytes) -> DeviceResult<()> {
        self.pin_op(PinOpType::Erase, pin).await
    }

    /// Cryptographically erase every entry.
    pub async fn secure_erase(&mut self, pin: Bytes) -> DeviceResult<()> {
        self.pin_op(PinOpType::SecureErase, pin).await
    }

    async fn pin_op(&mut self, op_type: PinOpType, pin: Bytes) -> DeviceResult<()> {
        let header = self.next_header(MessageType::PinOp, &CmdOpts::default());
        let body = Body {
            pin_op: Some(PinOperation {
                op_type: Some(op_type),
            }),
            ..Body::default()
        };
        self.round_trip(header, Some(body), Bytes::new(), Auth::Pin(pin))
            .await?;
        info!(connection_id = self.connection_id, op = %op_type, "pin operation completed");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------------

    /// Scan `range` for media errors; returns the keys reported.
    pub async fn media_scan(&mut self, range: &KeyRange) -> DeviceResult<Vec<Bytes>> {
        self.range_command(MessageType::MediaScan, range, &CmdOpts::default())
            .await
    }

    /// Compact `range`; returns the keys reported.
    pub async fn media_optimize(&mut self, range: &KeyRange) -> DeviceResult<Vec<Bytes>> {
        self.range_command(MessageType::MediaOptimize, range, &CmdOpts::default())
            .await
    }

    /// Persist all write-back data.
    pub async fn flush_all_data(&mut self) -> DeviceResult<()> {
        let header = self.next_header(MessageType::FlushAllData, &CmdOpts::default());
        self.round_trip(header, None, Bytes::new(), Auth::Hmac)
            .await?;
        Ok(())
    }

    /// Change the device power level.
    pub async fn set_power_level(&mut self, level: PowerLevel) -> DeviceResult<()> {
        let header = self.next_header(MessageType::SetPowerLevel, &CmdOpts::default());
        let body = Body {
            power: Some(Power { level: Some(level) }),
            ..Body::default()
        };
        self.round_trip(header, Some(body), Bytes::new(), Auth::Hmac)
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Request plumbing
    // -----------------------------------------------------------------------

    fn next_header(&mut self, message_type: MessageType, opts: &CmdOpts) -> Header {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        Header {
            cluster_version: Some(opts.cluster_version),
            connection_id: Some(self.connection_id),
            sequence: Some(sequence),
            message_type: Some(message_type),
            timeout: Some(opts.timeout),
            priority: Some(opts.priority),
            ..Header::default()
        }
    }

    fn sign(&self, command: &Command, auth: Auth) -> DeviceResult<Message> {
        Ok(match auth {
            Auth::Hmac => Message::hmac(self.identity, &self.hmac_key, command)?,
            Auth::Pin(pin) => Message::pin(pin, command),
        })
    }

    async fn range_command(
        &mut self,
        message_type: MessageType,
        range: &KeyRange,
        opts: &CmdOpts,
    ) -> DeviceResult<Vec<Bytes>> {
        range.validate()?;
        let header = self.next_header(message_type, opts);
        let body = Body {
            range: Some(Range {
                start_key: Some(range.start.clone()),
                end_key: Some(range.end.clone()),
                start_key_inclusive: Some(range.start_inclusive),
                end_key_inclusive: Some(range.end_inclusive),
                max_returned: Some(range.max_returned),
                reverse: Some(range.reverse),
                keys: Vec::new(),
            }),
            ..Body::default()
        };
        let (response, _) = self
            .round_trip(header, Some(body), Bytes::new(), Auth::Hmac)
            .await?;
        Ok(response
            .body
            .and_then(|b| b.range)
            .map(|r| r.keys)
            .unwrap_or_default())
    }

    async fn get_family(
        &mut self,
        message_type: MessageType,
        key: &[u8],
        opts: &CmdOpts,
    ) -> DeviceResult<Record> {
        let header = self.next_header(message_type, opts);
        let body = Body {
            key_value: Some(KeyValue {
                key: Some(Bytes::copy_from_slice(key)),
                metadata_only: opts.metadata_only.then_some(true),
                ..KeyValue::default()
            }),
            ..Body::default()
        };
        let (response, value) = self
            .round_trip(header, Some(body), Bytes::new(), Auth::Hmac)
            .await?;
        let kv = response.body.and_then(|b| b.key_value).unwrap_or_default();
        Ok(Record {
            key: kv.key.unwrap_or_default(),
            value,
            version: kv.db_version.unwrap_or_default(),
            tag: kv.tag.unwrap_or_default(),
            algorithm: kv.algorithm,
        })
    }

    /// Send a request and wait for its correlated, successful response.
    async fn round_trip(
        &mut self,
        header: Header,
        body: Option<Body>,
        value: Bytes,
        auth: Auth,
    ) -> DeviceResult<(Command, Bytes)> {
        if !self.is_usable() {
            return Err(DeviceError::ConnectionClosed);
        }
        self.in_flight = true;
        let result = self.exchange(header, body, value, auth).await;
        self.in_flight = false;
        if let Err(e) = &result {
            if e.is_connection_fatal() {
                self.mark_unusable(e).await;
            }
        }
        result
    }

    async fn exchange(
        &mut self,
        header: Header,
        body: Option<Body>,
        value: Bytes,
        auth: Auth,
    ) -> DeviceResult<(Command, Bytes)> {
        let sequence = header.sequence.unwrap_or_default();
        let request_type = header
            .message_type
            .ok_or_else(|| DeviceError::InvalidArgument("request without message type".into()))?;
        let expected = request_type.response().ok_or_else(|| {
            DeviceError::InvalidArgument(format!("{request_type} is not a request type"))
        })?;
        let command = Command {
            header: Some(header),
            body,
            status: None,
        };
        let message = self.sign(&command, auth)?;
        trace!(
            connection_id = self.connection_id,
            sequence,
            message_type = %request_type,
            value_len = value.len(),
            "sending request"
        );
        self.transport.send(&message, &value).await?;

        let (response, value) = tokio::time::timeout(self.request_timeout, self.transport.recv())
            .await
            .map_err(|_| DeviceError::Timeout("device response"))??;
        let command = self.authenticate_response(&response)?;
        correlate(&command, sequence, expected)?;

        let code = command.status_code();
        if !code.is_success() {
            let message = command
                .status
                .as_ref()
                .and_then(|s| s.status_message.clone())
                .unwrap_or_default();
            debug!(
                connection_id = self.connection_id,
                sequence,
                status = %code,
                "device returned error status"
            );
            return Err(DeviceError::status(code, message));
        }
        Ok((command, value))
    }

    /// Send a request the device does not acknowledge.
    async fn send_only(&mut self, header: Header, body: Option<Body>, value: Bytes) -> DeviceResult<()> {
        if !self.is_usable() {
            return Err(DeviceError::ConnectionClosed);
        }
        let command = Command {
            header: Some(header),
            body,
            status: None,
        };
        self.in_flight = true;
        let result = match self.sign(&command, Auth::Hmac) {
            Ok(message) => self.transport.send(&message, &value).await,
            Err(e) => Err(e),
        };
        self.in_flight = false;
        if let Err(e) = &result {
            if e.is_connection_fatal() {
                self.mark_unusable(e).await;
            }
        }
        result
    }

    fn authenticate_response(&self, response: &Message) -> DeviceResult<Command> {
        match response.auth_type {
            Some(AuthType::Hmac) => {
                response.verify_hmac(&self.hmac_key)?;
                Ok(response.decode_command()?)
            }
            Some(AuthType::Pin) => Ok(response.decode_command()?),
            Some(AuthType::UnsolicitedStatus) => {
                let command = response.decode_command()?;
                Err(DeviceError::Protocol(format!(
                    "device sent unsolicited status {}",
                    command.status_code()
                )))
            }
            None => Err(DeviceError::Protocol("response without auth type".into())),
        }
    }

    async fn mark_unusable(&mut self, cause: &DeviceError) {
        if self.usable {
            warn!(
                peer = %self.transport.peer(),
                connection_id = self.connection_id,
                error = %cause,
                "device connection is no longer usable"
            );
        }
        self.usable = false;
        self.transport.close().await;
    }
}

fn correlate(command: &Command, sequence: u64, expected: MessageType) -> DeviceResult<()> {
    let header = command
        .header
        .as_ref()
        .ok_or_else(|| DeviceError::Protocol("response without header".into()))?;
    if header.ack_sequence != Some(sequence) {
        return Err(DeviceError::Protocol(format!(
            "response acknowledges sequence {:?}, expected {sequence}",
            header.ack_sequence
        )));
    }
    if header.message_type != Some(expected) {
        return Err(DeviceError::Protocol(format!(
            "response type {:?}, expected {expected}",
            header.message_type
        )));
    }
    Ok(())
}

fn put_body(key: &[u8], opts: &CmdOpts) -> Body {
    Body {
        key_value: Some(KeyValue {
            new_version: opts.new_version.clone(),
            key: Some(Bytes::copy_from_slice(key)),
            db_version: opts.db_version.clone(),
            tag: Some(opts.tag.clone()),
            algorithm: Some(opts.algorithm),
            metadata_only: None,
            force: Some(opts.force),
            synchronization: Some(opts.synchronization),
        }),
        ..Body::default()
    }
}

fn delete_body(key: &[u8], opts: &CmdOpts) -> Body {
    Body {
        key_value: Some(KeyValue {
            key: Some(Bytes::copy_from_slice(key)),
            db_version: opts.db_version.clone(),
            force: Some(opts.force),
            synchronization: Some(opts.synchronization),
            ..KeyValue::default()
        }),
        ..Body::default()
    }
}

fn validate_bound(key: &[u8]) -> DeviceResult<()> {
    if key.len() > MAX_KEY_SIZE {
        return Err(DeviceError::InvalidArgument(format!(
            "key is {} bytes, limit is {MAX_KEY_SIZE}",
            key.len()
        )));
    }
    Ok(())
}

#[async_trait]
impl KvDevice for NetworkClient {
    async fn get(&mut self, key: &[u8], opts: &CmdOpts) -> DeviceResult<Record> {
        validate_key(key)?;
        self.get_family(MessageType::Get, key, opts).await
    }

    async fn get_next(&mut self, key: &[u8], opts: &CmdOpts) -> DeviceResult<Record> {
        validate_bound(key)?;
        self.get_family(MessageType::GetNext, key, opts).await
    }

    async fn get_previous(&mut self, key: &[u8], opts: &CmdOpts) -> DeviceResult<Record> {
        validate_bound(key)?;
        self.get_family(MessageType::GetPrevious, key, opts).await
    }

    async fn get_version(&mut self, key: &[u8], opts: &CmdOpts) -> DeviceResult<Bytes> {
        validate_key(key)?;
        let record = self.get_family(MessageType::GetVersion, key, opts).await?;
        Ok(record.version)
    }

    async fn put(&mut self, key: &[u8], value: Bytes, opts: &CmdOpts) -> DeviceResult<()> {
        opts.validate(key, value.len(), self.max_value_size)?;
        let header = self.next_header(MessageType::Put, opts);
        self.round_trip(header, Some(put_body(key, opts)), value, Auth::Hmac)
            .await?;
        Ok(())
    }

    async fn delete(&mut self, key: &[u8], opts: &CmdOpts) -> DeviceResult<()> {
        opts.validate(key, 0, self.max_value_size)?;
        let header = self.next_header(MessageType::Delete, opts);
        self.round_trip(header, Some(delete_body(key, opts)), Bytes::new(), Auth::Hmac)
            .await?;
        Ok(())
    }

    async fn get_key_range(
        &mut self,
        range: &KeyRange,
        opts: &CmdOpts,
    ) -> DeviceResult<Vec<Bytes>> {
        self.range_command(MessageType::GetKeyRange, range, opts)
            .await
    }

    async fn noop(&mut self) -> DeviceResult<()> {
        let header = self.next_header(MessageType::Noop, &CmdOpts::default());
        self.round_trip(header, None, Bytes::new(), Auth::Hmac)
            .await?;
        Ok(())
    }

    async fn get_log(&mut self, types: &[LogType]) -> DeviceResult<GetLog> {
        let header = self.next_header(MessageType::GetLog, &CmdOpts::default());
        let body = Body {
            get_log: Some(GetLog {
                types: types.to_vec(),
                ..GetLog::default()
            }),
            ..Body::default()
        };
        let (response, _) = self
            .round_trip(header, Some(body), Bytes::new(), Auth::Hmac)
            .await?;
        Ok(response.body.and_then(|b| b.get_log).unwrap_or_default())
    }

    async fn close(&mut self) -> DeviceResult<()> {
        self.usable = false;
        self.transport.close().await;
        Ok(())
    }

    fn is_usable(&self) -> bool {
        self.usable && !self.in_flight && self.transport.is_open()
    }
}

#[cfg(test)]
mod tests {
    use kinstack_proto::{Status, StatusCode};
    use tokio::io::DuplexStream;

    use super::*;

    fn config() -> DeviceConfig {
        DeviceConfig::builder().timeout_ms(2_000).build()
    }

    /// Device end of a duplex pipe that speaks raw frames.
    struct ScriptedDevice {
        transport: FramedTransport,
    }

    impl ScriptedDevice {
        fn new(stream: DuplexStream) -> Self {
            Self {
                transport: FramedTransport::new(stream, config().frame_limits(), "client"),
            }
        }

        async fn sign_on(&mut self, connection_id: i64) {
            let command = Command {
                header: Some(Header {
                    connection_id: Some(connection_id),
                    cluster_version: Some(0),
                    ..Header::default()
                }),
                ..Command::default()
            };
            self.transport
                .send(&Message::unsolicited(&command), &[])
                .await
                .unwrap();
        }

        async fn next_request(&mut self) -> Command {
            let (message, _) = self.transport.recv().await.unwrap();
            message.verify_hmac(b"asdfasdf").unwrap();
            message.decode_command().unwrap()
        }

        async fn reply(&mut self, ack: u64, message_type: MessageType, code: StatusCode) {
            let command = Command {
                header: Some(Header {
                    ack_sequence: Some(ack),
                    message_type: Some(message_type),
                    ..Header::default()
                }),
                body: None,
                status: Some(Status::with_code(code)),
            };
            let message = Message::hmac(1, b"asdfasdf", &command).unwrap();
            self.transport.send(&message, &[]).await.unwrap();
        }
    }

    async fn connected_pair() -> (NetworkClient, ScriptedDevice) {
        let (client_end, device_end) = tokio::io::duplex(64 * 1024);
        let mut device = ScriptedDevice::new(device_end);
        device.sign_on(77).await;
        let client = NetworkClient::sign_on(client_end, &config(), "device")
            .await
            .unwrap();
        (client, device)
    }

    #[tokio::test]
    async fn test_should_adopt_connection_id_at_sign_on() {
        let (client, _device) = connected_pair().await;
        assert_eq!(client.connection_id(), 77);
        assert_eq!(client.sequence(), 1);
        assert!(client.is_usable());
    }

    #[tokio::test]
    async fn test_should_reject_signed_first_message() {
        let (client_end, device_end) = tokio::io::duplex(4096);
        let mut device = ScriptedDevice::new(device_end);
        device.reply(0, MessageType::NoopResponse, StatusCode::Success).await;
        let err = NetworkClient::sign_on(client_end, &config(), "device")
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_should_increment_sequence_and_echo_connection_id() {
        let (mut client, mut device) = connected_pair().await;
        let server = tokio::spawn(async move {
            for expected in 1..=2u64 {
                let request = device.next_request().await;
                let header = request.header.unwrap();
                assert_eq!(header.sequence, Some(expected));
                assert_eq!(header.connection_id, Some(77));
                device
                    .reply(expected, MessageType::NoopResponse, StatusCode::Success)
                    .await;
            }
        });
        client.noop().await.unwrap();
        client.noop().await.unwrap();
        server.await.unwrap();
        assert_eq!(client.sequence(), 3);
    }

    #[tokio::test]
    async fn test_should_keep_connection_after_status_error() {
        let (mut client, mut device) = connected_pair().await;
        let server = tokio::spawn(async move {
            let request = device.next_request().await;
            let seq = request.header.unwrap().sequence.unwrap();
            device
                .reply(seq, MessageType::GetResponse, StatusCode::NotFound)
                .await;
            device
        });
        let err = client.get(b"missing", &CmdOpts::default()).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(client.is_usable());
        drop(server.await.unwrap());
    }

    #[tokio::test]
    async fn test_should_become_unusable_on_uncorrelated_response() {
        let (mut client, mut device) = connected_pair().await;
        let server = tokio::spawn(async move {
            let _ = device.next_request().await;
            device
                .reply(999, MessageType::NoopResponse, StatusCode::Success)
                .await;
            device
        });
        let err = client.noop().await.unwrap_err();
        assert!(matches!(err, DeviceError::Protocol(_)));
        assert!(!client.is_usable());
        assert!(matches!(
            client.noop().await,
            Err(DeviceError::ConnectionClosed)
        ));
        drop(server.await.unwrap());
    }

    #[tokio::test]
    async fn test_should_reject_wrong_response_type() {
        let (mut client, mut device) = connected_pair().await;
        let server = tokio::spawn(async move {
            let request = device.next_request().await;
            let seq = request.header.unwrap().sequence.unwrap();
            device
                .reply(seq, MessageType::PutResponse, StatusCode::Success)
                .await;
            device
        });
        assert!(matches!(
            client.noop().await,
            Err(DeviceError::Protocol(_))
        ));
        drop(server.await.unwrap());
    }

    #[tokio::test]
    async fn test_should_reject_invalid_arguments_without_io() {
        let (mut client, _device) = connected_pair().await;
        let err = client
            .put(b"", Bytes::from_static(b"v"), &CmdOpts::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceError::InvalidArgument(_)));
        assert_eq!(client.sequence(), 1);
        assert!(client.is_usable());
    }

    #[tokio::test]
    async fn test_should_time_out_and_become_unusable() {
        let (client_end, device_end) = tokio::io::duplex(64 * 1024);
        let mut device = ScriptedDevice::new(device_end);
        device.sign_on(5).await;
        let config = DeviceConfig::builder().timeout_ms(50).build();
        let mut client = NetworkClient::sign_on(client_end, &config, "device")
            .await
            .unwrap();
        assert!(matches!(
            client.noop().await,
            Err(DeviceError::Timeout(_))
        ));
        assert!(!client.is_usable());
        drop(device);
    }

    #[tokio::test]
    async fn test_should_retire_connection_when_request_is_cancelled() {
        let (mut client, mut device) = connected_pair().await;
        let abandoned = tokio::time::timeout(Duration::from_millis(20), client.noop()).await;
        assert!(abandoned.is_err());
        assert!(!client.is_usable());

        // the late reply must not be read as the answer to a new request
        let request = device.next_request().await;
        let seq = request.header.unwrap().sequence.unwrap();
        device
            .reply(seq, MessageType::NoopResponse, StatusCode::Success)
            .await;
        assert!(matches!(
            client.noop().await,
            Err(DeviceError::ConnectionClosed)
        ));
        assert_eq!(client.sequence(), 2);
    }

    #[tokio::test]
    async fn test_should_send_put_fields_in_body() {
        let (mut client, mut device) = connected_pair().await;
        let server = tokio::spawn(async move {
            let (message, value) = device.transport.recv().await.unwrap();
            let request = message.decode_command().unwrap();
            let kv = request.body.unwrap().key_value.unwrap();
            assert_eq!(kv.key.as_deref(), Some(&b"bucket.photos"[..]));
            assert_eq!(kv.force, Some(true));
            assert_eq!(&value[..], b"{}");
            let seq = request.header.unwrap().sequence.unwrap();
            device
                .reply(seq, MessageType::PutResponse, StatusCode::Success)
                .await;
            device
        });
        client
            .put(b"bucket.photos", Bytes::from_static(b"{}"), &CmdOpts::default())
            .await
            .unwrap();
        drop(server.await.unwrap());
    }
}
