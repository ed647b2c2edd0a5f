//! Loopback device simulator.
//!
//! Serves the device protocol on a local TCP port, backed by a
//! [`MemoryDevice`]. It signs on every connection, verifies HMACs,
//! correlates responses and supports batches, logs, PIN operations and
//! power levels, which is enough to run the store and the network client
//! end to end without hardware.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use kinstack_proto::{
    Algorithm, AuthType, Batch, Body, Capacity, Command, GetLog, Header, KeyValue, Limits,
    LogType, Message, MessageType, PinOpType, PowerLevel, Priority, Range, Security,
    SecurityOpType, Status, StatusCode, Synchronization, Temperature, Utilization,
};
use parking_lot::Mutex;
use rand::RngExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

use crate::config::DeviceConfig;
use crate::device::KvDevice;
use crate::error::{DeviceError, DeviceResult};
use crate::fastpath::{FastPathClient, SkinnyWaist};
use crate::memory::MemoryDevice;
use crate::options::{CmdOpts, KeyRange, MAX_KEY_SIZE, MAX_TAG_SIZE, MAX_VERSION_SIZE};
use crate::transport::FramedTransport;

/// Largest encoded message the simulator accepts.
const MAX_MESSAGE_SIZE: u32 = 1024 * 1024;

/// Settings of a [`DeviceSimulator`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct SimulatorOptions {
    /// Identity allowed to sign requests.
    #[builder(default = 1)]
    pub identity: i64,
    /// HMAC key of `identity`.
    #[builder(default = String::from("asdfasdf"), setter(into))]
    pub hmac_key: String,
    /// Cluster version requests must carry.
    #[builder(default = 0)]
    pub cluster_version: i64,
    /// Largest value advertised at sign-on.
    #[builder(default = 1024 * 1024)]
    pub max_value_size: usize,
    /// Initial lock PIN.
    #[builder(default, setter(into))]
    pub lock_pin: Bytes,
    /// Initial erase PIN.
    #[builder(default, setter(into))]
    pub erase_pin: Bytes,
}

impl Default for SimulatorOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug)]
struct Controls {
    locked: bool,
    power: PowerLevel,
    lock_pin: Bytes,
    erase_pin: Bytes,
}

#[derive(Debug)]
struct DeviceState {
    device: Arc<MemoryDevice>,
    options: SimulatorOptions,
    controls: Mutex<Controls>,
    batches: tokio::sync::Mutex<()>,
}

/// A device served on a loopback port.
#[derive(Debug)]
pub struct DeviceSimulator {
    addr: SocketAddr,
    state: Arc<DeviceState>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl DeviceSimulator {
    /// Bind an ephemeral loopback port and start serving an empty device.
    pub async fn start(options: SimulatorOptions) -> DeviceResult<Self> {
        Self::with_device(Arc::new(MemoryDevice::new()), options).await
    }

    /// Serve an existing device.
    pub async fn with_device(
        device: Arc<MemoryDevice>,
        options: SimulatorOptions,
    ) -> DeviceResult<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(DeviceState {
            device,
            controls: Mutex::new(Controls {
                locked: false,
                power: PowerLevel::Operational,
                lock_pin: options.lock_pin.clone(),
                erase_pin: options.erase_pin.clone(),
            }),
            options,
            batches: tokio::sync::Mutex::new(()),
        });
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(accept_loop(listener, Arc::clone(&state), shutdown_rx));
        info!(%addr, "device simulator listening");
        Ok(Self {
            addr,
            state,
            shutdown,
            task: Some(task),
        })
    }

    /// Bound address.
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Backing device.
    #[must_use]
    pub fn device(&self) -> &Arc<MemoryDevice> {
        &self.state.device
    }

    /// Client configuration that reaches this simulator.
    #[must_use]
    pub fn device_config(&self) -> DeviceConfig {
        DeviceConfig::builder()
            .host(self.addr.ip().to_string())
            .port(self.addr.port())
            .identity(self.state.options.identity)
            .hmac_key(self.state.options.hmac_key.clone())
            .max_value_size(self.state.options.max_value_size)
            .timeout_ms(5_000)
            .build()
    }

    /// Stop accepting and drop every open connection.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "device simulator task failed");
            }
        }
    }
}

impl Drop for DeviceSimulator {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    state: Arc<DeviceState>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };
                let state = Arc::clone(&state);
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve(stream, peer, state, shutdown).await {
                        debug!(%peer, error = %e, "simulated device connection ended");
                    }
                });
            }
            _ = shutdown.changed() => {
                info!("device simulator shutting down");
                break;
            }
        }
    }
}

fn random_connection_id() -> i64 {
    let mut buf = [0u8; 8];
    let mut rng = rand::rng();
    rng.fill(&mut buf);
    (i64::from_be_bytes(buf) & i64::MAX).max(1)
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// Operation queued inside an open batch.
#[derive(Debug)]
struct QueuedOp {
    sequence: u64,
    message_type: MessageType,
    opts: CmdOpts,
    key: Bytes,
    value: Bytes,
}

/// Outcome of one request, before it is framed.
#[derive(Debug, Default)]
struct Reply {
    status: Status,
    body: Option<Body>,
    value: Bytes,
}

impl Reply {
    fn ok() -> Self {
        Self {
            status: Status::with_code(StatusCode::Success),
            ..Self::default()
        }
    }

    fn with_body(body: Body) -> Self {
        Self {
            body: Some(body),
            ..Self::ok()
        }
    }

    fn failed(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status: Status::with_message(code, message),
            ..Self::default()
        }
    }

    fn from_error(err: &DeviceError) -> Self {
        match err {
            DeviceError::Status { code, message } => Self::failed(*code, message.clone()),
            DeviceError::InvalidArgument(message) => {
                Self::failed(StatusCode::InvalidRequest, message.clone())
            }
            other => Self::failed(StatusCode::InternalError, other.to_string()),
        }
    }
}

struct Session {
    state: Arc<DeviceState>,
    client: FastPathClient,
    connection_id: i64,
    batches: HashMap<u32, Vec<QueuedOp>>,
}

async fn serve(
    stream: TcpStream,
    peer: SocketAddr,
    state: Arc<DeviceState>,
    mut shutdown: watch::Receiver<bool>,
) -> DeviceResult<()> {
    stream.set_nodelay(true)?;
    let limits = kinstack_proto::FrameLimits {
        max_message_len: MAX_MESSAGE_SIZE,
        max_value_len: u32::try_from(state.options.max_value_size).unwrap_or(u32::MAX),
    };
    let mut transport = FramedTransport::new(stream, limits, peer.to_string());
    let waist: Arc<dyn SkinnyWaist> = state.device.clone();
    let mut session = Session {
        client: FastPathClient::new(waist, state.options.identity, state.options.max_value_size),
        connection_id: random_connection_id(),
        state,
        batches: HashMap::new(),
    };
    transport
        .send(&Message::unsolicited(&session.sign_on()), &[])
        .await?;
    debug!(%peer, connection_id = session.connection_id, "simulated device signed on");

    loop {
        let frame = tokio::select! {
            biased;
            _ = shutdown.changed() => None,
            frame = transport.recv() => Some(frame),
        };
        let Some(frame) = frame else {
            transport.close().await;
            return Ok(());
        };
        let (message, value) = frame?;
        let Some((response, value)) = session.handle(&message, value).await? else {
            continue;
        };
        let last = response.auth_type == Some(AuthType::UnsolicitedStatus);
        transport.send(&response, &value).await?;
        if last {
            transport.close().await;
            return Ok(());
        }
    }
}

impl Session {
    fn sign_on(&self) -> Command {
        Command {
            header: Some(Header {
                cluster_version: Some(self.state.options.cluster_version),
                connection_id: Some(self.connection_id),
                ..Header::default()
            }),
            body: Some(Body {
                get_log: Some(GetLog {
                    limits: Some(self.limits()),
                    ..GetLog::default()
                }),
                ..Body::default()
            }),
            status: Some(Status::with_code(StatusCode::Success)),
        }
    }

    fn limits(&self) -> Limits {
        let max_value = u32::try_from(self.state.options.max_value_size).unwrap_or(u32::MAX);
        Limits {
            max_key_size: Some(MAX_KEY_SIZE as u32),
            max_value_size: Some(max_value),
            max_version_size: Some(MAX_VERSION_SIZE as u32),
            max_tag_size: Some(MAX_TAG_SIZE as u32),
            max_connections: Some(100),
            max_outstanding_read_requests: Some(1),
            max_outstanding_write_requests: Some(1),
            max_message_size: Some(MAX_MESSAGE_SIZE),
            max_key_range_count: Some(800),
            max_identity_count: Some(1),
            max_pin_size: Some(32),
            max_operation_count_per_batch: Some(15),
            max_batch_count_per_device: Some(5),
        }
    }

    /// Process one request. `None` means the request is not acknowledged.
    async fn handle(
        &mut self,
        message: &Message,
        value: Bytes,
    ) -> DeviceResult<Option<(Message, Bytes)>> {
        let pin = match message.auth_type {
            Some(AuthType::Hmac) => {
                let identity = message.hmac_auth.as_ref().and_then(|a| a.identity);
                let verified = identity == Some(self.state.options.identity)
                    && message
                        .verify_hmac(self.state.options.hmac_key.as_bytes())
                        .is_ok();
                if !verified {
                    warn!(connection_id = self.connection_id, ?identity, "hmac verification failed");
                    return Ok(Some(self.terminate(StatusCode::HmacFailure, "hmac failure")));
                }
                None
            }
            Some(AuthType::Pin) => Some(
                message
                    .pin_auth
                    .as_ref()
                    .and_then(|a| a.pin.clone())
                    .unwrap_or_default(),
            ),
            _ => {
                return Ok(Some(
                    self.terminate(StatusCode::InvalidRequest, "unexpected auth type"),
                ));
            }
        };

        let command = message.decode_command()?;
        let header = command.header.clone().unwrap_or_default();
        let Some(request_type) = header.message_type.filter(|t| t.is_request()) else {
            return Ok(Some(
                self.terminate(StatusCode::HeaderRequired, "request type missing"),
            ));
        };
        let sequence = header.sequence.unwrap_or_default();

        if let Some(batch_id) = header.batch_id {
            if self.enqueue(batch_id, request_type, &header, &command, value.clone()) {
                return Ok(None);
            }
        }

        let is_pin = pin.is_some();
        let reply = if request_type == MessageType::PinOp {
            match pin {
                Some(pin) => self.pin_op(&command, &pin),
                None => Reply::failed(StatusCode::NotAuthorized, "pin operation requires pin auth"),
            }
        } else if is_pin {
            Reply::failed(StatusCode::NotAuthorized, "pin auth only allowed for pin operations")
        } else {
            self.execute(request_type, &header, &command, value).await
        };

        let response = Command {
            header: Some(Header {
                ack_sequence: Some(sequence),
                connection_id: Some(self.connection_id),
                message_type: request_type.response(),
                ..Header::default()
            }),
            body: reply.body,
            status: Some(reply.status),
        };
        let message = if is_pin {
            Message::pin(Bytes::new(), &response)
        } else {
            Message::hmac(
                self.state.options.identity,
                self.state.options.hmac_key.as_bytes(),
                &response,
            )?
        };
        Ok(Some((message, reply.value)))
    }

    fn terminate(&self, code: StatusCode, message: &str) -> (Message, Bytes) {
        let command = Command {
            header: Some(Header {
                connection_id: Some(self.connection_id),
                ..Header::default()
            }),
            body: None,
            status: Some(Status::with_message(code, message)),
        };
        (Message::unsolicited(&command), Bytes::new())
    }

    /// Queue batched commands; returns false when the command is not a
    /// batch member and must be executed normally.
    fn enqueue(
        &mut self,
        batch_id: u32,
        request_type: MessageType,
        header: &Header,
        command: &Command,
        value: Bytes,
    ) -> bool {
        match request_type {
            MessageType::StartBatch => {
                self.batches.insert(batch_id, Vec::new());
                true
            }
            MessageType::Put | MessageType::Delete => {
                let kv = command
                    .body
                    .as_ref()
                    .and_then(|b| b.key_value.clone())
                    .unwrap_or_default();
                let op = QueuedOp {
                    sequence: header.sequence.unwrap_or_default(),
                    message_type: request_type,
                    opts: opts_from(header, &kv),
                    key: kv.key.unwrap_or_default(),
                    value,
                };
                // Commands for an unknown batch are dropped; END_BATCH then
                // reports the count mismatch.
                if let Some(ops) = self.batches.get_mut(&batch_id) {
                    ops.push(op);
                }
                true
            }
            _ => false,
        }
    }

    async fn execute(
        &mut self,
        request_type: MessageType,
        header: &Header,
        command: &Command,
        value: Bytes,
    ) -> Reply {
        if header.cluster_version.unwrap_or_default() != self.state.options.cluster_version {
            return Reply::failed(StatusCode::VersionFailure, "cluster version mismatch");
        }
        {
            let controls = self.state.controls.lock();
            if controls.locked {
                return Reply::failed(StatusCode::DeviceLocked, "device is locked");
            }
            if request_type != MessageType::SetPowerLevel {
                match controls.power {
                    PowerLevel::Operational => {}
                    PowerLevel::Hibernate => {
                        return Reply::failed(StatusCode::Hibernate, "device is hibernating");
                    }
                    PowerLevel::Shutdown | PowerLevel::Fail => {
                        return Reply::failed(StatusCode::Shutdown, "device is shut down");
                    }
                }
            }
        }

        let body = command.body.clone().unwrap_or_default();
        let kv = body.key_value.clone().unwrap_or_default();
        let key = kv.key.clone().unwrap_or_default();
        let opts = opts_from(header, &kv);
        let result = match request_type {
            MessageType::Get
            | MessageType::GetNext
            | MessageType::GetPrevious
            | MessageType::GetVersion => self.read(request_type, &key, &opts).await,
            MessageType::Put => self.client.put(&key, value, &opts).await.map(|()| Reply::ok()),
            MessageType::Delete => self.client.delete(&key, &opts).await.map(|()| Reply::ok()),
            MessageType::GetKeyRange => {
                let range = range_from(body.range.as_ref());
                self.client
                    .get_key_range(&range, &opts)
                    .await
                    .map(|keys| range_reply(&range, keys))
            }
            MessageType::MediaScan | MessageType::MediaOptimize => {
                Ok(range_reply(&range_from(body.range.as_ref()), Vec::new()))
            }
            MessageType::GetLog => Ok(self.get_log(&body.get_log.unwrap_or_default().types)),
            MessageType::Security => Ok(self.security(body.security.unwrap_or_default())),
            MessageType::SetPowerLevel => {
                let level = body
                    .power
                    .and_then(|p| p.level)
                    .unwrap_or(PowerLevel::Operational);
                self.state.controls.lock().power = level;
                info!(connection_id = self.connection_id, %level, "power level changed");
                Ok(Reply::ok())
            }
            MessageType::EndBatch => {
                let batch_id = header.batch_id.unwrap_or_default();
                let count = body.batch.and_then(|b| b.count).unwrap_or_default();
                Ok(self.commit(batch_id, count).await)
            }
            MessageType::AbortBatch => {
                self.batches.remove(&header.batch_id.unwrap_or_default());
                Ok(Reply::ok())
            }
            MessageType::Noop | MessageType::FlushAllData => Ok(Reply::ok()),
            other => Ok(Reply::failed(
                StatusCode::InvalidRequest,
                format!("{other} is not supported"),
            )),
        };
        result.unwrap_or_else(|e| Reply::from_error(&e))
    }

    async fn read(&mut self, request_type: MessageType, key: &[u8], opts: &CmdOpts) -> DeviceResult<Reply> {
        let record = match request_type {
            MessageType::GetNext => self.client.get_next(key, opts).await?,
            MessageType::GetPrevious => self.client.get_previous(key, opts).await?,
            MessageType::GetVersion => {
                let metadata = CmdOpts {
                    metadata_only: true,
                    ..opts.clone()
                };
                self.client.get(key, &metadata).await?
            }
            _ => self.client.get(key, opts).await?,
        };
        let value = if request_type == MessageType::GetVersion {
            Bytes::new()
        } else {
            Bytes::copy_from_slice(&record.value)
        };
        Ok(Reply {
            body: Some(Body {
                key_value: Some(KeyValue {
                    key: Some(record.key),
                    db_version: Some(record.version),
                    tag: Some(record.tag),
                    algorithm: record.algorithm,
                    ..KeyValue::default()
                }),
                ..Body::default()
            }),
            value,
            ..Reply::ok()
        })
    }

    fn get_log(&self, types: &[LogType]) -> Reply {
        let device = &self.state.device;
        let full = if device.capacity() == 0 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
            let ratio = (device.used_bytes() as f64 / device.capacity() as f64) as f32;
            ratio
        };
        let mut log = GetLog {
            types: types.to_vec(),
            ..GetLog::default()
        };
        for log_type in types {
            match log_type {
                LogType::Utilizations => {
                    log.utilizations = vec![Utilization {
                        name: Some("HDA".to_owned()),
                        value: Some(full),
                    }];
                }
                LogType::Temperatures => {
                    log.temperatures = vec![Temperature {
                        name: Some("HDA".to_owned()),
                        current: Some(35.0),
                        minimum: Some(5.0),
                        maximum: Some(70.0),
                        target: Some(25.0),
                    }];
                }
                LogType::Capacities => {
                    log.capacity = Some(Capacity {
                        nominal_capacity_in_bytes: Some(device.capacity()),
                        portion_full: Some(full),
                    });
                }
                LogType::Limits => log.limits = Some(self.limits()),
                _ => {}
            }
        }
        Reply::with_body(Body {
            get_log: Some(log),
            ..Body::default()
        })
    }

    fn security(&self, security: Security) -> Reply {
        let mut controls = self.state.controls.lock();
        let (current, old, new) = match security.op_type {
            Some(SecurityOpType::LockPin) => (
                &mut controls.lock_pin,
                security.old_lock_pin,
                security.new_lock_pin,
            ),
            Some(SecurityOpType::ErasePin) => (
                &mut controls.erase_pin,
                security.old_erase_pin,
                security.new_erase_pin,
            ),
            _ => return Reply::failed(StatusCode::InvalidRequest, "unsupported security operation"),
        };
        if old.unwrap_or_default() != *current {
            return Reply::failed(StatusCode::NotAuthorized, "old pin does not match");
        }
        *current = new.unwrap_or_default();
        Reply::ok()
    }

    fn pin_op(&self, command: &Command, pin: &Bytes) -> Reply {
        let op_type = command
            .body
            .as_ref()
            .and_then(|b| b.pin_op.as_ref())
            .and_then(|p| p.op_type);
        let mut controls = self.state.controls.lock();
        let expected = match op_type {
            Some(PinOpType::Lock | PinOpType::Unlock) => &controls.lock_pin,
            Some(PinOpType::Erase | PinOpType::SecureErase) => &controls.erase_pin,
            None => return Reply::failed(StatusCode::InvalidRequest, "pin operation type missing"),
        };
        if pin != expected {
            return Reply::failed(StatusCode::NotAuthorized, "pin does not match");
        }
        match op_type {
            Some(PinOpType::Lock) => controls.locked = true,
            Some(PinOpType::Unlock) => {
                if !controls.locked {
                    return Reply::failed(StatusCode::DeviceAlreadyUnlocked, "device is not locked");
                }
                controls.locked = false;
            }
            _ => {
                if controls.locked {
                    return Reply::failed(StatusCode::DeviceLocked, "device is locked");
                }
                self.state.device.erase();
            }
        }
        info!(connection_id = self.connection_id, op = ?op_type, "pin operation applied");
        Reply::ok()
    }

    async fn commit(&mut self, batch_id: u32, count: u32) -> Reply {
        let Some(ops) = self.batches.remove(&batch_id) else {
            return Reply::failed(StatusCode::InvalidBatch, format!("unknown batch {batch_id}"));
        };
        if ops.len() != count as usize {
            return Reply::failed(
                StatusCode::InvalidBatch,
                format!("batch holds {} operations, END_BATCH claims {count}", ops.len()),
            );
        }
        let _guard = self.state.batches.lock().await;
        if let Some(failed) = ops.iter().find(|op| !self.precheck(op)) {
            let mut reply = Reply::failed(StatusCode::InvalidBatch, "batch precheck failed");
            reply.body = Some(Body {
                batch: Some(Batch {
                    failed_sequence: Some(failed.sequence),
                    ..Batch::default()
                }),
                ..Body::default()
            });
            return reply;
        }
        let mut sequences = Vec::with_capacity(ops.len());
        for op in ops {
            let result = if op.message_type == MessageType::Put {
                self.client.put(&op.key, op.value, &op.opts).await
            } else {
                self.client.delete(&op.key, &op.opts).await
            };
            if let Err(e) = result {
                warn!(batch_id, sequence = op.sequence, error = %e, "batch operation failed after precheck");
                return Reply::from_error(&e);
            }
            sequences.push(op.sequence);
        }
        debug!(connection_id = self.connection_id, batch_id, count, "batch applied");
        Reply::with_body(Body {
            batch: Some(Batch {
                count: Some(count),
                sequence: sequences,
                failed_sequence: None,
            }),
            ..Body::default()
        })
    }

    fn precheck(&self, op: &QueuedOp) -> bool {
        if op.opts.validate(&op.key, op.value.len(), self.state.options.max_value_size).is_err() {
            return false;
        }
        let current = self.state.device.version_of(&op.key);
        if op.message_type == MessageType::Delete && current.is_none() {
            return false;
        }
        op.opts.force
            || current.unwrap_or_default() == op.opts.db_version.clone().unwrap_or_default()
    }
}

fn opts_from(header: &Header, kv: &KeyValue) -> CmdOpts {
    CmdOpts {
        cluster_version: header.cluster_version.unwrap_or_default(),
        timeout: header.timeout.unwrap_or(60_000),
        priority: header.priority.unwrap_or(Priority::Normal),
        algorithm: kv.algorithm.unwrap_or(Algorithm::Sha1),
        synchronization: kv.synchronization.unwrap_or(Synchronization::WriteBack),
        force: kv.force.unwrap_or(false),
        tag: kv.tag.clone().unwrap_or_default(),
        new_version: kv.new_version.clone(),
        db_version: kv.db_version.clone(),
        metadata_only: kv.metadata_only.unwrap_or(false),
    }
}

fn range_from(range: Option<&Range>) -> KeyRange {
    let range = range.cloned().unwrap_or_default();
    KeyRange {
        start: range.start_key.unwrap_or_default(),
        end: range.end_key.unwrap_or_default(),
        start_inclusive: range.start_key_inclusive.unwrap_or(false),
        end_inclusive: range.end_key_inclusive.unwrap_or(false),
        max_returned: range.max_returned.unwrap_or(800),
        reverse: range.reverse.unwrap_or(false),
    }
}

fn range_reply(range: &KeyRange, keys: Vec<Bytes>) -> Reply {
    Reply::with_body(Body {
        range: Some(Range {
            start_key: Some(range.start.clone()),
            end_key: Some(range.end.clone()),
            keys,
            ..Range::default()
        }),
        ..Body::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NetworkClient;

    async fn started() -> (DeviceSimulator, NetworkClient) {
        let simulator = DeviceSimulator::start(
            SimulatorOptions::builder()
                .lock_pin(Bytes::from_static(b"1234"))
                .erase_pin(Bytes::from_static(b"5678"))
                .build(),
        )
        .await
        .unwrap();
        let client = NetworkClient::connect(&simulator.device_config())
            .await
            .unwrap();
        (simulator, client)
    }

    #[tokio::test]
    async fn test_should_serve_put_get_and_delete() {
        let (simulator, mut client) = started().await;
        client
            .put(b"bucket.photos", Bytes::from_static(b"{}"), &CmdOpts::default())
            .await
            .unwrap();
        let record = client.get(b"bucket.photos", &CmdOpts::default()).await.unwrap();
        assert_eq!(&record.value[..], b"{}");
        assert_eq!(&record.key[..], b"bucket.photos");
        assert!(simulator.device().contains(b"bucket.photos"));

        client.delete(b"bucket.photos", &CmdOpts::default()).await.unwrap();
        assert!(client
            .get(b"bucket.photos", &CmdOpts::default())
            .await
            .unwrap_err()
            .is_not_found());
        assert!(client.is_usable());
    }

    #[tokio::test]
    async fn test_should_advertise_limits_at_sign_on() {
        let (_simulator, mut client) = started().await;
        assert_eq!(client.max_value_size(), 1024 * 1024);
        let log = client
            .get_log(&[LogType::Limits, LogType::Capacities])
            .await
            .unwrap();
        assert_eq!(log.limits.unwrap().max_key_range_count, Some(800));
        assert!(log.capacity.unwrap().nominal_capacity_in_bytes.unwrap() > 0);
    }

    #[tokio::test]
    async fn test_should_scan_key_ranges() {
        let (_simulator, mut client) = started().await;
        for key in [&b"meta.b/1"[..], b"meta.b/2", b"meta.c/1"] {
            client
                .put(key, Bytes::new(), &CmdOpts::default())
                .await
                .unwrap();
        }
        let range = KeyRange::builder()
            .start(&b"meta.b/"[..])
            .end(&b"meta.b0"[..])
            .build();
        let keys = client
            .get_key_range(&range, &CmdOpts::default())
            .await
            .unwrap();
        assert_eq!(keys, vec![Bytes::from_static(b"meta.b/1"), Bytes::from_static(b"meta.b/2")]);
        let next = client.get_next(b"meta.b/2", &CmdOpts::default()).await.unwrap();
        assert_eq!(&next.key[..], b"meta.c/1");
    }

    #[tokio::test]
    async fn test_should_apply_batch_atomically() {
        let (simulator, mut client) = started().await;
        let mut batch = client.start_batch().await.unwrap();
        client
            .batch_put(&mut batch, b"a", Bytes::from_static(b"1"), &CmdOpts::default())
            .await
            .unwrap();
        client
            .batch_put(&mut batch, b"b", Bytes::from_static(b"2"), &CmdOpts::default())
            .await
            .unwrap();
        assert!(simulator.device().is_empty());
        let committed = client.end_batch(batch).await.unwrap();
        assert_eq!(committed.count, Some(2));
        assert_eq!(simulator.device().len(), 2);
    }

    #[tokio::test]
    async fn test_should_reject_batch_when_precheck_fails() {
        let (simulator, mut client) = started().await;
        let mut batch = client.start_batch().await.unwrap();
        client
            .batch_put(&mut batch, b"a", Bytes::from_static(b"1"), &CmdOpts::default())
            .await
            .unwrap();
        let stale = CmdOpts::builder()
            .force(false)
            .db_version(Bytes::from_static(b"v9"))
            .build();
        client
            .batch_delete(&mut batch, b"missing", &stale)
            .await
            .unwrap();
        let err = client.end_batch(batch).await.unwrap_err();
        assert_eq!(err.status_code(), Some(StatusCode::InvalidBatch));
        assert!(simulator.device().is_empty());
        assert!(client.is_usable());
    }

    #[tokio::test]
    async fn test_should_lock_and_unlock_with_pin() {
        let (_simulator, mut client) = started().await;
        let err = client.lock(Bytes::from_static(b"0000")).await.unwrap_err();
        assert_eq!(err.status_code(), Some(StatusCode::NotAuthorized));

        client.lock(Bytes::from_static(b"1234")).await.unwrap();
        let err = client.noop().await.unwrap_err();
        assert_eq!(err.status_code(), Some(StatusCode::DeviceLocked));
        client.unlock(Bytes::from_static(b"1234")).await.unwrap();
        client.noop().await.unwrap();
    }

    #[tokio::test]
    async fn test_should_erase_with_erase_pin() {
        let (simulator, mut client) = started().await;
        client
            .put(b"k", Bytes::from_static(b"v"), &CmdOpts::default())
            .await
            .unwrap();
        client
            .set_erase_pin(Bytes::from_static(b"5678"), Bytes::from_static(b"9999"))
            .await
            .unwrap();
        client.erase(Bytes::from_static(b"9999")).await.unwrap();
        assert!(simulator.device().is_empty());
    }

    #[tokio::test]
    async fn test_should_refuse_commands_while_hibernating() {
        let (_simulator, mut client) = started().await;
        client.set_power_level(PowerLevel::Hibernate).await.unwrap();
        let err = client.noop().await.unwrap_err();
        assert_eq!(err.status_code(), Some(StatusCode::Hibernate));
        client.set_power_level(PowerLevel::Operational).await.unwrap();
        client.flush_all_data().await.unwrap();
    }

    #[tokio::test]
    async fn test_should_drop_connection_on_bad_hmac() {
        let simulator = DeviceSimulator::start(SimulatorOptions::default())
            .await
            .unwrap();
        let mut config = simulator.device_config();
        config.hmac_key = "wrong".to_owned();
        let mut client = NetworkClient::connect(&config).await.unwrap();
        assert!(client.noop().await.is_err());
        assert!(!client.is_usable());
    }

    #[tokio::test]
    async fn test_should_close_connections_on_shutdown() {
        let (simulator, mut client) = started().await;
        client.noop().await.unwrap();
        simulator.shutdown().await;
        assert!(client.noop().await.is_err());
        assert!(!client.is_usable());
    }
}
