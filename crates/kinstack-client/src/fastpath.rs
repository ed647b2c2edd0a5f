//! In-process fast path to a device library.
//!
//! When the store and the device share a process, commands skip framing and
//! sockets and call the library's narrow interface, the [`SkinnyWaist`],
//! directly. Buffers the library allocates are wrapped in a [`ValueBuffer`]
//! that gives them back on drop, so callers only ever see [`Bytes`].

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use kinstack_proto::{Algorithm, StatusCode};
use parking_lot::Mutex;
use tracing::trace;

use crate::device::{KvDevice, Record};
use crate::error::{DeviceError, DeviceResult};
use crate::options::{CmdOpts, KeyRange, MAX_KEY_SIZE, validate_key};

// ---------------------------------------------------------------------------
// Library interface
// ---------------------------------------------------------------------------

/// Non-success outcomes of a library call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WaistStatus {
    /// The key does not exist.
    #[error("not found")]
    NotFound,
    /// The stored version did not match.
    #[error("version mismatch")]
    VersionMismatch,
    /// The user may not perform the operation.
    #[error("authorization failure")]
    AuthorizationFailure,
    /// The device is full.
    #[error("no space left")]
    NoSpace,
    /// The store is frozen.
    #[error("frozen")]
    Frozen,
    /// The media reported a fault.
    #[error("media fault")]
    MediaFault,
    /// The library failed internally.
    #[error("internal error")]
    InternalError,
    /// The store structures are corrupt.
    #[error("store corrupt")]
    StoreCorrupt,
    /// The stored data is corrupt.
    #[error("data corrupt")]
    DataCorrupt,
    /// An internal block pointer did not match.
    #[error("block point mismatch")]
    BlockPointMismatch,
    /// A precondition check failed.
    #[error("precheck failed")]
    PrecheckFailed,
    /// The firmware image is invalid.
    #[error("firmware invalid")]
    FirmwareInvalid,
    /// The cluster version did not match.
    #[error("version failure")]
    VersionFailure,
    /// The request was malformed.
    #[error("invalid request")]
    InvalidRequest,
    /// Instant secure erase left the database invalid.
    #[error("secure erase failed")]
    SecureEraseFailed,
    /// The operation cannot be supported.
    #[error("unsupportable")]
    Unsupportable,
    /// Superblock I/O failed.
    #[error("superblock i/o error")]
    SuperblockIo,
    /// A library limit was exceeded.
    #[error("limit exceeded")]
    ExceedLimit,
    /// An id was used twice.
    #[error("duplicate id")]
    DuplicateId,
}

impl WaistStatus {
    /// Device status code this outcome corresponds to.
    #[must_use]
    pub fn status_code(self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NotFound,
            Self::VersionMismatch => StatusCode::VersionMismatch,
            Self::AuthorizationFailure => StatusCode::NotAuthorized,
            Self::NoSpace => StatusCode::NoSpace,
            Self::Frozen => StatusCode::DeviceLocked,
            Self::MediaFault | Self::StoreCorrupt | Self::SuperblockIo => StatusCode::PermDataError,
            Self::DataCorrupt => StatusCode::DataError,
            Self::VersionFailure => StatusCode::VersionFailure,
            Self::InvalidRequest
            | Self::PrecheckFailed
            | Self::Unsupportable
            | Self::ExceedLimit
            | Self::DuplicateId => StatusCode::InvalidRequest,
            Self::InternalError
            | Self::BlockPointMismatch
            | Self::FirmwareInvalid
            | Self::SecureEraseFailed => StatusCode::InternalError,
        }
    }
}

impl From<WaistStatus> for DeviceError {
    fn from(status: WaistStatus) -> Self {
        Self::status(status.status_code(), status.to_string())
    }
}

/// A value buffer allocated by the library. It must be handed back through
/// [`SkinnyWaist::release`].
#[derive(Debug)]
pub struct NativeBuffer {
    handle: u64,
    data: Box<[u8]>,
}

impl NativeBuffer {
    /// Wrap library-owned bytes identified by `handle`.
    #[must_use]
    pub fn new(handle: u64, data: Box<[u8]>) -> Self {
        Self { handle, data }
    }

    /// Library handle.
    #[must_use]
    pub fn handle(&self) -> u64 {
        self.handle
    }

    /// Buffer contents.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

/// Result of a library GET.
#[derive(Debug)]
pub struct WaistEntry {
    /// Value buffer; empty for metadata-only reads.
    pub buffer: NativeBuffer,
    /// Stored version.
    pub version: Bytes,
    /// Stored tag.
    pub tag: Bytes,
    /// Algorithm of `tag`.
    pub algorithm: Option<Algorithm>,
}

/// Narrow synchronous interface to an in-process device library.
pub trait SkinnyWaist: Send + Sync + std::fmt::Debug {
    /// Read `key`.
    fn get(&self, user_id: i64, key: &[u8], opts: &CmdOpts) -> Result<WaistEntry, WaistStatus>;

    /// Write `value` at `key`.
    fn put(&self, user_id: i64, key: &[u8], value: &[u8], opts: &CmdOpts)
    -> Result<(), WaistStatus>;

    /// Remove `key`.
    fn delete(&self, user_id: i64, key: &[u8], opts: &CmdOpts) -> Result<(), WaistStatus>;

    /// List keys in `range`.
    fn get_key_range(&self, user_id: i64, range: &KeyRange) -> Result<Vec<Bytes>, WaistStatus>;

    /// Give back a buffer returned by [`SkinnyWaist::get`].
    fn release(&self, buffer: NativeBuffer);
}

/// Owning handle over a [`NativeBuffer`]; releases it exactly once on drop.
#[derive(Debug)]
pub struct ValueBuffer {
    buffer: Option<NativeBuffer>,
    waist: Arc<dyn SkinnyWaist>,
}

impl ValueBuffer {
    /// Take ownership of `buffer`, to be released through `waist`.
    #[must_use]
    pub fn new(buffer: NativeBuffer, waist: Arc<dyn SkinnyWaist>) -> Self {
        Self {
            buffer: Some(buffer),
            waist,
        }
    }

    /// Expose the buffer as [`Bytes`] without copying. The buffer is
    /// released when the last clone of the returned bytes is dropped.
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        Bytes::from_owner(self)
    }
}

impl AsRef<[u8]> for ValueBuffer {
    fn as_ref(&self) -> &[u8] {
        self.buffer.as_ref().map_or(&[], NativeBuffer::as_slice)
    }
}

impl Drop for ValueBuffer {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            trace!(handle = buffer.handle(), "releasing native buffer");
            self.waist.release(buffer);
        }
    }
}

/// Serializes every call into a library that is not reentrant.
#[derive(Debug)]
pub struct SerializedWaist<W> {
    inner: W,
    lock: Mutex<()>,
}

impl<W: SkinnyWaist> SerializedWaist<W> {
    /// Wrap `inner`.
    #[must_use]
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            lock: Mutex::new(()),
        }
    }

    /// The wrapped library.
    #[must_use]
    pub fn inner(&self) -> &W {
        &self.inner
    }
}

impl<W: SkinnyWaist> SkinnyWaist for SerializedWaist<W> {
    fn get(&self, user_id: i64, key: &[u8], opts: &CmdOpts) -> Result<WaistEntry, WaistStatus> {
        let _guard = self.lock.lock();
        self.inner.get(user_id, key, opts)
    }

    fn put(
        &self,
        user_id: i64,
        key: &[u8],
        value: &[u8],
        opts: &CmdOpts,
    ) -> Result<(), WaistStatus> {
        let _guard = self.lock.lock();
        self.inner.put(user_id, key, value, opts)
    }

    fn delete(&self, user_id: i64, key: &[u8], opts: &CmdOpts) -> Result<(), WaistStatus> {
        let _guard = self.lock.lock();
        self.inner.delete(user_id, key, opts)
    }

    fn get_key_range(&self, user_id: i64, range: &KeyRange) -> Result<Vec<Bytes>, WaistStatus> {
        let _guard = self.lock.lock();
        self.inner.get_key_range(user_id, range)
    }

    fn release(&self, buffer: NativeBuffer) {
        let _guard = self.lock.lock();
        self.inner.release(buffer);
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Device client that calls a [`SkinnyWaist`] in-process.
///
/// Calls run on the caller's task without suspending; there is no stream to
/// break, so the client stays usable until closed.
#[derive(Debug, Clone)]
pub struct FastPathClient {
    waist: Arc<dyn SkinnyWaist>,
    user_id: i64,
    max_value_size: usize,
    closed: bool,
}

impl FastPathClient {
    /// Create a client acting as `user_id`.
    #[must_use]
    pub fn new(waist: Arc<dyn SkinnyWaist>, user_id: i64, max_value_size: usize) -> Self {
        Self {
            waist,
            user_id,
            max_value_size,
            closed: false,
        }
    }

    fn ensure_open(&self) -> DeviceResult<()> {
        if self.closed {
            Err(DeviceError::ConnectionClosed)
        } else {
            Ok(())
        }
    }

    fn read(&self, key: &[u8], opts: &CmdOpts) -> DeviceResult<Record> {
        let entry = self.waist.get(self.user_id, key, opts)?;
        let value = ValueBuffer::new(entry.buffer, Arc::clone(&self.waist)).into_bytes();
        Ok(Record {
            key: Bytes::copy_from_slice(key),
            value,
            version: entry.version,
            tag: entry.tag,
            algorithm: entry.algorithm,
        })
    }

    fn neighbour(&self, range: &KeyRange, opts: &CmdOpts) -> DeviceResult<Record> {
        let key = self
            .waist
            .get_key_range(self.user_id, range)?
            .into_iter()
            .next()
            .ok_or(WaistStatus::NotFound)?;
        self.read(&key, opts)
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
impl KvDevice for FastPathClient {
    async fn get(&mut self, key: &[u8], opts: &CmdOpts) -> DeviceResult<Record> {
        self.ensure_open()?;
        validate_key(key)?;
        self.read(key, opts)
    }

    async fn get_next(&mut self, key: &[u8], opts: &CmdOpts) -> DeviceResult<Record> {
        self.ensure_open()?;
        validate_bound(key)?;
        let range = KeyRange::builder()
            .start(Bytes::copy_from_slice(key))
            .end(Bytes::from(vec![0xff; MAX_KEY_SIZE]))
            .start_inclusive(false)
            .max_returned(1)
            .build();
        self.neighbour(&range, opts)
    }

    async fn get_previous(&mut self, key: &[u8], opts: &CmdOpts) -> DeviceResult<Record> {
        self.ensure_open()?;
        validate_bound(key)?;
        let range = KeyRange::builder()
            .start(Bytes::new())
            .end(Bytes::copy_from_slice(key))
            .end_inclusive(false)
            .max_returned(1)
            .reverse(true)
            .build();
        self.neighbour(&range, opts)
    }

    async fn get_version(&mut self, key: &[u8], opts: &CmdOpts) -> DeviceResult<Bytes> {
        self.ensure_open()?;
        validate_key(key)?;
        let opts = CmdOpts {
            metadata_only: true,
            ..opts.clone()
        };
        Ok(self.read(key, &opts)?.version)
    }

    async fn put(&mut self, key: &[u8], value: Bytes, opts: &CmdOpts) -> DeviceResult<()> {
        self.ensure_open()?;
        opts.validate(key, value.len(), self.max_value_size)?;
        self.waist.put(self.user_id, key, &value, opts)?;
        Ok(())
    }

    async fn delete(&mut self, key: &[u8], opts: &CmdOpts) -> DeviceResult<()> {
        self.ensure_open()?;
        opts.validate(key, 0, self.max_value_size)?;
        self.waist.delete(self.user_id, key, opts)?;
        Ok(())
    }

    async fn get_key_range(
        &mut self,
        range: &KeyRange,
        _opts: &CmdOpts,
    ) -> DeviceResult<Vec<Bytes>> {
        self.ensure_open()?;
        range.validate()?;
        Ok(self.waist.get_key_range(self.user_id, range)?)
    }

    async fn noop(&mut self) -> DeviceResult<()> {
        self.ensure_open()
    }

    async fn close(&mut self) -> DeviceResult<()> {
        self.closed = true;
        Ok(())
    }

    fn is_usable(&self) -> bool {
        !self.closed
    }
}

#[cfg(test)]
mod tests {
    use kinstack_proto::LogType;

    use super::*;
    use crate::memory::MemoryDevice;

    fn client() -> (FastPathClient, Arc<MemoryDevice>) {
        let device = Arc::new(MemoryDevice::new());
        let waist: Arc<dyn SkinnyWaist> = device.clone();
        (FastPathClient::new(waist, 1, 1024), device)
    }

    #[tokio::test]
    async fn test_should_release_buffer_when_bytes_dropped() {
        let (mut client, device) = client();
        client
            .put(b"k", Bytes::from_static(b"value"), &CmdOpts::default())
            .await
            .unwrap();
        let record = client.get(b"k", &CmdOpts::default()).await.unwrap();
        let alias = record.value.clone();
        assert_eq!(&record.value[..], b"value");
        assert_eq!(device.outstanding_buffers(), 1);
        drop(record);
        assert_eq!(device.outstanding_buffers(), 1);
        drop(alias);
        assert_eq!(device.outstanding_buffers(), 0);
    }

    #[tokio::test]
    async fn test_should_map_library_status_to_device_status() {
        let (mut client, device) = client();
        let err = client.get(b"missing", &CmdOpts::default()).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(client.is_usable());
        assert_eq!(device.outstanding_buffers(), 0);
        assert_eq!(
            WaistStatus::Frozen.status_code(),
            StatusCode::DeviceLocked
        );
        assert_eq!(
            DeviceError::from(WaistStatus::MediaFault).status_code(),
            Some(StatusCode::PermDataError)
        );
    }

    #[tokio::test]
    async fn test_should_walk_neighbours() {
        let (mut client, _device) = client();
        for key in [&b"a"[..], b"b", b"c"] {
            client
                .put(key, Bytes::copy_from_slice(key), &CmdOpts::default())
                .await
                .unwrap();
        }
        let next = client.get_next(b"a", &CmdOpts::default()).await.unwrap();
        assert_eq!(&next.key[..], b"b");
        let previous = client.get_previous(b"c", &CmdOpts::default()).await.unwrap();
        assert_eq!(&previous.key[..], b"b");
        assert!(client
            .get_next(b"c", &CmdOpts::default())
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_should_reject_oversized_value_before_calling_library() {
        let (mut client, device) = client();
        let err = client
            .put(b"k", Bytes::from(vec![0u8; 1025]), &CmdOpts::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceError::InvalidArgument(_)));
        assert!(device.is_empty());
    }

    #[tokio::test]
    async fn test_should_not_support_get_log() {
        let (mut client, _device) = client();
        assert!(matches!(
            client.get_log(&[LogType::Capacities]).await,
            Err(DeviceError::Unsupported(_))
        ));
    }

    #[tokio::test]
    async fn test_should_serialize_calls_through_adapter() {
        let waist: Arc<dyn SkinnyWaist> = Arc::new(SerializedWaist::new(MemoryDevice::new()));
        let mut client = FastPathClient::new(waist, 1, 1024);
        client
            .put(b"k", Bytes::from_static(b"v"), &CmdOpts::default())
            .await
            .unwrap();
        let version = client.get_version(b"k", &CmdOpts::default()).await.unwrap();
        assert!(version.is_empty());
        assert_eq!(
            &client.get(b"k", &CmdOpts::default()).await.unwrap().value[..],
            b"v"
        );
    }

    #[tokio::test]
    async fn test_should_fail_after_close() {
        let (mut client, _device) = client();
        client.close().await.unwrap();
        assert!(!client.is_usable());
        assert!(matches!(
            client.noop().await,
            Err(DeviceError::ConnectionClosed)
        ));
    }
}
