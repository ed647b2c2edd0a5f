//! Fixtures shared by the handler tests.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use kinstack_client::{
    CmdOpts, ConnectionPool, DeviceError, DeviceResult, FastPathClient, KeyRange, KvDevice,
    MemoryDevice, Record,
};
use kinstack_proto::StatusCode;
use parking_lot::Mutex;

use crate::config::StoreConfig;
use crate::store::KvObjectStore;

/// Small limits so tests exercise pagination and part-size checks cheaply.
pub(crate) fn test_config() -> StoreConfig {
    StoreConfig::builder()
        .key_range_max(3)
        .min_part_size(5)
        .max_part_number(100)
        .max_object_size(1024)
        .build()
}

/// A store over two fast-path clients sharing one in-memory device.
pub(crate) fn memory_store() -> (Arc<MemoryDevice>, KvObjectStore<FastPathClient>) {
    let device = Arc::new(MemoryDevice::new());
    let clients = (0..2)
        .map(|_| FastPathClient::new(device.clone(), 1, 4096))
        .collect();
    (device, KvObjectStore::new(ConnectionPool::new(clients), test_config()))
}

/// Keys on `device` that start with `prefix`.
pub(crate) fn keys_with_prefix(device: &MemoryDevice, prefix: &str) -> Vec<String> {
    device
        .keys()
        .into_iter()
        .filter(|k| k.starts_with(prefix.as_bytes()))
        .map(|k| String::from_utf8_lossy(&k).into_owned())
        .collect()
}

/// Wraps a fast-path client and rejects writes to keys with a given prefix.
#[derive(Debug)]
pub(crate) struct FlakyDevice {
    inner: FastPathClient,
    fail_puts_with: Arc<Mutex<Option<Vec<u8>>>>,
}

/// A store over one [`FlakyDevice`] plus the switch that arms it.
pub(crate) fn flaky_store() -> (
    Arc<MemoryDevice>,
    Arc<Mutex<Option<Vec<u8>>>>,
    KvObjectStore<FlakyDevice>,
) {
    let device = Arc::new(MemoryDevice::new());
    let switch = Arc::new(Mutex::new(None));
    let flaky = FlakyDevice {
        inner: FastPathClient::new(device.clone(), 1, 4096),
        fail_puts_with: Arc::clone(&switch),
    };
    let store = KvObjectStore::new(ConnectionPool::new(vec![flaky]), test_config());
    (device, switch, store)
}

#[async_trait]
impl KvDevice for FlakyDevice {
    async fn get(&mut self, key: &[u8], opts: &CmdOpts) -> DeviceResult<Record> {
        self.inner.get(key, opts).await
    }

    async fn get_next(&mut self, key: &[u8], opts: &CmdOpts) -> DeviceResult<Record> {
        self.inner.get_next(key, opts).await
    }

    async fn get_previous(&mut self, key: &[u8], opts: &CmdOpts) -> DeviceResult<Record> {
        self.inner.get_previous(key, opts).await
    }

    async fn get_version(&mut self, key: &[u8], opts: &CmdOpts) -> DeviceResult<Bytes> {
        self.inner.get_version(key, opts).await
    }

    async fn put(&mut self, key: &[u8], value: Bytes, opts: &CmdOpts) -> DeviceResult<()> {
        let armed = self.fail_puts_with.lock().clone();
        if let Some(prefix) = armed {
            if key.starts_with(&prefix) {
                return Err(DeviceError::status(StatusCode::InternalError, "injected"));
            }
        }
        self.inner.put(key, value, opts).await
    }

    async fn delete(&mut self, key: &[u8], opts: &CmdOpts) -> DeviceResult<()> {
        self.inner.delete(key, opts).await
    }

    async fn get_key_range(
        &mut self,
        range: &KeyRange,
        opts: &CmdOpts,
    ) -> DeviceResult<Vec<Bytes>> {
        self.inner.get_key_range(range, opts).await
    }

    async fn noop(&mut self) -> DeviceResult<()> {
        self.inner.noop().await
    }

    fn is_usable(&self) -> bool {
        self.inner.is_usable()
    }
}
