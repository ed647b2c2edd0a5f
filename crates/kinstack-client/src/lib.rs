//! Clients and connection pooling for Kinetic key-value devices.
//!
//! Two implementations share the [`KvDevice`] command set: a
//! [`NetworkClient`] speaking the framed protocol over TCP or TLS, and a
//! [`FastPathClient`] calling an in-process library through the
//! [`SkinnyWaist`] interface. A [`ConnectionPool`] hands devices out
//! exclusively to callers.
//!
//! # Architecture
//!
//! ```text
//! ConnectionPool<D: KvDevice>
//!        |
//!        +--> NetworkClient --> FramedTransport --> TCP / TLS --> device
//!        |
//!        +--> FastPathClient --> SkinnyWaist (MemoryDevice, native library)
//! ```
//!
//! [`DeviceSimulator`] serves the network protocol on a loopback port on top
//! of a [`MemoryDevice`], for tests and local development.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use bytes::Bytes;
//! use kinstack_client::{CmdOpts, ConnectionPool, FastPathClient, KvDevice, MemoryDevice};
//!
//! tokio_test::block_on(async {
//!     let device = Arc::new(MemoryDevice::new());
//!     let pool = ConnectionPool::new(vec![FastPathClient::new(device, 1, 1024)]);
//!     let mut client = pool.acquire().await.unwrap();
//!     client
//!         .put(b"bucket.photos", Bytes::from_static(b"{}"), &CmdOpts::default())
//!         .await
//!         .unwrap();
//!     let record = client.get(b"bucket.photos", &CmdOpts::default()).await.unwrap();
//!     assert_eq!(&record.value[..], b"{}");
//! });
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod fastpath;
pub mod memory;
pub mod network;
pub mod options;
pub mod pool;
pub mod simulator;
pub mod transport;

pub use config::DeviceConfig;
pub use device::{KvDevice, Record};
pub use error::{DeviceError, DeviceResult};
pub use fastpath::{
    FastPathClient, NativeBuffer, SerializedWaist, SkinnyWaist, ValueBuffer, WaistEntry,
    WaistStatus,
};
pub use memory::MemoryDevice;
pub use network::{BatchHandle, NetworkClient};
pub use options::{CmdOpts, KeyRange, MAX_KEY_SIZE, MAX_TAG_SIZE, MAX_VERSION_SIZE};
pub use pool::{
    ConnectionPool, DeviceConnector, FastPathConnector, NetworkConnector, PoolStats, PooledDevice,
};
pub use simulator::{DeviceSimulator, SimulatorOptions};
pub use transport::FramedTransport;
