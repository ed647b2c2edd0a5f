//! End-to-end tests for the Kinetic object store.
//!
//! Each test starts a [`DeviceSimulator`] on a loopback port and talks to it
//! through real network clients, so the codec, transport, client, pool and
//! object layer are exercised together. No external device is needed.
//!
//! Run them with:
//! ```text
//! cargo test -p kinstack-integration
//! ```

use std::sync::{Arc, Once};

use kinstack_client::{
    ConnectionPool, DeviceSimulator, FastPathClient, MemoryDevice, NetworkClient, SimulatorOptions,
};
use kinstack_store::{KvObjectStore, StoreConfig};

static INIT: Once = Once::new();

/// Largest value the simulated device accepts; one device value per part.
pub const MAX_VALUE_SIZE: usize = 16 * 1024 * 1024;

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// Start a simulator sized for multi-megabyte parts.
pub async fn start_simulator() -> DeviceSimulator {
    init_tracing();
    DeviceSimulator::start(
        SimulatorOptions::builder()
            .max_value_size(MAX_VALUE_SIZE)
            .build(),
    )
    .await
    .unwrap_or_else(|e| panic!("failed to start device simulator: {e}"))
}

/// Open a pool of `connections` network clients to `simulator`.
pub async fn network_pool(
    simulator: &DeviceSimulator,
    connections: usize,
) -> ConnectionPool<NetworkClient> {
    let mut config = simulator.device_config();
    config.connections = connections;
    ConnectionPool::connect(&config)
        .await
        .unwrap_or_else(|e| panic!("failed to connect to {}: {e}", simulator.addr()))
}

/// An object store over the network with default limits.
pub async fn network_store(
    simulator: &DeviceSimulator,
    connections: usize,
) -> KvObjectStore<NetworkClient> {
    KvObjectStore::new(
        network_pool(simulator, connections).await,
        StoreConfig::default(),
    )
}

/// An object store calling an in-process device through the fast path.
#[must_use]
pub fn fast_path_store(connections: usize) -> (Arc<MemoryDevice>, KvObjectStore<FastPathClient>) {
    init_tracing();
    let device = Arc::new(MemoryDevice::new());
    let clients = (0..connections)
        .map(|_| FastPathClient::new(device.clone(), 1, MAX_VALUE_SIZE))
        .collect();
    (
        device,
        KvObjectStore::new(ConnectionPool::new(clients), StoreConfig::default()),
    )
}

/// Deterministic pseudo-random payload of `len` bytes.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn payload(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

mod test_bucket;
mod test_fast_path;
mod test_multipart;
mod test_object;
mod test_pool;
