//! Bounded pool of device connections.
//!
//! The pool owns a fixed number of slots. [`ConnectionPool::acquire`] waits
//! for a semaphore permit, takes a device out of a free slot and hands it
//! out as a [`PooledDevice`]; dropping the guard puts the device back before
//! the permit is released, so a woken waiter always finds a free slot.
//!
//! # Reconnects
//!
//! A device that is no longer usable when it is returned is dropped and its
//! slot marked broken. The next acquisition that lands on a broken slot
//! reconnects through the pool's [`DeviceConnector`]. Pools built from a
//! fixed set of devices have no connector and fail such acquisitions with
//! [`DeviceError::ConnectionClosed`].

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::config::DeviceConfig;
use crate::device::KvDevice;
use crate::error::{DeviceError, DeviceResult};
use crate::fastpath::{FastPathClient, SkinnyWaist};
use crate::network::NetworkClient;

/// Opens new device connections for a pool.
#[async_trait]
pub trait DeviceConnector<D>: Send + Sync + std::fmt::Debug {
    /// Open and sign on a fresh connection.
    async fn connect(&self) -> DeviceResult<D>;
}

/// Connects [`NetworkClient`]s to one device.
#[derive(Debug, Clone)]
pub struct NetworkConnector {
    config: DeviceConfig,
}

impl NetworkConnector {
    /// Connector for the device described by `config`.
    #[must_use]
    pub fn new(config: DeviceConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl DeviceConnector<NetworkClient> for NetworkConnector {
    async fn connect(&self) -> DeviceResult<NetworkClient> {
        NetworkClient::connect(&self.config).await
    }
}

/// Creates [`FastPathClient`]s over a shared library handle.
#[derive(Debug, Clone)]
pub struct FastPathConnector {
    waist: Arc<dyn SkinnyWaist>,
    user_id: i64,
    max_value_size: usize,
}

impl FastPathConnector {
    /// Connector acting as `user_id` against `waist`.
    #[must_use]
    pub fn new(waist: Arc<dyn SkinnyWaist>, user_id: i64, max_value_size: usize) -> Self {
        Self {
            waist,
            user_id,
            max_value_size,
        }
    }
}

#[async_trait]
impl DeviceConnector<FastPathClient> for FastPathConnector {
    async fn connect(&self) -> DeviceResult<FastPathClient> {
        Ok(FastPathClient::new(
            Arc::clone(&self.waist),
            self.user_id,
            self.max_value_size,
        ))
    }
}

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Slot<D> {
    Idle(D),
    Busy,
    Broken,
}

#[derive(Debug)]
struct Shared<D> {
    slots: Mutex<Vec<Slot<D>>>,
    permits: Arc<Semaphore>,
    connector: Option<Arc<dyn DeviceConnector<D>>>,
    in_use: AtomicUsize,
    high_water_mark: AtomicUsize,
    closed: AtomicBool,
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Number of slots.
    pub capacity: usize,
    /// Devices currently handed out.
    pub in_use: usize,
    /// Slots not handed out.
    pub available: usize,
    /// Largest `in_use` observed.
    pub high_water_mark: usize,
}

/// Fixed-size pool granting exclusive access to devices.
///
/// Cloning is cheap; clones share the same slots.
#[derive(Debug)]
pub struct ConnectionPool<D> {
    shared: Arc<Shared<D>>,
}

impl<D> Clone for ConnectionPool<D> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl ConnectionPool<NetworkClient> {
    /// Open `config.connections` connections to one device up front.
    pub async fn connect(config: &DeviceConfig) -> DeviceResult<Self> {
        let connector: Arc<dyn DeviceConnector<NetworkClient>> =
            Arc::new(NetworkConnector::new(config.clone()));
        let mut devices = Vec::with_capacity(config.connections);
        for _ in 0..config.connections {
            devices.push(connector.connect().await?);
        }
        info!(
            address = %config.address(),
            connections = config.connections,
            "device connection pool ready"
        );
        Ok(Self::build(
            devices.into_iter().map(Slot::Idle).collect(),
            Some(connector),
        ))
    }
}

impl<D: KvDevice + 'static> ConnectionPool<D> {
    /// Pool over already connected devices, without reconnects.
    #[must_use]
    pub fn new(devices: Vec<D>) -> Self {
        Self::build(devices.into_iter().map(Slot::Idle).collect(), None)
    }

    /// Pool of `size` slots that connects lazily through `connector`.
    #[must_use]
    pub fn with_connector(connector: Arc<dyn DeviceConnector<D>>, size: usize) -> Self {
        let slots = (0..size).map(|_| Slot::Broken).collect();
        Self::build(slots, Some(connector))
    }
}

impl<D> ConnectionPool<D> {
    fn build(slots: Vec<Slot<D>>, connector: Option<Arc<dyn DeviceConnector<D>>>) -> Self {
        let capacity = slots.len();
        debug!(capacity, reconnect = connector.is_some(), "connection pool created");
        Self {
            shared: Arc::new(Shared {
                slots: Mutex::new(slots),
                permits: Arc::new(Semaphore::new(capacity)),
                connector,
                in_use: AtomicUsize::new(0),
                high_water_mark: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let capacity = self.shared.slots.lock().len();
        let in_use = self.shared.in_use.load(Ordering::Acquire);
        PoolStats {
            capacity,
            in_use,
            available: capacity.saturating_sub(in_use),
            high_water_mark: self.shared.high_water_mark.load(Ordering::Acquire),
        }
    }

    /// Whether [`ConnectionPool::close`] was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

impl<D: KvDevice + 'static> ConnectionPool<D> {
    /// Wait for a free device and take it exclusively.
    pub async fn acquire(&self) -> DeviceResult<PooledDevice<D>> {
        if self.is_closed() {
            return Err(DeviceError::PoolClosed);
        }
        let permit = Arc::clone(&self.shared.permits)
            .acquire_owned()
            .await
            .map_err(|_| DeviceError::PoolClosed)?;

        let (slot, device) = self.take_slot()?;
        let mut reservation = SlotReservation {
            shared: &self.shared,
            slot,
            armed: true,
        };
        let device = match device {
            Some(device) => device,
            None => self.reconnect(slot).await?,
        };
        reservation.armed = false;

        let in_use = self.shared.in_use.fetch_add(1, Ordering::AcqRel) + 1;
        self.shared
            .high_water_mark
            .fetch_max(in_use, Ordering::AcqRel);
        Ok(PooledDevice {
            device: Some(device),
            slot,
            shared: Arc::clone(&self.shared),
            _permit: permit,
        })
    }

    /// Mark the first idle slot (or else the first broken one) busy.
    fn take_slot(&self) -> DeviceResult<(usize, Option<D>)> {
        let mut slots = self.shared.slots.lock();
        if let Some(index) = slots.iter().position(|s| matches!(s, Slot::Idle(_))) {
            if let Slot::Idle(device) = std::mem::replace(&mut slots[index], Slot::Busy) {
                if device.is_usable() {
                    return Ok((index, Some(device)));
                }
                warn!(slot = index, "evicting unusable idle device");
            }
            return Ok((index, None));
        }
        let Some(index) = slots.iter().position(|s| matches!(s, Slot::Broken)) else {
            warn!(slots = slots.len(), "permit granted but every slot is busy");
            return Err(anyhow::anyhow!("permit granted but every slot is busy").into());
        };
        slots[index] = Slot::Busy;
        Ok((index, None))
    }

    async fn reconnect(&self, slot: usize) -> DeviceResult<D> {
        let connector = self
            .shared
            .connector
            .as_ref()
            .ok_or(DeviceError::ConnectionClosed)?;
        debug!(slot, "reconnecting pool slot");
        let device = connector.connect().await.inspect_err(|e| {
            warn!(slot, error = %e, "failed to reconnect pool slot");
        })?;
        info!(slot, "pool slot reconnected");
        Ok(device)
    }

    /// Reject new acquisitions and close idle devices. Devices still handed
    /// out are dropped when returned.
    pub async fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.permits.close();
        let idle: Vec<D> = {
            let mut slots = self.shared.slots.lock();
            slots
                .iter_mut()
                .filter_map(|slot| match std::mem::replace(slot, Slot::Broken) {
                    Slot::Idle(device) => Some(device),
                    Slot::Busy => {
                        *slot = Slot::Busy;
                        None
                    }
                    Slot::Broken => None,
                })
                .collect()
        };
        for mut device in idle {
            if let Err(e) = device.close().await {
                debug!(error = %e, "error closing pooled device");
            }
        }
        info!("device connection pool closed");
    }
}

/// A slot taken by an acquisition that has no device yet.
///
/// Puts the slot back as broken when the acquisition fails or its future is
/// dropped while reconnecting.
struct SlotReservation<'a, D> {
    shared: &'a Shared<D>,
    slot: usize,
    armed: bool,
}

impl<D> Drop for SlotReservation<'_, D> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.slots.lock()[self.slot] = Slot::Broken;
        }
    }
}

/// Exclusive handle to a pooled device; returns it to the pool on drop.
#[derive(Debug)]
pub struct PooledDevice<D: KvDevice> {
    device: Option<D>,
    slot: usize,
    shared: Arc<Shared<D>>,
    _permit: OwnedSemaphorePermit,
}

impl<D: KvDevice> PooledDevice<D> {
    /// Slot index, for logging.
    #[must_use]
    pub fn slot(&self) -> usize {
        self.slot
    }
}

impl<D: KvDevice> Deref for PooledDevice<D> {
    type Target = D;

    fn deref(&self) -> &D {
        match &self.device {
            Some(device) => device,
            None => unreachable!("device is present until drop"),
        }
    }
}

impl<D: KvDevice> DerefMut for PooledDevice<D> {
    fn deref_mut(&mut self) -> &mut D {
        match &mut self.device {
            Some(device) => device,
            None => unreachable!("device is present until drop"),
        }
    }
}

impl<D: KvDevice> Drop for PooledDevice<D> {
    fn drop(&mut self) {
        let Some(device) = self.device.take() else {
            return;
        };
        // The slot is refilled before `_permit` is dropped.
        let usable = device.is_usable();
        let closed = self.shared.closed.load(Ordering::Acquire);
        if !usable {
            warn!(slot = self.slot, "dropping unusable device from pool");
        }
        self.shared.slots.lock()[self.slot] = if usable && !closed {
            Slot::Idle(device)
        } else {
            Slot::Broken
        };
        self.shared.in_use.fetch_sub(1, Ordering::AcqRel);
    }
}
