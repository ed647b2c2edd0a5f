//! The device command set shared by the network and fast-path clients.

use async_trait::async_trait;
use bytes::Bytes;
use kinstack_proto::{Algorithm, GetLog, LogType};

use crate::error::{DeviceError, DeviceResult};
use crate::options::{CmdOpts, KeyRange};

/// One entry read from a device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    /// Key of the entry.
    pub key: Bytes,
    /// Value; empty for metadata-only reads.
    pub value: Bytes,
    /// Stored version.
    pub version: Bytes,
    /// Stored integrity tag.
    pub tag: Bytes,
    /// Algorithm of `tag`.
    pub algorithm: Option<Algorithm>,
}

/// A single logical device connection.
///
/// Implementations are used by one caller at a time (`&mut self`); the
/// connection pool hands them out exclusively. A failed call that returns a
/// stream error leaves the device unusable ([`KvDevice::is_usable`]); status
/// errors do not.
#[async_trait]
pub trait KvDevice: Send + std::fmt::Debug {
    /// Read the entry at `key`.
    async fn get(&mut self, key: &[u8], opts: &CmdOpts) -> DeviceResult<Record>;

    /// Read the first entry after `key`.
    async fn get_next(&mut self, key: &[u8], opts: &CmdOpts) -> DeviceResult<Record>;

    /// Read the last entry before `key`.
    async fn get_previous(&mut self, key: &[u8], opts: &CmdOpts) -> DeviceResult<Record>;

    /// Read only the version stored at `key`.
    async fn get_version(&mut self, key: &[u8], opts: &CmdOpts) -> DeviceResult<Bytes>;

    /// Store `value` at `key`.
    async fn put(&mut self, key: &[u8], value: Bytes, opts: &CmdOpts) -> DeviceResult<()>;

    /// Remove `key`.
    async fn delete(&mut self, key: &[u8], opts: &CmdOpts) -> DeviceResult<()>;

    /// List keys in `range`; values need follow-up reads.
    async fn get_key_range(&mut self, range: &KeyRange, opts: &CmdOpts)
    -> DeviceResult<Vec<Bytes>>;

    /// Round-trip without side effects.
    async fn noop(&mut self) -> DeviceResult<()>;

    /// Read device log sections.
    async fn get_log(&mut self, _types: &[LogType]) -> DeviceResult<GetLog> {
        Err(DeviceError::Unsupported("getlog"))
    }

    /// Release the underlying connection.
    async fn close(&mut self) -> DeviceResult<()> {
        Ok(())
    }

    /// Whether the device can still serve requests.
    fn is_usable(&self) -> bool;
}
