//! Per-command options and key ranges.

use bytes::Bytes;
use kinstack_proto::{Algorithm, Priority, Synchronization};
use typed_builder::TypedBuilder;

use crate::error::{DeviceError, DeviceResult};

/// Longest key the device accepts.
pub const MAX_KEY_SIZE: usize = 4096;

/// Longest version the device accepts.
pub const MAX_VERSION_SIZE: usize = 2048;

/// Longest tag the device accepts.
pub const MAX_TAG_SIZE: usize = 128;

/// Options shared by every keyed command.
///
/// Every field is a closed type, so unknown algorithms, sync modes and
/// priorities cannot be expressed; [`CmdOpts::validate`] covers the size
/// limits before any I/O happens.
///
/// ```
/// use kinstack_client::CmdOpts;
/// use kinstack_proto::Synchronization;
///
/// let opts = CmdOpts::builder()
///     .synchronization(Synchronization::WriteThrough)
///     .build();
/// assert!(opts.force);
/// assert!(opts.validate(b"bucket.photos", 0, 1024).is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder)]
pub struct CmdOpts {
    /// Cluster version expected by the caller.
    #[builder(default = 0)]
    pub cluster_version: i64,
    /// Device-side queueing timeout in milliseconds.
    #[builder(default = 60_000)]
    pub timeout: u64,
    /// Scheduling priority.
    #[builder(default = Priority::Normal)]
    pub priority: Priority,
    /// Algorithm the tag was computed with.
    #[builder(default = Algorithm::Sha1)]
    pub algorithm: Algorithm,
    /// Durability mode for writes.
    #[builder(default = Synchronization::WriteBack)]
    pub synchronization: Synchronization,
    /// Skip version checks.
    #[builder(default = true)]
    pub force: bool,
    /// Integrity tag stored with the value.
    #[builder(default)]
    pub tag: Bytes,
    /// Version to store on PUT.
    #[builder(default, setter(strip_option))]
    pub new_version: Option<Bytes>,
    /// Version the stored entry must have when `force` is false.
    #[builder(default, setter(strip_option))]
    pub db_version: Option<Bytes>,
    /// Only return metadata on GET.
    #[builder(default = false)]
    pub metadata_only: bool,
}

impl Default for CmdOpts {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl CmdOpts {
    /// Check key, version, tag and value sizes.
    pub fn validate(&self, key: &[u8], value_len: usize, max_value_size: usize) -> DeviceResult<()> {
        validate_key(key)?;
        for (name, version) in [("new version", &self.new_version), ("db version", &self.db_version)]
        {
            if let Some(v) = version {
                if v.len() > MAX_VERSION_SIZE {
                    return Err(DeviceError::InvalidArgument(format!(
                        "{name} is {} bytes, limit is {MAX_VERSION_SIZE}",
                        v.len()
                    )));
                }
            }
        }
        if self.tag.len() > MAX_TAG_SIZE {
            return Err(DeviceError::InvalidArgument(format!(
                "tag is {} bytes, limit is {MAX_TAG_SIZE}",
                self.tag.len()
            )));
        }
        if value_len > max_value_size {
            return Err(DeviceError::InvalidArgument(format!(
                "value is {value_len} bytes, limit is {max_value_size}"
            )));
        }
        Ok(())
    }
}

/// Reject empty and oversized keys.
pub fn validate_key(key: &[u8]) -> DeviceResult<()> {
    if key.is_empty() {
        return Err(DeviceError::InvalidArgument("key is empty".to_owned()));
    }
    if key.len() > MAX_KEY_SIZE {
        return Err(DeviceError::InvalidArgument(format!(
            "key is {} bytes, limit is {MAX_KEY_SIZE}",
            key.len()
        )));
    }
    Ok(())
}

/// Arguments of a key-range scan.
#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder)]
pub struct KeyRange {
    /// First key of the range.
    #[builder(setter(into))]
    pub start: Bytes,
    /// Last key of the range.
    #[builder(setter(into))]
    pub end: Bytes,
    /// Whether `start` itself may be returned.
    #[builder(default = true)]
    pub start_inclusive: bool,
    /// Whether `end` itself may be returned.
    #[builder(default = true)]
    pub end_inclusive: bool,
    /// Upper bound on returned keys.
    #[builder(default = 800)]
    pub max_returned: u32,
    /// Return keys in descending order, starting from `end`.
    #[builder(default = false)]
    pub reverse: bool,
}

impl KeyRange {
    /// Whether `key` falls inside the bounds (ignoring `max_returned`).
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        let above_start = if self.start_inclusive {
            key >= &self.start[..]
        } else {
            key > &self.start[..]
        };
        let below_end = if self.end_inclusive {
            key <= &self.end[..]
        } else {
            key < &self.end[..]
        };
        above_start && below_end
    }

    /// Reject bounds that cannot be sent.
    pub fn validate(&self) -> DeviceResult<()> {
        if self.start.len() > MAX_KEY_SIZE || self.end.len() > MAX_KEY_SIZE {
            return Err(DeviceError::InvalidArgument(format!(
                "range bound longer than {MAX_KEY_SIZE} bytes"
            )));
        }
        if self.max_returned == 0 {
            return Err(DeviceError::InvalidArgument(
                "max_returned must be positive".to_owned(),
            ));
        }
        Ok(())
    }
}
