//! In-memory key-value engine behind the fast-path interface.
//!
//! Backs the loopback device simulator and fast-path tests. Entries live in
//! an ordered map so range scans follow device key order; every buffer
//! handed out through [`SkinnyWaist::get`] is tracked until released.

use std::collections::{BTreeMap, HashSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use kinstack_proto::Algorithm;
use parking_lot::{Mutex, RwLock};

use crate::fastpath::{NativeBuffer, SkinnyWaist, WaistEntry, WaistStatus};
use crate::options::{CmdOpts, KeyRange};

/// Default nominal capacity, 4 TB like a single drive.
const DEFAULT_CAPACITY: u64 = 4_000_000_000_000;

#[derive(Debug, Clone)]
struct StoredEntry {
    value: Bytes,
    version: Bytes,
    tag: Bytes,
    algorithm: Algorithm,
}

impl StoredEntry {
    fn footprint(key: &[u8], value: &[u8]) -> u64 {
        (key.len() + value.len()) as u64
    }
}

#[derive(Debug, Default)]
struct Entries {
    map: BTreeMap<Bytes, StoredEntry>,
    used: u64,
}

/// Ordered in-memory device.
#[derive(Debug)]
pub struct MemoryDevice {
    entries: RwLock<Entries>,
    outstanding: Mutex<HashSet<u64>>,
    next_handle: AtomicU64,
    capacity: u64,
}

impl Default for MemoryDevice {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl MemoryDevice {
    /// An empty device with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty device holding at most `capacity` bytes of keys and values.
    #[must_use]
    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
            outstanding: Mutex::new(HashSet::new()),
            next_handle: AtomicU64::new(1),
            capacity,
        }
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().map.len()
    }

    /// Whether the device holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().map.is_empty()
    }

    /// Nominal capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Bytes of keys and values currently stored.
    #[must_use]
    pub fn used_bytes(&self) -> u64 {
        self.entries.read().used
    }

    /// Buffers handed out and not yet released.
    #[must_use]
    pub fn outstanding_buffers(&self) -> usize {
        self.outstanding.lock().len()
    }

    /// All keys, in order.
    #[must_use]
    pub fn keys(&self) -> Vec<Bytes> {
        self.entries.read().map.keys().cloned().collect()
    }

    /// Whether `key` is stored.
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        self.entries.read().map.contains_key(key)
    }

    /// Stored version of `key`, if present.
    #[must_use]
    pub fn version_of(&self, key: &[u8]) -> Option<Bytes> {
        self.entries.read().map.get(key).map(|e| e.version.clone())
    }

    /// Drop every entry.
    pub fn erase(&self) {
        let mut entries = self.entries.write();
        entries.map.clear();
        entries.used = 0;
    }

    fn check_version(current: Option<&Bytes>, expected: Option<&Bytes>) -> Result<(), WaistStatus> {
        let current = current.map_or(&[][..], |v| &v[..]);
        let expected = expected.map_or(&[][..], |v| &v[..]);
        if current == expected {
            Ok(())
        } else {
            Err(WaistStatus::VersionMismatch)
        }
    }
}

impl SkinnyWaist for MemoryDevice {
    fn get(&self, _user_id: i64, key: &[u8], opts: &CmdOpts) -> Result<WaistEntry, WaistStatus> {
        let entry = self
            .entries
            .read()
            .map
            .get(key)
            .cloned()
            .ok_or(WaistStatus::NotFound)?;
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let data: Box<[u8]> = if opts.metadata_only {
            Box::default()
        } else {
            entry.value.to_vec().into_boxed_slice()
        };
        self.outstanding.lock().insert(handle);
        Ok(WaistEntry {
            buffer: NativeBuffer::new(handle, data),
            version: entry.version,
            tag: entry.tag,
            algorithm: Some(entry.algorithm),
        })
    }

    fn put(&self, _user_id: i64, key: &[u8], value: &[u8], opts: &CmdOpts) -> Result<(), WaistStatus> {
        let mut entries = self.entries.write();
        let existing = entries.map.get(key);
        if !opts.force {
            Self::check_version(existing.map(|e| &e.version), opts.db_version.as_ref())?;
        }
        let freed = existing.map_or(0, |e| StoredEntry::footprint(key, &e.value));
        let needed = StoredEntry::footprint(key, value);
        if entries.used - freed + needed > self.capacity {
            return Err(WaistStatus::NoSpace);
        }
        entries.used = entries.used - freed + needed;
        entries.map.insert(
            Bytes::copy_from_slice(key),
            StoredEntry {
                value: Bytes::copy_from_slice(value),
                version: opts.new_version.clone().unwrap_or_default(),
                tag: opts.tag.clone(),
                algorithm: opts.algorithm,
            },
        );
        Ok(())
    }

    fn delete(&self, _user_id: i64, key: &[u8], opts: &CmdOpts) -> Result<(), WaistStatus> {
        let mut entries = self.entries.write();
        let existing = entries.map.get(key).ok_or(WaistStatus::NotFound)?;
        if !opts.force {
            Self::check_version(Some(&existing.version), opts.db_version.as_ref())?;
        }
        if let Some(removed) = entries.map.remove(key) {
            entries.used -= StoredEntry::footprint(key, &removed.value);
        }
        Ok(())
    }

    fn get_key_range(&self, _user_id: i64, range: &KeyRange) -> Result<Vec<Bytes>, WaistStatus> {
        if range.start > range.end {
            return Ok(Vec::new());
        }
        let lower = if range.start_inclusive {
            Bound::Included(&range.start)
        } else {
            Bound::Excluded(&range.start)
        };
        let upper = if range.end_inclusive {
            Bound::Included(&range.end)
        } else {
            Bound::Excluded(&range.end)
        };
        if range.start == range.end && !(range.start_inclusive && range.end_inclusive) {
            return Ok(Vec::new());
        }
        let entries = self.entries.read();
        let keys = entries.map.range::<Bytes, _>((lower, upper)).map(|(k, _)| k.clone());
        let max = range.max_returned as usize;
        Ok(if range.reverse {
            keys.rev().take(max).collect()
        } else {
            keys.take(max).collect()
        })
    }

    fn release(&self, buffer: NativeBuffer) {
        self.outstanding.lock().remove(&buffer.handle());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: &'static [u8], end: &'static [u8]) -> KeyRange {
        KeyRange::builder().start(start).end(end).build()
    }

    fn put(device: &MemoryDevice, key: &[u8], value: &[u8]) {
        device.put(1, key, value, &CmdOpts::default()).unwrap();
    }

    #[test]
    fn test_should_store_and_read_back() {
        let device = MemoryDevice::new();
        put(&device, b"a", b"alpha");
        let entry = device.get(1, b"a", &CmdOpts::default()).unwrap();
        assert_eq!(entry.buffer.as_slice(), b"alpha");
        assert_eq!(device.outstanding_buffers(), 1);
        device.release(entry.buffer);
        assert_eq!(device.outstanding_buffers(), 0);
    }

    #[test]
    fn test_should_enforce_versions_unless_forced() {
        let device = MemoryDevice::new();
        let v1 = CmdOpts::builder()
            .force(false)
            .new_version(Bytes::from_static(b"1"))
            .build();
        device.put(1, b"k", b"x", &v1).unwrap();

        let stale = CmdOpts::builder()
            .force(false)
            .db_version(Bytes::from_static(b"0"))
            .new_version(Bytes::from_static(b"2"))
            .build();
        assert_eq!(
            device.put(1, b"k", b"y", &stale),
            Err(WaistStatus::VersionMismatch)
        );
        assert_eq!(
            device.delete(1, b"k", &stale),
            Err(WaistStatus::VersionMismatch)
        );

        device.put(1, b"k", b"z", &CmdOpts::default()).unwrap();
        assert_eq!(device.version_of(b"k"), Some(Bytes::new()));
        device.delete(1, b"k", &CmdOpts::default()).unwrap();
        assert_eq!(
            device.delete(1, b"k", &CmdOpts::default()),
            Err(WaistStatus::NotFound)
        );
    }

    #[test]
    fn test_should_scan_ranges_with_bounds_and_reverse() {
        let device = MemoryDevice::new();
        for key in [&b"a"[..], b"b", b"c", b"d"] {
            put(&device, key, b"");
        }
        let keys = device.get_key_range(1, &range(b"a", b"c")).unwrap();
        assert_eq!(keys, vec![Bytes::from_static(b"a"), Bytes::from_static(b"b"), Bytes::from_static(b"c")]);

        let mut exclusive = range(b"a", b"d");
        exclusive.start_inclusive = false;
        exclusive.end_inclusive = false;
        exclusive.max_returned = 1;
        assert_eq!(
            device.get_key_range(1, &exclusive).unwrap(),
            vec![Bytes::from_static(b"b")]
        );

        exclusive.reverse = true;
        assert_eq!(
            device.get_key_range(1, &exclusive).unwrap(),
            vec![Bytes::from_static(b"c")]
        );

        assert!(device.get_key_range(1, &range(b"z", b"a")).unwrap().is_empty());
    }

    #[test]
    fn test_should_report_no_space() {
        let device = MemoryDevice::with_capacity(8);
        put(&device, b"k", b"1234");
        assert_eq!(
            device.put(1, b"j", b"12345", &CmdOpts::default()),
            Err(WaistStatus::NoSpace)
        );
        // overwriting frees the old value first
        put(&device, b"k", b"1234567");
        assert_eq!(device.used_bytes(), 8);
    }

    #[test]
    fn test_should_erase_everything() {
        let device = MemoryDevice::new();
        put(&device, b"a", b"1");
        device.erase();
        assert!(device.is_empty());
        assert_eq!(device.used_bytes(), 0);
    }
}
