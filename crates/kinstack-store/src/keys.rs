//! Mapping of buckets, objects and parts onto the flat device key space.
//!
//! ```text
//! bucket.<bucket>                                  bucket data (empty)
//! meta.bucket.<bucket>                             BucketRecord
//! <bucket>/<object>                                object data
//! meta.<bucket>/<object>                           ObjectRecord
//! <bucket>/<object>.fs.json                        UploadRecord
//! <bucket>/<object>.<nnnnn>.<etag>.<size>          part data
//! meta.<bucket>/<object>.<nnnnn>.<etag>.<size>     part ObjectRecord
//! ```
//!
//! Bucket names never contain `/`, so `<bucket>/` bounds one bucket's keys
//! and `<bucket>0` (the next byte after `/`) is the exclusive end of them.

use bytes::Bytes;
use kinstack_client::MAX_KEY_SIZE;

use crate::checksums::is_md5_hex;

/// Prefix of every metadata key.
pub const META_PREFIX: &str = "meta.";

/// Prefix of bucket keys.
pub const BUCKET_PREFIX: &str = "bucket.";

/// Suffix of in-progress upload records.
pub const UPLOAD_SUFFIX: &str = ".fs.json";

/// Separator between a bucket and its object names.
pub const SEPARATOR: char = '/';

/// Data key of a bucket.
#[must_use]
pub fn bucket_key(bucket: &str) -> Bytes {
    Bytes::from(format!("{BUCKET_PREFIX}{bucket}"))
}

/// Data key of an object.
#[must_use]
pub fn object_key(bucket: &str, object: &str) -> Bytes {
    Bytes::from(format!("{bucket}{SEPARATOR}{object}"))
}

/// Key of the upload record for `object`.
#[must_use]
pub fn upload_key(bucket: &str, object: &str) -> Bytes {
    Bytes::from(format!("{bucket}{SEPARATOR}{object}{UPLOAD_SUFFIX}"))
}

/// Metadata key paired with a data key.
#[must_use]
pub fn meta_key(data_key: &[u8]) -> Bytes {
    let mut key = Vec::with_capacity(META_PREFIX.len() + data_key.len());
    key.extend_from_slice(META_PREFIX.as_bytes());
    key.extend_from_slice(data_key);
    Bytes::from(key)
}

/// Smallest key greater than every key starting with `prefix`.
///
/// Trailing `0xff` bytes cannot be incremented and are dropped; a prefix made
/// only of `0xff` bytes has no such key and maps to the largest legal key.
#[must_use]
pub fn increment_last_byte(prefix: &[u8]) -> Bytes {
    let mut key = prefix.to_vec();
    while let Some(last) = key.pop() {
        if last < u8::MAX {
            key.push(last + 1);
            return Bytes::from(key);
        }
    }
    Bytes::from(vec![u8::MAX; MAX_KEY_SIZE])
}

/// Inclusive start and exclusive end of a key-range scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanBounds {
    /// First key of the range, inclusive.
    pub start: Bytes,
    /// End of the range, exclusive.
    pub end: Bytes,
}

/// All bucket metadata keys.
#[must_use]
pub fn bucket_scan() -> ScanBounds {
    let start = format!("{META_PREFIX}{BUCKET_PREFIX}");
    ScanBounds {
        end: increment_last_byte(start.as_bytes()),
        start: Bytes::from(start),
    }
}

/// Metadata keys of objects in `bucket` whose names start with `prefix`.
#[must_use]
pub fn object_meta_scan(bucket: &str, prefix: &str) -> ScanBounds {
    let start = format!("{META_PREFIX}{bucket}{SEPARATOR}{prefix}");
    ScanBounds {
        end: increment_last_byte(start.as_bytes()),
        start: Bytes::from(start),
    }
}

/// Data keys in `bucket` starting with `prefix`: objects, parts and upload
/// records.
#[must_use]
pub fn bucket_data_scan(bucket: &str, prefix: &str) -> ScanBounds {
    let start = format!("{bucket}{SEPARATOR}{prefix}");
    ScanBounds {
        end: increment_last_byte(start.as_bytes()),
        start: Bytes::from(start),
    }
}

/// Metadata keys of the parts of `object`.
#[must_use]
pub fn part_meta_scan(bucket: &str, object: &str) -> ScanBounds {
    let start = format!("{META_PREFIX}{bucket}{SEPARATOR}{object}.");
    ScanBounds {
        end: increment_last_byte(start.as_bytes()),
        start: Bytes::from(start),
    }
}

/// Object name of a metadata key in `bucket`, if it belongs there.
#[must_use]
pub fn object_name_from_meta_key<'a>(bucket: &str, key: &'a [u8]) -> Option<&'a str> {
    let rest = key.strip_prefix(META_PREFIX.as_bytes())?;
    let rest = rest.strip_prefix(bucket.as_bytes())?;
    let rest = rest.strip_prefix(b"/")?;
    std::str::from_utf8(rest).ok()
}

/// Bucket name of a bucket metadata key.
#[must_use]
pub fn bucket_name_from_meta_key(key: &[u8]) -> Option<&str> {
    let rest = key.strip_prefix(META_PREFIX.as_bytes())?;
    let rest = rest.strip_prefix(BUCKET_PREFIX.as_bytes())?;
    std::str::from_utf8(rest).ok()
}

/// Object name of an upload record key in `bucket`.
#[must_use]
pub fn object_name_from_upload_key<'a>(bucket: &str, key: &'a [u8]) -> Option<&'a str> {
    let rest = key.strip_prefix(bucket.as_bytes())?;
    let rest = rest.strip_prefix(b"/")?;
    let rest = std::str::from_utf8(rest).ok()?;
    rest.strip_suffix(UPLOAD_SUFFIX)
}

/// Whether an object name ends in a part suffix `.<nnnnn>.<etag>.<size>`.
#[must_use]
pub fn is_part_name(name: &str) -> bool {
    let mut fields = name.rsplitn(4, '.');
    let (Some(size), Some(etag), Some(number), Some(object)) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return false;
    };
    !object.is_empty() && PartKey::parse(&format!("{number}.{etag}.{size}")).is_some()
}

/// Identity of one uploaded part, carried in its key suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartKey {
    /// Part number.
    pub number: u32,
    /// Hex MD5 of the part content.
    pub etag: String,
    /// Part size in bytes.
    pub size: u64,
}

impl PartKey {
    /// Key suffix `<nnnnn>.<etag>.<size>`.
    #[must_use]
    pub fn suffix(&self) -> String {
        format!("{:05}.{}.{}", self.number, self.etag, self.size)
    }

    /// Data key of this part of `object`.
    #[must_use]
    pub fn data_key(&self, bucket: &str, object: &str) -> Bytes {
        Bytes::from(format!(
            "{bucket}{SEPARATOR}{object}.{}",
            self.suffix()
        ))
    }

    /// Metadata key of this part of `object`.
    #[must_use]
    pub fn meta_key(&self, bucket: &str, object: &str) -> Bytes {
        meta_key(&self.data_key(bucket, object))
    }

    /// Decode a suffix produced by [`PartKey::suffix`].
    ///
    /// ```
    /// use kinstack_store::keys::PartKey;
    ///
    /// let part = PartKey::parse("00003.5d41402abc4b2a76b9719d911017c592.5").unwrap();
    /// assert_eq!(part.number, 3);
    /// assert_eq!(part.size, 5);
    /// assert!(PartKey::parse("3.abc.5").is_none());
    /// ```
    #[must_use]
    pub fn parse(suffix: &str) -> Option<Self> {
        let mut fields = suffix.splitn(3, '.');
        let number = fields.next()?;
        let etag = fields.next()?;
        let size = fields.next()?;
        if number.len() < 5 || !number.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if !is_md5_hex(etag) || size.is_empty() || !size.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(Self {
            number: number.parse().ok()?,
            etag: etag.to_owned(),
            size: size.parse().ok()?,
        })
    }

    /// Decode the part identity from a part metadata key of `object`.
    #[must_use]
    pub fn from_meta_key(bucket: &str, object: &str, key: &[u8]) -> Option<Self> {
        let name = object_name_from_meta_key(bucket, key)?;
        let suffix = name.strip_prefix(object)?.strip_prefix('.')?;
        Self::parse(suffix)
    }
}
