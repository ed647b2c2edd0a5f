//! Inputs and results of the [`ObjectLayer`](crate::layer::ObjectLayer)
//! operations.

use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use typed_builder::TypedBuilder;

use crate::error::{StoreError, StoreResult};
use crate::meta::{BucketRecord, ObjectRecord};

/// A bucket as returned by bucket calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketInfo {
    /// Bucket name.
    pub name: String,
    /// Creation time.
    pub created: DateTime<Utc>,
}

impl From<BucketRecord> for BucketInfo {
    fn from(record: BucketRecord) -> Self {
        Self {
            name: record.name,
            created: record.created,
        }
    }
}

/// An object as returned by object calls and listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Bucket name.
    pub bucket: String,
    /// Object name.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Hex etag; multipart objects carry a `-N` suffix.
    pub etag: String,
    /// MIME type.
    pub content_type: String,
    /// Last modification time.
    pub modified: DateTime<Utc>,
    /// User metadata.
    pub user_defined: BTreeMap<String, String>,
    /// Number of parts for multipart objects, zero otherwise.
    pub part_count: usize,
}

impl ObjectInfo {
    /// Describe `record`, stored as `bucket/name`.
    #[must_use]
    pub fn from_record(bucket: &str, name: &str, record: &ObjectRecord) -> Self {
        Self {
            bucket: bucket.to_owned(),
            name: name.to_owned(),
            size: record.size(),
            etag: record.etag().to_owned(),
            content_type: record.content_type().to_owned(),
            modified: record.modified,
            user_defined: record.user_metadata(),
            part_count: record.parts.len(),
        }
    }
}

/// Options of `put_object` and `new_multipart_upload`.
#[derive(Debug, Clone, Default, TypedBuilder)]
pub struct PutObjectOptions {
    /// MIME type; guessed from the object name when absent.
    #[builder(default, setter(strip_option, into))]
    pub content_type: Option<String>,
    /// User metadata stored with the object.
    #[builder(default)]
    pub user_metadata: BTreeMap<String, String>,
    /// Base64 MD5 the payload must match.
    #[builder(default, setter(strip_option, into))]
    pub content_md5: Option<String>,
}

/// A byte range of an object: `length` bytes starting at `offset`, or the
/// rest of the object when `length` is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// First byte.
    pub offset: u64,
    /// Number of bytes.
    pub length: Option<u64>,
}

impl ByteRange {
    /// `length` bytes from `offset`.
    #[must_use]
    pub fn new(offset: u64, length: u64) -> Self {
        Self {
            offset,
            length: Some(length),
        }
    }

    /// From `offset` to the end.
    #[must_use]
    pub fn from_offset(offset: u64) -> Self {
        Self {
            offset,
            length: None,
        }
    }

    /// Resolve against an object of `size` bytes into `(offset, length)`.
    ///
    /// ```
    /// use kinstack_store::types::ByteRange;
    ///
    /// assert_eq!(ByteRange::from_offset(2).resolve(5).unwrap(), (2, 3));
    /// assert!(ByteRange::new(3, 3).resolve(5).is_err());
    /// ```
    pub fn resolve(&self, size: u64) -> StoreResult<(u64, u64)> {
        let length = self.length.unwrap_or(size.saturating_sub(self.offset));
        let out_of_range = || StoreError::InvalidRange {
            offset: self.offset,
            length,
            size,
        };
        if self.offset > size {
            return Err(out_of_range());
        }
        match self.offset.checked_add(length) {
            Some(end) if end <= size => Ok((self.offset, length)),
            _ => Err(out_of_range()),
        }
    }
}

/// Result of `get_object`.
#[derive(Debug, Clone)]
pub struct GetObjectOutput {
    /// Object description.
    pub info: ObjectInfo,
    /// Requested bytes.
    pub data: Bytes,
    /// Offset of `data` within the object.
    pub offset: u64,
}

/// Result of `list_objects`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListObjectsInfo {
    /// Whether more entries follow.
    pub is_truncated: bool,
    /// Marker for the next page, when truncated.
    pub next_marker: Option<String>,
    /// Objects in name order.
    pub objects: Vec<ObjectInfo>,
    /// Common prefixes in name order.
    pub prefixes: Vec<String>,
}

/// Result of `list_objects_v2`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListObjectsV2Info {
    /// Whether more entries follow.
    pub is_truncated: bool,
    /// Token the page was requested with.
    pub continuation_token: Option<String>,
    /// Token for the next page, when truncated.
    pub next_continuation_token: Option<String>,
    /// Objects in name order.
    pub objects: Vec<ObjectInfo>,
    /// Common prefixes in name order.
    pub prefixes: Vec<String>,
}

/// One uploaded part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartInfo {
    /// Part number.
    pub part_number: u32,
    /// Hex MD5 of the part.
    pub etag: String,
    /// Size in bytes.
    pub size: u64,
    /// Upload time.
    pub modified: DateTime<Utc>,
}

/// Result of `list_object_parts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListPartsInfo {
    /// Bucket name.
    pub bucket: String,
    /// Object name.
    pub object: String,
    /// Upload id.
    pub upload_id: String,
    /// Marker the page was requested with.
    pub part_number_marker: u32,
    /// Marker for the next page.
    pub next_part_number_marker: u32,
    /// Page size.
    pub max_parts: usize,
    /// Whether more parts follow.
    pub is_truncated: bool,
    /// Parts in ascending part number order.
    pub parts: Vec<PartInfo>,
}

/// A part declared in `complete_multipart_upload`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletePart {
    /// Part number.
    pub part_number: u32,
    /// Etag returned when the part was uploaded.
    pub etag: String,
}

impl CompletePart {
    /// Declare part `part_number` with `etag`.
    #[must_use]
    pub fn new(part_number: u32, etag: impl Into<String>) -> Self {
        Self {
            part_number,
            etag: etag.into(),
        }
    }
}

/// An in-progress multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartUploadInfo {
    /// Object name.
    pub object: String,
    /// Upload id.
    pub upload_id: String,
    /// Initiation time.
    pub initiated: DateTime<Utc>,
}

/// Result of `list_multipart_uploads`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListMultipartsInfo {
    /// Key marker for the next page.
    pub next_key_marker: Option<String>,
    /// Whether more uploads follow.
    pub is_truncated: bool,
    /// Uploads in object name order.
    pub uploads: Vec<MultipartUploadInfo>,
    /// Common prefixes in name order.
    pub prefixes: Vec<String>,
}

/// Device capacity figures.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StorageInfo {
    /// Nominal capacity in bytes, when the device reports it.
    pub total: Option<u64>,
    /// Bytes in use, when the device reports it.
    pub used: Option<u64>,
    /// Connections in the pool.
    pub connections: usize,
    /// Connections currently checked out.
    pub in_use: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_resolve_ranges_within_object() {
        assert_eq!(ByteRange::new(0, 5).resolve(5).unwrap(), (0, 5));
        assert_eq!(ByteRange::new(1, 3).resolve(5).unwrap(), (1, 3));
        assert_eq!(ByteRange::from_offset(5).resolve(5).unwrap(), (5, 0));
        assert_eq!(ByteRange::from_offset(0).resolve(0).unwrap(), (0, 0));
    }

    #[test]
    fn test_should_reject_unsatisfiable_ranges() {
        assert!(matches!(
            ByteRange::from_offset(6).resolve(5),
            Err(StoreError::InvalidRange { offset: 6, size: 5, .. })
        ));
        assert!(matches!(
            ByteRange::new(2, 4).resolve(5),
            Err(StoreError::InvalidRange { length: 4, .. })
        ));
        assert!(ByteRange::new(1, u64::MAX).resolve(5).is_err());
    }

    #[test]
    fn test_should_build_put_options() {
        let opts = PutObjectOptions::builder()
            .content_type("text/plain")
            .content_md5("XUFAKrxLKna5cZ2REBfFkg==")
            .build();
        assert_eq!(opts.content_type.as_deref(), Some("text/plain"));
        assert!(opts.user_metadata.is_empty());
        assert!(PutObjectOptions::default().content_md5.is_none());
    }
}
