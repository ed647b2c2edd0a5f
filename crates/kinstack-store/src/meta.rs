//! JSON records stored under metadata keys.

use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::keys::PartKey;

/// Reserved metadata field holding the hex etag.
pub const META_ETAG: &str = "etag";

/// Reserved metadata field holding the decimal size.
pub const META_SIZE: &str = "size";

/// Reserved metadata field holding the MIME type.
pub const META_CONTENT_TYPE: &str = "content-type";

const RESERVED: [&str; 3] = [META_ETAG, META_SIZE, META_CONTENT_TYPE];

/// Current on-device record version.
pub const RECORD_VERSION: u32 = 1;

/// Metadata of `bucket.<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketRecord {
    /// Bucket name.
    pub name: String,
    /// Creation time.
    pub created: DateTime<Utc>,
}

/// What an [`ObjectRecord`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    /// A visible object.
    Object,
    /// One uploaded part of an in-progress multipart upload.
    Part,
}

/// One part of a completed multipart object, in assembly order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartRecord {
    /// Part number.
    pub number: u32,
    /// Hex MD5 of the part.
    pub etag: String,
    /// Part size in bytes.
    pub size: u64,
}

impl PartRecord {
    /// Key identity of this part.
    #[must_use]
    pub fn key(&self) -> PartKey {
        PartKey {
            number: self.number,
            etag: self.etag.clone(),
            size: self.size,
        }
    }
}

impl From<&PartKey> for PartRecord {
    fn from(key: &PartKey) -> Self {
        Self {
            number: key.number,
            etag: key.etag.clone(),
            size: key.size,
        }
    }
}

/// Metadata of an object or of an uploaded part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRecord {
    /// Record layout version.
    pub version: u32,
    /// Object or part.
    pub kind: RecordKind,
    /// Reserved fields plus user metadata.
    pub meta: BTreeMap<String, String>,
    /// Part index of a multipart object; empty for single-shot objects.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<PartRecord>,
    /// Creation time.
    pub created: DateTime<Utc>,
    /// Last modification time.
    pub modified: DateTime<Utc>,
}

impl ObjectRecord {
    /// A record for content with the given etag, size and type.
    #[must_use]
    pub fn new(
        kind: RecordKind,
        etag: &str,
        size: u64,
        content_type: &str,
        user_metadata: &BTreeMap<String, String>,
    ) -> Self {
        let now = Utc::now();
        let mut meta: BTreeMap<String, String> = user_metadata
            .iter()
            .filter(|(k, _)| !RESERVED.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        meta.insert(META_ETAG.to_owned(), etag.to_owned());
        meta.insert(META_SIZE.to_owned(), size.to_string());
        meta.insert(META_CONTENT_TYPE.to_owned(), content_type.to_owned());
        Self {
            version: RECORD_VERSION,
            kind,
            meta,
            parts: Vec::new(),
            created: now,
            modified: now,
        }
    }

    /// Stored etag.
    #[must_use]
    pub fn etag(&self) -> &str {
        self.meta.get(META_ETAG).map_or("", String::as_str)
    }

    /// Stored size; a record without a parseable size reads as empty.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.meta
            .get(META_SIZE)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }

    /// Stored MIME type.
    #[must_use]
    pub fn content_type(&self) -> &str {
        self.meta.get(META_CONTENT_TYPE).map_or("", String::as_str)
    }

    /// Metadata without the reserved fields.
    #[must_use]
    pub fn user_metadata(&self) -> BTreeMap<String, String> {
        self.meta
            .iter()
            .filter(|(k, _)| !RESERVED.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Whether the content lives in part data keys.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        !self.parts.is_empty()
    }
}

/// State of an in-progress multipart upload, stored at
/// `<bucket>/<object>.fs.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecord {
    /// Upload id handed to the client.
    pub upload_id: String,
    /// Bucket name.
    pub bucket: String,
    /// Object name.
    pub object: String,
    /// Metadata the completed object will carry.
    pub meta: BTreeMap<String, String>,
    /// Initiation time.
    pub initiated: DateTime<Utc>,
}

/// Encode a record as a device value.
pub fn encode<T: Serialize>(record: &T) -> anyhow::Result<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(record)?))
}

/// Decode a record read from `key`.
pub fn decode<T: for<'de> Deserialize<'de>>(key: &[u8], value: &[u8]) -> anyhow::Result<T> {
    use anyhow::Context;

    serde_json::from_slice(value)
        .with_context(|| format!("corrupt record at {}", String::from_utf8_lossy(key)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_keep_reserved_fields_authoritative() {
        let mut user = BTreeMap::new();
        user.insert("etag".to_owned(), "forged".to_owned());
        user.insert("x-amz-meta-color".to_owned(), "blue".to_owned());
        let record = ObjectRecord::new(RecordKind::Object, "abc", 5, "text/plain", &user);

        assert_eq!(record.etag(), "abc");
        assert_eq!(record.size(), 5);
        assert_eq!(record.content_type(), "text/plain");
        assert_eq!(record.user_metadata().len(), 1);
        assert_eq!(record.user_metadata()["x-amz-meta-color"], "blue");
        assert!(!record.is_multipart());
    }

    #[test]
    fn test_should_serialize_records_as_camel_case_json() {
        let record = ObjectRecord::new(RecordKind::Part, "abc", 1, "a/b", &BTreeMap::new());
        let value = encode(&record).unwrap();
        let json = std::str::from_utf8(&value).unwrap();
        assert!(json.contains("\"kind\":\"part\""));
        assert!(!json.contains("parts"));

        let back: ObjectRecord = decode(b"k", &value).unwrap();
        assert_eq!(back, record);

        let upload = UploadRecord {
            upload_id: "u".into(),
            bucket: "b".into(),
            object: "o".into(),
            meta: BTreeMap::new(),
            initiated: Utc::now(),
        };
        assert!(String::from_utf8(encode(&upload).unwrap().to_vec()).unwrap().contains("uploadId"));
    }

    #[test]
    fn test_should_name_the_key_of_corrupt_records() {
        let err = decode::<BucketRecord>(b"meta.bucket.b", b"{not json").unwrap_err();
        assert!(err.to_string().contains("meta.bucket.b"));
    }
}
