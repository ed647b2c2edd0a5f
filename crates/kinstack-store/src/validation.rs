//! Name and argument validation for the object layer.
//!
//! Everything here runs before the first device call, so rejected requests
//! never touch the key space.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use base64::Engine;
use md5::{Digest, Md5};

use crate::error::{StoreError, StoreResult};
use crate::keys::UPLOAD_SUFFIX;

/// Maximum total size (in bytes) of all user-defined metadata keys and values.
const MAX_METADATA_SIZE: usize = 2048;

/// Maximum object name length in bytes.
const MAX_OBJECT_NAME_BYTES: usize = 1024;

/// Minimum bucket name length.
const MIN_BUCKET_NAME_LEN: usize = 3;

/// Maximum bucket name length.
const MAX_BUCKET_NAME_LEN: usize = 63;

fn invalid_bucket(name: &str, reason: impl Into<String>) -> StoreError {
    StoreError::BucketNameInvalid {
        bucket: name.to_owned(),
        reason: reason.into(),
    }
}

fn invalid_object(bucket: &str, object: &str, reason: impl Into<String>) -> StoreError {
    StoreError::ObjectNameInvalid {
        bucket: bucket.to_owned(),
        object: object.to_owned(),
        reason: reason.into(),
    }
}

/// Validate a bucket name.
///
/// Strict rules (DNS compatible):
/// - 3-63 characters long
/// - Only lowercase letters, numbers, hyphens, and dots
/// - Must start and end with a letter or number
/// - No consecutive dots (`..`)
/// - Not formatted as an IPv4 address (e.g. `192.168.0.1`)
/// - Must not start with `xn--` or `sthree-`, nor end with `-s3alias`
///
/// Relaxed rules keep the length and the first/last character checks but
/// also admit uppercase letters, underscores and colons. Either way a name
/// can never contain `/`, which separates buckets from objects in the key
/// space.
///
/// # Examples
///
/// ```
/// use kinstack_store::validation::validate_bucket_name;
///
/// assert!(validate_bucket_name("my-valid-bucket", true).is_ok());
/// assert!(validate_bucket_name("AB", true).is_err());
/// assert!(validate_bucket_name("Legacy_Bucket", false).is_ok());
/// ```
pub fn validate_bucket_name(name: &str, strict: bool) -> StoreResult<()> {
    let len = name.len();

    if !(MIN_BUCKET_NAME_LEN..=MAX_BUCKET_NAME_LEN).contains(&len) {
        return Err(invalid_bucket(
            name,
            format!(
                "Bucket name must be between {MIN_BUCKET_NAME_LEN} and {MAX_BUCKET_NAME_LEN} characters long"
            ),
        ));
    }

    let allowed = |b: u8| {
        if strict {
            b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'.'
        } else {
            b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b':')
        }
    };
    if !name.bytes().all(allowed) {
        return Err(invalid_bucket(
            name,
            if strict {
                "Bucket name must only contain lowercase letters, numbers, hyphens, and dots"
            } else {
                "Bucket name must only contain letters, numbers, hyphens, dots, underscores, and colons"
            },
        ));
    }

    let first = name.as_bytes()[0];
    let last = name.as_bytes()[len - 1];
    if !first.is_ascii_alphanumeric() || !last.is_ascii_alphanumeric() {
        return Err(invalid_bucket(
            name,
            "Bucket name must start and end with a letter or number",
        ));
    }

    if name.contains("..") {
        return Err(invalid_bucket(
            name,
            "Bucket name must not contain consecutive dots",
        ));
    }

    if name.parse::<Ipv4Addr>().is_ok() {
        return Err(invalid_bucket(
            name,
            "Bucket name must not be formatted as an IP address",
        ));
    }

    if strict {
        if name.starts_with("xn--") {
            return Err(invalid_bucket(name, "Bucket name must not start with 'xn--'"));
        }
        if name.ends_with("-s3alias") {
            return Err(invalid_bucket(
                name,
                "Bucket name must not end with '-s3alias'",
            ));
        }
        if name.starts_with("sthree-") {
            return Err(invalid_bucket(
                name,
                "Bucket name must not start with 'sthree-'",
            ));
        }
    }

    Ok(())
}

/// Validate an object name.
///
/// Rules:
/// - 1-1024 bytes in length
/// - No leading `/` and no empty path segment (`//`)
/// - Must not end with the reserved upload-record suffix `.fs.json`
///
/// # Examples
///
/// ```
/// use kinstack_store::validation::validate_object_name;
///
/// assert!(validate_object_name("photos", "2024/image.jpg").is_ok());
/// assert!(validate_object_name("photos", "").is_err());
/// assert!(validate_object_name("photos", "state.fs.json").is_err());
/// ```
pub fn validate_object_name(bucket: &str, object: &str) -> StoreResult<()> {
    if object.is_empty() {
        return Err(invalid_object(bucket, object, "Object name must not be empty"));
    }

    if object.len() > MAX_OBJECT_NAME_BYTES {
        return Err(invalid_object(
            bucket,
            object,
            format!(
                "Object name must not exceed {MAX_OBJECT_NAME_BYTES} bytes, got {}",
                object.len()
            ),
        ));
    }

    if object.starts_with('/') || object.contains("//") {
        return Err(invalid_object(
            bucket,
            object,
            "Object name must not contain empty path segments",
        ));
    }

    if object.ends_with(UPLOAD_SUFFIX) {
        return Err(invalid_object(
            bucket,
            object,
            format!("Object name must not end with '{UPLOAD_SUFFIX}'"),
        ));
    }

    Ok(())
}

/// Validate an object name prefix used for listing.
///
/// Prefixes may be empty and may end with `/`, but share the length limit.
pub fn validate_prefix(bucket: &str, prefix: &str) -> StoreResult<()> {
    if prefix.len() > MAX_OBJECT_NAME_BYTES {
        return Err(invalid_object(
            bucket,
            prefix,
            format!("Prefix must not exceed {MAX_OBJECT_NAME_BYTES} bytes"),
        ));
    }
    Ok(())
}

/// Validate a part number against the configured maximum.
///
/// # Examples
///
/// ```
/// use kinstack_store::validation::validate_part_number;
///
/// assert!(validate_part_number(1, 10_000).is_ok());
/// assert!(validate_part_number(0, 10_000).is_err());
/// ```
pub fn validate_part_number(part_number: u32, max: u32) -> StoreResult<()> {
    if part_number == 0 || part_number > max {
        return Err(StoreError::InvalidArgument(format!(
            "Part number must be an integer between 1 and {max}, got {part_number}"
        )));
    }
    Ok(())
}

/// Validate user-defined metadata.
///
/// The total size of all keys plus all values must not exceed 2 KB.
pub fn validate_metadata(metadata: &BTreeMap<String, String>) -> StoreResult<()> {
    let total_size: usize = metadata.iter().map(|(k, v)| k.len() + v.len()).sum();

    if total_size > MAX_METADATA_SIZE {
        return Err(StoreError::InvalidArgument(format!(
            "User-defined metadata must not exceed {MAX_METADATA_SIZE} bytes, got {total_size}"
        )));
    }

    Ok(())
}

/// Validate a base64 `Content-MD5` value against the payload.
///
/// An absent value always passes.
///
/// # Examples
///
/// ```
/// use kinstack_store::validation::validate_content_md5;
///
/// assert!(validate_content_md5(None, b"hello").is_ok());
/// assert!(validate_content_md5(Some("XUFAKrxLKna5cZ2REBfFkg=="), b"hello").is_ok());
/// ```
pub fn validate_content_md5(content_md5: Option<&str>, body: &[u8]) -> StoreResult<()> {
    let Some(expected_b64) = content_md5 else {
        return Ok(());
    };

    let expected = base64::engine::general_purpose::STANDARD
        .decode(expected_b64)
        .map_err(|_| StoreError::InvalidArgument("Content-MD5 is not valid base64".to_owned()))?;

    if expected.len() != 16 {
        return Err(StoreError::InvalidArgument(
            "Content-MD5 must be a 128-bit digest".to_owned(),
        ));
    }

    if Md5::digest(body).as_slice() != expected.as_slice() {
        return Err(StoreError::BadDigest);
    }

    Ok(())
}
