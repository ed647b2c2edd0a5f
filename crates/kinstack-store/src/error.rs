//! Object store error types.
//!
//! [`StoreError`] is the only error the object layer returns. Store-semantic
//! failures (bad names, unknown uploads, invalid parts, unsatisfiable ranges)
//! are raised before or instead of device calls; device failures are carried
//! through unchanged so the caller can tell a device status from a broken
//! connection.
//!
//! # Usage
//!
//! ```
//! use kinstack_client::DeviceError;
//! use kinstack_proto::StatusCode;
//! use kinstack_store::error::StoreError;
//!
//! let err: StoreError = DeviceError::status(StatusCode::NoSpace, "full").into();
//! assert_eq!(err.device_status(), Some(StatusCode::NoSpace));
//! ```

use kinstack_client::DeviceError;
use kinstack_proto::StatusCode;

/// Object store error type.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    // -----------------------------------------------------------------------
    // Bucket errors
    // -----------------------------------------------------------------------
    /// The bucket name is not acceptable.
    #[error("Bucket name '{bucket}' is invalid: {reason}")]
    BucketNameInvalid {
        /// The rejected name.
        bucket: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The bucket does not exist.
    #[error("Bucket not found: {bucket}")]
    BucketNotFound {
        /// The bucket name.
        bucket: String,
    },

    /// A bucket with that name already exists.
    #[error("Bucket already exists: {bucket}")]
    BucketExists {
        /// The bucket name.
        bucket: String,
    },

    /// The bucket still holds objects or uploads.
    #[error("Bucket is not empty: {bucket}")]
    BucketNotEmpty {
        /// The bucket name.
        bucket: String,
    },

    // -----------------------------------------------------------------------
    // Object errors
    // -----------------------------------------------------------------------
    /// The object name is not acceptable.
    #[error("Object name '{bucket}/{object}' is invalid: {reason}")]
    ObjectNameInvalid {
        /// The bucket name.
        bucket: String,
        /// The rejected object name.
        object: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The object does not exist, or its metadata was never written.
    #[error("Object not found: {bucket}/{object}")]
    ObjectNotFound {
        /// The bucket name.
        bucket: String,
        /// The object name.
        object: String,
    },

    /// The payload exceeds what a single device value can hold.
    #[error("Entity of {size} bytes exceeds the maximum of {max}")]
    EntityTooLarge {
        /// Payload size.
        size: u64,
        /// Allowed maximum.
        max: u64,
    },

    /// The requested byte range cannot be satisfied.
    #[error("Range offset {offset} length {length} is outside an object of {size} bytes")]
    InvalidRange {
        /// Requested start.
        offset: u64,
        /// Requested length.
        length: u64,
        /// Actual object size.
        size: u64,
    },

    /// The supplied Content-MD5 did not match the payload.
    #[error("The Content-MD5 you specified did not match what we received")]
    BadDigest,

    // -----------------------------------------------------------------------
    // Multipart errors
    // -----------------------------------------------------------------------
    /// No upload with that id is in progress for the object.
    #[error("Upload {upload_id} not found for {bucket}/{object}")]
    InvalidUploadId {
        /// The bucket name.
        bucket: String,
        /// The object name.
        object: String,
        /// The unknown upload id.
        upload_id: String,
    },

    /// A declared part was never uploaded or its etag does not match.
    #[error("Part {part_number} with etag {etag} could not be found")]
    InvalidPart {
        /// Declared part number.
        part_number: u32,
        /// Declared etag.
        etag: String,
    },

    /// Declared parts are not ascending from 1 without gaps.
    #[error("Parts must be listed in ascending order starting at 1 without gaps")]
    InvalidPartOrder,

    /// A part other than the last is below the minimum part size.
    #[error("Part {part_number} is {size} bytes, smaller than the minimum of {min}")]
    PartTooSmall {
        /// Part number.
        part_number: u32,
        /// Actual size.
        size: u64,
        /// Minimum allowed size.
        min: u64,
    },

    // -----------------------------------------------------------------------
    // Generic errors
    // -----------------------------------------------------------------------
    /// An argument was rejected before any device call.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The device answered with a non-success status.
    #[error("Device status {code}: {message}")]
    Device {
        /// Device status code.
        code: StatusCode,
        /// Device status message.
        message: String,
    },

    /// The device could not be reached or the connection broke.
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Catch-all for unexpected failures.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl StoreError {
    /// Convenience constructor for [`StoreError::BucketNotFound`].
    #[must_use]
    pub fn bucket_not_found(bucket: &str) -> Self {
        Self::BucketNotFound {
            bucket: bucket.to_owned(),
        }
    }

    /// Convenience constructor for [`StoreError::ObjectNotFound`].
    #[must_use]
    pub fn object_not_found(bucket: &str, object: &str) -> Self {
        Self::ObjectNotFound {
            bucket: bucket.to_owned(),
            object: object.to_owned(),
        }
    }

    /// Convenience constructor for [`StoreError::InvalidUploadId`].
    #[must_use]
    pub fn invalid_upload_id(bucket: &str, object: &str, upload_id: &str) -> Self {
        Self::InvalidUploadId {
            bucket: bucket.to_owned(),
            object: object.to_owned(),
            upload_id: upload_id.to_owned(),
        }
    }

    /// The device status code, when the device rejected the call.
    #[must_use]
    pub fn device_status(&self) -> Option<StatusCode> {
        match self {
            Self::Device { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether the error reports a missing bucket, object or upload.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::BucketNotFound { .. } | Self::ObjectNotFound { .. } | Self::InvalidUploadId { .. }
        )
    }
}

impl From<DeviceError> for StoreError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::Status { code, message } => Self::Device { code, message },
            DeviceError::InvalidArgument(msg) => Self::InvalidArgument(msg),
            DeviceError::Internal(e) => Self::Internal(e),
            other => Self::DeviceUnavailable(other.to_string()),
        }
    }
}

/// Convenience alias for store results.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_carry_device_status_unchanged() {
        let err = StoreError::from(DeviceError::status(StatusCode::VersionMismatch, "stale"));
        assert_eq!(err.device_status(), Some(StatusCode::VersionMismatch));
        assert!(matches!(err, StoreError::Device { ref message, .. } if message == "stale"));
    }

    #[test]
    fn test_should_map_stream_errors_to_unavailable() {
        let err = StoreError::from(DeviceError::ConnectionClosed);
        assert!(matches!(err, StoreError::DeviceUnavailable(_)));
        assert_eq!(err.device_status(), None);

        let err = StoreError::from(DeviceError::PoolClosed);
        assert!(matches!(err, StoreError::DeviceUnavailable(_)));
    }

    #[test]
    fn test_should_keep_caller_errors_distinct() {
        let err = StoreError::from(DeviceError::InvalidArgument("key is empty".into()));
        assert!(matches!(err, StoreError::InvalidArgument(ref m) if m == "key is empty"));
    }

    #[test]
    fn test_should_classify_not_found_variants() {
        assert!(StoreError::bucket_not_found("b").is_not_found());
        assert!(StoreError::object_not_found("b", "o").is_not_found());
        assert!(StoreError::invalid_upload_id("b", "o", "u").is_not_found());
        assert!(!StoreError::BadDigest.is_not_found());
    }

    #[test]
    fn test_should_format_messages_with_context() {
        let err = StoreError::InvalidPart {
            part_number: 3,
            etag: "abc".into(),
        };
        assert_eq!(err.to_string(), "Part 3 with etag abc could not be found");
        let err = StoreError::object_not_found("photos", "cat.jpg");
        assert_eq!(err.to_string(), "Object not found: photos/cat.jpg");
    }
}
