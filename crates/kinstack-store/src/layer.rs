//! The storage contract consumed by the HTTP layer.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StoreResult;
use crate::types::{
    BucketInfo, ByteRange, CompletePart, GetObjectOutput, ListMultipartsInfo, ListObjectsInfo,
    ListObjectsV2Info, ListPartsInfo, ObjectInfo, PartInfo, PutObjectOptions, StorageInfo,
};

/// Generic object storage.
///
/// Every call is independent: implementations may serve them concurrently
/// and keep no per-caller state between calls.
#[async_trait]
pub trait ObjectLayer: Send + Sync + std::fmt::Debug {
    // -----------------------------------------------------------------------
    // Buckets
    // -----------------------------------------------------------------------

    /// Create `bucket`; fails if it already exists.
    async fn make_bucket(&self, bucket: &str) -> StoreResult<()>;

    /// Describe `bucket`.
    async fn get_bucket_info(&self, bucket: &str) -> StoreResult<BucketInfo>;

    /// All buckets in name order.
    async fn list_buckets(&self) -> StoreResult<Vec<BucketInfo>>;

    /// Remove an empty `bucket`.
    async fn delete_bucket(&self, bucket: &str) -> StoreResult<()>;

    // -----------------------------------------------------------------------
    // Objects
    // -----------------------------------------------------------------------

    /// Store `data` as `bucket/object`, replacing any previous object.
    async fn put_object(
        &self,
        bucket: &str,
        object: &str,
        data: Bytes,
        opts: &PutObjectOptions,
    ) -> StoreResult<ObjectInfo>;

    /// Read `bucket/object`, or the part of it selected by `range`.
    async fn get_object(
        &self,
        bucket: &str,
        object: &str,
        range: Option<ByteRange>,
    ) -> StoreResult<GetObjectOutput>;

    /// Describe `bucket/object` without reading its data.
    async fn get_object_info(&self, bucket: &str, object: &str) -> StoreResult<ObjectInfo>;

    /// Copy an object, optionally replacing its metadata.
    async fn copy_object(
        &self,
        src_bucket: &str,
        src_object: &str,
        dst_bucket: &str,
        dst_object: &str,
        opts: Option<&PutObjectOptions>,
    ) -> StoreResult<ObjectInfo>;

    /// Remove `bucket/object`; removing an absent object succeeds.
    async fn delete_object(&self, bucket: &str, object: &str) -> StoreResult<()>;

    /// Remove several objects, reporting one outcome per name.
    async fn delete_objects(&self, bucket: &str, objects: &[String]) -> Vec<StoreResult<()>>;

    /// List objects by `prefix`, grouping names at `delimiter`.
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        marker: &str,
        delimiter: &str,
        max_keys: usize,
    ) -> StoreResult<ListObjectsInfo>;

    /// List objects with continuation tokens.
    async fn list_objects_v2(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<&str>,
        delimiter: &str,
        max_keys: usize,
        start_after: &str,
    ) -> StoreResult<ListObjectsV2Info>;

    // -----------------------------------------------------------------------
    // Multipart uploads
    // -----------------------------------------------------------------------

    /// Start an upload for `bucket/object` and return its id.
    async fn new_multipart_upload(
        &self,
        bucket: &str,
        object: &str,
        opts: &PutObjectOptions,
    ) -> StoreResult<String>;

    /// Upload part `part_number`; re-uploading a number replaces it.
    async fn put_object_part(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> StoreResult<PartInfo>;

    /// Parts uploaded so far, newest copy per part number.
    async fn list_object_parts(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_number_marker: u32,
        max_parts: usize,
    ) -> StoreResult<ListPartsInfo>;

    /// Assemble the declared parts into `bucket/object`.
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        parts: &[CompletePart],
    ) -> StoreResult<ObjectInfo>;

    /// Discard an upload and every part uploaded for it.
    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
    ) -> StoreResult<()>;

    /// In-progress uploads in `bucket` whose object names start with `prefix`.
    async fn list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: &str,
        key_marker: &str,
        delimiter: &str,
        max_uploads: usize,
    ) -> StoreResult<ListMultipartsInfo>;

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Capacity figures of the backing device.
    async fn storage_info(&self) -> StoreResult<StorageInfo>;

    /// Release every device connection; later calls fail.
    async fn shutdown(&self) -> StoreResult<()>;
}
