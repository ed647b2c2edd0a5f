//! Object store over pooled key-value devices.
//!
//! [`KvObjectStore`] owns an injected [`ConnectionPool`] and the store
//! configuration. Each operation takes one device from the pool for its whole
//! duration, so the calls it makes are strictly sequential. The operations
//! themselves live in the `ops` submodules and are wired together in
//! the `impl ObjectLayer for KvObjectStore` block below.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use kinstack_client::{CmdOpts, ConnectionPool, KeyRange, KvDevice, PooledDevice};
use kinstack_proto::Synchronization;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::keys::{self, ScanBounds};
use crate::layer::ObjectLayer;
use crate::meta::{self, BucketRecord};
use crate::types::{
    BucketInfo, ByteRange, CompletePart, GetObjectOutput, ListMultipartsInfo, ListObjectsInfo,
    ListObjectsV2Info, ListPartsInfo, ObjectInfo, PartInfo, PutObjectOptions, StorageInfo,
};
use crate::validation::validate_bucket_name;

/// S3-style object store mapping buckets, objects and multipart uploads onto
/// a flat device key space.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use bytes::Bytes;
/// use kinstack_client::{ConnectionPool, FastPathClient, MemoryDevice};
/// use kinstack_store::{KvObjectStore, ObjectLayer, PutObjectOptions, StoreConfig};
///
/// tokio_test::block_on(async {
///     let device = Arc::new(MemoryDevice::new());
///     let pool = ConnectionPool::new(vec![FastPathClient::new(device, 1, 1 << 20)]);
///     let store = KvObjectStore::new(pool, StoreConfig::default());
///
///     store.make_bucket("photos").await.unwrap();
///     let opts = PutObjectOptions::default();
///     store
///         .put_object("photos", "cat.jpg", Bytes::from_static(b"meow"), &opts)
///         .await
///         .unwrap();
///     let out = store.get_object("photos", "cat.jpg", None).await.unwrap();
///     assert_eq!(&out.data[..], b"meow");
///     assert_eq!(out.info.content_type, "image/jpeg");
/// });
/// ```
#[derive(Debug)]
pub struct KvObjectStore<D: KvDevice> {
    /// Device connections.
    pub(crate) pool: ConnectionPool<D>,
    /// Store configuration.
    pub(crate) config: Arc<StoreConfig>,
}

impl<D: KvDevice> Clone for KvObjectStore<D> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

impl<D: KvDevice + 'static> KvObjectStore<D> {
    /// Create a store over `pool`.
    #[must_use]
    pub fn new(pool: ConnectionPool<D>, config: StoreConfig) -> Self {
        Self {
            pool,
            config: Arc::new(config),
        }
    }

    /// Returns a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &ConnectionPool<D> {
        &self.pool
    }

    /// Returns a reference to the store configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Take a device from the pool for one operation.
    pub(crate) async fn device(&self) -> StoreResult<PooledDevice<D>> {
        let device = self.pool.acquire().await?;
        trace!(slot = device.slot(), "device acquired");
        Ok(device)
    }

    /// Check the bucket name against the configured rules.
    pub(crate) fn validate_bucket(&self, bucket: &str) -> StoreResult<()> {
        validate_bucket_name(bucket, self.config.strict_bucket_names)
    }

    /// Fail unless `bucket` has a valid name and exists.
    pub(crate) async fn ensure_bucket(&self, device: &mut D, bucket: &str) -> StoreResult<()> {
        self.validate_bucket(bucket)?;
        let key = keys::meta_key(&keys::bucket_key(bucket));
        if read_record::<BucketRecord, _>(device, &key).await?.is_none() {
            return Err(StoreError::bucket_not_found(bucket));
        }
        Ok(())
    }

    /// A paginated scan over `bounds` using the configured batch size.
    pub(crate) fn scan(&self, bounds: ScanBounds) -> KeyScan {
        KeyScan::new(bounds, self.config.key_range_max)
    }
}

// ---------------------------------------------------------------------------
// Key-level helpers
// ---------------------------------------------------------------------------

/// Options for every store write: data and metadata must reach the media in
/// the order they are issued.
pub(crate) fn write_opts() -> CmdOpts {
    CmdOpts::builder()
        .synchronization(Synchronization::WriteThrough)
        .build()
}

/// Read the raw value at `key`; `None` when absent.
pub(crate) async fn read_value<K>(device: &mut K, key: &[u8]) -> StoreResult<Option<Bytes>>
where
    K: KvDevice + ?Sized,
{
    match device.get(key, &CmdOpts::default()).await {
        Ok(record) => Ok(Some(record.value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Read and decode the record at `key`; `None` when absent.
pub(crate) async fn read_record<T, K>(device: &mut K, key: &[u8]) -> StoreResult<Option<T>>
where
    T: DeserializeOwned,
    K: KvDevice + ?Sized,
{
    match read_value(device, key).await? {
        Some(value) => Ok(Some(meta::decode(key, &value)?)),
        None => Ok(None),
    }
}

/// Store `value` at `key`.
pub(crate) async fn write_value<K>(device: &mut K, key: &[u8], value: Bytes) -> StoreResult<()>
where
    K: KvDevice + ?Sized,
{
    device.put(key, value, &write_opts()).await?;
    Ok(())
}

/// Encode and store `record` at `key`.
pub(crate) async fn write_record<T, K>(device: &mut K, key: &[u8], record: &T) -> StoreResult<()>
where
    T: Serialize + Sync,
    K: KvDevice + ?Sized,
{
    write_value(device, key, meta::encode(record)?).await
}

/// Whether `key` is stored.
pub(crate) async fn key_exists<K>(device: &mut K, key: &[u8]) -> StoreResult<bool>
where
    K: KvDevice + ?Sized,
{
    match device.get_version(key, &CmdOpts::default()).await {
        Ok(_) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Remove `key`; returns whether it was present.
pub(crate) async fn delete_key<K>(device: &mut K, key: &[u8]) -> StoreResult<bool>
where
    K: KvDevice + ?Sized,
{
    match device.delete(key, &write_opts()).await {
        Ok(()) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e.into()),
    }
}

// ---------------------------------------------------------------------------
// Paginated key scans
// ---------------------------------------------------------------------------

/// Walks a key range in pages of at most `batch` keys.
///
/// Each page resumes strictly after the last key of the previous one, so the
/// range is covered once even though the device caps every response.
#[derive(Debug, Clone)]
pub(crate) struct KeyScan {
    next: Bytes,
    inclusive: bool,
    end: Bytes,
    batch: u32,
    done: bool,
}

impl KeyScan {
    pub(crate) fn new(bounds: ScanBounds, batch: u32) -> Self {
        Self {
            next: bounds.start,
            inclusive: true,
            end: bounds.end,
            batch: batch.max(1),
            done: false,
        }
    }

    /// Skip every key up to and including `key`.
    pub(crate) fn start_after(&mut self, key: Bytes) {
        if key >= self.next {
            self.next = key;
            self.inclusive = false;
        }
    }

    /// Skip every key below `key`.
    pub(crate) fn skip_to(&mut self, key: Bytes) {
        if key > self.next {
            self.next = key;
            self.inclusive = true;
        }
    }

    /// Fetch the next page of keys, or `None` once the range is exhausted.
    pub(crate) async fn next_page<K>(&mut self, device: &mut K) -> StoreResult<Option<Vec<Bytes>>>
    where
        K: KvDevice + ?Sized,
    {
        if self.done || self.next >= self.end {
            return Ok(None);
        }
        let range = KeyRange {
            start: self.next.clone(),
            end: self.end.clone(),
            start_inclusive: self.inclusive,
            end_inclusive: false,
            max_returned: self.batch,
            reverse: false,
        };
        let keys = device.get_key_range(&range, &CmdOpts::default()).await?;
        if keys.len() < self.batch as usize {
            self.done = true;
        }
        let Some(last) = keys.last() else {
            self.done = true;
            return Ok(None);
        };
        self.next = last.clone();
        self.inclusive = false;
        Ok(Some(keys))
    }
}

// ---------------------------------------------------------------------------
// ObjectLayer
// ---------------------------------------------------------------------------

#[async_trait]
impl<D: KvDevice + 'static> ObjectLayer for KvObjectStore<D> {
    async fn make_bucket(&self, bucket: &str) -> StoreResult<()> {
        self.handle_make_bucket(bucket).await
    }

    async fn get_bucket_info(&self, bucket: &str) -> StoreResult<BucketInfo> {
        self.handle_get_bucket_info(bucket).await
    }

    async fn list_buckets(&self) -> StoreResult<Vec<BucketInfo>> {
        self.handle_list_buckets().await
    }

    async fn delete_bucket(&self, bucket: &str) -> StoreResult<()> {
        self.handle_delete_bucket(bucket).await
    }

    async fn put_object(
        &self,
        bucket: &str,
        object: &str,
        data: Bytes,
        opts: &PutObjectOptions,
    ) -> StoreResult<ObjectInfo> {
        self.handle_put_object(bucket, object, data, opts).await
    }

    async fn get_object(
        &self,
        bucket: &str,
        object: &str,
        range: Option<ByteRange>,
    ) -> StoreResult<GetObjectOutput> {
        self.handle_get_object(bucket, object, range).await
    }

    async fn get_object_info(&self, bucket: &str, object: &str) -> StoreResult<ObjectInfo> {
        self.handle_get_object_info(bucket, object).await
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_object: &str,
        dst_bucket: &str,
        dst_object: &str,
        opts: Option<&PutObjectOptions>,
    ) -> StoreResult<ObjectInfo> {
        self.handle_copy_object(src_bucket, src_object, dst_bucket, dst_object, opts)
            .await
    }

    async fn delete_object(&self, bucket: &str, object: &str) -> StoreResult<()> {
        self.handle_delete_object(bucket, object).await
    }

    async fn delete_objects(&self, bucket: &str, objects: &[String]) -> Vec<StoreResult<()>> {
        self.handle_delete_objects(bucket, objects).await
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        marker: &str,
        delimiter: &str,
        max_keys: usize,
    ) -> StoreResult<ListObjectsInfo> {
        self.handle_list_objects(bucket, prefix, marker, delimiter, max_keys)
            .await
    }

    async fn list_objects_v2(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<&str>,
        delimiter: &str,
        max_keys: usize,
        start_after: &str,
    ) -> StoreResult<ListObjectsV2Info> {
        self.handle_list_objects_v2(
            bucket,
            prefix,
            continuation_token,
            delimiter,
            max_keys,
            start_after,
        )
        .await
    }

    async fn new_multipart_upload(
        &self,
        bucket: &str,
        object: &str,
        opts: &PutObjectOptions,
    ) -> StoreResult<String> {
        self.handle_new_multipart_upload(bucket, object, opts).await
    }

    async fn put_object_part(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> StoreResult<PartInfo> {
        self.handle_put_object_part(bucket, object, upload_id, part_number, data)
            .await
    }

    async fn list_object_parts(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_number_marker: u32,
        max_parts: usize,
    ) -> StoreResult<ListPartsInfo> {
        self.handle_list_object_parts(bucket, object, upload_id, part_number_marker, max_parts)
            .await
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        parts: &[CompletePart],
    ) -> StoreResult<ObjectInfo> {
        self.handle_complete_multipart_upload(bucket, object, upload_id, parts)
            .await
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
    ) -> StoreResult<()> {
        self.handle_abort_multipart_upload(bucket, object, upload_id)
            .await
    }

    async fn list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: &str,
        key_marker: &str,
        delimiter: &str,
        max_uploads: usize,
    ) -> StoreResult<ListMultipartsInfo> {
        self.handle_list_multipart_uploads(bucket, prefix, key_marker, delimiter, max_uploads)
            .await
    }

    async fn storage_info(&self) -> StoreResult<StorageInfo> {
        self.handle_storage_info().await
    }

    async fn shutdown(&self) -> StoreResult<()> {
        self.handle_shutdown().await
    }
}
