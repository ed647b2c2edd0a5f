//! Bucket operation handlers.
//!
//! Implements `make_bucket`, `get_bucket_info`, `list_buckets` and
//! `delete_bucket`, plus the store-wide `storage_info` and `shutdown`.

use bytes::Bytes;
use chrono::Utc;
use kinstack_client::{DeviceError, KvDevice};
use kinstack_proto::LogType;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::keys;
use crate::meta::BucketRecord;
use crate::store::{
    KeyScan, KvObjectStore, delete_key, key_exists, read_record, write_record, write_value,
};
use crate::types::{BucketInfo, StorageInfo};

impl<D: KvDevice + 'static> KvObjectStore<D> {
    /// Create a bucket.
    ///
    /// The existence check and the writes are not atomic: two concurrent
    /// creators of the same name may both succeed.
    pub(crate) async fn handle_make_bucket(&self, bucket: &str) -> StoreResult<()> {
        self.validate_bucket(bucket)?;
        let mut device = self.device().await?;

        let data_key = keys::bucket_key(bucket);
        let meta_key = keys::meta_key(&data_key);
        if key_exists(&mut *device, &meta_key).await? {
            return Err(StoreError::BucketExists {
                bucket: bucket.to_owned(),
            });
        }

        let record = BucketRecord {
            name: bucket.to_owned(),
            created: Utc::now(),
        };
        write_value(&mut *device, &data_key, Bytes::new()).await?;
        write_record(&mut *device, &meta_key, &record).await?;

        info!(bucket = %bucket, "bucket created");
        Ok(())
    }

    /// Describe a bucket.
    pub(crate) async fn handle_get_bucket_info(&self, bucket: &str) -> StoreResult<BucketInfo> {
        self.validate_bucket(bucket)?;
        let mut device = self.device().await?;
        let meta_key = keys::meta_key(&keys::bucket_key(bucket));
        let record: BucketRecord = read_record(&mut *device, &meta_key)
            .await?
            .ok_or_else(|| StoreError::bucket_not_found(bucket))?;
        Ok(record.into())
    }

    /// List all buckets in name order.
    pub(crate) async fn handle_list_buckets(&self) -> StoreResult<Vec<BucketInfo>> {
        let mut device = self.device().await?;
        let mut scan = self.scan(keys::bucket_scan());
        let mut buckets = Vec::new();

        while let Some(page) = scan.next_page(&mut *device).await? {
            for key in page {
                // objects of a bucket named `bucket.<x>` share the range
                match keys::bucket_name_from_meta_key(&key) {
                    Some(name) if !name.contains(keys::SEPARATOR) => {}
                    _ => continue,
                }
                // deleted between the scan and the read
                if let Some(record) = read_record::<BucketRecord, _>(&mut *device, &key).await? {
                    buckets.push(BucketInfo::from(record));
                }
            }
        }

        debug!(count = buckets.len(), "list_buckets completed");
        Ok(buckets)
    }

    /// Delete an empty bucket.
    ///
    /// Any data key under the bucket (objects, parts, upload records) keeps
    /// it from being deleted.
    pub(crate) async fn handle_delete_bucket(&self, bucket: &str) -> StoreResult<()> {
        let mut device = self.device().await?;
        self.ensure_bucket(&mut device, bucket).await?;

        let mut probe = KeyScan::new(keys::bucket_data_scan(bucket, ""), 1);
        if probe.next_page(&mut *device).await?.is_some() {
            return Err(StoreError::BucketNotEmpty {
                bucket: bucket.to_owned(),
            });
        }

        let data_key = keys::bucket_key(bucket);
        delete_key(&mut *device, &keys::meta_key(&data_key)).await?;
        delete_key(&mut *device, &data_key).await?;

        info!(bucket = %bucket, "bucket deleted");
        Ok(())
    }

    /// Device capacity and pool occupancy.
    ///
    /// Devices without a log (the fast path) report no capacity figures.
    pub(crate) async fn handle_storage_info(&self) -> StoreResult<StorageInfo> {
        let stats = self.pool.stats();
        let mut info = StorageInfo {
            total: None,
            used: None,
            connections: stats.capacity,
            in_use: stats.in_use,
        };

        let mut device = self.device().await?;
        match device.get_log(&[LogType::Capacities]).await {
            Ok(log) => {
                if let Some(capacity) = log.capacity {
                    info.total = capacity.nominal_capacity_in_bytes;
                    if let (Some(total), Some(full)) =
                        (capacity.nominal_capacity_in_bytes, capacity.portion_full)
                    {
                        #[allow(
                            clippy::cast_precision_loss,
                            clippy::cast_possible_truncation,
                            clippy::cast_sign_loss
                        )]
                        let used = (total as f64 * f64::from(full)).round() as u64;
                        info.used = Some(used.min(total));
                    }
                }
            }
            Err(DeviceError::Unsupported(_)) => {}
            Err(e) => return Err(e.into()),
        }

        debug!(total = ?info.total, used = ?info.used, "storage_info completed");
        Ok(info)
    }

    /// Close every pooled connection.
    pub(crate) async fn handle_shutdown(&self) -> StoreResult<()> {
        self.pool.close().await;
        info!("object store shut down");
        Ok(())
    }
}
