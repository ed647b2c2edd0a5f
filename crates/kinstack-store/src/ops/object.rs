//! Object operation handlers.
//!
//! Implements `put_object`, `get_object`, `get_object_info`, `copy_object`,
//! `delete_object` and `delete_objects`.
//!
//! Writers store the data key before the metadata key, and readers treat a
//! missing metadata key as a missing object, so a write interrupted between
//! the two leaves nothing visible.

use std::collections::HashSet;

use anyhow::anyhow;
use bytes::{Bytes, BytesMut};
use futures::future::join_all;
use kinstack_client::KvDevice;
use tracing::debug;

use crate::checksums::compute_md5;
use crate::error::{StoreError, StoreResult};
use crate::keys;
use crate::meta::{ObjectRecord, RecordKind};
use crate::store::{KvObjectStore, delete_key, read_record, read_value, write_record, write_value};
use crate::types::{ByteRange, GetObjectOutput, ObjectInfo, PutObjectOptions};
use crate::utils::guess_content_type;
use crate::validation::{validate_content_md5, validate_metadata, validate_object_name};

/// `length` bytes of `value` starting at `offset`.
fn slice_value(key: &[u8], value: &Bytes, offset: u64, length: u64) -> StoreResult<Bytes> {
    let start = usize::try_from(offset).map_err(|e| anyhow!(e))?;
    let len = usize::try_from(length).map_err(|e| anyhow!(e))?;
    let end = start
        .checked_add(len)
        .filter(|end| *end <= value.len())
        .ok_or_else(|| {
            anyhow!(
                "value at {} is {} bytes, shorter than its metadata claims",
                String::from_utf8_lossy(key),
                value.len()
            )
        })?;
    Ok(value.slice(start..end))
}

impl<D: KvDevice + 'static> KvObjectStore<D> {
    /// Store a single-shot object.
    pub(crate) async fn handle_put_object(
        &self,
        bucket: &str,
        object: &str,
        data: Bytes,
        opts: &PutObjectOptions,
    ) -> StoreResult<ObjectInfo> {
        validate_object_name(bucket, object)?;
        validate_metadata(&opts.user_metadata)?;
        validate_content_md5(opts.content_md5.as_deref(), &data)?;
        let size = data.len() as u64;
        if size > self.config.max_object_size {
            return Err(StoreError::EntityTooLarge {
                size,
                max: self.config.max_object_size,
            });
        }

        let mut device = self.device().await?;
        self.ensure_bucket(&mut device, bucket).await?;

        let etag = compute_md5(&data);
        let content_type = opts
            .content_type
            .clone()
            .unwrap_or_else(|| guess_content_type(object));
        let record = ObjectRecord::new(
            RecordKind::Object,
            &etag,
            size,
            &content_type,
            &opts.user_metadata,
        );

        let data_key = keys::object_key(bucket, object);
        let meta_key = keys::meta_key(&data_key);
        let previous: Option<ObjectRecord> = read_record(&mut *device, &meta_key).await?;

        write_value(&mut *device, &data_key, data).await?;
        write_record(&mut *device, &meta_key, &record).await?;

        if let Some(previous) = previous.filter(|p| p.kind == RecordKind::Object) {
            self.discard_object_parts(&mut device, bucket, object, &previous.parts, &HashSet::new())
                .await?;
        }

        debug!(bucket = %bucket, object = %object, size, etag = %etag, "put_object completed");
        Ok(ObjectInfo::from_record(bucket, object, &record))
    }

    /// Read the metadata record of a visible object.
    pub(crate) async fn load_object(
        &self,
        device: &mut D,
        bucket: &str,
        object: &str,
    ) -> StoreResult<ObjectRecord> {
        let meta_key = keys::meta_key(&keys::object_key(bucket, object));
        match read_record::<ObjectRecord, _>(device, &meta_key).await? {
            Some(record) if record.kind == RecordKind::Object => Ok(record),
            _ => Err(StoreError::object_not_found(bucket, object)),
        }
    }

    /// Read `length` bytes from `offset` of an object's content.
    async fn read_object_data(
        &self,
        device: &mut D,
        bucket: &str,
        object: &str,
        record: &ObjectRecord,
        offset: u64,
        length: u64,
    ) -> StoreResult<Bytes> {
        if length == 0 {
            return Ok(Bytes::new());
        }

        if !record.is_multipart() {
            let key = keys::object_key(bucket, object);
            let value = read_value(device, &key)
                .await?
                .ok_or_else(|| StoreError::object_not_found(bucket, object))?;
            return slice_value(&key, &value, offset, length);
        }

        let end = offset + length;
        let mut out = BytesMut::with_capacity(usize::try_from(length).map_err(|e| anyhow!(e))?);
        let mut part_start = 0u64;
        for part in &record.parts {
            let part_end = part_start + part.size;
            if part_end > offset && part_start < end {
                let key = part.key().data_key(bucket, object);
                let value = read_value(device, &key)
                    .await?
                    .ok_or_else(|| StoreError::object_not_found(bucket, object))?;
                let from = offset.saturating_sub(part_start);
                let to = end.min(part_end) - part_start;
                out.extend_from_slice(&slice_value(&key, &value, from, to - from)?);
            }
            if part_end >= end {
                break;
            }
            part_start = part_end;
        }
        Ok(out.freeze())
    }

    /// Read an object, or the part of it selected by `range`.
    pub(crate) async fn handle_get_object(
        &self,
        bucket: &str,
        object: &str,
        range: Option<ByteRange>,
    ) -> StoreResult<GetObjectOutput> {
        validate_object_name(bucket, object)?;
        let mut device = self.device().await?;
        self.ensure_bucket(&mut device, bucket).await?;

        let record = self.load_object(&mut device, bucket, object).await?;
        let size = record.size();
        let (offset, length) = match range {
            Some(range) => range.resolve(size)?,
            None => (0, size),
        };
        let data = self
            .read_object_data(&mut device, bucket, object, &record, offset, length)
            .await?;

        debug!(bucket = %bucket, object = %object, offset, length, "get_object completed");
        Ok(GetObjectOutput {
            info: ObjectInfo::from_record(bucket, object, &record),
            data,
            offset,
        })
    }

    /// Describe an object.
    pub(crate) async fn handle_get_object_info(
        &self,
        bucket: &str,
        object: &str,
    ) -> StoreResult<ObjectInfo> {
        validate_object_name(bucket, object)?;
        let mut device = self.device().await?;
        self.ensure_bucket(&mut device, bucket).await?;
        let record = self.load_object(&mut device, bucket, object).await?;
        Ok(ObjectInfo::from_record(bucket, object, &record))
    }

    /// Copy an object.
    ///
    /// Without `opts` the copy keeps the source content type and user
    /// metadata. Copying an object onto itself only rewrites its metadata,
    /// and requires `opts`.
    pub(crate) async fn handle_copy_object(
        &self,
        src_bucket: &str,
        src_object: &str,
        dst_bucket: &str,
        dst_object: &str,
        opts: Option<&PutObjectOptions>,
    ) -> StoreResult<ObjectInfo> {
        if src_bucket == dst_bucket && src_object == dst_object {
            let opts = opts.ok_or_else(|| {
                StoreError::InvalidArgument(
                    "Copying an object onto itself requires replacing its metadata".to_owned(),
                )
            })?;
            return self.replace_metadata(dst_bucket, dst_object, opts).await;
        }

        let source = self.handle_get_object(src_bucket, src_object, None).await?;
        let put_opts = match opts {
            Some(opts) => PutObjectOptions {
                content_md5: None,
                ..opts.clone()
            },
            None => PutObjectOptions {
                content_type: Some(source.info.content_type),
                user_metadata: source.info.user_defined,
                content_md5: None,
            },
        };
        let info = self
            .handle_put_object(dst_bucket, dst_object, source.data, &put_opts)
            .await?;

        debug!(
            src = %format!("{src_bucket}/{src_object}"),
            dst = %format!("{dst_bucket}/{dst_object}"),
            "copy_object completed"
        );
        Ok(info)
    }

    async fn replace_metadata(
        &self,
        bucket: &str,
        object: &str,
        opts: &PutObjectOptions,
    ) -> StoreResult<ObjectInfo> {
        validate_object_name(bucket, object)?;
        validate_metadata(&opts.user_metadata)?;
        let mut device = self.device().await?;
        self.ensure_bucket(&mut device, bucket).await?;

        let current = self.load_object(&mut device, bucket, object).await?;
        let content_type = opts
            .content_type
            .clone()
            .unwrap_or_else(|| current.content_type().to_owned());
        let mut record = ObjectRecord::new(
            RecordKind::Object,
            current.etag(),
            current.size(),
            &content_type,
            &opts.user_metadata,
        );
        record.parts = current.parts;
        record.created = current.created;

        let meta_key = keys::meta_key(&keys::object_key(bucket, object));
        write_record(&mut *device, &meta_key, &record).await?;
        Ok(ObjectInfo::from_record(bucket, object, &record))
    }

    /// Delete an object; deleting an absent object succeeds.
    pub(crate) async fn handle_delete_object(&self, bucket: &str, object: &str) -> StoreResult<()> {
        validate_object_name(bucket, object)?;
        let mut device = self.device().await?;
        self.ensure_bucket(&mut device, bucket).await?;

        let data_key = keys::object_key(bucket, object);
        let meta_key = keys::meta_key(&data_key);
        match read_record::<ObjectRecord, _>(&mut *device, &meta_key).await? {
            Some(record) if record.kind == RecordKind::Object => {
                delete_key(&mut *device, &meta_key).await?;
                delete_key(&mut *device, &data_key).await?;
                self.discard_object_parts(&mut device, bucket, object, &record.parts, &HashSet::new())
                    .await?;
            }
            // the name collides with an uploaded part; leave the upload alone
            Some(_) => {}
            // data left behind by an interrupted write
            None => {
                delete_key(&mut *device, &data_key).await?;
            }
        }

        debug!(bucket = %bucket, object = %object, "delete_object completed");
        Ok(())
    }

    /// Delete several objects concurrently, one result per name.
    pub(crate) async fn handle_delete_objects(
        &self,
        bucket: &str,
        objects: &[String],
    ) -> Vec<StoreResult<()>> {
        join_all(
            objects
                .iter()
                .map(|object| self.handle_delete_object(bucket, object)),
        )
        .await
    }
}
