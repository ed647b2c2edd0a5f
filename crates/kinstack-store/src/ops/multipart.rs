//! Multipart upload handlers.
//!
//! An upload is an [`UploadRecord`] at `<bucket>/<object>.fs.json` plus one
//! data key and one `part`-kind metadata record per uploaded part. Part keys
//! carry `(number, etag, size)` in their suffix, so the parts of an upload can
//! be rebuilt from a range scan alone. Completing an upload writes the object
//! record listing the chosen parts; that write is the commit point.

use std::collections::{BTreeMap, HashSet};
use std::ops::Bound;

use bytes::Bytes;
use chrono::Utc;
use kinstack_client::KvDevice;
use tracing::{debug, info};

use crate::checksums::{canonical_etag, compute_md5, compute_multipart_etag};
use crate::error::{StoreError, StoreResult};
use crate::keys::{self, PartKey};
use crate::meta::{META_CONTENT_TYPE, ObjectRecord, PartRecord, RecordKind, UploadRecord};
use crate::store::{KvObjectStore, delete_key, key_exists, read_record, write_record, write_value};
use crate::types::{CompletePart, ListPartsInfo, ObjectInfo, PartInfo, PutObjectOptions};
use crate::utils::{generate_upload_id, guess_content_type};
use crate::validation::{validate_metadata, validate_object_name, validate_part_number};

/// Upper bound on parts returned by one `list_object_parts` call.
const MAX_PARTS_LISTED: usize = 1000;

/// One uploaded copy of a part, as found on the device.
#[derive(Debug, Clone)]
pub(crate) struct UploadedPart {
    pub(crate) key: PartKey,
    pub(crate) record: ObjectRecord,
}

/// The most recently written copy of each part number.
fn newest_parts(parts: &[UploadedPart]) -> BTreeMap<u32, &UploadedPart> {
    let mut newest: BTreeMap<u32, &UploadedPart> = BTreeMap::new();
    for part in parts {
        newest
            .entry(part.key.number)
            .and_modify(|current| {
                if part.record.modified >= current.record.modified {
                    *current = part;
                }
            })
            .or_insert(part);
    }
    newest
}

fn part_info(part: &UploadedPart) -> PartInfo {
    PartInfo {
        part_number: part.key.number,
        etag: part.key.etag.clone(),
        size: part.key.size,
        modified: part.record.modified,
    }
}

impl<D: KvDevice + 'static> KvObjectStore<D> {
    /// Read the upload record of `object`, failing unless it carries
    /// `upload_id`.
    async fn load_upload(
        &self,
        device: &mut D,
        bucket: &str,
        object: &str,
        upload_id: &str,
    ) -> StoreResult<UploadRecord> {
        match read_record::<UploadRecord, _>(device, &keys::upload_key(bucket, object)).await? {
            Some(upload) if upload.upload_id == upload_id => Ok(upload),
            _ => Err(StoreError::invalid_upload_id(bucket, object, upload_id)),
        }
    }

    /// Every uploaded part of `object`, duplicates included, in key order.
    pub(crate) async fn scan_parts(
        &self,
        device: &mut D,
        bucket: &str,
        object: &str,
    ) -> StoreResult<Vec<UploadedPart>> {
        let mut scan = self.scan(keys::part_meta_scan(bucket, object));
        let mut parts = Vec::new();
        while let Some(page) = scan.next_page(device).await? {
            for meta_key in page {
                // other objects sharing the name prefix
                let Some(key) = PartKey::from_meta_key(bucket, object, &meta_key) else {
                    continue;
                };
                if let Some(record) = read_record::<ObjectRecord, _>(device, &meta_key).await? {
                    if record.kind == RecordKind::Part {
                        parts.push(UploadedPart { key, record });
                    }
                }
            }
        }
        Ok(parts)
    }

    /// Delete the part data keys of a replaced object.
    ///
    /// Keys in `keep` survive, and so do keys whose part metadata exists,
    /// since an in-flight upload of the same content owns them.
    pub(crate) async fn discard_object_parts(
        &self,
        device: &mut D,
        bucket: &str,
        object: &str,
        parts: &[PartRecord],
        keep: &HashSet<PartKey>,
    ) -> StoreResult<()> {
        for part in parts {
            let key = part.key();
            if keep.contains(&key) || key_exists(device, &key.meta_key(bucket, object)).await? {
                continue;
            }
            delete_key(device, &key.data_key(bucket, object)).await?;
        }
        Ok(())
    }

    /// Remove every uploaded part of `object` and its upload record.
    ///
    /// Part data the current object reads from is left in place. Returns the
    /// number of part copies removed.
    async fn drop_upload(&self, device: &mut D, bucket: &str, object: &str) -> StoreResult<usize> {
        let object_meta = keys::meta_key(&keys::object_key(bucket, object));
        let referenced: HashSet<PartKey> =
            match read_record::<ObjectRecord, _>(device, &object_meta).await? {
                Some(record) if record.kind == RecordKind::Object => {
                    record.parts.iter().map(PartRecord::key).collect()
                }
                _ => HashSet::new(),
            };

        let parts = self.scan_parts(device, bucket, object).await?;
        for part in &parts {
            delete_key(device, &part.key.meta_key(bucket, object)).await?;
            if !referenced.contains(&part.key) {
                delete_key(device, &part.key.data_key(bucket, object)).await?;
            }
        }
        delete_key(device, &keys::upload_key(bucket, object)).await?;
        Ok(parts.len())
    }

    /// Start a multipart upload and return its id.
    ///
    /// An object has at most one upload in flight; starting another discards
    /// the parts of the previous one.
    pub(crate) async fn handle_new_multipart_upload(
        &self,
        bucket: &str,
        object: &str,
        opts: &PutObjectOptions,
    ) -> StoreResult<String> {
        validate_object_name(bucket, object)?;
        validate_metadata(&opts.user_metadata)?;
        let mut device = self.device().await?;
        self.ensure_bucket(&mut device, bucket).await?;

        let upload_key = keys::upload_key(bucket, object);
        if let Some(previous) = read_record::<UploadRecord, _>(&mut *device, &upload_key).await? {
            let dropped = self.drop_upload(&mut device, bucket, object).await?;
            debug!(
                bucket = %bucket,
                object = %object,
                upload_id = %previous.upload_id,
                parts = dropped,
                "previous upload discarded"
            );
        }

        let mut meta = opts.user_metadata.clone();
        meta.insert(
            META_CONTENT_TYPE.to_owned(),
            opts.content_type
                .clone()
                .unwrap_or_else(|| guess_content_type(object)),
        );
        let upload = UploadRecord {
            upload_id: generate_upload_id(),
            bucket: bucket.to_owned(),
            object: object.to_owned(),
            meta,
            initiated: Utc::now(),
        };
        write_record(&mut *device, &upload_key, &upload).await?;

        info!(bucket = %bucket, object = %object, upload_id = %upload.upload_id, "multipart upload started");
        Ok(upload.upload_id)
    }

    /// Store one part. Re-uploading a part number adds a newer copy.
    pub(crate) async fn handle_put_object_part(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> StoreResult<PartInfo> {
        validate_object_name(bucket, object)?;
        validate_part_number(part_number, self.config.max_part_number)?;
        let size = data.len() as u64;
        if size > self.config.max_object_size {
            return Err(StoreError::EntityTooLarge {
                size,
                max: self.config.max_object_size,
            });
        }

        let mut device = self.device().await?;
        self.ensure_bucket(&mut device, bucket).await?;
        let upload = self.load_upload(&mut device, bucket, object, upload_id).await?;

        let key = PartKey {
            number: part_number,
            etag: compute_md5(&data),
            size,
        };
        let content_type = upload.meta.get(META_CONTENT_TYPE).map_or("", String::as_str);
        let record = ObjectRecord::new(
            RecordKind::Part,
            &key.etag,
            size,
            content_type,
            &BTreeMap::new(),
        );
        write_value(&mut *device, &key.data_key(bucket, object), data).await?;
        write_record(&mut *device, &key.meta_key(bucket, object), &record).await?;

        debug!(
            bucket = %bucket,
            object = %object,
            part_number,
            size,
            etag = %key.etag,
            "put_object_part completed"
        );
        Ok(PartInfo {
            part_number,
            etag: key.etag,
            size,
            modified: record.modified,
        })
    }

    /// List the newest copy of each uploaded part after `part_number_marker`.
    pub(crate) async fn handle_list_object_parts(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_number_marker: u32,
        max_parts: usize,
    ) -> StoreResult<ListPartsInfo> {
        validate_object_name(bucket, object)?;
        let max_parts = max_parts.min(MAX_PARTS_LISTED);
        let mut device = self.device().await?;
        self.ensure_bucket(&mut device, bucket).await?;
        self.load_upload(&mut device, bucket, object, upload_id).await?;

        let uploaded = self.scan_parts(&mut device, bucket, object).await?;
        let newest = newest_parts(&uploaded);
        let mut remaining = newest
            .range((Bound::Excluded(part_number_marker), Bound::Unbounded))
            .map(|(_, part)| part_info(part));
        let parts: Vec<PartInfo> = remaining.by_ref().take(max_parts).collect();
        let is_truncated = max_parts > 0 && remaining.next().is_some();

        Ok(ListPartsInfo {
            bucket: bucket.to_owned(),
            object: object.to_owned(),
            upload_id: upload_id.to_owned(),
            part_number_marker,
            next_part_number_marker: parts.last().map_or(part_number_marker, |p| p.part_number),
            max_parts,
            is_truncated,
            parts,
        })
    }

    /// Assemble the declared parts into the final object.
    ///
    /// Everything is checked before the object record is written, so a
    /// rejected completion leaves the upload intact. After the commit the
    /// per-part metadata, unchosen part copies, the upload record and the
    /// content of any replaced object are removed.
    pub(crate) async fn handle_complete_multipart_upload(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        parts: &[CompletePart],
    ) -> StoreResult<ObjectInfo> {
        validate_object_name(bucket, object)?;
        if parts.is_empty() {
            return Err(StoreError::InvalidArgument(
                "You must specify at least one part".to_owned(),
            ));
        }
        if parts
            .iter()
            .enumerate()
            .any(|(i, p)| usize::try_from(p.part_number).ok() != Some(i + 1))
        {
            return Err(StoreError::InvalidPartOrder);
        }

        let mut device = self.device().await?;
        self.ensure_bucket(&mut device, bucket).await?;
        let upload = self.load_upload(&mut device, bucket, object, upload_id).await?;
        let uploaded = self.scan_parts(&mut device, bucket, object).await?;

        let mut chosen = Vec::with_capacity(parts.len());
        for (i, declared) in parts.iter().enumerate() {
            let etag = canonical_etag(&declared.etag);
            let part = uploaded
                .iter()
                .find(|p| p.key.number == declared.part_number && p.key.etag.eq_ignore_ascii_case(etag))
                .ok_or_else(|| StoreError::InvalidPart {
                    part_number: declared.part_number,
                    etag: declared.etag.clone(),
                })?;
            if i + 1 < parts.len() && part.key.size < self.config.min_part_size {
                return Err(StoreError::PartTooSmall {
                    part_number: declared.part_number,
                    size: part.key.size,
                    min: self.config.min_part_size,
                });
            }
            chosen.push(PartRecord::from(&part.key));
        }

        let size: u64 = chosen.iter().map(|p| p.size).sum();
        let etags: Vec<&str> = chosen.iter().map(|p| p.etag.as_str()).collect();
        let etag = compute_multipart_etag(&etags);
        let content_type = upload
            .meta
            .get(META_CONTENT_TYPE)
            .cloned()
            .unwrap_or_else(|| guess_content_type(object));

        let data_key = keys::object_key(bucket, object);
        let meta_key = keys::meta_key(&data_key);
        let previous = read_record::<ObjectRecord, _>(&mut *device, &meta_key)
            .await?
            .filter(|r| r.kind == RecordKind::Object);

        let mut record = ObjectRecord::new(RecordKind::Object, &etag, size, &content_type, &upload.meta);
        record.parts = chosen;
        write_record(&mut *device, &meta_key, &record).await?;

        let keep: HashSet<PartKey> = record.parts.iter().map(PartRecord::key).collect();
        for part in &uploaded {
            delete_key(&mut *device, &part.key.meta_key(bucket, object)).await?;
            if !keep.contains(&part.key) {
                delete_key(&mut *device, &part.key.data_key(bucket, object)).await?;
            }
        }
        delete_key(&mut *device, &keys::upload_key(bucket, object)).await?;
        // content of a replaced single-shot object, or of an interrupted put
        delete_key(&mut *device, &data_key).await?;
        if let Some(previous) = previous {
            self.discard_object_parts(&mut device, bucket, object, &previous.parts, &keep)
                .await?;
        }

        info!(
            bucket = %bucket,
            object = %object,
            upload_id = %upload_id,
            parts = record.parts.len(),
            size,
            "multipart upload completed"
        );
        Ok(ObjectInfo::from_record(bucket, object, &record))
    }

    /// Abandon an upload, removing its parts and its record.
    pub(crate) async fn handle_abort_multipart_upload(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
    ) -> StoreResult<()> {
        validate_object_name(bucket, object)?;
        let mut device = self.device().await?;
        self.ensure_bucket(&mut device, bucket).await?;
        self.load_upload(&mut device, bucket, object, upload_id).await?;

        let dropped = self.drop_upload(&mut device, bucket, object).await?;
        info!(bucket = %bucket, object = %object, upload_id = %upload_id, parts = dropped, "multipart upload aborted");
        Ok(())
    }
}
