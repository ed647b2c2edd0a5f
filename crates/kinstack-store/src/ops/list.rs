//! Listing handlers.
//!
//! Implements `list_objects`, `list_objects_v2` and `list_multipart_uploads`.
//! Listings walk the key space in `key_range_max` pages. When a delimiter
//! folds a run of keys into one common prefix the scan jumps past the whole
//! run instead of reading it.

use bytes::Bytes;
use kinstack_client::KvDevice;
use tracing::debug;

use crate::error::StoreResult;
use crate::keys;
use crate::meta::{ObjectRecord, RecordKind, UploadRecord};
use crate::store::{KvObjectStore, read_record};
use crate::types::{ListMultipartsInfo, ListObjectsInfo, ListObjectsV2Info, MultipartUploadInfo, ObjectInfo};
use crate::utils::{decode_continuation_token, encode_continuation_token};
use crate::validation::validate_prefix;

/// Upper bound on entries returned by one listing call.
const MAX_KEYS_LISTED: usize = 1000;

/// The common prefix `name` rolls up into, if the delimiter occurs after
/// `prefix`.
fn common_prefix<'a>(name: &'a str, prefix: &str, delimiter: &str) -> Option<&'a str> {
    if delimiter.is_empty() {
        return None;
    }
    let at = name.get(prefix.len()..)?.find(delimiter)?;
    name.get(..prefix.len() + at + delimiter.len())
}

impl<D: KvDevice + 'static> KvObjectStore<D> {
    /// List objects after `marker`, rolling names up at `delimiter`.
    pub(crate) async fn handle_list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        marker: &str,
        delimiter: &str,
        max_keys: usize,
    ) -> StoreResult<ListObjectsInfo> {
        validate_prefix(bucket, prefix)?;
        let max_keys = max_keys.min(MAX_KEYS_LISTED);
        let mut device = self.device().await?;
        self.ensure_bucket(&mut device, bucket).await?;

        let mut listing = ListObjectsInfo::default();
        if max_keys == 0 {
            return Ok(listing);
        }

        let mut scan = self.scan(keys::object_meta_scan(bucket, prefix));
        if !marker.is_empty() {
            scan.start_after(keys::meta_key(&keys::object_key(bucket, marker)));
        }

        let mut entries = 0usize;
        let mut last: Option<String> = None;
        'pages: while let Some(page) = scan.next_page(&mut *device).await? {
            let mut floor: Option<Bytes> = None;
            for key in page {
                if floor.as_ref().is_some_and(|f| key < *f) {
                    continue;
                }
                let Some(name) = keys::object_name_from_meta_key(bucket, &key) else {
                    continue;
                };

                let mut record = None;
                if keys::is_part_name(name) {
                    match read_record::<ObjectRecord, _>(&mut *device, &key).await? {
                        Some(r) if r.kind == RecordKind::Object => record = Some(r),
                        _ => continue,
                    }
                }

                if let Some(common) = common_prefix(name, prefix, delimiter) {
                    let next = keys::increment_last_byte(&keys::meta_key(&keys::object_key(
                        bucket, common,
                    )));
                    scan.skip_to(next.clone());
                    floor = Some(next);
                    if common <= marker {
                        continue;
                    }
                    if entries == max_keys {
                        listing.is_truncated = true;
                        break 'pages;
                    }
                    listing.prefixes.push(common.to_owned());
                    entries += 1;
                    last = Some(common.to_owned());
                    continue;
                }

                if record.is_none() {
                    record = read_record::<ObjectRecord, _>(&mut *device, &key).await?;
                }
                // deleted since the scan, or a part of an in-flight upload
                let Some(record) = record.filter(|r| r.kind == RecordKind::Object) else {
                    continue;
                };
                if entries == max_keys {
                    listing.is_truncated = true;
                    break 'pages;
                }
                listing
                    .objects
                    .push(ObjectInfo::from_record(bucket, name, &record));
                entries += 1;
                last = Some(name.to_owned());
            }
        }

        if listing.is_truncated {
            listing.next_marker = last;
        }
        debug!(
            bucket = %bucket,
            prefix = %prefix,
            objects = listing.objects.len(),
            prefixes = listing.prefixes.len(),
            truncated = listing.is_truncated,
            "list_objects completed"
        );
        Ok(listing)
    }

    /// List objects with continuation tokens.
    ///
    /// A token, when present, takes precedence over `start_after`.
    pub(crate) async fn handle_list_objects_v2(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<&str>,
        delimiter: &str,
        max_keys: usize,
        start_after: &str,
    ) -> StoreResult<ListObjectsV2Info> {
        let marker = match continuation_token {
            Some(token) => decode_continuation_token(token)?,
            None => start_after.to_owned(),
        };
        let listing = self
            .handle_list_objects(bucket, prefix, &marker, delimiter, max_keys)
            .await?;

        Ok(ListObjectsV2Info {
            is_truncated: listing.is_truncated,
            continuation_token: continuation_token.map(str::to_owned),
            next_continuation_token: listing
                .next_marker
                .as_deref()
                .map(encode_continuation_token),
            objects: listing.objects,
            prefixes: listing.prefixes,
        })
    }

    /// List in-flight uploads whose object names follow `key_marker`.
    pub(crate) async fn handle_list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: &str,
        key_marker: &str,
        delimiter: &str,
        max_uploads: usize,
    ) -> StoreResult<ListMultipartsInfo> {
        validate_prefix(bucket, prefix)?;
        let max_uploads = max_uploads.min(MAX_KEYS_LISTED);
        let mut device = self.device().await?;
        self.ensure_bucket(&mut device, bucket).await?;

        let mut listing = ListMultipartsInfo::default();
        if max_uploads == 0 {
            return Ok(listing);
        }

        // upload records sort among object and part data keys
        let mut scan = self.scan(keys::bucket_data_scan(bucket, prefix));
        if !key_marker.is_empty() {
            scan.start_after(keys::object_key(bucket, key_marker));
        }

        let mut entries = 0usize;
        let mut last: Option<String> = None;
        'pages: while let Some(page) = scan.next_page(&mut *device).await? {
            let mut floor: Option<Bytes> = None;
            for key in page {
                if floor.as_ref().is_some_and(|f| key < *f) {
                    continue;
                }
                let Some(name) = keys::object_name_from_upload_key(bucket, &key) else {
                    continue;
                };
                if name <= key_marker {
                    continue;
                }

                if let Some(common) = common_prefix(name, prefix, delimiter) {
                    let next = keys::increment_last_byte(&keys::object_key(bucket, common));
                    scan.skip_to(next.clone());
                    floor = Some(next);
                    if common <= key_marker || listing.prefixes.last().is_some_and(|p| p == common) {
                        continue;
                    }
                    if entries == max_uploads {
                        listing.is_truncated = true;
                        break 'pages;
                    }
                    listing.prefixes.push(common.to_owned());
                    entries += 1;
                    last = Some(common.to_owned());
                    continue;
                }

                let Some(upload) = read_record::<UploadRecord, _>(&mut *device, &key).await? else {
                    continue;
                };
                if entries == max_uploads {
                    listing.is_truncated = true;
                    break 'pages;
                }
                listing.uploads.push(MultipartUploadInfo {
                    object: name.to_owned(),
                    upload_id: upload.upload_id,
                    initiated: upload.initiated,
                });
                entries += 1;
                last = Some(name.to_owned());
            }
        }

        if listing.is_truncated {
            listing.next_key_marker = last;
        }
        debug!(
            bucket = %bucket,
            uploads = listing.uploads.len(),
            truncated = listing.is_truncated,
            "list_multipart_uploads completed"
        );
        Ok(listing)
    }
}
