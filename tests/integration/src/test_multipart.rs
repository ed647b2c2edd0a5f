//! Multipart upload integration tests over the network client.

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use kinstack_store::{ByteRange, CompletePart, ObjectLayer, PutObjectOptions, StoreError};

    use crate::{network_store, payload, start_simulator};

    const MIB: usize = 1024 * 1024;

    #[tokio::test]
    async fn test_should_assemble_eleven_mib_object_from_three_parts() {
        let simulator = start_simulator().await;
        let store = network_store(&simulator, 2).await;
        store.make_bucket("backups").await.unwrap();
        let upload = store
            .new_multipart_upload("backups", "db.tar", &PutObjectOptions::default())
            .await
            .unwrap();

        let bodies = [payload(5 * MIB, 1), payload(5 * MIB, 2), payload(MIB, 3)];
        let mut declared = Vec::new();
        for (number, body) in (1u32..).zip(&bodies) {
            let part = store
                .put_object_part("backups", "db.tar", &upload, number, Bytes::from(body.clone()))
                .await
                .unwrap();
            declared.push(CompletePart::new(number, part.etag));
        }

        let info = store
            .complete_multipart_upload("backups", "db.tar", &upload, &declared)
            .await
            .unwrap();
        assert_eq!(info.size, 11 * MIB as u64);
        assert!(info.etag.ends_with("-3"));
        assert_eq!(info.content_type, "application/x-tar");

        let listing = store.list_objects("backups", "", "", "", 100).await.unwrap();
        assert_eq!(listing.objects.len(), 1);
        assert_eq!(listing.objects[0].name, "db.tar");
        assert_eq!(listing.objects[0].size, 11 * MIB as u64);
        assert!(listing.prefixes.is_empty());

        let seam = store
            .get_object("backups", "db.tar", Some(ByteRange::new(5 * MIB as u64 - 4, 8)))
            .await
            .unwrap();
        let mut expected = bodies[0][5 * MIB - 4..].to_vec();
        expected.extend_from_slice(&bodies[1][..4]);
        assert_eq!(&seam.data[..], &expected[..]);

        let whole = store.get_object("backups", "db.tar", None).await.unwrap();
        assert_eq!(whole.data.len(), 11 * MIB);
        assert_eq!(&whole.data[10 * MIB..], &bodies[2][..]);

        simulator.shutdown().await;
    }

    #[tokio::test]
    async fn test_should_rebuild_upload_state_from_device() {
        let simulator = start_simulator().await;
        let first = network_store(&simulator, 1).await;
        first.make_bucket("backups").await.unwrap();
        let upload = first
            .new_multipart_upload("backups", "big", &PutObjectOptions::default())
            .await
            .unwrap();
        for number in [2u32, 1] {
            first
                .put_object_part("backups", "big", &upload, number, Bytes::from(payload(MIB, 9)))
                .await
                .unwrap();
        }
        first.shutdown().await.unwrap();

        let second = network_store(&simulator, 1).await;
        let parts = second
            .list_object_parts("backups", "big", &upload, 0, 100)
            .await
            .unwrap();
        let numbers: Vec<_> = parts.parts.iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, [1, 2]);
        let uploads = second
            .list_multipart_uploads("backups", "", "", "", 10)
            .await
            .unwrap();
        assert_eq!(uploads.uploads.len(), 1);
        assert_eq!(uploads.uploads[0].upload_id, upload);

        simulator.shutdown().await;
    }

    #[tokio::test]
    async fn test_should_abort_without_leaking_keys() {
        let simulator = start_simulator().await;
        let store = network_store(&simulator, 2).await;
        store.make_bucket("backups").await.unwrap();
        let upload = store
            .new_multipart_upload("backups", "big", &PutObjectOptions::default())
            .await
            .unwrap();
        for number in 1..=3 {
            store
                .put_object_part("backups", "big", &upload, number, Bytes::from(payload(1024, 4)))
                .await
                .unwrap();
        }

        store
            .abort_multipart_upload("backups", "big", &upload)
            .await
            .unwrap();
        let keys = simulator.device().keys();
        assert_eq!(keys.len(), 2, "only the bucket keys remain: {keys:?}");
        assert!(matches!(
            store
                .complete_multipart_upload("backups", "big", &upload, &[CompletePart::new(1, "x")])
                .await,
            Err(StoreError::InvalidUploadId { .. })
        ));

        simulator.shutdown().await;
    }

    #[tokio::test]
    async fn test_should_reject_small_leading_parts() {
        let simulator = start_simulator().await;
        let store = network_store(&simulator, 1).await;
        store.make_bucket("backups").await.unwrap();
        let upload = store
            .new_multipart_upload("backups", "big", &PutObjectOptions::default())
            .await
            .unwrap();
        let one = store
            .put_object_part("backups", "big", &upload, 1, Bytes::from(payload(MIB, 1)))
            .await
            .unwrap();
        let two = store
            .put_object_part("backups", "big", &upload, 2, Bytes::from(payload(MIB, 2)))
            .await
            .unwrap();

        let declared = [CompletePart::new(1, one.etag), CompletePart::new(2, two.etag)];
        assert!(matches!(
            store
                .complete_multipart_upload("backups", "big", &upload, &declared)
                .await,
            Err(StoreError::PartTooSmall { part_number: 1, .. })
        ));
        assert!(matches!(
            store.get_object_info("backups", "big").await,
            Err(StoreError::ObjectNotFound { .. })
        ));

        simulator.shutdown().await;
    }
}
