//! Object store over the in-process fast path.

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use kinstack_store::{CompletePart, ObjectLayer, PutObjectOptions};

    use crate::{fast_path_store, payload};

    const MIB: usize = 1024 * 1024;

    #[tokio::test]
    async fn test_should_serve_objects_without_network() {
        let (device, store) = fast_path_store(2);
        store.make_bucket("local").await.unwrap();
        store
            .put_object("local", "a.txt", Bytes::from_static(b"alpha"), &PutObjectOptions::default())
            .await
            .unwrap();

        let out = store.get_object("local", "a.txt", None).await.unwrap();
        assert_eq!(&out.data[..], b"alpha");
        assert_eq!(out.info.content_type, "text/plain");
        drop(out);
        assert_eq!(device.outstanding_buffers(), 0);

        let info = store.storage_info().await.unwrap();
        assert_eq!(info.total, None);
        assert_eq!(info.connections, 2);
    }

    #[tokio::test]
    async fn test_should_complete_multipart_upload_over_fast_path() {
        let (device, store) = fast_path_store(1);
        store.make_bucket("local").await.unwrap();
        let upload = store
            .new_multipart_upload("local", "blob", &PutObjectOptions::default())
            .await
            .unwrap();

        let first = store
            .put_object_part("local", "blob", &upload, 1, Bytes::from(payload(5 * MIB, 5)))
            .await
            .unwrap();
        let last = store
            .put_object_part("local", "blob", &upload, 2, Bytes::from_static(b"tail"))
            .await
            .unwrap();
        let info = store
            .complete_multipart_upload(
                "local",
                "blob",
                &upload,
                &[CompletePart::new(1, first.etag), CompletePart::new(2, last.etag)],
            )
            .await
            .unwrap();
        assert_eq!(info.size, 5 * MIB as u64 + 4);

        store.delete_object("local", "blob").await.unwrap();
        store.delete_bucket("local").await.unwrap();
        assert!(device.is_empty());
    }
}
