//! Object integration tests over the network client.

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use bytes::Bytes;
    use futures::future::join_all;
    use kinstack_store::{ByteRange, ObjectLayer, PutObjectOptions, StoreError};

    use crate::{network_store, payload, start_simulator};

    #[tokio::test]
    async fn test_should_round_trip_large_object() {
        let simulator = start_simulator().await;
        let store = network_store(&simulator, 2).await;
        store.make_bucket("media").await.unwrap();

        let body = payload(3 * 1024 * 1024, 11);
        let info = store
            .put_object("media", "clip.mp4", Bytes::from(body.clone()), &PutObjectOptions::default())
            .await
            .unwrap();
        assert_eq!(info.size, body.len() as u64);
        assert_eq!(info.content_type, "video/mp4");

        let out = store.get_object("media", "clip.mp4", None).await.unwrap();
        assert_eq!(out.data.len(), body.len());
        assert_eq!(&out.data[..], &body[..]);

        let slice = store
            .get_object("media", "clip.mp4", Some(ByteRange::new(1_000_000, 10)))
            .await
            .unwrap();
        assert_eq!(&slice.data[..], &body[1_000_000..1_000_010]);

        simulator.shutdown().await;
    }

    #[tokio::test]
    async fn test_should_keep_metadata_and_copy_objects() {
        let simulator = start_simulator().await;
        let store = network_store(&simulator, 2).await;
        store.make_bucket("docs").await.unwrap();

        let mut user_metadata = BTreeMap::new();
        user_metadata.insert("x-amz-meta-author".to_owned(), "kim".to_owned());
        let opts = PutObjectOptions::builder()
            .content_type("text/markdown")
            .user_metadata(user_metadata)
            .build();
        store
            .put_object("docs", "notes.md", Bytes::from_static(b"# notes"), &opts)
            .await
            .unwrap();

        let copy = store
            .copy_object("docs", "notes.md", "docs", "archive/notes.md", None)
            .await
            .unwrap();
        assert_eq!(copy.content_type, "text/markdown");
        assert_eq!(copy.user_defined["x-amz-meta-author"], "kim");
        assert_eq!(copy.etag, store.get_object_info("docs", "notes.md").await.unwrap().etag);

        simulator.shutdown().await;
    }

    #[tokio::test]
    async fn test_should_list_with_delimiter_and_pages() {
        let simulator = start_simulator().await;
        let store = network_store(&simulator, 4).await;
        store.make_bucket("logs").await.unwrap();

        let names: Vec<String> = (0..4)
            .map(|i| format!("2024/{i:02}/app.log"))
            .chain((0..5).map(|i| format!("readme-{i}")))
            .collect();
        let opts = PutObjectOptions::default();
        let puts = names.iter().map(|name| {
            store.put_object("logs", name, Bytes::from_static(b"line"), &opts)
        });
        for result in join_all(puts).await {
            result.unwrap();
        }

        let top = store.list_objects("logs", "", "", "/", 100).await.unwrap();
        assert_eq!(top.prefixes, ["2024/"]);
        assert_eq!(top.objects.len(), 5);

        let months = store.list_objects("logs", "2024/", "", "/", 100).await.unwrap();
        assert_eq!(months.prefixes, ["2024/00/", "2024/01/", "2024/02/", "2024/03/"]);

        let mut token: Option<String> = None;
        let mut seen = 0;
        loop {
            let page = store
                .list_objects_v2("logs", "", token.as_deref(), "", 2, "")
                .await
                .unwrap();
            seen += page.objects.len();
            if !page.is_truncated {
                break;
            }
            token = page.next_continuation_token;
        }
        assert_eq!(seen, 9);

        simulator.shutdown().await;
    }

    #[tokio::test]
    async fn test_should_delete_objects_in_bulk() {
        let simulator = start_simulator().await;
        let store = network_store(&simulator, 2).await;
        store.make_bucket("tmp").await.unwrap();
        let names: Vec<String> = (0..6).map(|i| format!("f{i}")).collect();
        for name in &names {
            store
                .put_object("tmp", name, Bytes::from_static(b"x"), &PutObjectOptions::default())
                .await
                .unwrap();
        }

        let results = store.delete_objects("tmp", &names).await;
        assert!(results.iter().all(Result::is_ok));
        assert!(store.list_objects("tmp", "", "", "", 10).await.unwrap().objects.is_empty());
        assert!(matches!(
            store.get_object("tmp", "f0", None).await,
            Err(StoreError::ObjectNotFound { .. })
        ));

        simulator.shutdown().await;
    }
}
