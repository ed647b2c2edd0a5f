//! Bucket integration tests over the network client.

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use kinstack_store::{ObjectLayer, PutObjectOptions, StoreError};

    use crate::{network_store, start_simulator};

    #[tokio::test]
    async fn test_should_create_list_and_delete_buckets() {
        let simulator = start_simulator().await;
        let store = network_store(&simulator, 2).await;

        for name in ["gamma", "alpha", "beta"] {
            store.make_bucket(name).await.unwrap();
        }
        let names: Vec<_> = store
            .list_buckets()
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, ["alpha", "beta", "gamma"]);

        assert!(matches!(
            store.make_bucket("alpha").await,
            Err(StoreError::BucketExists { .. })
        ));

        store.delete_bucket("beta").await.unwrap();
        assert!(matches!(
            store.get_bucket_info("beta").await,
            Err(StoreError::BucketNotFound { .. })
        ));
        assert!(!simulator.device().contains(b"meta.bucket.beta"));

        store.shutdown().await.unwrap();
        simulator.shutdown().await;
    }

    #[tokio::test]
    async fn test_should_refuse_to_delete_non_empty_bucket() {
        let simulator = start_simulator().await;
        let store = network_store(&simulator, 1).await;
        store.make_bucket("docs").await.unwrap();
        store
            .put_object("docs", "readme.md", Bytes::from_static(b"# hi"), &PutObjectOptions::default())
            .await
            .unwrap();

        assert!(matches!(
            store.delete_bucket("docs").await,
            Err(StoreError::BucketNotEmpty { .. })
        ));
        store.delete_object("docs", "readme.md").await.unwrap();
        store.delete_bucket("docs").await.unwrap();
        assert!(simulator.device().is_empty());

        simulator.shutdown().await;
    }

    #[tokio::test]
    async fn test_should_report_device_capacity() {
        let simulator = start_simulator().await;
        let store = network_store(&simulator, 3).await;
        store.make_bucket("docs").await.unwrap();
        store
            .put_object("docs", "a", Bytes::from(vec![7u8; 4096]), &PutObjectOptions::default())
            .await
            .unwrap();

        let info = store.storage_info().await.unwrap();
        assert_eq!(info.connections, 3);
        let total = info.total.unwrap();
        assert!(total > 0);
        assert!(info.used.unwrap() <= total);

        simulator.shutdown().await;
    }
}
