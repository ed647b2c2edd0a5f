//! Connection pool behaviour seen through the object store.

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use futures::future::join_all;
    use kinstack_store::{ObjectLayer, PutObjectOptions, StoreError};

    use crate::{network_store, start_simulator};

    #[tokio::test]
    async fn test_should_multiplex_many_operations_over_few_connections() {
        let simulator = start_simulator().await;
        let store = network_store(&simulator, 2).await;
        store.make_bucket("load").await.unwrap();

        let names: Vec<String> = (0..16).map(|i| format!("obj-{i:02}")).collect();
        let opts = PutObjectOptions::default();
        let puts = names.iter().map(|name| {
            store.put_object("load", name, Bytes::from(name.clone()), &opts)
        });
        for result in join_all(puts).await {
            result.unwrap();
        }

        let stats = store.pool().stats();
        assert_eq!(stats.capacity, 2);
        assert_eq!(stats.in_use, 0);
        assert!(stats.high_water_mark <= 2);

        let listing = store.list_objects("load", "", "", "", 100).await.unwrap();
        assert_eq!(listing.objects.len(), 16);
        let out = store.get_object("load", "obj-07", None).await.unwrap();
        assert_eq!(&out.data[..], b"obj-07");

        simulator.shutdown().await;
    }

    #[tokio::test]
    async fn test_should_surface_lost_device_as_unavailable() {
        let simulator = start_simulator().await;
        let store = network_store(&simulator, 1).await;
        store.make_bucket("gone").await.unwrap();
        simulator.shutdown().await;

        assert!(matches!(
            store.get_bucket_info("gone").await,
            Err(StoreError::DeviceUnavailable(_))
        ));
        // the broken connection is evicted and reconnecting fails too
        assert!(matches!(
            store.get_bucket_info("gone").await,
            Err(StoreError::DeviceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_should_reject_operations_after_shutdown() {
        let simulator = start_simulator().await;
        let store = network_store(&simulator, 2).await;
        store.shutdown().await.unwrap();
        assert!(store.pool().is_closed());
        assert!(matches!(
            store.list_buckets().await,
            Err(StoreError::DeviceUnavailable(_))
        ));
        simulator.shutdown().await;
    }
}
