//! S3-style object layer over Kinetic key-value devices.
//!
//! [`KvObjectStore`] implements the [`ObjectLayer`] contract (buckets,
//! objects, listings and multipart uploads) by mapping the hierarchical
//! bucket/object model onto a device's flat, ordered key space. Every
//! operation borrows one device from a [`kinstack_client::ConnectionPool`]
//! for its duration.
//!
//! # Architecture
//!
//! ```text
//! HTTP layer (routing, XML, auth)
//!        |
//!        v
//! ObjectLayer (trait)
//!        |
//!        v
//! KvObjectStore<D> --> ops::{bucket, object, list, multipart}
//!        |
//!        v
//! ConnectionPool<D: KvDevice> --> NetworkClient | FastPathClient
//! ```
//!
//! See [`keys`] for the key layout and [`meta`] for the records stored under
//! metadata keys.

pub mod checksums;
pub mod config;
pub mod error;
pub mod keys;
pub mod layer;
pub mod meta;
mod ops;
pub mod store;
pub mod types;
pub mod utils;
pub mod validation;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use layer::ObjectLayer;
pub use store::KvObjectStore;
pub use types::{
    BucketInfo, ByteRange, CompletePart, GetObjectOutput, ListMultipartsInfo, ListObjectsInfo,
    ListObjectsV2Info, ListPartsInfo, MultipartUploadInfo, ObjectInfo, PartInfo, PutObjectOptions,
    StorageInfo,
};
