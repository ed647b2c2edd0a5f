//! Object layer operation handlers.
//!
//! Each submodule adds `handle_*` methods to
//! [`KvObjectStore`](crate::store::KvObjectStore) for one group of
//! operations:
//!
//! - [`bucket`] -- make, describe, list and delete buckets, plus device
//!   capacity and shutdown
//! - [`object`] -- put, get, describe, copy and delete objects
//! - [`list`] -- object listings (V1 and V2)
//! - [`multipart`] -- multipart upload lifecycle and upload listings

pub mod bucket;
pub mod list;
pub mod multipart;
pub mod object;

#[cfg(test)]
pub(crate) mod testing;
