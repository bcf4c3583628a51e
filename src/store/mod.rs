//! Object store collaborator
//!
//! The resolution and transfer logic never talks to a network transport
//! directly. Everything it needs from the bucket goes through the
//! [`ObjectStore`] trait: listing keys, listing generations of a key, the
//! bucket's versioning flag, single-request uploads of a byte range, server-side
//! compose, deletion and download. Pagination, authentication and retries are
//! the implementor's business.
//!
//! [`InMemoryStore`] is a complete implementation backed by process memory.
//! It is what the test suite runs against and is handy for downstream
//! command-layer tests.
//!
//! # Example
//!
//! ```
//! use gcs_resource::store::{InMemoryStore, ObjectStore};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = InMemoryStore::new();
//! store.create_bucket("artifacts", true);
//! store.put_object("artifacts", "builds/app-1.0.tgz", b"payload");
//!
//! let keys = store.list_object_keys("artifacts", "builds/").await?;
//! assert_eq!(keys, vec!["builds/app-1.0.tgz".to_string()]);
//! # Ok(())
//! # }
//! ```

mod error;
pub mod memory;

pub use error::{StoreError, StoreResult};
pub use memory::{InMemoryStore, StoreCall};

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio::io::AsyncRead;

use crate::types::Generation;

/// Request body for an upload: a bounded reader over the bytes to send
pub type UploadBody = Box<dyn AsyncRead + Unpin + Send>;

/// Download stream of object bytes
pub type ReadStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Per-request attributes applied to uploaded objects
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadOptions {
    /// Content-Type of the stored object
    pub content_type: Option<String>,

    /// Canned ACL (e.g. `publicRead`, `bucketOwnerFullControl`)
    pub predefined_acl: Option<String>,

    /// Cache-Control header of the stored object
    pub cache_control: Option<String>,
}

/// Operations the core requires from a cloud object store.
///
/// Implementors must be `Send + Sync`: the upload coordinator shares one
/// store across concurrent chunk workers.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// All object keys under `prefix`, in no particular order.
    ///
    /// Pagination is handled inside the implementation.
    async fn list_object_keys(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<String>>;

    /// Every retained generation of exactly `key`, in store-reported order
    async fn list_generations(&self, bucket: &str, key: &str) -> StoreResult<Vec<Generation>>;

    /// Whether object versioning is enabled on the bucket
    async fn is_versioning_enabled(&self, bucket: &str) -> StoreResult<bool>;

    /// Upload `body` as the full content of `key` in one request.
    ///
    /// Returns the generation the store assigned to the new object, if any.
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        options: &UploadOptions,
        body: UploadBody,
    ) -> StoreResult<Option<Generation>>;

    /// Concatenate `parts`, in order, into `destination` server-side
    async fn compose(&self, bucket: &str, destination: &str, parts: &[String]) -> StoreResult<()>;

    /// Delete `key`, or one generation of it when `generation` is set
    async fn delete_object(
        &self,
        bucket: &str,
        key: &str,
        generation: Option<Generation>,
    ) -> StoreResult<()>;

    /// Stream the content of `key`; the live object when `generation` is `None`
    async fn download_object(
        &self,
        bucket: &str,
        key: &str,
        generation: Option<Generation>,
    ) -> StoreResult<ReadStream>;

    /// Short identifier for log output
    fn store_name(&self) -> &str {
        "gcs"
    }
}
