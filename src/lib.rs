/*!
 * gcs-resource - artifact versioning and transfer for Google Cloud Storage
 *
 * The core of a pipeline resource that tracks artifacts in a bucket:
 * - Version discovery from object names via a capturing regexp
 * - Natural ordering of version strings (digit runs compared numerically)
 * - Generation tracking for a single key in a versioned bucket
 * - Parallel chunked uploads joined with server-side compose
 *
 * The bucket itself is reached through the `store::ObjectStore` trait; the
 * command layer supplies the transport.
 */

pub mod catalog;
pub mod config;
pub mod error;
pub mod logging;
pub mod store;
pub mod transfer;
pub mod types;
pub mod version;

// Re-export commonly used types
pub use catalog::VersionCatalog;
pub use config::{PutParams, RequestedVersion, ResourceConfig, Source, SourceMode};
pub use error::{Error, ErrorCategory, Result};
pub use store::{InMemoryStore, ObjectStore, StoreError, UploadOptions};
pub use transfer::{
    ParallelUploadCoordinator, ProgressEvent, ProgressReporter, TransferPlan, TransferPlanner,
    UploadTarget,
};
pub use types::{Generation, ObjectRef, VersionRef};
pub use version::{Extraction, VersionPattern, VersionToken};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
