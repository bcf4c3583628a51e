//! Uploading local files to the bucket
//!
//! [`TransferPlanner`] decides between a single request and a chunked
//! upload; [`ParallelUploadCoordinator`] carries the plan out and reports
//! through a [`ProgressReporter`].

mod plan;
mod progress;
mod upload;

pub use plan::{plan, threshold_from_mebibytes, ChunkRange, TransferPlan, TransferPlanner, MAX_PARALLELISM};
pub use progress::{ProgressEvent, ProgressReader, ProgressReporter, REPORT_GRANULARITY};
pub use upload::{ParallelUploadCoordinator, UploadPhase, UploadTarget};
