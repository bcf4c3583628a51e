//! Parallel upload coordinator
//!
//! A [`TransferPlan`] with one chunk is sent as a single upload request. A
//! multi-chunk plan fans out one tokio task per chunk, each streaming its byte
//! range of the local file into `<destination>.part<i>`. Once every worker has
//! finished the parts are composed server-side, in plan order, into the
//! destination and then deleted.
//!
//! If any chunk fails, the first failure (by completion) is returned after all
//! workers are drained, and nothing is composed. Parts that did upload are
//! left in the bucket; a re-run overwrites them.

use std::fmt;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::plan::{ChunkRange, TransferPlan, TransferPlanner};
use super::progress::{ProgressEvent, ProgressReader, ProgressReporter};
use crate::config::PutParams;
use crate::error::{Error, Result};
use crate::store::{ObjectStore, UploadBody, UploadOptions};
use crate::types::{Generation, ObjectRef};

/// Where and how the uploaded object is stored
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadTarget {
    pub bucket: String,
    pub destination: String,
    pub content_type: Option<String>,
    pub predefined_acl: Option<String>,
    pub cache_control: Option<String>,
    /// Whether the bucket keeps generations; only then is one returned
    pub versioned: bool,
}

impl UploadTarget {
    pub fn new(bucket: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            destination: destination.into(),
            ..Default::default()
        }
    }

    /// Target carrying the object attributes of `params`
    pub fn from_params(
        bucket: impl Into<String>,
        destination: impl Into<String>,
        params: &PutParams,
    ) -> Self {
        let non_empty = |value: &Option<String>| value.clone().filter(|v| !v.is_empty());
        Self {
            bucket: bucket.into(),
            destination: destination.into(),
            content_type: non_empty(&params.content_type),
            predefined_acl: non_empty(&params.predefined_acl),
            cache_control: non_empty(&params.cache_control),
            versioned: false,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_predefined_acl(mut self, acl: impl Into<String>) -> Self {
        self.predefined_acl = Some(acl.into());
        self
    }

    pub fn with_cache_control(mut self, cache_control: impl Into<String>) -> Self {
        self.cache_control = Some(cache_control.into());
        self
    }

    pub fn versioned(mut self, versioned: bool) -> Self {
        self.versioned = versioned;
        self
    }

    pub fn options(&self) -> UploadOptions {
        UploadOptions {
            content_type: self.content_type.clone(),
            predefined_acl: self.predefined_acl.clone(),
            cache_control: self.cache_control.clone(),
        }
    }
}

/// Stage of a multi-part upload, as it appears in log output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    Planned,
    FanningOut,
    Composing,
    CleaningUp,
    Done,
    Failed,
}

impl fmt::Display for UploadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UploadPhase::Planned => "planned",
            UploadPhase::FanningOut => "fanning_out",
            UploadPhase::Composing => "composing",
            UploadPhase::CleaningUp => "cleaning_up",
            UploadPhase::Done => "done",
            UploadPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

enum Slot {
    Pending,
    Uploaded(u64),
    Failed,
}

enum Failure {
    Chunk(Error),
    Worker(String),
}

/// Drives single-part and multi-part uploads against an [`ObjectStore`]
#[derive(Clone)]
pub struct ParallelUploadCoordinator {
    store: Arc<dyn ObjectStore>,
    planner: TransferPlanner,
    progress: ProgressReporter,
}

impl ParallelUploadCoordinator {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            planner: TransferPlanner::default(),
            progress: ProgressReporter::default(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_planner(mut self, planner: TransferPlanner) -> Self {
        self.planner = planner;
        self
    }

    pub fn planner(&self) -> &TransferPlanner {
        &self.planner
    }

    /// Upload `local_file` to `target`.
    ///
    /// Queries the bucket's versioning flag, plans by file size and
    /// `threshold_bytes`, then executes the plan. The returned reference
    /// carries a generation only for single-part uploads to a versioned bucket.
    pub async fn publish(
        &self,
        local_file: &Path,
        target: &UploadTarget,
        threshold_bytes: i64,
    ) -> Result<ObjectRef> {
        let versioned = self.store.is_versioning_enabled(&target.bucket).await?;
        let file_size = tokio::fs::metadata(local_file).await?.len();
        let plan = self.planner.plan(file_size, threshold_bytes);

        let target = UploadTarget {
            versioned,
            ..target.clone()
        };
        let generation = self.execute(&plan, local_file, &target).await?;

        Ok(ObjectRef::new(&target.bucket, &target.destination).with_generation(generation))
    }

    /// Execute `plan` for `local_file`.
    ///
    /// Multi-part uploads always return `None`: compose does not report a
    /// generation.
    pub async fn execute(
        &self,
        plan: &TransferPlan,
        local_file: &Path,
        target: &UploadTarget,
    ) -> Result<Option<Generation>> {
        let started = Instant::now();
        info!(
            store = self.store.store_name(),
            bucket = %target.bucket,
            key = %target.destination,
            file_size = plan.file_size(),
            parts = plan.thread_count(),
            phase = %UploadPhase::Planned,
            "uploading {}",
            local_file.display()
        );
        self.progress.report(ProgressEvent::TransferStarted {
            key: target.destination.clone(),
            total_bytes: plan.file_size(),
            parts: plan.thread_count(),
        });

        let generation = if plan.is_parallel() {
            self.execute_parallel(plan, local_file, target).await?;
            None
        } else {
            self.execute_single(local_file, target).await?
        };

        info!(
            key = %target.destination,
            elapsed_ms = started.elapsed().as_millis() as u64,
            phase = %UploadPhase::Done,
            "upload complete"
        );
        self.progress.report(ProgressEvent::TransferCompleted {
            key: target.destination.clone(),
            total_bytes: plan.file_size(),
            duration: started.elapsed(),
        });

        Ok(generation)
    }

    async fn execute_single(
        &self,
        local_file: &Path,
        target: &UploadTarget,
    ) -> Result<Option<Generation>> {
        let file = File::open(local_file).await?;
        let reader = ProgressReader::new(file, 0, self.progress.clone());
        let counter = reader.counter();

        let generation = self
            .store
            .upload(&target.bucket, &target.destination, &target.options(), Box::new(reader))
            .await?;

        self.progress.report(ProgressEvent::PartCompleted {
            part: 0,
            bytes: counter.load(Ordering::Relaxed),
        });

        if target.versioned {
            Ok(generation)
        } else {
            Ok(None)
        }
    }

    async fn execute_parallel(
        &self,
        plan: &TransferPlan,
        local_file: &Path,
        target: &UploadTarget,
    ) -> Result<()> {
        let part_keys = plan.part_keys(&target.destination);
        let options = target.options();
        let last_index = plan.thread_count() - 1;

        info!(
            key = %target.destination,
            chunk_size = plan.chunk_size(),
            parts = plan.thread_count(),
            phase = %UploadPhase::FanningOut,
            "starting chunk uploads"
        );

        let mut join_set = JoinSet::new();
        for (chunk, part_key) in plan.chunks().iter().copied().zip(part_keys.iter().cloned()) {
            let worker = ChunkWorker {
                store: Arc::clone(&self.store),
                path: local_file.to_path_buf(),
                bucket: target.bucket.clone(),
                key: part_key,
                options: options.clone(),
                chunk,
                to_eof: chunk.index == last_index,
                progress: self.progress.clone(),
            };
            join_set.spawn(async move { (chunk.index, worker.run().await) });
        }

        let mut slots: Vec<Slot> = (0..plan.thread_count()).map(|_| Slot::Pending).collect();
        let mut first_failure: Option<Failure> = None;

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, Ok(bytes))) => {
                    debug!(part = index, bytes, "chunk uploaded");
                    slots[index] = Slot::Uploaded(bytes);
                    self.progress.report(ProgressEvent::PartCompleted { part: index, bytes });
                }
                Ok((index, Err(e))) => {
                    warn!(part = index, error = %e, "chunk upload failed");
                    slots[index] = Slot::Failed;
                    self.progress.report(ProgressEvent::PartFailed {
                        part: index,
                        error: e.to_string(),
                    });
                    if first_failure.is_none() {
                        first_failure = Some(Failure::Chunk(e));
                    } else {
                        debug!(part = index, "discarding later chunk failure");
                    }
                }
                Err(join_error) => {
                    warn!(error = %join_error, "chunk worker did not complete");
                    if first_failure.is_none() {
                        first_failure = Some(Failure::Worker(join_error.to_string()));
                    }
                }
            }
        }

        if let Some(failure) = first_failure {
            info!(key = %target.destination, phase = %UploadPhase::Failed, "not composing");
            return Err(match failure {
                Failure::Chunk(e) => e,
                Failure::Worker(message) => Error::Join {
                    index: slots
                        .iter()
                        .position(|slot| matches!(slot, Slot::Pending))
                        .unwrap_or(0),
                    message,
                },
            });
        }

        let uploaded: u64 = slots
            .iter()
            .map(|slot| match slot {
                Slot::Uploaded(bytes) => *bytes,
                Slot::Pending | Slot::Failed => 0,
            })
            .sum();
        debug!(uploaded, file_size = plan.file_size(), "all chunks uploaded");

        info!(
            key = %target.destination,
            parts = part_keys.len(),
            phase = %UploadPhase::Composing,
            "composing parts"
        );
        self.progress.report(ProgressEvent::Composing {
            key: target.destination.clone(),
            parts: part_keys.len(),
        });
        self.store
            .compose(&target.bucket, &target.destination, &part_keys)
            .await?;

        self.clean_up(&target.bucket, &part_keys).await;
        Ok(())
    }

    /// Delete intermediate parts; failures are only logged
    async fn clean_up(&self, bucket: &str, part_keys: &[String]) {
        debug!(parts = part_keys.len(), phase = %UploadPhase::CleaningUp, "deleting parts");
        for part_key in part_keys {
            if let Err(e) = self.store.delete_object(bucket, part_key, None).await {
                warn!(bucket, key = %part_key, error = %e, "could not delete part");
            }
        }
    }
}

impl fmt::Debug for ParallelUploadCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParallelUploadCoordinator")
            .field("store", &self.store.store_name())
            .field("planner", &self.planner)
            .finish()
    }
}

/// Everything one chunk task owns
struct ChunkWorker {
    store: Arc<dyn ObjectStore>,
    path: PathBuf,
    bucket: String,
    key: String,
    options: UploadOptions,
    chunk: ChunkRange,
    to_eof: bool,
    progress: ProgressReporter,
}

impl ChunkWorker {
    async fn run(self) -> Result<u64> {
        let mut file = File::open(&self.path).await?;
        file.seek(SeekFrom::Start(self.chunk.offset)).await?;

        let body: UploadBody;
        let counter;
        if self.to_eof {
            let reader = ProgressReader::new(file, self.chunk.index, self.progress);
            counter = reader.counter();
            body = Box::new(reader);
        } else {
            let bounded = file.take(self.chunk.length);
            let reader = ProgressReader::new(bounded, self.chunk.index, self.progress);
            counter = reader.counter();
            body = Box::new(reader);
        }

        self.store
            .upload(&self.bucket, &self.key, &self.options, body)
            .await?;

        Ok(counter.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, StoreCall};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_file(data: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(data).unwrap();
        file.flush().unwrap();
        file
    }

    fn coordinator(store: &InMemoryStore) -> ParallelUploadCoordinator {
        ParallelUploadCoordinator::new(Arc::new(store.clone()))
    }

    #[tokio::test]
    async fn test_single_part_versioned_returns_generation() {
        let store = InMemoryStore::new();
        store.create_bucket("b", true);
        let file = temp_file(b"hello");

        let plan = TransferPlanner::default().plan(5, 0);
        let target = UploadTarget::new("b", "dir/hello.txt").versioned(true);
        let generation = coordinator(&store)
            .execute(&plan, file.path(), &target)
            .await
            .unwrap();

        assert!(generation.is_some());
        assert_eq!(store.object_data("b", "dir/hello.txt", generation).unwrap(), &b"hello"[..]);
    }

    #[tokio::test]
    async fn test_single_part_unversioned_returns_none() {
        let store = InMemoryStore::new();
        store.create_bucket("b", false);
        let file = temp_file(b"hello");

        let plan = TransferPlanner::default().plan(5, 0);
        let generation = coordinator(&store)
            .execute(&plan, file.path(), &UploadTarget::new("b", "hello.txt"))
            .await
            .unwrap();

        assert_eq!(generation, None);
        assert_eq!(store.object_data("b", "hello.txt", None).unwrap(), &b"hello"[..]);
    }

    #[tokio::test]
    async fn test_options_are_applied() {
        let store = InMemoryStore::new();
        store.create_bucket("b", false);
        let file = temp_file(b"{}");

        let target = UploadTarget::new("b", "x.json")
            .with_content_type("application/json")
            .with_predefined_acl("publicRead")
            .with_cache_control("no-cache");
        coordinator(&store)
            .execute(&TransferPlanner::default().plan(2, 0), file.path(), &target)
            .await
            .unwrap();

        let options = store.object_options("b", "x.json").unwrap();
        assert_eq!(options.content_type.as_deref(), Some("application/json"));
        assert_eq!(options.predefined_acl.as_deref(), Some("publicRead"));
        assert_eq!(options.cache_control.as_deref(), Some("no-cache"));
    }

    #[tokio::test]
    async fn test_empty_file_is_one_upload() {
        let store = InMemoryStore::new();
        store.create_bucket("b", false);
        let file = temp_file(b"");

        let object = coordinator(&store)
            .publish(file.path(), &UploadTarget::new("b", "empty"), 1024)
            .await
            .unwrap();

        assert_eq!(object.url(), "gs://b/empty");
        let uploads = store
            .calls()
            .into_iter()
            .filter(|c| matches!(c, StoreCall::Upload { .. }))
            .count();
        assert_eq!(uploads, 1);
        assert_eq!(store.object_data("b", "empty", None).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_parallel_upload_composes_and_reports() {
        crate::logging::init_test_logging();
        let store = InMemoryStore::new();
        store.create_bucket("b", true);
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let file = temp_file(&data);

        let (reporter, mut events) = ProgressReporter::new();
        let object = coordinator(&store)
            .with_progress(reporter)
            .publish(file.path(), &UploadTarget::new("b", "big.bin"), 3000)
            .await
            .unwrap();

        // Compose carries no generation
        assert_eq!(object.generation, None);
        assert_eq!(store.object_data("b", "big.bin", None).unwrap(), &data[..]);
        assert_eq!(store.keys("b"), vec!["big.bin".to_string()]);

        let mut transferred = 0;
        let mut completed_parts = 0;
        let mut composing = false;
        while let Ok(event) = events.try_recv() {
            match event {
                ProgressEvent::BytesTransferred { bytes, .. } => transferred += bytes,
                ProgressEvent::PartCompleted { .. } => completed_parts += 1,
                ProgressEvent::Composing { parts, .. } => {
                    assert_eq!(parts, 4);
                    composing = true;
                }
                _ => {}
            }
        }
        assert_eq!(transferred, 10_000);
        assert_eq!(completed_parts, 4);
        assert!(composing);
    }

    #[tokio::test]
    async fn test_compose_failure_skips_cleanup() {
        crate::logging::init_test_logging();
        let store = InMemoryStore::new();
        store.create_bucket("b", false);
        store.fail_compose();
        let file = temp_file(&[1u8; 100]);

        let err = coordinator(&store)
            .publish(file.path(), &UploadTarget::new("b", "out"), 40)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Store(_)));
        assert!(!store
            .calls()
            .iter()
            .any(|c| matches!(c, StoreCall::Delete { .. })));
    }

    #[test]
    fn test_target_from_params_drops_empty_values() {
        let params = PutParams {
            file: "a.tgz".into(),
            content_type: Some(String::new()),
            predefined_acl: Some("private".into()),
            ..Default::default()
        };
        let target = UploadTarget::from_params("b", "dir/a.tgz", &params);
        assert_eq!(target.content_type, None);
        assert_eq!(target.predefined_acl.as_deref(), Some("private"));
        assert!(!target.versioned);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(UploadPhase::FanningOut.to_string(), "fanning_out");
        assert_eq!(UploadPhase::CleaningUp.to_string(), "cleaning_up");
    }
}
