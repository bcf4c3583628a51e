//! In-memory object store
//!
//! Keeps every bucket in process memory with GCS-like semantics: each write
//! gets a fresh generation, versioned buckets retain noncurrent generations,
//! compose concatenates existing objects. Failure injection and a call log
//! make it usable as a test double for the coordinator and the catalog.

use super::{ObjectStore, ReadStream, StoreError, StoreResult, UploadBody, UploadOptions};
use crate::types::Generation;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::AsyncReadExt;

/// One recorded collaborator call, in the order calls completed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    ListObjectKeys { bucket: String, prefix: String },
    ListGenerations { bucket: String, key: String },
    IsVersioningEnabled { bucket: String },
    Upload { bucket: String, key: String, bytes: u64 },
    Compose { bucket: String, destination: String, parts: Vec<String> },
    Delete { bucket: String, key: String, generation: Option<Generation> },
    Download { bucket: String, key: String, generation: Option<Generation> },
}

#[derive(Debug, Clone)]
struct StoredObject {
    generation: Generation,
    data: Bytes,
    options: UploadOptions,
}

#[derive(Debug, Default)]
struct Bucket {
    versioned: bool,
    /// Generations per key, oldest first; the last one is live
    objects: BTreeMap<String, Vec<StoredObject>>,
}

#[derive(Debug, Default)]
struct State {
    buckets: HashMap<String, Bucket>,
    next_generation: i64,
    calls: Vec<StoreCall>,
    failing_uploads: HashSet<String>,
    failing_deletes: HashSet<String>,
    fail_compose: bool,
    upload_delay: Option<Duration>,
}

impl State {
    fn bucket(&self, name: &str) -> StoreResult<&Bucket> {
        self.buckets
            .get(name)
            .ok_or_else(|| StoreError::BucketNotFound(name.to_string()))
    }

    fn bucket_mut(&mut self, name: &str) -> StoreResult<&mut Bucket> {
        self.buckets
            .get_mut(name)
            .ok_or_else(|| StoreError::BucketNotFound(name.to_string()))
    }

    fn allocate_generation(&mut self) -> StoreResult<Generation> {
        self.next_generation = self
            .next_generation
            .checked_add(1)
            .ok_or_else(|| StoreError::Other("generation counter overflow".to_string()))?;
        Generation::from_raw(self.next_generation)
            .ok_or_else(|| StoreError::Other("generation counter wrapped to zero".to_string()))
    }

    fn write(&mut self, bucket: &str, key: &str, data: Bytes, options: UploadOptions) -> StoreResult<Generation> {
        self.bucket(bucket)?;
        let generation = self.allocate_generation()?;
        let bucket = self.bucket_mut(bucket)?;
        let object = StoredObject {
            generation,
            data,
            options,
        };
        let history = bucket.objects.entry(key.to_string()).or_default();
        if !bucket.versioned {
            history.clear();
        }
        history.push(object);
        Ok(generation)
    }
}

/// Object store kept entirely in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: StoreCall) {
        self.state().calls.push(call);
    }

    /// Create (or reset the versioning flag of) a bucket
    pub fn create_bucket(&self, name: &str, versioned: bool) {
        let mut state = self.state();
        state.buckets.entry(name.to_string()).or_default().versioned = versioned;
    }

    /// Store `data` under `key`, returning the assigned generation.
    ///
    /// Seeding helper: not recorded in the call log. The bucket is created
    /// (unversioned) if it does not exist.
    ///
    /// # Panics
    ///
    /// Panics if the generation counter overflows.
    pub fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> Generation {
        let mut state = self.state();
        state.buckets.entry(bucket.to_string()).or_default();
        state
            .write(bucket, key, Bytes::copy_from_slice(data), UploadOptions::default())
            .expect("seeding an in-memory bucket")
    }

    /// Content of the live object, or of one generation
    pub fn object_data(&self, bucket: &str, key: &str, generation: Option<Generation>) -> Option<Bytes> {
        let state = self.state();
        let history = state.buckets.get(bucket)?.objects.get(key)?;
        find_generation(history, generation).map(|o| o.data.clone())
    }

    /// Upload options the live object was written with
    pub fn object_options(&self, bucket: &str, key: &str) -> Option<UploadOptions> {
        let state = self.state();
        let history = state.buckets.get(bucket)?.objects.get(key)?;
        history.last().map(|o| o.options.clone())
    }

    /// Live keys in the bucket, sorted
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let state = self.state();
        state
            .buckets
            .get(bucket)
            .map(|b| b.objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Make every upload to `key` fail with a network error
    pub fn fail_uploads_to(&self, key: &str) {
        self.state().failing_uploads.insert(key.to_string());
    }

    /// Make every delete of `key` fail with a service error
    pub fn fail_deletes_of(&self, key: &str) {
        self.state().failing_deletes.insert(key.to_string());
    }

    /// Make compose requests fail
    pub fn fail_compose(&self) {
        self.state().fail_compose = true;
    }

    /// Delay every successful upload, to keep chunk workers in flight
    pub fn set_upload_delay(&self, delay: Duration) {
        self.state().upload_delay = Some(delay);
    }

    /// Calls recorded so far, in completion order
    pub fn calls(&self) -> Vec<StoreCall> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }
}

fn find_generation(history: &[StoredObject], generation: Option<Generation>) -> Option<&StoredObject> {
    match generation {
        Some(generation) => history.iter().find(|o| o.generation == generation),
        None => history.last(),
    }
}

fn not_found(bucket: &str, key: &str) -> StoreError {
    StoreError::NotFound {
        bucket: bucket.to_string(),
        key: key.to_string(),
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn list_object_keys(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<String>> {
        let keys: Vec<String> = {
            let state = self.state();
            let source = state.bucket(bucket)?;
            let keys = source
                .objects
                .keys()
                .filter(|key| key.starts_with(prefix))
                .cloned()
                .collect();
            keys
        };
        self.record(StoreCall::ListObjectKeys {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
        });
        Ok(keys)
    }

    async fn list_generations(&self, bucket: &str, key: &str) -> StoreResult<Vec<Generation>> {
        let generations: Vec<Generation> = {
            let state = self.state();
            let source = state.bucket(bucket)?;
            let generations = source
                .objects
                .get(key)
                .map(|history| history.iter().map(|o| o.generation).collect())
                .unwrap_or_default();
            generations
        };
        self.record(StoreCall::ListGenerations {
            bucket: bucket.to_string(),
            key: key.to_string(),
        });
        Ok(generations)
    }

    async fn is_versioning_enabled(&self, bucket: &str) -> StoreResult<bool> {
        let versioned = self.state().bucket(bucket)?.versioned;
        self.record(StoreCall::IsVersioningEnabled {
            bucket: bucket.to_string(),
        });
        Ok(versioned)
    }

    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        options: &UploadOptions,
        mut body: UploadBody,
    ) -> StoreResult<Option<Generation>> {
        let (failing, delay) = {
            let state = self.state();
            (state.failing_uploads.contains(key), state.upload_delay)
        };
        if failing {
            return Err(StoreError::Network(format!("injected upload failure for {}", key)));
        }
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut buffer = Vec::new();
        body.read_to_end(&mut buffer).await?;
        let bytes = buffer.len() as u64;

        let generation = self.state().write(bucket, key, Bytes::from(buffer), options.clone())?;
        self.record(StoreCall::Upload {
            bucket: bucket.to_string(),
            key: key.to_string(),
            bytes,
        });
        Ok(Some(generation))
    }

    async fn compose(&self, bucket: &str, destination: &str, parts: &[String]) -> StoreResult<()> {
        {
            let mut state = self.state();
            if state.fail_compose {
                return Err(StoreError::Service {
                    code: "503".to_string(),
                    message: "injected compose failure".to_string(),
                });
            }

            let source = state.bucket(bucket)?;
            let mut combined = Vec::new();
            let mut options = UploadOptions::default();
            for (index, part) in parts.iter().enumerate() {
                let object = source
                    .objects
                    .get(part)
                    .and_then(|history| history.last())
                    .ok_or_else(|| not_found(bucket, part))?;
                if index == 0 {
                    options = object.options.clone();
                }
                combined.extend_from_slice(&object.data);
            }
            state.write(bucket, destination, Bytes::from(combined), options)?;
        }
        self.record(StoreCall::Compose {
            bucket: bucket.to_string(),
            destination: destination.to_string(),
            parts: parts.to_vec(),
        });
        Ok(())
    }

    async fn delete_object(
        &self,
        bucket: &str,
        key: &str,
        generation: Option<Generation>,
    ) -> StoreResult<()> {
        self.record(StoreCall::Delete {
            bucket: bucket.to_string(),
            key: key.to_string(),
            generation,
        });

        let mut state = self.state();
        if state.failing_deletes.contains(key) {
            return Err(StoreError::Service {
                code: "500".to_string(),
                message: format!("injected delete failure for {}", key),
            });
        }

        let objects = &mut state.bucket_mut(bucket)?.objects;
        let history = objects.get_mut(key).ok_or_else(|| not_found(bucket, key))?;
        match generation {
            Some(generation) => {
                let position = history
                    .iter()
                    .position(|o| o.generation == generation)
                    .ok_or_else(|| not_found(bucket, key))?;
                history.remove(position);
            }
            None => {
                history.pop();
            }
        }
        if history.is_empty() {
            objects.remove(key);
        }
        Ok(())
    }

    async fn download_object(
        &self,
        bucket: &str,
        key: &str,
        generation: Option<Generation>,
    ) -> StoreResult<ReadStream> {
        let data = {
            let state = self.state();
            let history = state
                .bucket(bucket)?
                .objects
                .get(key)
                .ok_or_else(|| not_found(bucket, key))?;
            let object = find_generation(history, generation).ok_or_else(|| not_found(bucket, key))?;
            let data = object.data.clone();
            data
        };
        self.record(StoreCall::Download {
            bucket: bucket.to_string(),
            key: key.to_string(),
            generation,
        });

        // Split into a few frames so consumers see a real stream
        let frames: Vec<std::io::Result<Bytes>> = data
            .chunks(64 * 1024)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        Ok(stream::iter(frames).boxed())
    }

    fn store_name(&self) -> &str {
        "memory"
    }
}
