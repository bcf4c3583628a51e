/*!
 * Version catalog: what versions exist in a bucket, and which one to fetch
 *
 * Pattern mode lists keys under the literal prefix of the naming pattern,
 * extracts a version token from each match and orders them. Versioned-file
 * mode works on one fixed key and the generations the bucket retains for it.
 */

use futures::TryStreamExt;
use std::path::Path;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::config::{RequestedVersion, Source, SourceMode};
use crate::error::{Error, Result};
use crate::store::ObjectStore;
use crate::types::{Generation, ObjectRef, VersionRef};
use crate::version::{self, Extraction, VersionPattern};

/// Read-side view of a bucket through an [`ObjectStore`]
#[derive(Clone)]
pub struct VersionCatalog {
    store: Arc<dyn ObjectStore>,
}

impl VersionCatalog {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Every key matching `pattern`, ascending by version
    pub async fn versions(&self, bucket: &str, pattern: &VersionPattern) -> Result<Vec<Extraction>> {
        let prefix = pattern.prefix_hint();
        let keys = self.store.list_object_keys(bucket, &prefix).await?;
        let listed = keys.len();

        let mut extractions: Vec<Extraction> =
            keys.iter().filter_map(|key| pattern.extract(key)).collect();
        version::sort_extractions(&mut extractions);

        debug!(
            bucket,
            prefix = %prefix,
            listed,
            matched = extractions.len(),
            "extracted versions"
        );
        Ok(extractions)
    }

    /// The key with the greatest version
    pub async fn latest(&self, bucket: &str, pattern: &VersionPattern) -> Result<Extraction> {
        let extractions = self.versions(bucket, pattern).await?;
        version::latest(&extractions)
            .cloned()
            .ok_or_else(|| Error::NoCandidates {
                pattern: pattern.as_str().to_string(),
            })
    }

    /// Generations retained for `key`, in the order the store reports them
    pub async fn generations(&self, bucket: &str, key: &str) -> Result<Vec<Generation>> {
        self.require_versioning(bucket).await?;
        let generations = self.store.list_generations(bucket, key).await?;
        debug!(bucket, key, count = generations.len(), "listed generations");
        Ok(generations)
    }

    /// Decide which object a fetch should download.
    ///
    /// The source is validated before the store is touched. In pattern mode a
    /// requested path is used as is; otherwise the latest key is chosen. In
    /// versioned-file mode the bucket must have versioning enabled; no
    /// requested generation means the live object.
    pub async fn resolve(&self, source: &Source, requested: &RequestedVersion) -> Result<ObjectRef> {
        match source.validate()? {
            SourceMode::Pattern(pattern) => {
                let key = match requested.requested_path() {
                    Some(path) => path.to_string(),
                    None => self.latest(&source.bucket, &pattern).await?.key,
                };
                info!(bucket = %source.bucket, key = %key, "resolved object");
                Ok(ObjectRef::new(&source.bucket, key))
            }
            SourceMode::VersionedFile(key) => {
                let generation = requested.generation_value()?;
                self.require_versioning(&source.bucket).await?;
                info!(
                    bucket = %source.bucket,
                    key = %key,
                    generation = Generation::to_raw(generation),
                    "resolved versioned object"
                );
                Ok(ObjectRef::new(&source.bucket, key).with_generation(generation))
            }
        }
    }

    /// Versions newer than or equal to `current`, oldest first.
    ///
    /// Without a usable current version only the latest one is reported.
    pub async fn check(&self, source: &Source, current: &RequestedVersion) -> Result<Vec<VersionRef>> {
        match source.validate()? {
            SourceMode::Pattern(pattern) => {
                let extractions = self.versions(&source.bucket, &pattern).await?;
                let current_token = current
                    .requested_path()
                    .and_then(|path| pattern.extract(path))
                    .map(|extraction| extraction.token);

                let selected: Vec<&Extraction> = match current_token {
                    Some(token) => extractions.iter().filter(|e| e.token >= token).collect(),
                    None => version::latest(&extractions).into_iter().collect(),
                };

                Ok(selected
                    .into_iter()
                    .map(|e| VersionRef::Path { path: e.key.clone() })
                    .collect())
            }
            SourceMode::VersionedFile(key) => {
                let current_generation = current.generation_value()?;
                let generations = self.generations(&source.bucket, &key).await?;

                let selected: Vec<Generation> = match current_generation {
                    Some(current) => generations.into_iter().filter(|g| *g >= current).collect(),
                    None => generations.last().copied().into_iter().collect(),
                };

                Ok(selected
                    .into_iter()
                    .map(|generation| VersionRef::Generation { generation })
                    .collect())
            }
        }
    }

    /// Download `object` to `local_path`, returning the bytes written.
    ///
    /// Parent directories are created. A pinned generation requires a
    /// versioned bucket.
    pub async fn download(&self, object: &ObjectRef, local_path: &Path) -> Result<u64> {
        if object.generation.is_some() {
            self.require_versioning(&object.bucket).await?;
        }

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut stream = self
            .store
            .download_object(&object.bucket, &object.key, object.generation)
            .await?;
        let mut file = File::create(local_path).await?;
        let mut written = 0u64;

        while let Some(chunk) = stream.try_next().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        info!(url = %object, bytes = written, path = %local_path.display(), "downloaded object");
        Ok(written)
    }

    async fn require_versioning(&self, bucket: &str) -> Result<()> {
        if self.store.is_versioning_enabled(bucket).await? {
            Ok(())
        } else {
            Err(Error::NotVersioned {
                bucket: bucket.to_string(),
            })
        }
    }
}

impl std::fmt::Debug for VersionCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionCatalog")
            .field("store", &self.store.store_name())
            .finish()
    }
}
