//! Upload planning: one request or a fan-out of chunks

use serde::Serialize;
use tracing::{debug, warn};

/// Upper bound on concurrent chunk uploads (and on compose sources)
pub const MAX_PARALLELISM: usize = 32;

const MIB_SHIFT: u32 = 20;

/// Convert a threshold given in MiB to bytes; zero or negative disables chunking
pub fn threshold_from_mebibytes(mebibytes: i64) -> i64 {
    if mebibytes <= 0 {
        0
    } else {
        mebibytes.saturating_mul(1 << MIB_SHIFT)
    }
}

/// Byte range of the local file handled by one chunk worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChunkRange {
    pub index: usize,
    pub offset: u64,
    pub length: u64,
}

impl ChunkRange {
    /// Exclusive end offset
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// How one file is sent to the store.
///
/// `chunks` tile `[0, file_size)` in order. A single-part plan has exactly
/// one chunk covering the whole file (possibly empty).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferPlan {
    file_size: u64,
    chunk_size: u64,
    chunks: Vec<ChunkRange>,
    clamped: bool,
}

impl TransferPlan {
    fn single(file_size: u64) -> Self {
        Self {
            file_size,
            chunk_size: file_size,
            chunks: vec![ChunkRange {
                index: 0,
                offset: 0,
                length: file_size,
            }],
            clamped: false,
        }
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Number of concurrent chunk uploads; 1 means a single request
    pub fn thread_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_parallel(&self) -> bool {
        self.thread_count() > 1
    }

    /// Whether the requested chunk size was overridden by the parallelism cap
    pub fn was_clamped(&self) -> bool {
        self.clamped
    }

    pub fn chunks(&self) -> &[ChunkRange] {
        &self.chunks
    }

    /// Name of the intermediate object for chunk `index`
    pub fn part_key(destination: &str, index: usize) -> String {
        format!("{}.part{}", destination, index)
    }

    /// Intermediate object names in plan order; empty for a single-part plan
    pub fn part_keys(&self, destination: &str) -> Vec<String> {
        if !self.is_parallel() {
            return Vec::new();
        }
        self.chunks
            .iter()
            .map(|chunk| Self::part_key(destination, chunk.index))
            .collect()
    }
}

/// Computes [`TransferPlan`]s under a parallelism cap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferPlanner {
    max_parallelism: usize,
}

impl Default for TransferPlanner {
    fn default() -> Self {
        Self {
            max_parallelism: MAX_PARALLELISM,
        }
    }
}

impl TransferPlanner {
    /// Planner with a custom cap, clamped to `1..=MAX_PARALLELISM`
    pub fn new(max_parallelism: usize) -> Self {
        Self {
            max_parallelism: max_parallelism.clamp(1, MAX_PARALLELISM),
        }
    }

    pub fn max_parallelism(&self) -> usize {
        self.max_parallelism
    }

    /// Plan the upload of `file_size` bytes with chunks of `threshold_bytes`.
    ///
    /// A threshold of zero or less disables chunking. When the file would need
    /// more chunks than the cap allows, it is split into exactly `cap` chunks
    /// of at most `ceil(file_size / cap)` bytes and a warning is logged.
    pub fn plan(&self, file_size: u64, threshold_bytes: i64) -> TransferPlan {
        if threshold_bytes <= 0 || file_size == 0 {
            debug!(file_size, threshold_bytes, "planning single-part upload");
            return TransferPlan::single(file_size);
        }

        let max = self.max_parallelism as u64;
        let threads = file_size.div_ceil(threshold_bytes as u64);

        if threads <= 1 {
            debug!(file_size, threshold_bytes, "file fits in one chunk, planning single-part upload");
            return TransferPlan::single(file_size);
        }

        let (chunk_size, chunks, clamped) = if threads > max {
            // file_size > max here, so every chunk gets at least one byte
            let chunk_size = file_size.div_ceil(max);
            warn!(
                max_parallelism = max,
                chunk_mib = chunk_size >> MIB_SHIFT,
                chunk_bytes = chunk_size,
                "only up to {} parallel uploads are supported; parallel_upload_threshold is ignored",
                max
            );
            (chunk_size, balanced_chunks(file_size, max), true)
        } else {
            let chunk_size = threshold_bytes as u64;
            (chunk_size, fixed_chunks(file_size, chunk_size, threads), false)
        };

        debug!(file_size, chunk_size, threads = chunks.len(), "planning parallel upload");

        TransferPlan {
            file_size,
            chunk_size,
            chunks,
            clamped,
        }
    }
}

/// `threads` chunks of `chunk_size` bytes; the last one takes the remainder
fn fixed_chunks(file_size: u64, chunk_size: u64, threads: u64) -> Vec<ChunkRange> {
    (0..threads)
        .map(|i| {
            let offset = i * chunk_size;
            let length = if i + 1 == threads {
                file_size - offset
            } else {
                chunk_size
            };
            ChunkRange {
                index: i as usize,
                offset,
                length,
            }
        })
        .collect()
}

/// Exactly `threads` chunks whose lengths differ by at most one byte
fn balanced_chunks(file_size: u64, threads: u64) -> Vec<ChunkRange> {
    let base = file_size / threads;
    let longer = file_size % threads;
    let mut offset = 0;
    (0..threads)
        .map(|i| {
            let length = if i < longer { base + 1 } else { base };
            let chunk = ChunkRange {
                index: i as usize,
                offset,
                length,
            };
            offset += length;
            chunk
        })
        .collect()
}

/// Plan with an explicit cap; see [`TransferPlanner::plan`]
pub fn plan(file_size: u64, threshold_bytes: i64, max_parallelism: usize) -> TransferPlan {
    TransferPlanner::new(max_parallelism).plan(file_size, threshold_bytes)
}
