//! Version extraction and ordering
//!
//! Object keys such as `file-1.5.6-build.100.tgz` carry their version inside
//! the name. A [`VersionPattern`] captures that part as a [`VersionToken`],
//! and tokens are ordered by digit/non-digit runs so that `build.100` comes
//! after `build.9`, which plain string order gets wrong.
//!
//! ```
//! use gcs_resource::version::{latest, VersionPattern};
//!
//! let pattern = VersionPattern::new(r"file-(.*)\.tgz").unwrap();
//! let candidates = ["file-1.5.6-build.10.tgz", "file-1.5.6-build.100.tgz", "file-1.5.6-build.9.tgz"];
//! let extractions = candidates.iter().filter_map(|k| pattern.extract(k)).collect::<Vec<_>>();
//!
//! assert_eq!(latest(&extractions).unwrap().key, "file-1.5.6-build.100.tgz");
//! ```

mod pattern;
mod token;

pub use pattern::{extract, prefix_hint, Extraction, VersionPattern, VERSION_GROUP};
pub use token::{segments, Segment, VersionToken};

use tracing::warn;

/// Sort extractions ascending by version
pub fn sort_extractions(extractions: &mut [Extraction]) {
    extractions.sort();
}

/// The extraction with the greatest version.
///
/// When several keys carry the same token, the lexicographically greatest
/// key wins and the ambiguity is logged.
pub fn latest(extractions: &[Extraction]) -> Option<&Extraction> {
    let winner = extractions.iter().max()?;

    let tied: Vec<&str> = extractions
        .iter()
        .filter(|e| e.token == winner.token && e.key != winner.key)
        .map(|e| e.key.as_str())
        .collect();
    if !tied.is_empty() {
        warn!(
            version = %winner.token,
            chosen = %winner.key,
            others = ?tied,
            "several objects carry the latest version; picking the greatest key"
        );
    }

    Some(winner)
}
