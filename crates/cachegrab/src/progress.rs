use std::path::PathBuf;
use std::sync::Arc;

use crate::extractor::{ExtractStats, ExtractionStatus};
use crate::walker::WalkStats;

/// Events emitted while walking the cache and extracting objects.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// The walk over the cache root has begun.
    WalkStarted {
        /// The cache root being walked.
        root: PathBuf,
    },
    /// A regular file was visited.
    FileVisited {
        /// Number of files visited so far.
        found: u64,
    },
    /// The walk is complete.
    WalkFinished { stats: WalkStats },
    /// Extraction of the matched objects has begun.
    ExtractStarted {
        /// Number of objects queued for extraction.
        total: usize,
    },
    /// One object has been handled.
    ObjectFinished {
        /// Location of the object.
        location: String,
        /// What happened to it.
        status: ExtractionStatus,
    },
    /// Extraction is complete.
    ExtractFinished { stats: ExtractStats },
}

/// A callback function for progress updates.
pub type OnProgress = Arc<dyn Fn(ProgressEvent) + Send + Sync>;
