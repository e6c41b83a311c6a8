//! # Cache Walker
//!
//! One depth-first pass over the cache root. Every regular file is first
//! screened with the cheap filters (host from its relative path, storage
//! size, filesystem mtime); only survivors are handed to the
//! [`CacheIndex`], and the parsed objects then go through the expensive
//! filters.

use std::fmt::{self, Display};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;

use crate::error::{GrabError, Result};
use crate::filter::FilterSpec;
use crate::index::{CacheIndex, CacheObject};
use crate::progress::{OnProgress, ProgressEvent};

/// Counters collected during one walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    /// Regular files visited.
    pub found: u64,
    /// Files that passed the cheap filters and were read by the index.
    pub matched_cheap: u64,
    /// Objects that passed every filter.
    pub matched: u64,
}

impl WalkStats {
    pub fn skipped(&self) -> u64 {
        self.found - self.matched_cheap
    }
}

impl Display for WalkStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} objects found ({} skipped), {} matched",
            self.found,
            self.skipped(),
            self.matched
        )
    }
}

/// Result of a walk: the matched objects in discovery order.
#[derive(Debug, Default)]
pub struct WalkOutput {
    pub objects: Vec<CacheObject>,
    pub stats: WalkStats,
}

#[derive(Debug, Clone)]
pub struct WalkerConfig {
    /// Root directory of the cache.
    pub cache_root: PathBuf,

    /// Follow symbolic links while walking
    pub follow_links: bool,
}

impl WalkerConfig {
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
            follow_links: true,
        }
    }
}

pub struct CacheWalker<'a, I> {
    config: WalkerConfig,
    filter: &'a FilterSpec,
    index: I,
    on_progress: Option<OnProgress>,
}

impl<'a, I: CacheIndex> CacheWalker<'a, I> {
    pub fn new(config: WalkerConfig, filter: &'a FilterSpec, index: I) -> Self {
        Self {
            config,
            filter,
            index,
            on_progress: None,
        }
    }

    pub fn with_progress(mut self, on_progress: Option<OnProgress>) -> Self {
        self.on_progress = on_progress;
        self
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(on_progress) = &self.on_progress {
            on_progress(event);
        }
    }

    /// Check that the cache root is usable before anything is visited.
    pub fn check_root(&self) -> Result<()> {
        let root = &self.config.cache_root;
        if root.as_os_str().is_empty() {
            return Err(GrabError::config(
                "Can't find cache root. Try to specify it manually ('-r' option)",
            ));
        }

        let metadata = std::fs::metadata(root).map_err(|e| {
            GrabError::config(format!("Cache root {}: {e}", root.display()))
        })?;
        if !metadata.is_dir() {
            return Err(GrabError::config(format!(
                "Cache root {} is not a directory",
                root.display()
            )));
        }

        std::fs::read_dir(root).map_err(|e| {
            GrabError::config(format!("Cache root {}: {e}", root.display()))
        })?;
        Ok(())
    }

    /// Walk the cache root and collect every object matching the filter.
    pub fn walk(&self) -> Result<WalkOutput> {
        self.check_root()?;

        let root = &self.config.cache_root;
        info!("Reading cache {}", root.display());
        self.emit(ProgressEvent::WalkStarted { root: root.clone() });

        let mut output = WalkOutput::default();

        for entry in WalkDir::new(root).follow_links(self.config.follow_links) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| root.clone());
                    warn!("Skipping {}: {}", path.display(), err);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            output.stats.found += 1;
            self.emit(ProgressEvent::FileVisited {
                found: output.stats.found,
            });

            let path = entry.path();
            let metadata = match entry.metadata() {
                Ok(metadata) => Some(metadata),
                Err(e) => {
                    debug!(
                        "Cannot stat {}, size and mtime filters not applied: {}",
                        path.display(),
                        e
                    );
                    None
                }
            };

            if !self.passes_cheap_filters(root, path, metadata.as_ref()) {
                continue;
            }
            let mtime_checked = metadata.as_ref().and_then(unix_mtime).is_some();
            output.stats.matched_cheap += 1;

            let object = match self.index.read_object(path, metadata.as_ref()) {
                Ok(Some(object)) => object,
                Ok(None) => {
                    debug!("Not a cache object: {}", path.display());
                    continue;
                }
                Err(e) => {
                    debug!("Cannot read cache object {}: {}", path.display(), e);
                    continue;
                }
            };

            if object.is_directory() {
                trace!("Skipping directory entry '{}'", object.location);
                continue;
            }

            trace!("Analyzing: '{}'", object.location);
            if !self.passes_object_filters(&object, mtime_checked) {
                continue;
            }

            debug!("Matched: {}", object.location);
            output.stats.matched += 1;
            output.objects.push(object);
        }

        info!("Reading cache ...done. {}", output.stats);
        self.emit(ProgressEvent::WalkFinished {
            stats: output.stats,
        });

        Ok(output)
    }

    fn passes_cheap_filters(&self, root: &Path, path: &Path, metadata: Option<&Metadata>) -> bool {
        if !self.filter.hosts().is_empty() {
            let relative = relative_location(root, path);
            if !self.filter.matches_host(&relative) {
                trace!("Not matched by any hostname filter: {}", path.display());
                return false;
            }
        }

        let Some(metadata) = metadata else {
            return true;
        };

        if !self.filter.admits_storage_size(metadata.len()) {
            trace!("Storage file smaller than minimum size: {}", path.display());
            return false;
        }

        if let Some(mtime) = unix_mtime(metadata) {
            if !self.filter.matches_mtime(mtime) {
                trace!("Not matched by modification time: {}", path.display());
                return false;
            }
        }

        true
    }

    /// Filters that need the parsed object. The object's own time stands in
    /// when the filesystem mtime was not available to the cheap filters.
    fn passes_object_filters(&self, object: &CacheObject, mtime_checked: bool) -> bool {
        if !self.filter.matches_object(object) {
            trace!("Not matched by size, path or content type: '{}'", object.location);
            return false;
        }

        if !mtime_checked && !self.filter.matches_mtime(object.modified_time) {
            trace!("Not matched by modification time: '{}'", object.location);
            return false;
        }

        true
    }
}

/// Path of `path` below `root`, with `/` separators.
fn relative_location(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn unix_mtime(metadata: &Metadata) -> Option<i64> {
    let modified = metadata.modified().ok()?;
    let secs = match modified.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => i64::try_from(elapsed.as_secs()).ok()?,
        Err(before) => -i64::try_from(before.duration().as_secs()).ok()?,
    };
    Some(secs)
}
