//! # Extractor
//!
//! Copies the body of every matched object to `<output>/<host>/<filename>`.
//! Destination files are created exclusively, so an existing file is taken
//! as already extracted and a repeated run writes nothing new. Failures are
//! confined to the object they occur on.

use std::fmt::{self, Display};
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{GrabError, Result};
use crate::index::CacheObject;
use crate::location::{extract_filename, extract_host, is_usable_filename};
use crate::progress::{OnProgress, ProgressEvent};
use crate::size::format_bytes;

/// Default copy buffer size.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Directory name used for hosts that cannot be a path component.
const FALLBACK_HOST_DIR: &str = "_";

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Directory the `<host>/<filename>` tree is created under
    pub output_root: PathBuf,

    /// Size of the copy buffer in bytes
    pub chunk_size: usize,
}

impl ExtractorConfig {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

/// What happened to one object.
#[derive(Debug)]
pub enum ExtractionOutcome {
    Extracted { path: PathBuf, bytes: u64 },
    SkippedExists(PathBuf),
    SkippedError(String),
}

impl ExtractionOutcome {
    pub fn status(&self) -> ExtractionStatus {
        match self {
            ExtractionOutcome::Extracted { .. } => ExtractionStatus::Extracted,
            ExtractionOutcome::SkippedExists(_) => ExtractionStatus::SkippedExists,
            ExtractionOutcome::SkippedError(_) => ExtractionStatus::SkippedError,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStatus {
    Extracted,
    SkippedExists,
    SkippedError,
}

/// Counters collected during extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractStats {
    pub extracted: u64,
    pub skipped_exists: u64,
    pub skipped_error: u64,
    pub bytes_written: u64,
}

impl ExtractStats {
    fn record(&mut self, outcome: &ExtractionOutcome) {
        match outcome {
            ExtractionOutcome::Extracted { bytes, .. } => {
                self.extracted += 1;
                self.bytes_written += bytes;
            }
            ExtractionOutcome::SkippedExists(_) => self.skipped_exists += 1,
            ExtractionOutcome::SkippedError(_) => self.skipped_error += 1,
        }
    }
}

impl Display for ExtractStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} extracted ({}), {} already present, {} failed",
            self.extracted,
            format_bytes(self.bytes_written),
            self.skipped_exists,
            self.skipped_error
        )
    }
}

pub struct Extractor {
    config: ExtractorConfig,
    on_progress: Option<OnProgress>,
}

impl Extractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self {
            config,
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

    /// Check that the output root exists and accepts new files.
    pub fn check_output_root(&self) -> Result<()> {
        let root = &self.config.output_root;
        let metadata = fs::metadata(root).map_err(|e| {
            GrabError::config(format!("Output directory {}: {e}", root.display()))
        })?;
        if !metadata.is_dir() {
            return Err(GrabError::config(format!(
                "Output directory {} is not a directory",
                root.display()
            )));
        }

        let probe = root.join(format!(".cachegrab-probe-{}", std::process::id()));
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&probe)
            .map_err(|e| {
                GrabError::config(format!("Output directory {}: {e}", root.display()))
            })?;
        if let Err(e) = fs::remove_file(&probe) {
            debug!("Failed to remove probe file {}: {}", probe.display(), e);
        }
        Ok(())
    }

    /// Extract every object in order and return the counters.
    pub fn extract_all(&self, objects: Vec<CacheObject>) -> ExtractStats {
        let mut stats = ExtractStats::default();
        self.emit(ProgressEvent::ExtractStarted {
            total: objects.len(),
        });

        for object in objects {
            let outcome = self.extract(&object);
            stats.record(&outcome);
            self.emit(ProgressEvent::ObjectFinished {
                location: object.location,
                status: outcome.status(),
            });
        }

        info!("Extracted: {}", stats);
        self.emit(ProgressEvent::ExtractFinished { stats });
        stats
    }

    /// Where `object` is written to, or `None` when no usable file name exists.
    pub fn destination(&self, object: &CacheObject) -> Option<PathBuf> {
        let host = match extract_host(&object.location) {
            "." | ".." => FALLBACK_HOST_DIR,
            host => host,
        };
        let filename = output_filename(object)?;
        Some(self.config.output_root.join(host).join(filename))
    }

    /// Extract one object. Never fails the run; problems are reported in
    /// the outcome.
    pub fn extract(&self, object: &CacheObject) -> ExtractionOutcome {
        let Some(destination) = self.destination(object) else {
            warn!("No usable file name for '{}'", object.location);
            return ExtractionOutcome::SkippedError("no usable file name".to_string());
        };

        if let Some(host_dir) = destination.parent() {
            if let Err(e) = ensure_dir(host_dir) {
                warn!("Cannot create {}: {}", host_dir.display(), e);
                return ExtractionOutcome::SkippedError(e.to_string());
            }
        }

        let mut output = match create_exclusive(&destination) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!("File exists, skipped: {}", destination.display());
                return ExtractionOutcome::SkippedExists(destination);
            }
            Err(e) => {
                warn!("Cannot create {}: {}", destination.display(), e);
                return ExtractionOutcome::SkippedError(e.to_string());
            }
        };

        match self.copy_body(object, &mut output) {
            Ok(bytes) => {
                debug!(
                    "Extracted '{}' to {} ({} bytes)",
                    object.location,
                    destination.display(),
                    bytes
                );
                ExtractionOutcome::Extracted {
                    path: destination,
                    bytes,
                }
            }
            Err(e) => {
                warn!(
                    "Failed to extract '{}' from {}: {}",
                    object.location,
                    object.storage_path.display(),
                    e
                );
                drop(output);
                // A partial file would otherwise be taken as extracted next time.
                if let Err(remove_err) = fs::remove_file(&destination) {
                    debug!(
                        "Failed to remove partial file {}: {}",
                        destination.display(),
                        remove_err
                    );
                }
                ExtractionOutcome::SkippedError(e.to_string())
            }
        }
    }

    /// Stream the body of `object` into `output`.
    ///
    /// Opening, seeking or reading the source aborts the copy. Write errors
    /// are logged and the copy continues with the next chunk.
    fn copy_body(&self, object: &CacheObject, output: &mut File) -> io::Result<u64> {
        let mut input = File::open(&object.storage_path)?;
        input.seek(SeekFrom::Start(object.body_offset))?;

        let mut buf = vec![0u8; self.config.chunk_size];
        let mut written = 0u64;

        loop {
            let bytes_read = match input.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };

            match output.write_all(&buf[..bytes_read]) {
                Ok(()) => written += bytes_read as u64,
                Err(e) => warn!(
                    "Short write to output for '{}': {}",
                    object.location, e
                ),
            }
        }

        output.flush()?;
        Ok(written)
    }
}

/// File name for `object`: the last URL segment, or the storage file name
/// when the URL does not provide a usable one.
fn output_filename(object: &CacheObject) -> Option<&str> {
    if let Some(name) = extract_filename(&object.location) {
        if is_usable_filename(name) {
            return Some(name);
        }
        debug!(
            "Filename from '{}' is unusable, using the storage file name",
            object.location
        );
    }

    object
        .storage_path
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| is_usable_filename(name))
}

/// Create `dir` unless it already exists. Tolerates a concurrent creator.
fn ensure_dir(dir: &Path) -> io::Result<()> {
    match fs::create_dir(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists && dir.is_dir() => Ok(()),
        Err(e) => Err(e),
    }
}

fn create_exclusive(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o644);
    }
    options.open(path)
}
