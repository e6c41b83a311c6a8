//! # Cache Index
//!
//! The boundary between the walker and the proxy's on-disk record format.
//! The walker hands every file that survives the cheap filters to a
//! [`CacheIndex`], which turns it into a [`CacheObject`] or declines it.

use std::fs::Metadata;
use std::path::{Path, PathBuf};

use crate::error::IndexError;

mod polipo;

pub use self::polipo::PolipoIndex;

/// A stored response located inside one cache file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheObject {
    /// URL the cached response was fetched from.
    pub location: String,
    /// Cache file holding the headers and the body.
    pub storage_path: PathBuf,
    /// Offset of the first body byte within `storage_path`.
    pub body_offset: u64,
    /// Number of body bytes stored.
    pub size: u64,
    /// Modification time in seconds since the epoch.
    pub modified_time: i64,
    pub content_type: Option<String>,
}

impl CacheObject {
    /// Container entries carry no body worth extracting.
    pub fn is_directory(&self) -> bool {
        self.location.is_empty() || self.location.ends_with('/')
    }
}

/// A reader for one cache record format.
pub trait CacheIndex: Send + Sync {
    /// Read the record stored at `path`.
    ///
    /// `metadata` is the `stat` result the walker already holds, if any.
    /// Returns `Ok(None)` when the file is not a cache record.
    fn read_object(
        &self,
        path: &Path,
        metadata: Option<&Metadata>,
    ) -> Result<Option<CacheObject>, IndexError>;
}

impl<T: CacheIndex + ?Sized> CacheIndex for &T {
    fn read_object(
        &self,
        path: &Path,
        metadata: Option<&Metadata>,
    ) -> Result<Option<CacheObject>, IndexError> {
        (**self).read_object(path, metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(location: &str) -> CacheObject {
        CacheObject {
            location: location.to_string(),
            storage_path: PathBuf::from("/cache/h/x"),
            body_offset: 0,
            size: 0,
            modified_time: 0,
            content_type: None,
        }
    }

    #[test]
    fn directory_shaped_locations() {
        assert!(object("").is_directory());
        assert!(object("http://example.com/").is_directory());
        assert!(object("http://example.com/dir/").is_directory());
        assert!(!object("http://example.com/file").is_directory());
    }
}
