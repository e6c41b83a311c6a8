/// Errors that abort a run before or during the walk.
///
/// Per-object extraction failures are not represented here: the extractor
/// recovers from them locally and only reflects them in its counters.
#[derive(Debug, thiserror::Error)]
pub enum GrabError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Defined filter size too large: {0}")]
    Overflow(String),

    #[error("Cache index error: {0}")]
    Index(#[from] IndexError),
}

impl GrabError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        GrabError::Config(msg.into())
    }
}

/// Errors raised by a [`CacheIndex`](crate::index::CacheIndex) while reading one record.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed cache record: {0}")]
    Malformed(String),
}

pub type Result<T, E = GrabError> = std::result::Result<T, E>;
