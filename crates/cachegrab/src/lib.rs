//! # cachegrab engine
//!
//! Recovers response bodies from an HTTP proxy's disk cache without running
//! the proxy.
//!
//! A run has two sequential stages:
//!
//! 1. [`CacheWalker`] visits every file under the cache root. Cheap filters
//!    that need only the file path and `stat` data run first; the survivors
//!    are parsed by a [`CacheIndex`] and checked against the remaining
//!    filters.
//! 2. [`Extractor`] copies the matched bodies to `<output>/<host>/<file>`,
//!    skipping files that already exist.
//!
//! Filters are described by a [`FilterSpec`] built from `kind:value`
//! clauses (`size`, `host`, `path`, `ctype`, `mtime`, `age`).
//!
//! ```no_run
//! use cachegrab_engine::{
//!     CacheWalker, Extractor, ExtractorConfig, FilterSpec, PolipoIndex, WalkerConfig,
//! };
//!
//! # fn main() -> cachegrab_engine::Result<()> {
//! let filter = FilterSpec::from_clauses(["size:+2k", "host:example.com"])?;
//! let walker = CacheWalker::new(WalkerConfig::new("/var/cache/polipo"), &filter, PolipoIndex);
//! let extractor = Extractor::new(ExtractorConfig::new("recovered"));
//! extractor.check_output_root()?;
//!
//! let matched = walker.walk()?;
//! let stats = extractor.extract_all(matched.objects);
//! println!("{stats}");
//! # Ok(())
//! # }
//! ```

pub mod age;
pub mod config;
pub mod error;
pub mod extractor;
pub mod filter;
pub mod index;
pub mod location;
pub mod progress;
pub mod size;
pub mod walker;

pub use config::CacheConfig;
pub use error::{GrabError, IndexError, Result};
pub use extractor::{
    ExtractStats, ExtractionOutcome, ExtractionStatus, Extractor, ExtractorConfig,
};
pub use filter::{Bounds, FilterClause, FilterSpec, Modifier};
pub use index::{CacheIndex, CacheObject, PolipoIndex};
pub use progress::{OnProgress, ProgressEvent};
pub use size::{format_bytes, parse_size};
pub use walker::{CacheWalker, WalkOutput, WalkStats, WalkerConfig};
