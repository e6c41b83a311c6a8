use std::{path::PathBuf, sync::Arc};

use cachegrab_engine::config::{expand_tilde, resolve_cache_root};
use cachegrab_engine::{
    CacheConfig, CacheWalker, Extractor, ExtractorConfig, FilterSpec, OnProgress, PolipoIndex,
    ProgressEvent, WalkerConfig,
};
use clap::Parser;
use indicatif::MultiProgress;
use mimalloc::MiMalloc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

mod cli;
mod error;
mod utils;

use cli::CliArgs;
use error::AppError;
use utils::progress::ProgressManager;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {e}");
        error!(error = ?e, "Application failed");
        std::process::exit(1);
    }
}

fn bootstrap() -> Result<(), AppError> {
    let args = CliArgs::parse();

    init_logging(args.verbosity())?;

    // Filters are validated before anything touches the disk.
    let filter = FilterSpec::from_clauses(&args.filters)?;
    debug!("{filter}");

    let cache_config = load_cache_config(&args)?;
    let cache_root = resolve_cache_root(args.root.as_deref(), cache_config.as_ref());
    debug!("Cache root: {}", cache_root.display());

    let output_root = match args.output {
        Some(dir) => dir,
        None => {
            warn!("No output directory given (-O), extracting to the current directory");
            PathBuf::from("./")
        }
    };

    let multi = MultiProgress::new();
    let progress_manager = if args.show_progress {
        ProgressManager::new(multi)
    } else {
        ProgressManager::new_disabled(multi)
    };
    let on_progress: Option<OnProgress> = if progress_manager.is_disabled() {
        None
    } else {
        Some(Arc::new(move |event: ProgressEvent| progress_manager.handle_event(event)))
    };

    let walker = CacheWalker::new(WalkerConfig::new(cache_root), &filter, PolipoIndex::new())
        .with_progress(on_progress.clone());
    let extractor = Extractor::new(ExtractorConfig::new(output_root)).with_progress(on_progress);

    walker.check_root()?;
    extractor.check_output_root()?;

    let matched = walker.walk()?;
    let walk_stats = matched.stats;
    let extract_stats = extractor.extract_all(matched.objects);

    info!("Done. {walk_stats}; {extract_stats}");
    Ok(())
}

/// Settings from `-c`, or from the first known configuration file when
/// neither `-c` nor `-r` is given.
fn load_cache_config(args: &CliArgs) -> Result<Option<CacheConfig>, AppError> {
    if let Some(path) = &args.config {
        let path = expand_tilde(path);
        let config = CacheConfig::load(&path)?;
        info!("Using configuration file {}", path.display());
        return Ok(Some(config));
    }

    if args.root.is_some() {
        return Ok(None);
    }

    Ok(CacheConfig::discover().map(|(_, config)| config))
}

/// Map the verbosity tier to a log filter. `RUST_LOG` wins when set.
fn init_logging(verbosity: u8) -> Result<(), AppError> {
    let level = match verbosity {
        0 => "error",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(verbosity > 1)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .try_init()
        .map_err(|e| AppError::Initialization(e.to_string()))
}
