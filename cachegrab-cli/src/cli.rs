use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Define CLI arguments
#[derive(Parser, Debug)]
#[command(
    name = "cachegrab",
    version,
    about = "Extract cached response bodies from a Polipo disk cache",
    long_about = "Walks a Polipo on-disk cache and copies the bodies of the cached\n\
                  objects that match every given filter into <output>/<host>/<file>.\n\
                  Files that already exist in the output tree are left alone, so the\n\
                  tool can be re-run safely.\n\
                  \n\
                  Filters (repeat -F to combine them):\n  \
                  size:[+|-|=]N[k|m|g][b]    body size at least / at most / exactly N\n  \
                  host:TEXT                  host contains TEXT\n  \
                  path:TEXT                  URL path contains TEXT\n  \
                  ctype:TEXT                 Content-Type contains TEXT\n  \
                  mtime:[+|-|=]@SECONDS      modified after / before / at a Unix time\n  \
                  age:[+]N[d|m|y]            modified within the last N days, months or years"
)]
pub struct CliArgs {
    /// Decrease verbosity (repeatable)
    #[arg(short, long, action = ArgAction::Count)]
    pub quiet: u8,

    /// Increase verbosity (repeatable)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Polipo configuration file to read the cache root from
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Cache root directory, overrides the configuration file
    #[arg(short, long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Directory where extracted files are written (default: current directory)
    #[arg(short = 'O', long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Filter clause such as "size:+10k" or "host:example.com"
    #[arg(short = 'F', long = "filter", value_name = "CLAUSE")]
    pub filters: Vec<String>,

    /// Show progress bars while walking and extracting
    #[arg(short = 'P', long = "progress")]
    pub show_progress: bool,
}

impl CliArgs {
    /// Verbosity tier: 0 quiet, 1 normal, 2 extra, 3 everything.
    pub fn verbosity(&self) -> u8 {
        (1 + i16::from(self.verbose) - i16::from(self.quiet)).clamp(0, 3) as u8
    }
}
