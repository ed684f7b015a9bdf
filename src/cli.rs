use clap::Parser;
use std::path::PathBuf;

// Build version with engine info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Engine: simulated (deterministic)\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Short-video feed playback demo
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Number of videos in the mock feed
    #[arg(short = 'n', long = "videos", value_name = "N", default_value = "30")]
    pub videos: usize,

    /// Engine pool capacity (overrides config file)
    #[arg(short = 'c', long = "capacity", value_name = "N")]
    pub capacity: Option<usize>,

    /// Forward swipes to simulate
    #[arg(short = 's', long = "swipes", value_name = "N", default_value = "12")]
    pub swipes: usize,

    /// Load tunables from a JSON config file
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print every metrics event instead of a summary count
    #[arg(short = 'm', long = "metrics")]
    pub metrics: bool,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,
}
