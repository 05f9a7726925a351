//! Command-line interface for the edge CDN simulator.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Edge CDN simulator: ARC-cached edges that redirect users away from overload.
#[derive(Parser)]
#[command(name = "cdn-sim")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (JSON)
    #[arg(short, long, env = "CDN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "CDN_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, env = "CDN_JSON_LOGS")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Run the user population against the edge network
    Simulate {
        /// Write one JSON record per request to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Seed for every random source
        #[arg(long, env = "CDN_SEED")]
        seed: Option<u64>,

        /// Cache capacity per edge, in items
        #[arg(long, env = "CDN_CACHE_SIZE")]
        cache_size: Option<usize>,

        /// Multiplier for simulated delays (0 runs without sleeping)
        #[arg(long, env = "CDN_TIME_SCALE")]
        time_scale: Option<f64>,

        /// Use the small development preset instead of the reference setup
        #[arg(long)]
        dev: bool,
    },

    /// Show which edge the origin assigns to a location
    Discover {
        /// Latitude in degrees
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Longitude in degrees
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },

    /// Show version information
    Version,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
