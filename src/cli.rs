use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "datamosh")]
#[command(author, version, about = "Remove I-frames from H.264 MP4 files for datamosh effects")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Nullify every I-frame but the first, writing a moshed copy
    Mosh {
        /// Input MP4 file
        #[arg(required = true)]
        input: PathBuf,

        /// Output file (defaults to <stem>-iframoshed.<ext> next to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Ask before nullifying each I-frame
        #[arg(short, long)]
        interactive: bool,

        /// Report every I-frame with its timestamp
        #[arg(short, long)]
        debug: bool,

        /// Show what would be done without writing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Show tracks, codec configuration and NAL statistics of a file
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// List every NAL unit
        #[arg(long)]
        units: bool,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
