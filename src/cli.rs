use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tracklift")]
#[command(author, version, about = "Import timed samples from multi-track media files")]
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
    /// Probe a media file and list its tracks
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Import every sample of a media file and summarize each track
    Import {
        /// File to import
        #[arg(required = true)]
        file: PathBuf,

        /// Track id to import (repeatable; default is every track)
        #[arg(short, long = "track", value_name = "ID")]
        tracks: Vec<u32>,

        /// Samples buffered per track (overrides config)
        #[arg(long)]
        capacity: Option<usize>,

        /// Cancel the session after consuming this many samples
        #[arg(long, value_name = "N")]
        cancel_after: Option<u64>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
