use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cadenza")]
#[command(author, version, about = "Media streaming server with on-the-fly transcoding")]
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
    /// Start the streaming server
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Register every media file in this directory at startup
        #[arg(long)]
        media_dir: Option<PathBuf>,
    },

    /// Resolve the transcoding decision for a local file and print it
    Resolve {
        /// File to resolve
        #[arg(required = true)]
        file: PathBuf,

        /// Requested target format ("raw" forces passthrough)
        #[arg(long)]
        format: Option<String>,

        /// Explicit bitrate cap in kbps
        #[arg(long)]
        max_bit_rate: Option<u32>,
    },

    /// Check that configured transcoder executables are available
    CheckTools,

    /// Print version information
    Version,
}
