use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "storyforge")]
#[command(author, version, about = "Web stories media tooling with a managed ffmpeg session")]
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
    /// Transcode a file through a managed ffmpeg session
    Transcode {
        /// Input: local path, http(s) URL or base64 data URL
        #[arg(required = true)]
        input: String,

        /// Output file; its extension selects the container
        #[arg(required = true)]
        output: PathBuf,

        /// ffmpeg binary to use instead of searching PATH
        #[arg(long)]
        ffmpeg: Option<PathBuf>,

        /// Echo the engine log
        #[arg(long)]
        log: bool,

        /// Extra ffmpeg arguments placed between input and output
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// Check that the transcode engine can be located
    CheckEngine,

    /// List editor media from the content API
    Media {
        /// Resource kind: images, videos, audio or captions
        #[arg(default_value = "images")]
        kind: String,

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
