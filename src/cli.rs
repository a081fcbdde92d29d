use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "streamforge")]
#[command(author, version, about = "Live stream transcoding supervisor producing adaptive HLS")]
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
    /// Start the HTTP API and ingest hook server
    Start {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default search if not specified)
        config: Option<PathBuf>,
    },

    /// List encode profiles and their rendition ladders
    Profiles {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the ffmpeg invocation for a stream without running it
    Command {
        /// Stream key
        key: String,

        /// Encode profile (defaults to the first configured profile)
        #[arg(long)]
        profile: Option<String>,

        /// Output directory (defaults to <hls_root>/<key>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Treat the source as video only
        #[arg(long)]
        no_audio: bool,
    },

    /// Print the publish token for a stream key
    Token {
        /// Stream key
        key: String,
    },

    /// Generate a random secret suitable for security.stream_secret
    GenerateSecret,

    /// Display version information
    Version,
}
