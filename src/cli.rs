use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "convertforge")]
#[command(author, version, about = "Convert documents, spreadsheets, images, and media")]
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
    /// List the formats a file can be converted to
    Targets {
        /// File to inspect
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Convert one or more files
    Convert {
        /// Input files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Target format extension (e.g. docx, png, mp3)
        #[arg(short, long)]
        to: String,

        /// Compression level: none, low, medium, high
        #[arg(short, long, default_value = "none")]
        level: String,

        /// Directory to write the result into
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
