//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "casefile",
    version,
    author = "neur0map",
    about = "Evidence retrieval and cited answers for cold case files",
    long_about = "Casefile splits case evidence into overlapping chunks, indexes them in a local \
                  vector store, and answers questions using only the retrieved evidence, citing \
                  the file each fact came from."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/casefile/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Profile to apply on top of the config file
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Chunk and embed the evidence files, replacing the vector store
    Ingest {
        /// Evidence directory (defaults to storage.evidence_dir)
        #[arg(short, long, value_name = "DIR")]
        evidence: Option<PathBuf>,
    },

    /// Show the evidence chunks nearest to a query
    Search {
        /// Search query text
        query: String,

        /// Number of chunks to return (defaults to retrieval.top_k)
        #[arg(short, long)]
        k: Option<usize>,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Answer a question from the evidence, citing sources
    Ask {
        /// Question to ask
        question: String,

        /// Number of evidence chunks to retrieve
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Interactive questioning with follow-up context
    Chat,

    /// Extract a chronological timeline of events from all evidence
    Timeline {
        /// Show the timeline in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show store and configuration status
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
