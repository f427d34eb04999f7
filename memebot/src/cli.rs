use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Send prompts to a local Ollama model, one request at a time.
#[derive(Debug, Parser)]
#[command(name = "memebot", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file (TOML, YAML or JSON)
    #[arg(
        short = 'c',
        long = "config-path",
        env = "MEMEBOT_CONFIG_PATH",
        value_name = "FILE",
        global = true
    )]
    pub config_path: Option<PathBuf>,

    /// Print full responses as JSON instead of just the text
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Complete a single prompt via /api/generate
    Generate {
        prompt: String,
        /// System prompt
        #[arg(long)]
        system: Option<String>,
        /// Higher runs sooner
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        priority: i64,
    },
    /// Send one user message via /api/chat
    Chat {
        message: String,
        /// System message placed before the user message
        #[arg(long)]
        system: Option<String>,
        /// Higher runs sooner
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        priority: i64,
    },
    /// Queue every non-empty line of a file as its own generate request
    Batch {
        file: PathBuf,
        /// System prompt applied to every line
        #[arg(long)]
        system: Option<String>,
        /// Read a leading `<priority>:` from each line
        #[arg(long)]
        priority_prefix: bool,
    },
}
