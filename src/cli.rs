//! Command-line interface definition.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "threatlens")]
#[command(author, version, about = "Pluggable threat analysis for network flows, APKs, URLs and LLM prompts")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config file
    #[arg(short, long, global = true, env = "THREATLENS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json)
    #[arg(short, long, global = true, default_value = "text")]
    pub format: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP analysis service
    Serve {
        /// Address to listen on (overrides config)
        #[arg(short, long)]
        bind: Option<String>,

        /// Construct every analyzer before accepting requests
        #[arg(long)]
        preload: bool,
    },

    /// Analyze a single JSON request with one module
    Analyze {
        /// Module key or alias (network, apk, phishing, llm)
        module: String,

        /// Read the request from a file
        #[arg(short, long, conflicts_with = "data")]
        input: Option<PathBuf>,

        /// Inline JSON request
        #[arg(short, long)]
        data: Option<String>,

        /// Exit with code 1 if the threat level is at or above this level
        #[arg(long)]
        fail_on: Option<String>,
    },

    /// List registered analysis modules
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Construct every analyzer and report its health
    Health,

    /// Generate a default configuration file
    Init {
        /// Output path
        #[arg(short, long, default_value = "threatlens.toml")]
        output: PathBuf,
    },
}
