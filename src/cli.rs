use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "treelock")]
#[command(about = "Hierarchical lock manager for fixed resource trees", long_about = None)]
pub struct Cli {
    /// Output results in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// JSON configuration file (defaults to the production preset)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a batch file: N, m, Q, N level-order names, Q lines of `op node uid`
    Run {
        /// Batch input file (reads stdin if omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Answer newline-delimited JSON requests from stdin
    Serve {
        /// Print metrics to stderr when the input ends (Prometheus text, or JSON with --json)
        #[arg(long, default_value_t = false)]
        metrics: bool,

        /// Write the audit trail as JSON lines to this file when the input ends
        #[arg(long)]
        audit: Option<PathBuf>,
    },

    /// Print the configured tree
    Tree,

    /// Print the effective configuration
    Config {
        /// Preset (production|development|testing)
        #[arg(short, long)]
        preset: Option<String>,
    },
}
