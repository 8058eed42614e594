use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crate::store::QueryMode;

#[derive(Debug, Parser)]
#[command(
    name = "simple-rag",
    about = "Index review datasets into a hybrid vector store and query them"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Settings file (defaults to settings.toml in the data directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create or incrementally refresh the index from the datasets directory
    Index(IndexArgs),
    /// Serve the HTTP API
    Serve(ServeArgs),
    /// Print the normalized tokens of a text
    Process(ProcessArgs),
    /// Query the index
    Query(QueryArgs),
    /// Show configuration and index state
    Status(StatusArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

#[derive(Debug, Parser)]
pub struct IndexArgs {
    /// Directory to scan instead of the data directory's datasets/
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Delete points of documents that disappeared since the last run
    #[arg(long)]
    pub prune: bool,
}

#[derive(Debug, Parser)]
pub struct ServeArgs {
    /// Address to listen on, e.g. 0.0.0.0:8000
    #[arg(long)]
    pub bind: Option<String>,
}

#[derive(Debug, Parser)]
pub struct ProcessArgs {
    /// Text to normalize
    pub text: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct QueryArgs {
    /// The query text
    pub text: String,

    /// Number of dense (and fused) results
    #[arg(short = 'k', long = "top-k")]
    pub top_k: Option<usize>,

    /// Number of sparse results
    #[arg(long = "sparse-k")]
    pub sparse_k: Option<usize>,

    /// Override the configured query mode
    #[arg(long, value_enum)]
    pub mode: Option<QueryMode>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(self.shell, &mut cmd, "simple-rag", &mut std::io::stdout());
    }
}
