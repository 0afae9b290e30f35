//! Recipe RAG CLI: index recipes, query them and serve the HTTP API.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Recipe RAG: a cooking assistant grounded in your recipe collection
#[derive(Parser, Debug)]
#[command(name = "recipe-rag", version, about, long_about = None)]
struct Cli {
    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Create the collection if needed and index every recipe in the source
    Index {
        /// Recipe CSV (defaults to data.recipes_path)
        #[arg(short, long)]
        data: Option<PathBuf>,
    },
    /// Run a hybrid search and print the matching recipes
    Search {
        /// Search query
        query: String,
        /// Number of results
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Answer a question from the indexed recipes
    Ask {
        /// The question
        question: String,
        /// LLM model for the answer
        #[arg(short, long)]
        model: Option<String>,
        /// Number of recipes retrieved as context
        #[arg(short, long)]
        limit: Option<usize>,
        /// Print the full answer record as JSON
        #[arg(long)]
        json: bool,
    },
    /// Index at startup, then serve the HTTP API
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
        /// Skip indexing at startup
        #[arg(long)]
        skip_index: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
pub enum ConfigAction {
    /// Write a default configuration file into the workspace
    Init,
    /// Show the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "recipe-rag", "recipe-rag")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "recipe-rag.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    commands::handle_command(cli.command, &workspace, cli.config.as_deref()).await
}
