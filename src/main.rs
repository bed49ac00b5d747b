//! # ragchat CLI
//!
//! The `ragchat` binary manages the document index and runs the assistant,
//! either in the terminal or as an HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! ragchat --config ./config/ragchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragchat init` | Create the index schema |
//! | `ragchat ingest` | Incrementally index the documents root |
//! | `ragchat add <file>` | Index a single file |
//! | `ragchat rebuild` | Clear the index and ingest everything again |
//! | `ragchat stats` | Show what is indexed |
//! | `ragchat search "<query>"` | Single-query search with scores |
//! | `ragchat retrieve "<query>"` | Full multi-query retrieval with provenance |
//! | `ragchat chat` | Interactive terminal chat |
//! | `ragchat serve` | Start the HTTP chat server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use ragchat::{chat_cmd, config, ingest, logging, search, server, stats};

/// ragchat: a retrieval-augmented customer support chatbot.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/ragchat.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "ragchat",
    about = "ragchat — a retrieval-augmented customer support chatbot",
    version,
    long_about = "ragchat indexes your support documents and answers customer questions \
    from them, expanding each question into several phrasings for better recall and citing \
    the documents each answer is based on."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/ragchat.toml`. Missing sections use defaults.
    #[arg(long, global = true, default_value = "./config/ragchat.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the index schema. Safe to run more than once.
    Init,

    /// Index the documents root incrementally.
    ///
    /// Unchanged passages are skipped, edited ones re-embedded, and passages
    /// of deleted files removed.
    Ingest,

    /// Index a single file.
    Add {
        /// Path to a .txt, .md, or .pdf file.
        file: PathBuf,
    },

    /// Delete every indexed passage and ingest from scratch.
    Rebuild {
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },

    /// Show index statistics.
    Stats,

    /// Search the index with one query and print scored passages.
    Search {
        /// The query text.
        query: String,

        /// Minimum similarity score (default: 0.7).
        #[arg(long)]
        threshold: Option<f32>,

        /// Maximum number of results (default: 5).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Run multi-query retrieval and show variants, passages, and context.
    Retrieve {
        /// The query text.
        query: String,
    },

    /// Chat with the assistant in the terminal.
    Chat,

    /// Start the HTTP chat server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let base_level = match cli.command {
        Commands::Serve => "info",
        _ => "warn",
    };
    logging::init(base_level, cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => ingest::run_init(&cfg).await?,
        Commands::Ingest => ingest::run_ingest(&cfg).await?,
        Commands::Add { file } => ingest::run_add(&cfg, &file).await?,
        Commands::Rebuild { yes } => ingest::run_rebuild(&cfg, yes).await?,
        Commands::Stats => stats::run_stats(&cfg).await?,
        Commands::Search {
            query,
            threshold,
            limit,
        } => search::run_search(&cfg, &query, threshold, limit).await?,
        Commands::Retrieve { query } => search::run_retrieve(&cfg, &query).await?,
        Commands::Chat => chat_cmd::run_chat(&cfg).await?,
        Commands::Serve => server::run_server(&cfg).await?,
    }

    Ok(())
}
