//! # docqa CLI
//!
//! The `docqa` binary answers questions over documents in a cloud drive.
//!
//! ## Usage
//!
//! ```bash
//! docqa --config ./config/docqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa serve` | Start the HTTP boundary (`POST /query`) |
//! | `docqa ask "<question>" --target <id>` | Run one answer pipeline from the terminal |
//! | `docqa ls [folder_id]` | List a remote folder, newest first |
//!
//! ## Examples
//!
//! ```bash
//! # Browse the drive root
//! docqa ls
//!
//! # Search a folder listing by name
//! docqa ls 1AbCdEf --query report
//!
//! # Ask a question over a folder and a single file
//! docqa ask "What is the key finding?" --target 1AbCdEf --target 9XyZ
//!
//! # Start the HTTP server for the chat UI
//! docqa serve
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use docqa::answer::Answerer;
use docqa::config::{self, Config};
use docqa::embedding::create_embedder;
use docqa::generate::create_generator;
use docqa::index::create_index;
use docqa::models::QueryRequest;
use docqa::server;
use docqa::store::{DriveStore, FileStore, ROOT_FOLDER_ID};

/// docqa: retrieval-augmented question answering over cloud drive documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file with the store, chunking, embedding, index, and generation settings.
#[derive(Parser)]
#[command(
    name = "docqa",
    about = "Retrieval-augmented question answering over documents in a cloud drive",
    version,
    long_about = "docqa fetches the files and folders you select in your cloud drive, extracts \
    and chunks their text, embeds and indexes the chunks, and answers natural-language questions \
    grounded in the retrieved context, via a CLI or a small HTTP API."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP boundary.
    ///
    /// Binds to the address in `[server].bind` and serves `POST /query`
    /// and `GET /health`.
    Serve,

    /// Answer one question from the terminal.
    ///
    /// Runs the full pipeline (resolve, fetch, extract, chunk, embed, index,
    /// retrieve, generate) and prints the answer with its cited sources.
    Ask {
        /// The question to answer.
        question: String,

        /// A target file or folder id. Repeatable.
        #[arg(long = "target", required = true)]
        targets: Vec<String>,

        /// Override the number of chunks retrieved for context.
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// List a remote folder's contents, newest first.
    Ls {
        /// Folder id to list. Defaults to the drive root.
        folder_id: Option<String>,

        /// Only show items whose name contains this substring.
        #[arg(long)]
        query: Option<String>,
    },
}

fn build_answerer(config: &Config) -> anyhow::Result<Arc<Answerer>> {
    let store = Arc::new(DriveStore::new(&config.store)?);
    let embedder = create_embedder(&config.embedding)?;
    let index = create_index(&config.index)?;
    let generator = create_generator(&config.generation)?;
    Ok(Arc::new(Answerer::new(
        store, embedder, index, generator, config,
    )))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("docqa=info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            let answerer = build_answerer(&cfg)?;
            server::run_server(&cfg, answerer).await?;
        }
        Commands::Ask {
            question,
            targets,
            top_k,
        } => {
            let mut cfg = cfg;
            if let Some(k) = top_k {
                cfg.retrieval.top_k = k;
            }
            let answerer = build_answerer(&cfg)?;
            let result = answerer
                .answer(&QueryRequest {
                    question,
                    target_ids: targets,
                })
                .await?;

            println!("{}", result.answer_text);
            if !result.cited_chunks.is_empty() {
                println!();
                println!("sources:");
                for chunk in &result.cited_chunks {
                    println!(
                        "  {}#{} (score {:.3})",
                        chunk.source_name, chunk.sequence_index, chunk.score
                    );
                }
            }
        }
        Commands::Ls { folder_id, query } => {
            let store = DriveStore::new(&cfg.store)?;
            let folder = folder_id.as_deref().unwrap_or(ROOT_FOLDER_ID);
            let items = store
                .list_children_matching(folder, query.as_deref())
                .await?;
            if items.is_empty() {
                println!("No items.");
            }
            for item in items {
                let kind = if item.is_folder { "folder" } else { "file" };
                println!(
                    "{:<40} {:<8} {:<12} {}",
                    item.id,
                    kind,
                    item.modified_time.format("%Y-%m-%d"),
                    item.name
                );
            }
        }
    }

    Ok(())
}
