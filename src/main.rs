//! # Deckforge CLI (`deckforge`)
//!
//! ## Usage
//!
//! ```bash
//! deckforge --config ./config/deckforge.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `deckforge init` | Create the SQLite retry queue |
//! | `deckforge run ...` | Align, verify, build cards, and sync one module |
//! | `deckforge retry` | Recover interrupted cards and run one retry cycle |
//! | `deckforge status` | Show card counts per sync status |
//!
//! ## Examples
//!
//! ```bash
//! deckforge run --slides wk09/slides.txt --transcript wk09/lecture.txt \
//!     --facts wk09/facts.json --module wk09 --deck "Anatomy::wk09"
//!
//! # after the deck store comes back
//! deckforge retry
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `deckforge=info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use deckforge::config;
use deckforge::ingest::{self, IngestRequest};
use deckforge::migrate;
use deckforge::sync::SyncEngine;
use deckforge_core::models::SyncStatus;

/// Deckforge: turns lecture slides, transcripts, and extracted facts into
/// verified flashcards and syncs them to a deck store.
#[derive(Parser)]
#[command(name = "deckforge", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/deckforge.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the retry-queue database. Idempotent.
    Init,

    /// Run one module through the pipeline and sync its cards.
    Run {
        /// Slide text (extracted from PDF/PPTX).
        #[arg(long)]
        slides: PathBuf,

        /// Lecture transcript text.
        #[arg(long)]
        transcript: PathBuf,

        /// JSON array of facts extracted from the slides.
        #[arg(long)]
        facts: PathBuf,

        /// JSON array of facts extracted from the transcript.
        #[arg(long)]
        transcript_facts: Option<PathBuf>,

        /// Module identifier; duplicates are detected per module.
        #[arg(long)]
        module: String,

        /// Target deck path, e.g. `Anatomy::wk09`.
        #[arg(long)]
        deck: String,
    },

    /// Recover cards left pending by an interrupted run, then retry every
    /// queued card once.
    Retry,

    /// Show card counts per sync status.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "deckforge=info,deckforge_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Run {
            slides,
            transcript,
            facts,
            transcript_facts,
            module,
            deck,
        } => {
            let engine = SyncEngine::open(&cfg).await?;
            let request = IngestRequest {
                slides,
                transcript,
                facts,
                transcript_facts,
                module_id: module,
                deck_path: deck,
            };
            let report = ingest::run_ingest(&cfg, &engine, &request).await?;
            report.print();
        }
        Commands::Retry => {
            let engine = SyncEngine::open(&cfg).await?;
            let recovered = engine.recover().await?;
            let report = engine.retry_pending().await?;
            println!("retry");
            println!("  recovered from interrupted runs: {}", recovered);
            println!(
                "  {} live, {} file, {} queued, {} failed, {} already settled",
                report.delivered_live,
                report.delivered_file,
                report.queued_retry,
                report.failed_permanent,
                report.already_settled
            );
        }
        Commands::Status => {
            let engine = SyncEngine::open(&cfg).await?;
            let counts = engine.store().status_counts().await?;
            println!("sync status");
            for status in SyncStatus::ALL {
                println!("  {:<18} {}", status.as_str(), counts.get(&status).copied().unwrap_or(0));
            }
        }
    }

    Ok(())
}
