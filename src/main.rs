//! # Shared KB CLI (`kb`)
//!
//! Front end for the Shared KB lifecycle engine. Each invocation opens the
//! snapshot database, applies one operation, and exits. Commands that
//! accept `--wait` stay alive until every deferred transition has fired.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kb init` | Create the SQLite database and run schema migrations |
//! | `kb doc upload <files...>` | Add documents (Pending → Processing → Completed) |
//! | `kb doc list` | List documents and their status |
//! | `kb doc delete <id>` | Delete a document and prune it from indexes |
//! | `kb index create --name <name> <ids...>` | Create an index over completed documents |
//! | `kb index list` | List indexes and their status |
//! | `kb index sync <id>` | Sync an index (Created → Syncing → Completed) |
//! | `kb index delete <id>` | Delete an index |
//! | `kb query --index <id> "<text>"` | Query a completed index |
//! | `kb api-key show` | Print the API key, generating one if needed |
//! | `kb api-key regenerate` | Replace the API key |
//! | `kb wait` | Resume unfinished lifecycles and wait for them |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use shared_kb::observer::ObserverMode;
use shared_kb::{api_key, config, db, documents, engine, indexes, migrate, query};

/// Shared KB CLI. Tracks documents and indexes through their lifecycles
/// and queries completed indexes.
#[derive(Parser)]
#[command(
    name = "kb",
    about = "Shared KB: document and index lifecycle manager",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/kb.toml")]
    config: PathBuf,

    /// Enable debug logging (overridden by `KB_LOG`).
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Lifecycle event output on stderr. Defaults to `human` on a TTY.
    #[arg(long, global = true, value_enum)]
    progress: Option<ObserverMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Manage documents.
    Doc {
        #[command(subcommand)]
        action: DocAction,
    },

    /// Manage indexes.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Query a completed index.
    Query {
        /// Index UUID. Must be `Completed`.
        #[arg(long)]
        index: Option<String>,

        /// The question to ask.
        text: String,
    },

    /// Show or rotate the API key.
    ApiKey {
        #[command(subcommand)]
        action: ApiKeyAction,
    },

    /// Resume unfinished lifecycles and block until they complete.
    Wait,
}

#[derive(Subcommand)]
enum DocAction {
    /// Upload files as new documents.
    Upload {
        /// Files to add. Only the file name is recorded.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Wait until processing has completed.
        #[arg(long)]
        wait: bool,
    },
    /// List documents.
    List,
    /// Delete a document.
    Delete {
        /// Document UUID.
        id: String,
    },
}

#[derive(Subcommand)]
enum IndexAction {
    /// Create an index from completed documents.
    Create {
        /// Index name.
        #[arg(long)]
        name: String,

        /// Document UUIDs to include.
        documents: Vec<String>,
    },
    /// List indexes.
    List {
        /// Only indexes that can be queried.
        #[arg(long)]
        ready: bool,
    },
    /// Start syncing an index.
    Sync {
        /// Index UUID.
        id: String,

        /// Wait until the sync has completed.
        #[arg(long)]
        wait: bool,
    },
    /// Delete an index.
    Delete {
        /// Index UUID.
        id: String,
    },
}

#[derive(Subcommand)]
enum ApiKeyAction {
    /// Print the current key, generating one on first use.
    Show,
    /// Replace the key. The previous key stops working.
    Regenerate,
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("KB_LOG")
        .unwrap_or_else(|_| EnvFilter::new(format!("shared_kb={}", level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cfg = config::load_config(&cli.config)?;
    let mode = cli.progress.unwrap_or_else(ObserverMode::default_for_tty);

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::ApiKey { action } => match action {
            ApiKeyAction::Show => api_key::run_show(&cfg).await?,
            ApiKeyAction::Regenerate => api_key::run_regenerate(&cfg).await?,
        },
        command => {
            let kb = engine::open_from_config(&cfg, mode).await?;
            match command {
                Commands::Doc { action } => match action {
                    DocAction::Upload { files, wait } => {
                        documents::run_upload(&kb, &cfg.upload, &files, wait).await?
                    }
                    DocAction::List => documents::run_list(&kb).await?,
                    DocAction::Delete { id } => documents::run_delete(&kb, &id).await?,
                },
                Commands::Index { action } => match action {
                    IndexAction::Create { name, documents } => {
                        indexes::run_create(&kb, &name, &documents).await?
                    }
                    IndexAction::List { ready } => indexes::run_list(&kb, ready).await?,
                    IndexAction::Sync { id, wait } => indexes::run_sync(&kb, &id, wait).await?,
                    IndexAction::Delete { id } => indexes::run_delete(&kb, &id).await?,
                },
                Commands::Query { index, text } => {
                    query::run_query(&kb, index.as_deref(), &text).await?
                }
                Commands::Wait => {
                    let resumed = kb.resume().await;
                    kb.wait_idle().await;
                    println!("{} lifecycle(s) completed.", resumed);
                }
                Commands::Init | Commands::ApiKey { .. } => unreachable!(),
            }
        }
    }

    Ok(())
}
