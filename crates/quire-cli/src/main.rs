//! quire: operator command line for the note store.
//!
//! Applies migrations, runs the unused-tag sweep and inspects notes and tags
//! of a book. Results are printed as JSON on stdout; logs go to stderr or
//! `LOG_FILE`.

use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use quire_db::{Database, NoteRepository, Pagination, PoolConfig, TagRepository};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

const DEFAULT_LOG_FILTER: &str = "quire=info,quire_core=info,quire_db=info";

#[derive(Parser, Debug)]
#[command(name = "quire")]
#[command(author, version, about = "Note and tag store maintenance for quire")]
#[command(propagate_version = true)]
struct Cli {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Log output format: text or json
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply pending schema migrations
    Migrate,

    /// Delete tags no longer referenced by any note
    SweepTags,

    /// Show one note with its tags
    Show {
        /// Note id
        note_id: Uuid,
    },

    /// List the notes of a book
    List {
        /// Book id
        book_id: Uuid,

        /// Only notes carrying this tag id
        #[arg(long)]
        tag: Option<Uuid>,

        #[command(flatten)]
        paging: PagingArgs,
    },

    /// Case-insensitive substring search over title and body
    Search {
        /// Book id
        book_id: Uuid,

        /// Text to look for
        query: String,

        #[command(flatten)]
        paging: PagingArgs,
    },

    /// List the tags of a book with note counts
    Tags {
        /// Book id
        book_id: Uuid,
    },
}

#[derive(Args, Debug, Default)]
struct PagingArgs {
    /// 1-based page number
    #[arg(long)]
    page: Option<i64>,

    /// Page size (default 10)
    #[arg(long)]
    limit: Option<i64>,

    /// Sort key: title, updatedAt or createdAt
    #[arg(long)]
    order_by: Option<String>,

    /// Sort direction: asc or desc
    #[arg(long)]
    order: Option<String>,
}

impl From<PagingArgs> for Pagination {
    fn from(args: PagingArgs) -> Self {
        Pagination {
            page: args.page,
            limit: args.limit,
            order_by: args.order_by,
            order: args.order,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env before clap reads env-backed flags
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let _log_guard = init_tracing(&cli.log_format);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let message = format!("{:#}", e);
            error!(error = %message, "Command failed");
            eprintln!("Error: {}", message);
            ExitCode::FAILURE
        }
    }
}

/// Initialize tracing on stderr, or on a daily rolling file when `LOG_FILE`
/// is set.
///
/// Environment variables:
///   LOG_FILE    - path to log file (optional)
///   LOG_ANSI    - "true"/"false" override ANSI colors
///   RUST_LOG    - standard env filter (default: [`DEFAULT_LOG_FILTER`])
fn init_tracing(log_format: &str) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(env_filter);

    let guard = if let Some(ref path) = log_file {
        let path = Path::new(path);
        let file_dir = path.parent().unwrap_or(Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("quire.log");
        let (non_blocking, guard) =
            tracing_appender::non_blocking(tracing_appender::rolling::daily(file_dir, file_name));

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(log_ansi.unwrap_or(false)),
                )
                .init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stderr)"),
        "Logging initialized"
    );
    guard
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = PoolConfig::from_env().context("invalid pool configuration")?;
    let db = Database::connect_with_config(&cli.database_url, config)
        .await
        .context("failed to connect to database")?;

    match cli.command {
        Commands::Migrate => {
            db.migrate().await.context("migration failed")?;
            print_json(&serde_json::json!({ "migrated": true }))?;
        }
        Commands::SweepTags => {
            let removed = db.tags.delete_unused().await?;
            print_json(&serde_json::json!({ "removed": removed }))?;
        }
        Commands::Show { note_id } => {
            let note = db.notes.find_by_id(note_id).await?;
            print_json(&note)?;
        }
        Commands::List {
            book_id,
            tag,
            paging,
        } => {
            let page = match tag {
                Some(tag_id) => db.notes.find_by_tag(book_id, tag_id, paging.into()).await?,
                None => db.notes.find_by_book_id(book_id, paging.into()).await?,
            };
            print_json(&page)?;
        }
        Commands::Search {
            book_id,
            query,
            paging,
        } => {
            let page = db.notes.search(book_id, &query, paging.into()).await?;
            print_json(&page)?;
        }
        Commands::Tags { book_id } => {
            let tags = db.tags.find_by_book_id(book_id).await?;
            print_json(&tags)?;
        }
    }

    quire_db::log_pool_metrics(db.pool());
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
