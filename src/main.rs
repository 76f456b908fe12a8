//! # docwalker CLI
//!
//! The `docwalker` binary builds and serves Go package documentation.
//!
//! ## Usage
//!
//! ```bash
//! docwalker --config ./config/docwalker.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docwalker init` | Create the SQLite database and run schema migrations |
//! | `docwalker get <path>` | Serve or build documentation for one import path |
//! | `docwalker get <path> --refresh` | Refetch, honoring the refresh interval |
//! | `docwalker distribute` | Run one distribute pass |
//! | `docwalker recycle` | Run one recycle pass |
//! | `docwalker stats` | Print catalog statistics |
//! | `docwalker serve` | Start the HTTP server with background maintenance |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use docwalker::app::App;
use docwalker::check::{CheckOutcome, RequestKind};
use docwalker::lifecycle::PassReport;
use docwalker::{config, logging, migrate, server, stats};

/// Go package documentation crawler and server.
#[derive(Parser)]
#[command(
    name = "docwalker",
    about = "docwalker — resolve, fetch and document Go packages",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docwalker.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run more than once.
    Init,

    /// Serve or build the documentation of an import path.
    Get {
        /// Go import path, e.g. `github.com/gorilla/mux`.
        path: String,

        /// Refetch from upstream if the refresh interval has elapsed.
        #[arg(long)]
        refresh: bool,
    },

    /// Upload generated artifacts to object storage.
    Distribute,

    /// Retire unviewed and superseded artifacts.
    Recycle,

    /// Show catalog statistics.
    Stats,

    /// Start the HTTP server.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Get { path, refresh } => {
            let app = App::build(&cfg).await?;
            let kind = if refresh { RequestKind::Refresh } else { RequestKind::View };
            let outcome = app.checker.check(&path, kind).await?;
            print_outcome(&app, &outcome);
        }
        Commands::Distribute => {
            let app = App::build(&cfg).await?;
            let report = app.lifecycle.distribute().await?;
            print_report("distribute", &report);
        }
        Commands::Recycle => {
            let app = App::build(&cfg).await?;
            let report = app.lifecycle.recycle().await?;
            print_report("recycle", &report);
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            let app = App::build(&cfg).await?;
            server::run_server(app).await?;
        }
    }

    Ok(())
}

fn print_outcome(app: &App, outcome: &CheckOutcome) {
    match outcome {
        CheckOutcome::Ready {
            record,
            artifact,
            generated,
        } => {
            println!("{}", record.import_path);
            if !record.synopsis.is_empty() {
                println!("  {}", record.synopsis);
            }
            println!();
            println!("  etag:      {}", record.etag);
            println!("  status:    {}", artifact.status.as_str());
            println!("  generated: {}", generated);
            println!("  views:     {}", record.views);
            println!("  imports:   {}", record.import_paths.len());
            println!("  importers: {}", record.ref_num());
            for url in app.checker.store().doc_urls(&record.import_path, artifact) {
                println!("  {}", url);
            }
        }
        CheckOutcome::RefreshTooSoon { record, remaining_secs } => {
            println!(
                "{} was refreshed recently, try again in {}s",
                record.import_path, remaining_secs
            );
        }
    }
}

fn print_report(pass: &str, report: &PassReport) {
    if report.skipped {
        println!("{} pass already running, skipped.", pass);
    } else {
        println!(
            "{} pass: {} processed, {} failed.",
            pass, report.processed, report.failed
        );
    }
}
