use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::Local;
use clap::{Parser, Subcommand};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod db;
mod error;
mod ingest;
#[cfg(test)]
mod memory_store;
mod models;
mod reconcile;
mod report;
mod risk;
mod scheduler;
mod source;
mod store;
mod window;

use config::Config;
use ingest::IngestService;
use models::RawAttendanceRow;
use source::AttendanceSource;
use store::{ReportStore, SharedStore};

#[derive(Parser)]
#[command(name = "mentee-tracker")]
#[command(about = "Weekend attendance tracking and follow-up priorities for mentee cohorts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a small demo cohort
    Seed,
    /// Run the HTTP API and the weekly ingest schedule
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
    /// Fetch the latest weekend attendance from the source and classify mentees
    Ingest,
    /// Ingest attendance rows from a CSV export instead of the live source
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Create mentees for source students that are not tracked yet
    SyncMentees,
    /// Regenerate weekly reports and write them as markdown
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Show the weekend dates the next ingest would request
    Windows,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::InitDb => {
            let pool = connect(&config).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect(&config).await?;
            db::seed(&pool, &config.program.cohort_batch).await?;
            println!("Seed data inserted.");
        }
        Commands::Serve { port } => {
            let store: SharedStore = Arc::new(db::PgStore::new(connect(&config).await?));
            serve(config, store, port).await?;
        }
        Commands::Ingest => {
            let store: SharedStore = Arc::new(db::PgStore::new(connect(&config).await?));
            let source = build_source(&config, true)?;
            let ingest = IngestService::new(store, source, config.program.clone());
            let summary = ingest.run().await?;
            println!(
                "Fetched {} rows for {} dates; inserted {} records, classified {} mentees, refreshed {} weeks.",
                summary.rows_fetched,
                summary.dates.len(),
                summary.records_inserted,
                summary.mentees_classified,
                summary.weeks_reported
            );
        }
        Commands::Import { csv } => {
            let mut reader = csv::Reader::from_path(&csv)
                .with_context(|| format!("failed to open {}", csv.display()))?;
            let rows = reader
                .deserialize::<RawAttendanceRow>()
                .collect::<Result<Vec<_>, _>>()
                .with_context(|| format!("failed to parse {}", csv.display()))?;

            let store: SharedStore = Arc::new(db::PgStore::new(connect(&config).await?));
            let ingest = IngestService::new(store, None, config.program.clone());
            let summary = ingest
                .ingest_rows(&rows, Local::now().date_naive())
                .await?;
            println!(
                "Matched {} of {} rows from {}; inserted {} records.",
                summary.records_matched,
                summary.rows_fetched,
                csv.display(),
                summary.records_inserted
            );
        }
        Commands::SyncMentees => {
            let store: SharedStore = Arc::new(db::PgStore::new(connect(&config).await?));
            let source = build_source(&config, true)?;
            let ingest = IngestService::new(store, source, config.program.clone());
            let created = ingest.sync_mentees().await?;
            println!("Created {created} mentees.");
        }
        Commands::Report { out } => {
            let store: SharedStore = Arc::new(db::PgStore::new(connect(&config).await?));
            let ingest = IngestService::new(store.clone(), None, config.program.clone());
            ingest.regenerate_reports(Local::now().date_naive()).await?;
            let reports = store
                .list_weekly_reports(Some(&config.program.cohort_batch))
                .await?;
            let report = report::build_report(&config.program.cohort_batch, &reports);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Windows => print_windows(&config),
    }

    Ok(())
}

async fn connect(config: &Config) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")
}

fn build_source(config: &Config, required: bool) -> anyhow::Result<Option<AttendanceSource>> {
    let credentials = if required {
        Some(config.source_credentials()?)
    } else {
        config.source.clone()
    };

    credentials
        .map(|credentials| {
            AttendanceSource::new(credentials, config.source_timeout)
                .map(|source| source.with_batch_filter(config.program.batch_name_filter.clone()))
                .context("failed to build attendance source client")
        })
        .transpose()
}

async fn serve(config: Config, store: SharedStore, port: Option<u16>) -> anyhow::Result<()> {
    let source = build_source(&config, false)?;
    if source.is_none() {
        warn!("attendance source credentials missing; ingest and sync endpoints will fail");
    }

    let ingest = Arc::new(IngestService::new(
        store.clone(),
        source.clone(),
        config.program.clone(),
    ));

    let mut scheduler = if config.scheduler_enabled {
        Some(scheduler::start(ingest.clone(), &config.ingest_cron).await?)
    } else {
        info!("ingest scheduler disabled");
        None
    };

    let state = Arc::new(api::AppState {
        store,
        ingest,
        source,
    });
    let app = api::build_router(state, &config.cors_origins);

    let port = port.unwrap_or(config.port);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind port {port}"))?;
    info!(port, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    if let Some(scheduler) = scheduler.as_mut() {
        scheduler
            .shutdown()
            .await
            .context("failed to stop scheduler")?;
    }
    info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn print_windows(config: &Config) {
    let now = Local::now();
    let dates = window::weekend_dates(&now, config.program.attendance_start);

    println!("Weekend sessions for the next ingest:");
    for date in dates {
        let (start, end) = window::day_bounds(date, &Local);
        println!("- {date} ({}): {start} .. {end}", date.format("%a"));
    }
}
