//! Marketfeed Ingest - marketplace statistics ingestion tool

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{Days, NaiveDate, Utc};
use clap::Parser;
use marketfeed_common::logging::{init_logging, LogConfig, LogLevel};
use marketfeed_ingest::config::{IngestConfig, MAX_PAGE_SIZE};
use marketfeed_ingest::entities::EntityType;
use marketfeed_ingest::persist::{MemoryStore, PgStore};
use marketfeed_ingest::queue::{MemoryQueue, PgWorkQueue};
use marketfeed_ingest::supervisor::{RunSummary, WorkerSupervisor};
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "marketfeed-ingest")]
#[command(author, version, about = "Marketplace statistics ingestion tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Fetch data from API endpoints into the store
    Fetch {
        /// Endpoint to fetch (stocks, incomes, sales, orders, or all)
        #[arg(long, default_value = "all")]
        endpoint: String,

        /// Start date (YYYY-MM-DD); defaults to yesterday
        #[arg(long)]
        date_from: Option<NaiveDate>,

        /// End date (YYYY-MM-DD); defaults to today
        #[arg(long)]
        date_to: Option<NaiveDate>,

        /// Concurrent page requests per group
        #[arg(long)]
        concurrent: Option<usize>,

        /// Items per page (max 500)
        #[arg(long)]
        limit: Option<u32>,

        /// Number of queue workers
        #[arg(long)]
        workers: Option<usize>,

        /// Run against the in-memory queue and store, no database needed
        #[arg(long)]
        dry_run: bool,
    },

    /// List the known endpoints
    Endpoints,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env()?.with_file_prefix("marketfeed-ingest");
    if cli.verbose {
        log_config = log_config.with_level(LogLevel::Debug);
    }
    init_logging(&log_config)?;

    match cli.command {
        Command::Endpoints => {
            for entity in EntityType::ALL {
                println!("{} -> table '{}'", entity.endpoint(), entity.table());
            }
            Ok(())
        }
        Command::Fetch {
            endpoint,
            date_from,
            date_to,
            concurrent,
            limit,
            workers,
            dry_run,
        } => {
            let mut config = IngestConfig::from_env()?;
            if let Some(concurrent) = concurrent {
                config.concurrent = concurrent;
            }
            if let Some(limit) = limit {
                config.page_size = limit.min(MAX_PAGE_SIZE);
            }
            if let Some(workers) = workers {
                config.workers = workers;
            }
            config.validate()?;

            let endpoints: Vec<EntityType> = if endpoint == "all" {
                EntityType::ALL.to_vec()
            } else {
                vec![EntityType::from_endpoint(&endpoint)?]
            };

            let today = Utc::now().date_naive();
            let date_from =
                date_from.unwrap_or_else(|| today.checked_sub_days(Days::new(1)).unwrap_or(today));
            let date_to = date_to.unwrap_or(today);

            info!(
                %date_from,
                %date_to,
                concurrent = config.concurrent,
                limit = config.effective_page_size(),
                workers = config.workers,
                dry_run,
                "starting ingestion run"
            );

            let summary = if dry_run {
                run_in_memory(config, &endpoints, date_from, date_to).await?
            } else {
                run_against_postgres(config, &endpoints, date_from, date_to).await?
            };

            report(&summary);
            Ok(())
        }
    }
}

async fn run_in_memory(
    config: IngestConfig,
    endpoints: &[EntityType],
    date_from: NaiveDate,
    date_to: NaiveDate,
) -> Result<RunSummary> {
    let queue = Arc::new(MemoryQueue::new(config.job_max_attempts));
    let store = Arc::new(MemoryStore::new());
    let supervisor = WorkerSupervisor::new(config, queue, store)?;
    Ok(supervisor.run(endpoints, date_from, date_to).await?)
}

async fn run_against_postgres(
    config: IngestConfig,
    endpoints: &[EntityType],
    date_from: NaiveDate,
    date_to: NaiveDate,
) -> Result<RunSummary> {
    let database_url = config.require_database_url()?.to_string();
    let pool = PgPoolOptions::new()
        .max_connections(config.workers as u32 + 4)
        .connect(&database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let queue = Arc::new(PgWorkQueue::new(
        pool.clone(),
        Duration::from_secs(config.queue_retry_after_secs),
        config.job_max_attempts,
    ));
    let store = Arc::new(PgStore::new(pool));
    let supervisor = WorkerSupervisor::new(config, queue, store)?;
    Ok(supervisor.run(endpoints, date_from, date_to).await?)
}

fn report(summary: &RunSummary) {
    for endpoint in &summary.endpoints {
        match endpoint.pages {
            Some(pages) => info!(
                endpoint = %endpoint.entity,
                pages,
                jobs = endpoint.jobs_dispatched,
                items = endpoint.items_accepted,
                "endpoint summary"
            ),
            None => warn!(
                endpoint = %endpoint.entity,
                "endpoint skipped: page count could not be resolved"
            ),
        }
    }

    info!(
        jobs_dispatched = summary.jobs_dispatched,
        items_accepted = summary.items_accepted,
        drain = ?summary.drain,
        "ingestion run finished"
    );
}
