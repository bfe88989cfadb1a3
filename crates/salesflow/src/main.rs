use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use salesflow_core::{db, pipeline::SalesPipeline, quality};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Batch sales ETL pipeline", long_about = None)]
struct Cli {
    /// SQLite connection string; falls back to DATABASE_URL
    #[arg(long, global = true)]
    database: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute one pipeline run and record it in the run ledger
    Run(RunArgs),
    /// Extract, transform and validate without writing anything
    Check(ConfigArgs),
    /// Run database migrations
    Migrate,
    /// List recent runs
    Runs(RunsArgs),
}

#[derive(Args, Debug)]
struct ConfigArgs {
    /// Path to the pipeline configuration JSON
    #[arg(long, short)]
    config: PathBuf,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Skip running migrations before the run
    #[arg(long)]
    skip_migrations: bool,
}

#[derive(Args, Debug)]
struct RunsArgs {
    #[arg(long, default_value_t = 10)]
    limit: i64,

    /// Include the quality log entries of each listed run
    #[arg(long)]
    with_quality: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();
    let pool = connect_pool(cli.database.as_deref()).await?;

    match cli.command {
        Command::Run(args) => {
            if args.skip_migrations {
                warn!("Skipping migrations before run");
            } else {
                db::run_migrations(&pool).await?;
            }
            let pipeline = SalesPipeline::from_config_path(&args.config.config, pool)
                .context("failed to load pipeline configuration")?;
            let outcome = pipeline.run_with_outcome().await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if !outcome.succeeded() {
                bail!(
                    "pipeline run {} failed: {}",
                    outcome.run_id,
                    outcome.error.unwrap_or_default()
                );
            }
            Ok(())
        }
        Command::Check(args) => {
            let pipeline = SalesPipeline::from_config_path(&args.config, pool)
                .context("failed to load pipeline configuration")?;
            for (table, results) in pipeline.check().await? {
                println!("== {table} ==");
                println!("{}", quality::render_report(&results));
            }
            Ok(())
        }
        Command::Migrate => {
            db::run_migrations(&pool).await?;
            info!("Database migrations applied");
            Ok(())
        }
        Command::Runs(args) => {
            let ledger = salesflow_core::ledger::RunLedger::new(pool);
            for run in ledger.recent_runs(args.limit).await? {
                println!("{}", serde_json::to_string(&run)?);
                if args.with_quality {
                    for entry in ledger.quality_logs(run.run_id).await? {
                        println!("  {}", serde_json::to_string(&entry)?);
                    }
                }
            }
            Ok(())
        }
    }
}

async fn connect_pool(database: Option<&str>) -> Result<db::DbPool> {
    dotenvy::dotenv().ok();
    let database_url = match database {
        Some(url) => url.to_string(),
        None => std::env::var("DATABASE_URL").unwrap_or_else(|_| db::DEFAULT_DATABASE_URL.into()),
    };
    db::connect(&database_url)
        .await
        .with_context(|| format!("failed to open database {database_url}"))
}
