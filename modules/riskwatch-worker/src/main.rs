use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use riskwatch_common::{load_config, Config, Sector, CONFIG_PATH_ENV};

mod runtime;

use runtime::{load_documents, Runtime};

#[derive(Parser)]
#[command(name = "riskwatch", about = "Risk scoring and semantic retrieval over news documents")]
struct Cli {
    /// Path to config TOML file. Defaults apply when omitted.
    #[arg(long, env = CONFIG_PATH_ENV)]
    config: Option<PathBuf>,

    /// JSON array of documents to load into the in-memory store
    #[arg(long)]
    documents: PathBuf,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Score recent documents and print high-risk alerts
    Analyze {
        /// Keep running, one pass per configured interval
        #[arg(long)]
        watch: bool,

        /// Only report high-risk alerts in this sector
        #[arg(long)]
        sector: Option<String>,
    },

    /// Alerted documents similar to the given one
    Search {
        #[arg(long)]
        document: Uuid,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Trending topics over the recent pool
    Trends,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::from_default_env().add_directive("riskwatch=info".parse()?);
    if cli.json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("RiskWatch starting...");

    let config = match &cli.config {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => {
            let config = Config::default();
            config.validate()?;
            config
        }
    };

    let documents = load_documents(&cli.documents)?;
    let runtime = Runtime::new(config, cli.config.as_deref(), documents);

    match cli.command {
        Command::Analyze { watch, sector } => {
            let sector = sector
                .map(|s| s.parse::<Sector>().map_err(anyhow::Error::msg))
                .transpose()?;
            if watch {
                run_watch(&runtime, sector).await?;
            } else {
                let report = runtime.analyze(Utc::now(), sector).await?;
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
        }
        Command::Search { document, limit } => {
            let rows = runtime.related(document, limit, Utc::now()).await?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        Command::Trends => {
            let topics = runtime.trends(Utc::now());
            println!("{}", serde_json::to_string_pretty(&topics)?);
        }
    }

    Ok(())
}

/// One scoring pass per interval until Ctrl-C. The catalog is reloaded before
/// every pass after the first.
async fn run_watch(runtime: &Runtime, sector: Option<Sector>) -> Result<()> {
    let mut interval = tokio::time::interval(runtime.config.batch.interval());
    let mut first = true;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if !first {
                    runtime.reload_patterns();
                }
                first = false;
                let report = runtime.analyze(Utc::now(), sector).await?;
                info!(
                    documents = report.batch.documents_scanned,
                    alerts_created = report.batch.alerts_created,
                    failures = report.batch.failures.len(),
                    high_risk = report.high_risk_alerts.len(),
                    "Analysis pass finished"
                );
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                return Ok(());
            }
        }
    }
}
