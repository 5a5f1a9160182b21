use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use popreport::config::{AppConfig, LogFormat, LoggingConfig};

#[derive(Parser)]
#[command(
    name = "popreport",
    about = "Scheduled world population report pipeline",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (API server + scheduler)
    Serve {
        /// Bind address (overrides server.bind)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Run the pipeline once and print the report path
    RunNow,

    /// Show recorded pipeline executions, newest first
    History {
        /// Maximum number of records to show
        #[arg(long, default_value = "20")]
        limit: usize,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Preview when the schedule fires in the next N hours
    DryRun {
        /// Hours to preview
        #[arg(long, default_value = "24")]
        hours: u64,
    },
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let loaded = AppConfig::load_or_default(cli.config.as_deref())?;
    init_tracing(&loaded.config.logging);
    loaded.log();
    let mut config = loaded.config;

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            tracing::info!(bind = %config.server.bind, "Starting popreport daemon");
            popreport::serve(config).await?;
        }
        Commands::RunNow => {
            let orchestrator = popreport::build_orchestrator(&config)?;
            let artifact = orchestrator.run().await?;
            println!("Report generated: {}", artifact.display());
        }
        Commands::History { limit, json } => {
            let ledger = popreport::storage::ExecutionLedger::open(&config.storage.history_path)?;
            let records = ledger.recent(limit);
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("No executions recorded.");
            } else {
                println!("{:<27} | {:<8} | {:>10} | Error", "Started", "Status", "Duration");
                println!("{:-<27}-|-{:-<8}-|-{:-<10}-|-{:-<30}", "", "", "", "");
                for r in records {
                    println!(
                        "{:<27} | {:<8} | {:>9.2}s | {}",
                        r.timestamp.to_rfc3339(),
                        r.status,
                        r.duration_seconds,
                        r.error_message.as_deref().unwrap_or("")
                    );
                }
            }
        }
        Commands::DryRun { hours } => {
            let schedule = popreport::scheduler::ReportSchedule::parse(&config.scheduler.cron)?;
            let preview = schedule.preview(&chrono::Utc::now(), hours);
            if preview.is_empty() {
                println!("No runs scheduled in next {} hours.", hours);
            } else {
                println!("Upcoming runs (next {} hours, schedule '{}'):", hours, schedule.expr());
                for time in preview {
                    println!("{}", time.to_rfc3339());
                }
            }
        }
    }

    Ok(())
}
