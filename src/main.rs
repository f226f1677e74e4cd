use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use mailsweep::config::AppConfig;
use mailsweep::enrich::{LlmEnrichmentConfig, create_enrichment};
use mailsweep::error::RunError;
use mailsweep::pipeline::Analyzer;
use mailsweep::provider::auth::TokenStore;
use mailsweep::provider::gmail::{GmailClient, GmailConfig};
use mailsweep::rules::RuleSet;
use mailsweep::run::{RunCoordinator, RunStatusStore};
use mailsweep::server;

#[derive(Parser)]
#[command(name = "mailsweep")]
#[command(about = "Rule-first inbox triage with incremental runs")]
#[command(version)]
struct Cli {
    /// Log and record actions without touching the mailbox.
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute one pass over the mailbox and print the summary.
    Run {
        /// Bootstrap window override, in days.
        #[arg(long)]
        bootstrap_days: Option<u32>,
        /// Candidate listing cap override.
        #[arg(long)]
        max_results: Option<u32>,
    },
    /// Serve the dashboard API; runs are triggered over HTTP.
    Serve {
        /// Port override; defaults to MAILSWEEP_HTTP_PORT.
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = AppConfig::from_env()?;
    if cli.dry_run {
        config.dry_run = true;
    }
    if let Command::Run {
        bootstrap_days,
        max_results,
    } = &cli.command
    {
        if let Some(days) = bootstrap_days {
            config.bootstrap_days = *days;
        }
        if let Some(cap) = max_results {
            config.max_results = *cap;
        }
    }

    // Serve mode also logs to a daily-rolling file; the guard must
    // outlive the subscriber.
    let _log_guard = match &cli.command {
        Command::Serve { .. } => {
            let appender = tracing_appender::rolling::daily(&config.logs_dir, "mailsweep.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
                )
                .with(tracing_subscriber::fmt::layer().with_target(false))
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false),
                )
                .init();
            Some(guard)
        }
        Command::Run { .. } => {
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
                )
                .with(tracing_subscriber::fmt::layer().with_target(false))
                .init();
            None
        }
    };

    if config.dry_run {
        info!("Dry run: mailbox will not be modified");
    }

    let tokens = TokenStore::load(&config.secrets_dir).await?;
    let provider = Arc::new(GmailClient::new(GmailConfig::default(), tokens));
    let enrichment = create_enrichment(LlmEnrichmentConfig::from_env());
    let analyzer = Analyzer::new(RuleSet::default_rules(), enrichment);
    let status = Arc::new(RunStatusStore::new());
    let coordinator = Arc::new(RunCoordinator::new(
        config.clone(),
        provider,
        analyzer,
        status,
    ));

    match cli.command {
        Command::Run { .. } => match coordinator.run_once().await {
            Ok(summary) => {
                // Per-message errors are in the summary; only a failed
                // run is a process failure.
                println!("{}", serde_json::to_string_pretty(&summary)?);
                Ok(())
            }
            Err(RunError::AlreadyRunning) => {
                eprintln!("Error: a run is already in progress");
                std::process::exit(1);
            }
            Err(error) => {
                eprintln!("Error: run failed: {error}");
                std::process::exit(1);
            }
        },
        Command::Serve { port } => {
            let port = port.unwrap_or(config.http_port);
            server::serve(port, coordinator).await?;
            Ok(())
        }
    }
}
