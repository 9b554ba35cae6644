use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::path::Path;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use outreach_engine::api::automation_routes;
use outreach_engine::automation::{
    Automation, AutomationAction, AutomationRequest, AutomationResponse,
};
use outreach_engine::config::EngineConfig;
use outreach_engine::error::AutomationError;
use outreach_engine::llm::create_provider;
use outreach_engine::scheduler::spawn_cron_ticker;
use outreach_engine::store::LibSqlBackend;
use outreach_engine::transport::GmailTransport;

#[derive(Parser)]
#[command(name = "outreach-engine", version, about = "Creator outreach reply automation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one batch action and print the response envelope.
    Run {
        #[arg(long, value_enum, default_value_t = AutomationAction::Process)]
        action: AutomationAction,

        /// Operator identity (defaults to OUTREACH_OPERATOR_ID).
        #[arg(long, env = "OUTREACH_OPERATOR_ID")]
        operator: Option<String>,

        /// Ignore reply delays for this run.
        #[arg(long)]
        skip_delay: bool,

        /// Recipient for simulate-one-outreach.
        #[arg(long)]
        recipient: Option<String>,
    },
    /// Serve the HTTP API (and the scheduler, when OUTREACH_SCHEDULE is set).
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
}

fn init_tracing(log_dir: Option<&Path>) -> anyhow::Result<()> {
    let file_layer = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
            let path = dir.join("outreach-engine.log");
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();
    Ok(())
}

async fn build_automation(config: &EngineConfig) -> anyhow::Result<Arc<Automation>> {
    let llm = create_provider(&config.llm).context("creating completion provider")?;
    let transport = Arc::new(GmailTransport::new(config.gmail.clone()).context("creating Gmail client")?);
    let db = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("opening database at {}", config.db_path.display()))?,
    );

    Ok(Arc::new(Automation::from_config(
        config,
        transport,
        db.clone(),
        db,
        llm,
    )))
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Configuration errors abort before any thread is touched.
    let config = match EngineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            if matches!(cli.command, Commands::Run { .. }) {
                let response = AutomationResponse::failed(&AutomationError::Config(e));
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                eprintln!("Error: {e}");
            }
            return Ok(ExitCode::FAILURE);
        }
    };
    init_tracing(config.log_dir.as_deref())?;

    let automation = build_automation(&config).await?;

    match cli.command {
        Commands::Run {
            action,
            operator,
            skip_delay,
            recipient,
        } => {
            let request = AutomationRequest {
                operator: operator.unwrap_or_else(|| automation.operator_id().to_string()),
                skip_delay,
                action,
                recipient,
            };
            let response = automation.run(&request).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(if response.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Serve { port } => {
            if let Some(schedule) = config.schedule.clone() {
                spawn_cron_ticker(Arc::clone(&automation), schedule)?;
            }

            let addr = SocketAddr::from(([0, 0, 0, 0], port.unwrap_or(config.port)));
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("binding {addr}"))?;
            tracing::info!(%addr, operator = automation.operator_id(), "Automation API listening");
            axum::serve(listener, automation_routes(automation)).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
