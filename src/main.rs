use anyhow::Context;
use clap::Parser;
use idokep_wunderground::cli::Cli;
use idokep_wunderground::config::Config;
use idokep_wunderground::error::AppError;
use idokep_wunderground::ocr::{Recognizer, TesseractRecognizer};
use idokep_wunderground::scheduler::{CycleOutcome, Scheduler};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,idokep_wunderground=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            let code = e.downcast_ref::<AppError>().map_or(1, AppError::exit_code);
            ExitCode::from(code)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    info!("IdőKép to Weather Underground relay starting...");

    let config = Config::resolve(cli.config.as_deref(), &cli.overrides()).context(
        "Failed to load configuration\n\n\
         Make sure:\n\
         1. WUNDERGROUND_ID and WUNDERGROUND_KEY are set (check .env.example)\n\
         2. IDOKEP_LOCATION is set, or IDOKEP_AUTOMATA_ID together with USE_AUTOMATA=true\n\
         3. The config file, if given, exists and its ${VAR} placeholders are set",
    )?;
    info!("Configuration loaded");

    let recognizer: Arc<dyn Recognizer> = Arc::new(TesseractRecognizer::new(
        config.ocr.tesseract_cmd.clone(),
        Duration::from_secs(config.ocr.timeout_seconds),
    ));

    // Set up shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Spawn signal handler
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let mut scheduler = Scheduler::from_config(&config, recognizer, shutdown_rx)?;

    if config.scheduler.run_once {
        let code = match scheduler.run_once().await {
            Ok(CycleOutcome::Uploaded(time)) => {
                info!("Single run uploaded reading measured at {}", time);
                ExitCode::SUCCESS
            }
            Ok(CycleOutcome::Skipped(time)) => {
                info!("Single run skipped, reading at {} already sent", time);
                ExitCode::SUCCESS
            }
            Err(e) => ExitCode::from(e.exit_code()),
        };
        return Ok(code);
    }

    scheduler.run().await?;

    info!("IdőKép to Weather Underground relay shutting down");
    Ok(ExitCode::SUCCESS)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}
