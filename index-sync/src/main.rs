use std::process::ExitCode;

use clap::Parser;
use index_sync::cli::{run, Cli};
use index_sync::load_config::load_config;
use index_sync::telemetry;

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment
    dotenvy::dotenv().ok();

    let log_level = telemetry::init();
    let cli = Cli::parse();

    let settings = match load_config(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Refusing to start");
            return ExitCode::FAILURE;
        }
    };
    log_level.apply(&settings.log_level);
    settings.trace_loaded();

    tokio::select! {
        result = run(&cli, &settings) => match result {
            Ok(()) => {
                tracing::info!("index-sync completed successfully");
                ExitCode::SUCCESS
            }
            Err(e) => {
                tracing::error!(error = %format!("{e:#}"), "index-sync exited with error");
                ExitCode::FAILURE
            }
        },
        _ = shutdown_signal() => {
            tracing::info!("Received shutdown signal, exiting");
            ExitCode::SUCCESS
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
