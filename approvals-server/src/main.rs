use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod cli;
mod commands;
mod config;
mod runtime;

use cli::{Args, Mode};

/// Initialize tracing with dual output:
/// 1. Console output (stderr) - for interactive runs
/// 2. File output (~/.approvals/server.log) - for persistence
///
/// The returned guard flushes the file writer when dropped.
fn initialize_tracing() -> Result<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "info,\
         approvals_server=debug,\
         approvals_orchestrations=debug,\
         tower_http=debug,\
         sqlx::query=warn"
            .into()
    });

    // Set up file logging to ~/.approvals/server.log
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let approvals_dir = PathBuf::from(home).join(".approvals");
    std::fs::create_dir_all(&approvals_dir).ok();

    let file_appender = tracing_appender::rolling::never(&approvals_dir, "server.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer().with_writer(file_writer).with_ansi(false);
    let console_layer = fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Parse command line arguments
    let args = Args::parse();

    let _guard = initialize_tracing()?;

    match args.mode {
        Mode::Serve { port } => commands::server::run_serve(port).await,
        Mode::Start {
            subject,
            message,
            correlation_id,
            instance_id,
            name,
            industry,
            form_input_id,
            process_description,
            process_frequency,
            process_duration,
        } => {
            commands::instance::run_start(
                subject,
                message,
                correlation_id,
                instance_id,
                name,
                industry,
                form_input_id,
                process_description,
                process_frequency,
                process_duration,
            )
            .await
        }
        Mode::Raise {
            instance_id,
            approve,
            reject,
            reason,
        } => commands::instance::run_raise(instance_id, approve, reject, reason).await,
        Mode::Abandon { instance_id, reason } => commands::instance::run_abandon(instance_id, reason).await,
        Mode::Get {
            instance_id,
            history,
            output,
        } => commands::instance::run_get(instance_id, history, output).await,
        Mode::List { status, output } => commands::instance::run_list(status, output).await,
    }
}
