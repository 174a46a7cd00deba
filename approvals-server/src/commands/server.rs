use anyhow::Result;

use crate::config::Config;

/// Base URL of the approvals API used by the client commands
pub fn api_url() -> String {
    std::env::var("APPROVALS_API_URL").unwrap_or_else(|_| "http://localhost:8080".to_string())
}

pub async fn run_serve(port: Option<u16>) -> Result<()> {
    let config = Config::load()?;
    let port = port.unwrap_or(config.server_port);

    tracing::info!("Starting approvals server");
    tracing::info!("Approval request endpoint: {}", config.approval_request_url);
    tracing::info!("Notification endpoint: {}", config.notification_url);
    match &config.completion_sink_url {
        Some(url) => tracing::info!("Completion sink: {}", url),
        None => tracing::info!("Completion sink: log only (COMPLETION_SINK_URL not set)"),
    }

    let runtime = crate::runtime::initialize(&config).await?;

    let state = crate::api::AppState {
        engine: runtime.engine.clone(),
        ingress: runtime.ingress.clone(),
    };

    let host = config.server_host.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = crate::api::start_server(&host, port, state).await {
            tracing::error!("API server error: {}", e);
        }
    });

    tracing::info!("✓ Approvals server ready");
    tracing::info!("  API: http://{}:{}", config.server_host, port);
    tracing::info!("  Press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down...");
    api_handle.abort();
    runtime.shutdown();

    Ok(())
}

/// Fail fast with a hint when the API server is not reachable
pub async fn ensure_server_running() -> Result<()> {
    let api_url = api_url();

    if let Ok(response) = reqwest::get(format!("{}/health", api_url)).await {
        if response.status().is_success() {
            return Ok(());
        }
    }

    anyhow::bail!(
        "Cannot connect to the approvals API at {}\nStart it with: approvals-server serve",
        api_url
    );
}
