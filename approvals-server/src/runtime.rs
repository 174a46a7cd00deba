use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use approvals_orchestrations::activities::HttpEndpoint;
use approvals_orchestrations::registry::{create_activity_registry, ActivityEndpoints};
use approvals_orchestrations::store::{InstanceStore, MemoryInstanceStore, PostgresInstanceStore};
use approvals_orchestrations::triggers::{
    ChannelCompletionSink, CompletionPublisher, CompletionSink, HttpCompletionSink, Ingress,
};
use approvals_orchestrations::{ActivityInvoker, EngineOptions, EventCorrelator, OrchestrationEngine};
use tokio::task::JoinHandle;

use crate::config::Config;

const DEFAULT_SWEEP_PERIOD: Duration = Duration::from_secs(15);

/// Engine plus the background tasks it needs
pub struct Runtime {
    pub engine: Arc<OrchestrationEngine>,
    pub ingress: Ingress,
    background: Vec<JoinHandle<()>>,
}

impl Runtime {
    pub fn shutdown(self) {
        for task in self.background {
            task.abort();
        }
    }
}

/// Build the store, activities and engine, then recover unfinished instances
pub async fn initialize(config: &Config) -> Result<Runtime> {
    let store: Arc<dyn InstanceStore> = match &config.database_url {
        Some(db_url) => {
            tracing::info!("Connecting to instance store: PostgreSQL");
            let store = PostgresInstanceStore::connect(db_url)
                .await
                .context("Failed to connect to the instance store")?;
            store
                .initialize_schema()
                .await
                .context("Failed to initialize the instance store schema")?;
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store (instances do not survive a restart)");
            Arc::new(MemoryInstanceStore::new())
        }
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .build()
        .context("Failed to build HTTP client")?;

    let activities = create_activity_registry(ActivityEndpoints {
        approval_request: HttpEndpoint::new(client.clone(), &config.approval_request_url),
        notification: HttpEndpoint::new(client.clone(), &config.notification_url),
    });
    tracing::debug!("Registered activities: {:?}", activities.names());

    let mut background = Vec::new();

    let sink: Arc<dyn CompletionSink> = match &config.completion_sink_url {
        Some(url) => Arc::new(HttpCompletionSink::new(HttpEndpoint::new(client, url))),
        None => {
            let (sink, mut completions) = ChannelCompletionSink::new();
            background.push(tokio::spawn(async move {
                while let Some(result) = completions.recv().await {
                    tracing::info!(
                        correlation_id = %result.correlation_id,
                        "Completion result: {}",
                        result.value
                    );
                }
            }));
            Arc::new(sink)
        }
    };

    let engine = OrchestrationEngine::new(
        store.clone(),
        ActivityInvoker::new(store.clone(), Arc::new(activities), config.activity_retry_policy()),
        EventCorrelator::new(store.clone()),
        CompletionPublisher::new(sink, store.clone(), config.publish_retry_policy()),
    )
    .with_options(EngineOptions {
        event_timeout: config.approval_timeout(),
    });
    let engine = Arc::new(engine);

    let resumed = engine
        .resume_all()
        .await
        .context("Failed to resume unfinished instances")?;
    tracing::info!("✓ Resumed {} instance(s) from {} store", resumed, store.name());

    background.push(spawn_sweeper(engine.clone(), config.approval_timeout()));

    Ok(Runtime {
        ingress: Ingress::new(engine.clone()),
        engine,
        background,
    })
}

/// Periodically fails instances whose approval wait passed its deadline and
/// retries turns that failed after their input was recorded
fn spawn_sweeper(engine: Arc<OrchestrationEngine>, timeout: Option<Duration>) -> JoinHandle<()> {
    let period = match timeout {
        Some(timeout) => (timeout / 10).clamp(Duration::from_secs(1), Duration::from_secs(60)),
        None => DEFAULT_SWEEP_PERIOD,
    };
    tracing::info!("Approval timeout {:?}, sweeping every {:?}", timeout, period);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let report = engine.expire_waiters(chrono::Utc::now()).await;
            if !report.driven.is_empty() {
                tracing::info!("Sweep drove {} instance(s): {:?}", report.driven.len(), report.driven);
            }
            if !report.failed.is_empty() {
                tracing::warn!("Sweep deferred {} instance(s): {:?}", report.failed.len(), report.failed);
            }
        }
    })
}
