//! Egress: publishes completion results to the downstream sink

use std::sync::Arc;

use approvals_models::{CompletionResult, HistoryEvent};
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::activities::HttpEndpoint;
use crate::error::PublishError;
use crate::retry::RetryPolicy;
use crate::store::InstanceStore;

/// Destination for completion results. An `Err` is retried by the publisher.
#[async_trait]
pub trait CompletionSink: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, result: &CompletionResult) -> Result<(), String>;
}

/// POSTs `{correlationId, value}` to a queue endpoint.
pub struct HttpCompletionSink {
    endpoint: HttpEndpoint,
}

impl HttpCompletionSink {
    pub fn new(endpoint: HttpEndpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl CompletionSink for HttpCompletionSink {
    fn name(&self) -> &str {
        self.endpoint.url()
    }

    async fn send(&self, result: &CompletionResult) -> Result<(), String> {
        self.endpoint.post_json(result).await.map(|_| ())
    }
}

/// Hands results to an in-process consumer.
pub struct ChannelCompletionSink {
    tx: mpsc::UnboundedSender<CompletionResult>,
}

impl ChannelCompletionSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<CompletionResult>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl CompletionSink for ChannelCompletionSink {
    fn name(&self) -> &str {
        "channel"
    }

    async fn send(&self, result: &CompletionResult) -> Result<(), String> {
        self.tx
            .send(result.clone())
            .map_err(|_| "completion channel is closed".to_string())
    }
}

/// Sends a recorded completion with its own retry policy and records
/// `CompletionDelivered` once the sink accepted it.
pub struct CompletionPublisher {
    sink: Arc<dyn CompletionSink>,
    store: Arc<dyn InstanceStore>,
    policy: RetryPolicy,
}

impl CompletionPublisher {
    pub fn new(sink: Arc<dyn CompletionSink>, store: Arc<dyn InstanceStore>, policy: RetryPolicy) -> Self {
        Self { sink, store, policy }
    }

    pub fn sink_name(&self) -> &str {
        self.sink.name()
    }

    /// Returns the number of attempts it took.
    pub async fn publish(&self, instance_id: &str, result: &CompletionResult) -> Result<u32, PublishError> {
        let mut last_error = String::new();

        for attempt in 1..=self.policy.max_attempts {
            if attempt > 1 {
                tokio::time::sleep(self.policy.backoff.delay_after(attempt - 1)).await;
            }

            match self.sink.send(result).await {
                Ok(()) => {
                    self.store
                        .append_history(instance_id, HistoryEvent::CompletionDelivered { attempts: attempt })
                        .await?;

                    tracing::info!(
                        instance_id,
                        correlation_id = %result.correlation_id,
                        sink = self.sink.name(),
                        attempt,
                        "Completion published: {}",
                        result.value
                    );
                    return Ok(attempt);
                }
                Err(e) => {
                    tracing::warn!(
                        instance_id,
                        sink = self.sink.name(),
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        "Failed to publish completion: {}",
                        e
                    );
                    last_error = e;
                }
            }
        }

        Err(PublishError::Exhausted {
            correlation_id: result.correlation_id.clone(),
            attempts: self.policy.max_attempts,
            error: last_error,
        })
    }
}
