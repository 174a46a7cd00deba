//! Activity Invoker: runs a named activity with bounded retry
//!
//! Every attempt is written to the instance history as it finishes, so a
//! successful outcome is read back on replay instead of being re-executed.

use std::sync::Arc;

use approvals_models::{ActivityInvocation, HistoryEvent};
use serde_json::Value;

use crate::activities::ActivityContext;
use crate::error::InvokerError;
use crate::registry::ActivityRegistry;
use crate::retry::RetryPolicy;
use crate::store::InstanceStore;

pub struct ActivityInvoker {
    store: Arc<dyn InstanceStore>,
    registry: Arc<ActivityRegistry>,
    policy: RetryPolicy,
}

impl ActivityInvoker {
    pub fn new(store: Arc<dyn InstanceStore>, registry: Arc<ActivityRegistry>, policy: RetryPolicy) -> Self {
        Self {
            store,
            registry,
            policy,
        }
    }

    /// Runs activity `seq` of an instance from its first attempt.
    pub async fn invoke(
        &self,
        instance_id: &str,
        seq: u32,
        activity_name: &str,
        input: Value,
    ) -> Result<Value, InvokerError> {
        self.resume(instance_id, seq, activity_name, input, 0).await
    }

    /// Continues activity `seq` after `attempts_made` recorded failures, e.g.
    /// when a restart interrupted the retry loop. Recorded attempts count
    /// against the retry budget.
    pub async fn resume(
        &self,
        instance_id: &str,
        seq: u32,
        activity_name: &str,
        input: Value,
        attempts_made: u32,
    ) -> Result<Value, InvokerError> {
        let Some(activity) = self.registry.get(activity_name) else {
            let err = InvokerError::UnknownActivity(activity_name.to_string());
            self.record_failure(instance_id, seq, activity_name, attempts_made, err.to_string())
                .await?;
            return Err(err);
        };

        let mut attempt = attempts_made;
        let mut last_error = String::from("retry budget exhausted before the attempt could run");

        while attempt < self.policy.max_attempts {
            if attempt > 0 {
                let delay = self.policy.backoff.delay_after(attempt);
                tracing::debug!(
                    instance_id,
                    activity = activity_name,
                    delay_ms = delay.as_millis() as u64,
                    "Backing off before retry"
                );
                tokio::time::sleep(delay).await;
            }
            attempt += 1;

            let ctx = ActivityContext::new(instance_id, activity_name, attempt);
            let invocation = ActivityInvocation::new(instance_id, activity_name, input.clone(), attempt);

            match activity.execute(&ctx, input.clone()).await {
                Ok(result) => {
                    self.store
                        .append_history(
                            instance_id,
                            HistoryEvent::ActivityAttempted {
                                seq,
                                invocation: invocation.succeeded(result.clone()),
                            },
                        )
                        .await?;

                    tracing::info!(instance_id, activity = activity_name, attempt, "Activity succeeded");
                    return Ok(result);
                }
                Err(error) => {
                    tracing::warn!(
                        instance_id,
                        activity = activity_name,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        "Activity attempt failed: {}",
                        error
                    );

                    self.store
                        .append_history(
                            instance_id,
                            HistoryEvent::ActivityAttempted {
                                seq,
                                invocation: invocation.failed(error.clone()),
                            },
                        )
                        .await?;
                    last_error = error;
                }
            }
        }

        self.record_failure(instance_id, seq, activity_name, attempt, last_error.clone())
            .await?;

        Err(InvokerError::ActivityFailed {
            activity: activity_name.to_string(),
            attempts: attempt,
            error: last_error,
        })
    }

    async fn record_failure(
        &self,
        instance_id: &str,
        seq: u32,
        activity_name: &str,
        attempts: u32,
        error: String,
    ) -> Result<(), InvokerError> {
        self.store
            .append_history(
                instance_id,
                HistoryEvent::ActivityFailed {
                    seq,
                    name: activity_name.to_string(),
                    attempts,
                    error: error.clone(),
                },
            )
            .await?;

        tracing::error!(
            instance_id,
            activity = activity_name,
            attempts,
            "Activity failed permanently: {}",
            error
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activities::Activity;
    use crate::retry::BackoffStrategy;
    use crate::store::MemoryInstanceStore;
    use approvals_models::{ActivityOutcome, WorkflowInput};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct Flaky {
        calls: AtomicU32,
        failures: u32,
    }

    #[async_trait]
    impl Activity for Flaky {
        async fn execute(&self, _ctx: &ActivityContext, input: Value) -> Result<Value, String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                Err(format!("status 503 on call {}", call))
            } else {
                Ok(input)
            }
        }
    }

    async fn setup(failures: u32, max_attempts: u32) -> (Arc<MemoryInstanceStore>, Arc<Flaky>, ActivityInvoker) {
        let store = Arc::new(MemoryInstanceStore::new());
        store.create("lead-1", &WorkflowInput::default()).await.unwrap();

        let flaky = Arc::new(Flaky {
            calls: AtomicU32::new(0),
            failures,
        });
        let registry = ActivityRegistry::builder().register("flaky", flaky.clone()).build();
        let policy = RetryPolicy::new(max_attempts).with_backoff(BackoffStrategy::Fixed {
            delay: Duration::from_millis(1),
        });

        let invoker = ActivityInvoker::new(store.clone(), Arc::new(registry), policy);
        (store, flaky, invoker)
    }

    fn outcomes(history: &[approvals_models::HistoryEntry]) -> Vec<ActivityOutcome> {
        history
            .iter()
            .filter_map(|e| match &e.event {
                HistoryEvent::ActivityAttempted { invocation, .. } => Some(invocation.outcome.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_records_each_attempt_until_success() {
        let (store, flaky, invoker) = setup(2, 3).await;

        let result = invoker
            .invoke("lead-1", 0, "flaky", serde_json::json!({"ok": true}))
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!({"ok": true}));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);

        let history = store.load("lead-1").await.unwrap().history;
        let outcomes = outcomes(&history);
        assert_eq!(outcomes.len(), 3);
        assert!(matches!(outcomes[0], ActivityOutcome::Failed { .. }));
        assert!(matches!(outcomes[1], ActivityOutcome::Failed { .. }));
        assert!(matches!(outcomes[2], ActivityOutcome::Succeeded { .. }));
    }

    #[tokio::test]
    async fn test_exhaustion_records_failure() {
        let (store, flaky, invoker) = setup(10, 2).await;

        let err = invoker
            .invoke("lead-1", 0, "flaky", Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, InvokerError::ActivityFailed { attempts: 2, .. }));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);

        let history = store.load("lead-1").await.unwrap().history;
        assert!(matches!(
            history.last().map(|e| &e.event),
            Some(HistoryEvent::ActivityFailed { attempts: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_resume_counts_recorded_attempts() {
        let (_store, flaky, invoker) = setup(10, 3).await;

        let err = invoker
            .resume("lead-1", 0, "flaky", Value::Null, 2)
            .await
            .unwrap_err();
        assert!(matches!(err, InvokerError::ActivityFailed { attempts: 3, .. }));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_activity_fails_without_attempts() {
        let (store, _flaky, invoker) = setup(0, 3).await;

        let err = invoker
            .invoke("lead-1", 0, "missing", Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, InvokerError::UnknownActivity(ref name) if name == "missing"));

        let history = store.load("lead-1").await.unwrap().history;
        assert_eq!(history.len(), 1);
        assert!(matches!(history[0].event, HistoryEvent::ActivityFailed { attempts: 0, .. }));
    }
}
