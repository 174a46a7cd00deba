#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use approvals_models::{
    CompletionResult, HistoryEntry, HistoryEvent, InstanceStatus, InstanceSummary, StartApprovalRequest,
    WorkflowInput, WorkflowInstance,
};
use approvals_orchestrations::activities::{Activity, ActivityContext};
use approvals_orchestrations::activity_names::activities;
use approvals_orchestrations::registry::ActivityRegistry;
use approvals_orchestrations::store::{InstanceStore, MemoryInstanceStore};
use approvals_orchestrations::triggers::{ChannelCompletionSink, CompletionPublisher, CompletionSink, Ingress};
use approvals_orchestrations::{
    ActivityInvoker, BackoffStrategy, EngineOptions, EventCorrelator, OrchestrationEngine, RetryPolicy, StoreError,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedReceiver;

/// Activity that fails a fixed number of times, then succeeds.
pub struct ScriptedActivity {
    failures: u32,
    calls: AtomicU32,
}

impl ScriptedActivity {
    pub fn new(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            failures,
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Activity for ScriptedActivity {
    async fn execute(&self, _ctx: &ActivityContext, _input: Value) -> Result<Value, String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            Err("endpoint responded with status 503".to_string())
        } else {
            Ok(json!({"statusCode": 200}))
        }
    }
}

/// Sink that rejects a fixed number of sends before forwarding to a channel.
pub struct ScriptedSink {
    failures: u32,
    calls: AtomicU32,
    inner: ChannelCompletionSink,
}

#[async_trait]
impl CompletionSink for ScriptedSink {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn send(&self, result: &CompletionResult) -> Result<(), String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            Err("queue unavailable".to_string())
        } else {
            self.inner.send(result).await
        }
    }
}

#[derive(Default)]
struct Faults {
    failing_loads: HashSet<String>,
    slow_appends: HashMap<String, Duration>,
}

/// Memory store with per-instance failures and delays switched on by tests.
pub struct FaultyStore {
    inner: Arc<MemoryInstanceStore>,
    faults: Mutex<Faults>,
}

impl FaultyStore {
    pub fn new(inner: Arc<MemoryInstanceStore>) -> Self {
        Self {
            inner,
            faults: Mutex::new(Faults::default()),
        }
    }

    pub fn fail_loads(&self, id: &str) {
        self.faults.lock().unwrap().failing_loads.insert(id.to_string());
    }

    pub fn delay_appends(&self, id: &str, delay: Duration) {
        self.faults.lock().unwrap().slow_appends.insert(id.to_string(), delay);
    }

    pub fn heal(&self) {
        *self.faults.lock().unwrap() = Faults::default();
    }
}

#[async_trait]
impl InstanceStore for FaultyStore {
    fn name(&self) -> &str {
        "faulty"
    }

    async fn create(&self, id: &str, input: &WorkflowInput) -> Result<WorkflowInstance, StoreError> {
        self.inner.create(id, input).await
    }

    async fn load(&self, id: &str) -> Result<WorkflowInstance, StoreError> {
        if self.faults.lock().unwrap().failing_loads.contains(id) {
            return Err(StoreError::Corrupt {
                id: id.to_string(),
                message: "row unreadable".to_string(),
            });
        }
        self.inner.load(id).await
    }

    async fn append_history(&self, id: &str, event: HistoryEvent) -> Result<HistoryEntry, StoreError> {
        let delay = self.faults.lock().unwrap().slow_appends.get(id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.append_history(id, event).await
    }

    async fn set_status(&self, id: &str, status: InstanceStatus) -> Result<(), StoreError> {
        self.inner.set_status(id, status).await
    }

    async fn list(&self, status: Option<InstanceStatus>) -> Result<Vec<InstanceSummary>, StoreError> {
        self.inner.list(status).await
    }
}

#[derive(Debug, Clone, Default)]
pub struct HarnessOptions {
    pub request_failures: u32,
    pub notification_failures: u32,
    pub sink_failures: u32,
    pub engine: EngineOptions,
}

pub struct Harness {
    pub store: Arc<MemoryInstanceStore>,
    pub faults: Arc<FaultyStore>,
    pub engine: Arc<OrchestrationEngine>,
    pub ingress: Ingress,
    pub approval_request: Arc<ScriptedActivity>,
    pub notification: Arc<ScriptedActivity>,
    pub completions: UnboundedReceiver<CompletionResult>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(HarnessOptions::default())
    }

    pub fn with_options(options: HarnessOptions) -> Self {
        Self::over(Arc::new(MemoryInstanceStore::new()), options)
    }

    /// Builds a fresh engine over an existing store, as after a restart.
    pub fn over(store: Arc<MemoryInstanceStore>, options: HarnessOptions) -> Self {
        let approval_request = ScriptedActivity::new(options.request_failures);
        let notification = ScriptedActivity::new(options.notification_failures);

        let registry = ActivityRegistry::builder()
            .register(activities::SEND_APPROVAL_REQUEST, approval_request.clone())
            .register(activities::SEND_NOTIFICATION, notification.clone())
            .build();

        let (channel, completions) = ChannelCompletionSink::new();
        let sink = ScriptedSink {
            failures: options.sink_failures,
            calls: AtomicU32::new(0),
            inner: channel,
        };

        let faults = Arc::new(FaultyStore::new(store.clone()));
        let shared: Arc<dyn InstanceStore> = faults.clone();
        let engine = OrchestrationEngine::new(
            shared.clone(),
            ActivityInvoker::new(shared.clone(), Arc::new(registry), fast_policy(3)),
            EventCorrelator::new(shared.clone()),
            CompletionPublisher::new(Arc::new(sink), shared, fast_policy(2)),
        )
        .with_options(options.engine);

        let engine = Arc::new(engine);
        Self {
            store,
            faults,
            ingress: Ingress::new(engine.clone()),
            engine,
            approval_request,
            notification,
            completions,
        }
    }
}

pub fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts).with_backoff(BackoffStrategy::Fixed {
        delay: Duration::from_millis(1),
    })
}

pub fn request(instance_id: &str, correlation_id: &str) -> StartApprovalRequest {
    StartApprovalRequest {
        instance_id: Some(instance_id.to_string()),
        input: WorkflowInput {
            form_input_id: "form-1".to_string(),
            message: "We can automate **invoice matching** for you.".to_string(),
            subject: "Automation proposal".to_string(),
            name: "Ada".to_string(),
            industry: "Logistics".to_string(),
            business_process_description: "Invoice matching".to_string(),
            process_frequency: "Daily".to_string(),
            process_duration: "2h".to_string(),
            correlation_id: correlation_id.to_string(),
        },
    }
}
