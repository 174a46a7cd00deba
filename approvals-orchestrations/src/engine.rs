//! Orchestrator Engine
//!
//! Drives instances one turn at a time. A turn loads the instance, replays
//! the orchestration over its history and performs the single action the
//! replay asks for, repeating until the orchestration suspends on an event
//! or finishes. Only one turn runs per instance; the per-instance lock is
//! released while an activity executes.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use approvals_models::{
    ApprovalDecision, HistoryEvent, InstanceStatus, InstanceSummary, PendingEventWaiter, WorkflowInstance,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::task::JoinSet;

use crate::correlator::EventCorrelator;
use crate::error::{CorrelatorError, EngineError, InvokerError};
use crate::invoker::ActivityInvoker;
use crate::names::events;
use crate::orchestrations::approval_orchestration;
use crate::replay::{replay, OrchestrationFn, PendingAction, ReplayOutcome};
use crate::store::InstanceStore;
use crate::triggers::CompletionPublisher;

#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Deadline for each event wait. `None` waits indefinitely.
    pub event_timeout: Option<Duration>,
}

/// Outcome of [`OrchestrationEngine::expire_waiters`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Instances whose turn ran
    pub driven: Vec<String>,
    /// Instances whose turn failed; retried on the next sweep
    pub failed: Vec<String>,
}

type LockTable = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Handle on one instance's turn lock. The table entry goes away with the
/// last handle.
struct InstanceLock<'a> {
    table: &'a LockTable,
    instance_id: String,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl InstanceLock<'_> {
    async fn acquire(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.lock.lock().await
    }
}

impl Drop for InstanceLock<'_> {
    fn drop(&mut self) {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the table, one in this handle.
        let unshared = table
            .get(&self.instance_id)
            .is_some_and(|lock| Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) == 2);
        if unshared {
            table.remove(&self.instance_id);
        }
    }
}

/// Work dispatched outside the instance lock
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Work {
    Activity(String, u32),
    Delivery(String),
}

pub struct OrchestrationEngine {
    store: Arc<dyn InstanceStore>,
    invoker: ActivityInvoker,
    correlator: EventCorrelator,
    publisher: CompletionPublisher,
    orchestration: OrchestrationFn,
    options: EngineOptions,
    locks: LockTable,
    in_flight: Mutex<HashSet<Work>>,
    deferred: Mutex<HashSet<String>>,
}

impl OrchestrationEngine {
    pub fn new(
        store: Arc<dyn InstanceStore>,
        invoker: ActivityInvoker,
        correlator: EventCorrelator,
        publisher: CompletionPublisher,
    ) -> Self {
        Self {
            store,
            invoker,
            correlator,
            publisher,
            orchestration: approval_orchestration,
            options: EngineOptions::default(),
            locks: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
            deferred: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_orchestration(mut self, orchestration: OrchestrationFn) -> Self {
        self.orchestration = orchestration;
        self
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn store(&self) -> &Arc<dyn InstanceStore> {
        &self.store
    }

    pub async fn instance(&self, instance_id: &str) -> Result<WorkflowInstance, EngineError> {
        Ok(self.store.load(instance_id).await?)
    }

    pub async fn list(&self, status: Option<InstanceStatus>) -> Result<Vec<InstanceSummary>, EngineError> {
        Ok(self.store.list(status).await?)
    }

    pub async fn pending_waiters(&self) -> Vec<PendingEventWaiter> {
        self.correlator.pending().await
    }

    /// Advances an instance as far as it can go without outside input and
    /// returns its status afterwards.
    pub async fn run_turn(&self, instance_id: &str) -> Result<InstanceStatus, EngineError> {
        let lock = self.lock_for(instance_id);
        let mut guard = lock.acquire().await;

        let finished = loop {
            let instance = self.store.load(instance_id).await?;
            let mut status = instance.status;

            if status.is_terminal() {
                break instance;
            }

            if status == InstanceStatus::Created {
                self.store.set_status(instance_id, InstanceStatus::Running).await?;
                status = InstanceStatus::Running;
                tracing::info!(instance_id, "Instance started");
            }

            match replay(self.orchestration, &instance) {
                ReplayOutcome::Completed(result) => {
                    if instance.completion().is_none() {
                        self.store
                            .append_history(instance_id, HistoryEvent::OrchestrationCompleted { result })
                            .await?;
                    }
                    self.advance(instance_id, status, InstanceStatus::Completed).await?;
                    tracing::info!(instance_id, "Instance completed");
                }
                ReplayOutcome::Failed(error) => {
                    if instance.last_error().is_none() {
                        self.store
                            .append_history(
                                instance_id,
                                HistoryEvent::OrchestrationFailed { error: error.clone() },
                            )
                            .await?;
                    }
                    self.advance(instance_id, status, InstanceStatus::Failed).await?;
                    tracing::error!(instance_id, "Instance failed: {}", error);
                }
                ReplayOutcome::Pending(PendingAction::ScheduleActivity { seq, name, input }) => {
                    self.advance(instance_id, status, InstanceStatus::Running).await?;
                    tracing::debug!(instance_id, activity = %name, seq, "Scheduling activity");
                    self.store
                        .append_history(instance_id, HistoryEvent::ActivityScheduled { seq, name, input })
                        .await?;
                }
                ReplayOutcome::Pending(PendingAction::AwaitActivity {
                    seq,
                    name,
                    input,
                    attempts_made,
                }) => {
                    self.advance(instance_id, status, InstanceStatus::Running).await?;

                    let work = Work::Activity(instance_id.to_string(), seq);
                    if !self.claim(&work) {
                        tracing::debug!(instance_id, activity = %name, "Activity already in flight");
                        return Ok(InstanceStatus::Running);
                    }

                    drop(guard);
                    let outcome = self
                        .invoker
                        .resume(instance_id, seq, &name, input, attempts_made)
                        .await;
                    self.release(&work);

                    match outcome {
                        Ok(_) | Err(InvokerError::ActivityFailed { .. }) | Err(InvokerError::UnknownActivity(_)) => {}
                        Err(e) => return Err(e.into()),
                    }
                    guard = lock.acquire().await;
                }
                ReplayOutcome::Pending(PendingAction::RegisterWaiter { seq, name }) => {
                    let deadline = self
                        .options
                        .event_timeout
                        .and_then(|timeout| chrono::Duration::from_std(timeout).ok())
                        .map(|timeout| Utc::now() + timeout);
                    self.correlator.register(instance_id, seq, &name, deadline).await?;
                }
                ReplayOutcome::Pending(PendingAction::AwaitEvent { name, .. }) => {
                    if let Some(waiter) = instance.pending_waiter() {
                        self.correlator.restore(waiter).await;
                    }
                    self.advance(instance_id, status, InstanceStatus::WaitingForEvent).await?;
                    tracing::info!(instance_id, event = %name, "Waiting for event");
                    return Ok(InstanceStatus::WaitingForEvent);
                }
            }
        };

        drop(guard);
        drop(lock);

        self.deliver(&finished).await;
        Ok(finished.status)
    }

    /// Delivers an event to a waiting instance and runs the resulting turn.
    pub async fn raise_event(
        &self,
        instance_id: &str,
        event_name: &str,
        payload: Value,
    ) -> Result<InstanceStatus, EngineError> {
        {
            let lock = self.lock_for(instance_id);
            let _guard = lock.acquire().await;
            self.correlator.raise(instance_id, event_name, payload).await?;
        }
        Ok(self.follow_up(instance_id).await)
    }

    /// Raises the reviewer decision for an approval instance.
    pub async fn submit_decision(
        &self,
        instance_id: &str,
        decision: &ApprovalDecision,
    ) -> Result<InstanceStatus, EngineError> {
        let payload = serde_json::to_value(decision).map_err(|e| CorrelatorError::InvalidPayload {
            event_name: events::APPROVAL_RESPONSE.to_string(),
            message: e.to_string(),
        })?;
        self.raise_event(instance_id, events::APPROVAL_RESPONSE, payload).await
    }

    /// Operator action: fails an instance that is waiting for an event.
    pub async fn abandon(&self, instance_id: &str, reason: &str) -> Result<InstanceStatus, EngineError> {
        {
            let lock = self.lock_for(instance_id);
            let _guard = lock.acquire().await;
            self.correlator.abandon(instance_id, reason).await?;
        }
        Ok(self.follow_up(instance_id).await)
    }

    /// Abandons waiters past their deadline and fails their instances.
    /// Turns deferred by earlier failures are retried in the same pass; one
    /// instance failing never stops the others.
    pub async fn expire_waiters(&self, now: DateTime<Utc>) -> SweepReport {
        let expired = self.correlator.expire_due(now).await;
        for e in &expired.errors {
            tracing::error!("Expired wait not recorded, retrying on next sweep: {}", e);
        }

        let mut ids = self.take_deferred();
        for waiter in expired.abandoned {
            tracing::warn!(instance_id = %waiter.instance_id, event = %waiter.event_name, "Event wait expired");
            ids.push(waiter.instance_id);
        }
        ids.sort();
        ids.dedup();

        let mut report = SweepReport::default();
        for id in ids {
            match self.run_turn(&id).await {
                Ok(_) => report.driven.push(id),
                Err(e) => {
                    tracing::error!(instance_id = %id, "Turn failed, retrying on next sweep: {}", e);
                    self.defer(&id);
                    report.failed.push(id);
                }
            }
        }
        report
    }

    /// Startup recovery: re-drives every unfinished instance, which re-arms
    /// waiters, resumes interrupted activities and re-publishes completions
    /// that never reached the sink. Returns the number of instances driven.
    pub async fn resume_all(self: &Arc<Self>) -> Result<usize, EngineError> {
        let mut ids = Vec::new();
        for summary in self.store.list(None).await? {
            match summary.status {
                InstanceStatus::Failed => {}
                InstanceStatus::Completed => {
                    if !self.store.load(&summary.id).await?.is_delivered() {
                        ids.push(summary.id);
                    }
                }
                _ => ids.push(summary.id),
            }
        }

        tracing::info!(count = ids.len(), "Resuming instances");

        let mut turns = JoinSet::new();
        for id in ids {
            let engine = Arc::clone(self);
            turns.spawn(async move {
                let result = engine.run_turn(&id).await;
                (id, result)
            });
        }

        let mut resumed = 0;
        while let Some(joined) = turns.join_next().await {
            match joined {
                Ok((_, Ok(_))) => resumed += 1,
                Ok((id, Err(e))) => {
                    tracing::error!(instance_id = %id, "Failed to resume instance: {}", e);
                    self.defer(&id);
                }
                Err(e) => tracing::error!("Resume task panicked: {}", e),
            }
        }
        Ok(resumed)
    }

    /// Runs the turn that consumes input already recorded in history. The
    /// input stays accepted when the turn fails; the turn is deferred to the
    /// next sweep instead.
    async fn follow_up(&self, instance_id: &str) -> InstanceStatus {
        match self.run_turn(instance_id).await {
            Ok(status) => status,
            Err(e) => {
                tracing::error!(instance_id, "Turn after recorded input failed, deferring: {}", e);
                self.defer(instance_id);
                InstanceStatus::Running
            }
        }
    }

    async fn deliver(&self, instance: &WorkflowInstance) {
        if instance.status != InstanceStatus::Completed || instance.is_delivered() {
            return;
        }
        let Some(result) = instance.completion() else {
            return;
        };

        let work = Work::Delivery(instance.id.clone());
        if !self.claim(&work) {
            return;
        }

        if let Err(e) = self.publisher.publish(&instance.id, result).await {
            tracing::error!(
                instance_id = %instance.id,
                sink = self.publisher.sink_name(),
                "Completion not delivered, will retry on next recovery: {}",
                e
            );
        }
        self.release(&work);
    }

    /// Walks the transition table from `from` to `to`, passing through
    /// `Running` where the table requires it.
    async fn advance(&self, instance_id: &str, from: InstanceStatus, to: InstanceStatus) -> Result<(), EngineError> {
        if from == to {
            return Ok(());
        }
        if from != InstanceStatus::Running && to != InstanceStatus::Running {
            self.store.set_status(instance_id, InstanceStatus::Running).await?;
        }
        self.store.set_status(instance_id, to).await?;
        Ok(())
    }

    fn lock_for(&self, instance_id: &str) -> InstanceLock<'_> {
        let lock = self
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(instance_id.to_string())
            .or_default()
            .clone();
        InstanceLock {
            table: &self.locks,
            instance_id: instance_id.to_string(),
            lock,
        }
    }

    fn defer(&self, instance_id: &str) {
        self.deferred
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(instance_id.to_string());
    }

    fn take_deferred(&self) -> Vec<String> {
        self.deferred
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect()
    }

    fn claim(&self, work: &Work) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(work.clone())
    }

    fn release(&self, work: &Work) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(work);
    }
}

#[cfg(test)]
impl OrchestrationEngine {
    fn lock_table_len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
