//! Append-only execution history recorded for each instance

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::CompletionResult;

/// Outcome of a single activity attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActivityOutcome {
    Pending,
    Succeeded { result: Value },
    Failed { error: String },
}

/// One attempt at running a side-effecting activity.
///
/// Only attempts with a terminal outcome are written to history; a recorded
/// invocation is never changed afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityInvocation {
    pub instance_id: String,
    pub activity_name: String,
    pub input: Value,
    /// 1-based attempt number
    pub attempt: u32,
    pub outcome: ActivityOutcome,
}

impl ActivityInvocation {
    pub fn new(instance_id: &str, activity_name: &str, input: Value, attempt: u32) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            activity_name: activity_name.to_string(),
            input,
            attempt,
            outcome: ActivityOutcome::Pending,
        }
    }

    pub fn succeeded(mut self, result: Value) -> Self {
        self.outcome = ActivityOutcome::Succeeded { result };
        self
    }

    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.outcome = ActivityOutcome::Failed { error: error.into() };
        self
    }
}

/// Waiter registered while an instance is suspended on an external event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingEventWaiter {
    pub instance_id: String,
    pub event_name: String,
    /// Ordinal of the wait within the orchestration
    pub seq: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
}

/// Recorded step outcome. `seq` numbers activities and waits separately, in
/// the order the orchestration issues them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryEvent {
    ActivityScheduled {
        seq: u32,
        name: String,
        input: Value,
    },
    ActivityAttempted {
        seq: u32,
        invocation: ActivityInvocation,
    },
    /// Retries exhausted
    ActivityFailed {
        seq: u32,
        name: String,
        attempts: u32,
        error: String,
    },
    WaiterRegistered {
        seq: u32,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        deadline: Option<DateTime<Utc>>,
    },
    EventRaised {
        seq: u32,
        name: String,
        payload: Value,
    },
    WaiterAbandoned {
        seq: u32,
        name: String,
        reason: String,
    },
    OrchestrationCompleted {
        result: CompletionResult,
    },
    OrchestrationFailed {
        error: String,
    },
    CompletionDelivered {
        attempts: u32,
    },
}

impl HistoryEvent {
    /// Short label used in logs and listings.
    pub fn kind(&self) -> &'static str {
        match self {
            HistoryEvent::ActivityScheduled { .. } => "activity_scheduled",
            HistoryEvent::ActivityAttempted { .. } => "activity_attempted",
            HistoryEvent::ActivityFailed { .. } => "activity_failed",
            HistoryEvent::WaiterRegistered { .. } => "waiter_registered",
            HistoryEvent::EventRaised { .. } => "event_raised",
            HistoryEvent::WaiterAbandoned { .. } => "waiter_abandoned",
            HistoryEvent::OrchestrationCompleted { .. } => "orchestration_completed",
            HistoryEvent::OrchestrationFailed { .. } => "orchestration_failed",
            HistoryEvent::CompletionDelivered { .. } => "completion_delivered",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    /// Position in the instance history, starting at 0
    pub sequence_number: u64,
    pub recorded_at: DateTime<Utc>,
    pub event: HistoryEvent,
}
