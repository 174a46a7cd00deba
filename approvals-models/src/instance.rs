//! Workflow instance and its lifecycle status

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{CompletionResult, HistoryEntry, HistoryEvent, PendingEventWaiter, WorkflowInput};

/// Lifecycle status of an orchestration instance
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum InstanceStatus {
    Created,
    Running,
    WaitingForEvent,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown instance status '{0}'")]
pub struct ParseStatusError(pub String);

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Created => "Created",
            InstanceStatus::Running => "Running",
            InstanceStatus::WaitingForEvent => "WaitingForEvent",
            InstanceStatus::Completed => "Completed",
            InstanceStatus::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InstanceStatus::Completed | InstanceStatus::Failed)
    }

    /// Forward-only transition table.
    pub fn can_transition_to(&self, next: InstanceStatus) -> bool {
        use InstanceStatus::*;

        matches!(
            (self, next),
            (Created, Running)
                | (Running, WaitingForEvent)
                | (WaitingForEvent, Running)
                | (Running, Completed)
                | (Running, Failed)
        )
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Created" => Ok(InstanceStatus::Created),
            "Running" => Ok(InstanceStatus::Running),
            "WaitingForEvent" => Ok(InstanceStatus::WaitingForEvent),
            "Completed" => Ok(InstanceStatus::Completed),
            "Failed" => Ok(InstanceStatus::Failed),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// One run of the approval workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowInstance {
    pub id: String,
    pub status: InstanceStatus,
    pub input: WorkflowInput,
    pub correlation_id: String,
    pub history: Vec<HistoryEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowInstance {
    pub fn new(id: impl Into<String>, input: WorkflowInput, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            status: InstanceStatus::Created,
            correlation_id: input.correlation_id.clone(),
            input,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Error recorded when the instance failed.
    pub fn last_error(&self) -> Option<&str> {
        self.history.iter().rev().find_map(|entry| match &entry.event {
            HistoryEvent::OrchestrationFailed { error } => Some(error.as_str()),
            _ => None,
        })
    }

    /// Completion result recorded when the instance completed.
    pub fn completion(&self) -> Option<&CompletionResult> {
        self.history.iter().find_map(|entry| match &entry.event {
            HistoryEvent::OrchestrationCompleted { result } => Some(result),
            _ => None,
        })
    }

    /// Whether the completion result reached the egress sink.
    pub fn is_delivered(&self) -> bool {
        self.history
            .iter()
            .any(|entry| matches!(entry.event, HistoryEvent::CompletionDelivered { .. }))
    }

    /// Waiter registered in history and not yet raised or abandoned.
    pub fn pending_waiter(&self) -> Option<PendingEventWaiter> {
        let (seq, name, deadline) = self.history.iter().rev().find_map(|entry| match &entry.event {
            HistoryEvent::WaiterRegistered { seq, name, deadline } => {
                Some((*seq, name.clone(), *deadline))
            }
            _ => None,
        })?;

        let resolved = self.history.iter().any(|entry| match &entry.event {
            HistoryEvent::EventRaised { seq: s, .. } | HistoryEvent::WaiterAbandoned { seq: s, .. } => {
                *s == seq
            }
            _ => false,
        });

        if resolved {
            return None;
        }

        Some(PendingEventWaiter {
            instance_id: self.id.clone(),
            event_name: name,
            seq,
            deadline,
        })
    }

    pub fn summary(&self) -> InstanceSummary {
        InstanceSummary {
            id: self.id.clone(),
            status: self.status,
            correlation_id: self.correlation_id.clone(),
            last_error: self.last_error().map(str::to_string),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Instance listing row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceSummary {
    pub id: String,
    pub status: InstanceStatus,
    pub correlation_id: String,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
