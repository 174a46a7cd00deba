//! Request and response bodies for the HTTP API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CompletionResult, HistoryEntry, InstanceStatus, WorkflowInput, WorkflowInstance};

/// Request to start a new approval orchestration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StartApprovalRequest {
    /// Caller-supplied instance id; generated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    #[serde(flatten)]
    pub input: WorkflowInput,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StartApprovalResponse {
    pub instance_id: String,
    pub status: InstanceStatus,
}

/// Reviewer decision posted back by the approval UI.
///
/// Fields are optional so a missing `instanceId` or `approved` is reported as
/// a bad request instead of a deserialization failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RaiseEventRequest {
    #[serde(default)]
    pub instance_id: Option<String>,
    #[serde(default)]
    pub approved: Option<bool>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RaiseEventResponse {
    pub approved: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AbandonRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Full view of one instance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InstanceDetail {
    pub instance_id: String,
    pub status: InstanceStatus,
    pub correlation_id: String,
    pub last_error: Option<String>,
    pub completion: Option<CompletionResult>,
    pub delivered: bool,
    pub waiting_for: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub history: Vec<HistoryEntry>,
}

impl From<&WorkflowInstance> for InstanceDetail {
    fn from(instance: &WorkflowInstance) -> Self {
        Self {
            instance_id: instance.id.clone(),
            status: instance.status,
            correlation_id: instance.correlation_id.clone(),
            last_error: instance.last_error().map(str::to_string),
            completion: instance.completion().cloned(),
            delivered: instance.is_delivered(),
            waiting_for: instance.pending_waiter().map(|w| w.event_name),
            created_at: instance.created_at,
            updated_at: instance.updated_at,
            history: instance.history.clone(),
        }
    }
}
