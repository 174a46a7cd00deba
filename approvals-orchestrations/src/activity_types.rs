//! Input and output types for activities

use approvals_models::WorkflowInput;
use serde::{Deserialize, Serialize};

// ============================================================================
// Send Approval Request Activity
// ============================================================================

/// Body posted to the approval endpoint. The reviewer UI echoes
/// `instance_id` back when raising the decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SendApprovalRequestInput {
    pub instance_id: String,
    pub form_input_id: String,
    pub subject: String,
    pub message: String,
    pub name: String,
    pub industry: String,
    pub business_process_description: String,
    pub process_frequency: String,
    pub process_duration: String,
}

impl SendApprovalRequestInput {
    pub fn from_workflow(instance_id: &str, input: &WorkflowInput) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            form_input_id: input.form_input_id.clone(),
            subject: input.subject.clone(),
            message: input.message.clone(),
            name: input.name.clone(),
            industry: input.industry.clone(),
            business_process_description: input.business_process_description.clone(),
            process_frequency: input.process_frequency.clone(),
            process_duration: input.process_duration.clone(),
        }
    }
}

// ============================================================================
// Send Notification Activity
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendNotificationInput {
    pub subject: String,
    /// Markdown source, rendered to HTML by the activity
    pub message: String,
}

impl SendNotificationInput {
    pub fn from_workflow(input: &WorkflowInput) -> Self {
        Self {
            subject: input.subject.clone(),
            message: input.message.clone(),
        }
    }
}

/// Body posted to the notification endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationPayload {
    pub subject: String,
    /// HTML body
    pub message: String,
}

// ============================================================================
// Shared
// ============================================================================

/// Acknowledgement from an outbound HTTP activity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityReceipt {
    pub status_code: u16,
}
