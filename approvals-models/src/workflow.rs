//! Workflow payloads: submission input, reviewer decision, completion result

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lead submission that starts an approval orchestration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowInput {
    /// Id of the stored lead form submission
    #[serde(default)]
    pub form_input_id: String,
    /// Message body (Markdown)
    #[serde(default)]
    pub message: String,
    /// Message subject
    #[serde(default)]
    pub subject: String,
    /// Customer name
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub industry: String,
    #[serde(default)]
    pub business_process_description: String,
    #[serde(default)]
    pub process_frequency: String,
    #[serde(default)]
    pub process_duration: String,
    /// Caller reference echoed back in the completion result
    #[serde(default)]
    pub correlation_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("field '{0}' is required")]
    MissingField(&'static str),
}

impl WorkflowInput {
    /// Checks the fields the orchestration cannot run without.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.correlation_id.trim().is_empty() {
            return Err(ValidationError::MissingField("correlationId"));
        }
        Ok(())
    }
}

/// Reviewer decision delivered as the `ApprovalResponse` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApprovalDecision {
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ApprovalDecision {
    pub fn approved() -> Self {
        Self { approved: true, reason: None }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            reason: Some(reason.into()),
        }
    }

    /// Builds a decision from raw request fields. A reason only survives on
    /// rejection.
    pub fn new(approved: bool, reason: Option<String>) -> Self {
        if approved {
            Self::approved()
        } else {
            Self {
                approved: false,
                reason: Some(reason.unwrap_or_default()),
            }
        }
    }
}

/// Outcome published to the egress sink, matched to the request by
/// `correlation_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResult {
    pub correlation_id: String,
    pub value: String,
}

impl CompletionResult {
    pub fn from_decision(correlation_id: impl Into<String>, decision: &ApprovalDecision) -> Self {
        let value = if decision.approved {
            "APPROVED".to_string()
        } else {
            format!(
                "REJECTED, Reason: {}",
                decision.reason.as_deref().unwrap_or_default()
            )
        };

        Self {
            correlation_id: correlation_id.into(),
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_input_uses_camel_case() {
        let json = serde_json::json!({
            "formInputId": "f-1",
            "message": "# Hello",
            "subject": "Automation proposal",
            "name": "Ada",
            "industry": "Logistics",
            "businessProcessDescription": "Invoice matching",
            "processFrequency": "Daily",
            "processDuration": "2h",
            "correlationId": "corr-1"
        });

        let input: WorkflowInput = serde_json::from_value(json).unwrap();
        assert_eq!(input.form_input_id, "f-1");
        assert_eq!(input.business_process_description, "Invoice matching");
        assert_eq!(input.correlation_id, "corr-1");
        assert!(input.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_correlation_id() {
        let input = WorkflowInput {
            subject: "s".to_string(),
            ..Default::default()
        };
        assert_eq!(
            input.validate(),
            Err(ValidationError::MissingField("correlationId"))
        );

        let sparse = WorkflowInput {
            correlation_id: "corr-1".to_string(),
            ..Default::default()
        };
        assert_eq!(sparse.validate(), Ok(()));
    }

    #[test]
    fn test_completion_value_for_decisions() {
        let approved = CompletionResult::from_decision("c", &ApprovalDecision::approved());
        assert_eq!(approved.value, "APPROVED");

        let rejected =
            CompletionResult::from_decision("c", &ApprovalDecision::rejected("too costly"));
        assert_eq!(rejected.value, "REJECTED, Reason: too costly");
    }

    #[test]
    fn test_decision_drops_reason_when_approved() {
        let decision = ApprovalDecision::new(true, Some("ignored".to_string()));
        assert_eq!(decision, ApprovalDecision::approved());

        let decision = ApprovalDecision::new(false, None);
        assert_eq!(decision.reason.as_deref(), Some(""));
    }
}
