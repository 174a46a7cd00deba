//! Name constants for orchestrations and external events
//!
//! Names are written into instance history, so they must stay stable across
//! releases.

/// Orchestration names
pub mod orchestrations {
    /// Lead approval with a human decision
    ///
    /// **Input:** [`approvals_models::WorkflowInput`]
    /// **Output:** [`approvals_models::CompletionResult`]
    /// **Activities used:**
    /// - [`crate::activity_names::activities::SEND_APPROVAL_REQUEST`]
    /// - [`crate::activity_names::activities::SEND_NOTIFICATION`] (approved only)
    /// **Events awaited:** [`super::events::APPROVAL_RESPONSE`]
    /// **Duration:** unbounded, waits for a reviewer
    pub const APPROVAL_WORKFLOW: &str = "approval-workflow";
}

/// External event names
pub mod events {
    /// Reviewer decision
    ///
    /// **Payload:** [`approvals_models::ApprovalDecision`]
    pub const APPROVAL_RESPONSE: &str = "ApprovalResponse";
}
