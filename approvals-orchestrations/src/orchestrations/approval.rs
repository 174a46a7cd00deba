//! Lead approval orchestration

use approvals_models::{ApprovalDecision, CompletionResult, WorkflowInput};

use crate::activity_names::activities;
use crate::activity_types::{ActivityReceipt, SendApprovalRequestInput, SendNotificationInput};
use crate::names::events;
use crate::replay::{Interrupt, ReplayContext};

/// Sends the approval request, waits for the reviewer, notifies the customer
/// when approved and returns the correlated result.
pub fn approval_orchestration(
    ctx: &mut ReplayContext<'_>,
    input: &WorkflowInput,
) -> Result<CompletionResult, Interrupt> {
    let request = SendApprovalRequestInput::from_workflow(ctx.instance_id(), input);
    let _: ActivityReceipt = ctx.call_activity(activities::SEND_APPROVAL_REQUEST, &request)?;

    let decision: ApprovalDecision = ctx.wait_for_event(events::APPROVAL_RESPONSE)?;

    if decision.approved {
        let notification = SendNotificationInput::from_workflow(input);
        let _: ActivityReceipt = ctx.call_activity(activities::SEND_NOTIFICATION, &notification)?;
    }

    Ok(CompletionResult::from_decision(&input.correlation_id, &decision))
}
