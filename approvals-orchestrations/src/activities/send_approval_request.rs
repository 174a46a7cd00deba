//! Send approval request activity

use super::{ActivityContext, HttpEndpoint};
use crate::activity_names::activities;
use crate::activity_types::{ActivityReceipt, SendApprovalRequestInput};

/// Activity name for registration and scheduling
pub const NAME: &str = activities::SEND_APPROVAL_REQUEST;

pub async fn activity(
    ctx: ActivityContext,
    endpoint: HttpEndpoint,
    input: SendApprovalRequestInput,
) -> Result<ActivityReceipt, String> {
    ctx.trace_info(format!(
        "Sending approval request for form input '{}'",
        input.form_input_id
    ));

    let receipt = endpoint
        .post_json(&input)
        .await
        .map_err(|e| format!("Failed to send approval request: {}", e))?;

    ctx.trace_info("Approval request sent successfully");
    Ok(receipt)
}
