//! Name constants for activities

/// Activity names
pub mod activities {
    /// Ask a reviewer to approve the generated message
    ///
    /// **Input:** [`crate::activity_types::SendApprovalRequestInput`]
    /// **Output:** [`crate::activity_types::ActivityReceipt`]
    /// **Idempotent:** No (each attempt posts a new request)
    /// **Operations:**
    /// - POSTs the submission details and instance id to the approval endpoint
    /// - Non-2xx responses are retried
    pub const SEND_APPROVAL_REQUEST: &str = "send-approval-request";

    /// Send the approved message to the customer
    ///
    /// **Input:** [`crate::activity_types::SendNotificationInput`]
    /// **Output:** [`crate::activity_types::ActivityReceipt`]
    /// **Idempotent:** No
    /// **Operations:**
    /// - Renders the Markdown message to HTML
    /// - POSTs subject and HTML body to the notification endpoint
    pub const SEND_NOTIFICATION: &str = "send-notification";
}
