//! Static flow diagrams for orchestrations
//!
//! These Mermaid diagrams describe the expected flow of each orchestration.
//! A UI can overlay an instance history on them to show progress.

use crate::activity_names::activities;
use crate::names::{events, orchestrations};

/// Node IDs map to activity or event names for matching against history
#[derive(Debug)]
pub struct FlowDiagram {
    /// The orchestration name this flow belongs to
    pub orchestration_name: &'static str,
    /// Mermaid flowchart definition
    pub mermaid: &'static str,
    /// Mapping of node IDs to history names
    pub node_mappings: &'static [(&'static str, &'static str)],
}

/// Approval workflow flow
pub const APPROVAL_FLOW: FlowDiagram = FlowDiagram {
    orchestration_name: orchestrations::APPROVAL_WORKFLOW,
    mermaid: r#"flowchart TD
    start(["▶ Start"])
    send_request["📋 Send Approval Request<br/><small>with retry</small>"]
    wait_decision{"⏳ Approval Response"}
    send_notification["📋 Send Notification<br/><small>Markdown rendered to HTML</small>"]
    approved(["🏁 APPROVED"])
    rejected(["🏁 REJECTED"])
    failed(["💥 Failed"])

    start --> send_request
    send_request -->|exhausted| failed
    send_request --> wait_decision
    wait_decision -->|abandoned| failed
    wait_decision -->|approved| send_notification
    wait_decision -->|rejected| rejected
    send_notification -->|exhausted| failed
    send_notification --> approved
"#,
    node_mappings: &[
        ("send_request", activities::SEND_APPROVAL_REQUEST),
        ("wait_decision", events::APPROVAL_RESPONSE),
        ("send_notification", activities::SEND_NOTIFICATION),
    ],
};

/// Get all flow diagrams
pub fn get_all_flows() -> Vec<&'static FlowDiagram> {
    vec![&APPROVAL_FLOW]
}

/// Get flow diagram by orchestration name
pub fn get_flow_by_name(name: &str) -> Option<&'static FlowDiagram> {
    get_all_flows()
        .into_iter()
        .find(|flow| flow.orchestration_name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_lookup() {
        assert!(get_flow_by_name(orchestrations::APPROVAL_WORKFLOW).is_some());
        assert!(get_flow_by_name("create-instance").is_none());
    }

    #[test]
    fn test_every_mapped_node_is_in_the_diagram() {
        for (node, _) in APPROVAL_FLOW.node_mappings {
            assert!(APPROVAL_FLOW.mermaid.contains(node), "missing node {}", node);
        }
    }
}
