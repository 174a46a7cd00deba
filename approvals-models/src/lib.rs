//! Shared data model for the lead approval orchestrator.
//!
//! Everything here is plain data: the workflow input carried by a submission,
//! the persisted instance with its append-only history, the decision raised by
//! a reviewer and the completion result published once per instance.

pub mod api;
pub mod history;
pub mod instance;
pub mod workflow;

pub use api::*;
pub use history::*;
pub use instance::*;
pub use workflow::*;
