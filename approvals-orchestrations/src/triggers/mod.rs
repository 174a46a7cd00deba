//! Trigger adapters at the orchestration boundary
//!
//! Ingress turns a start request into a new instance. Egress publishes the
//! completion result of a finished instance.

pub mod egress;
pub mod ingress;

pub use egress::{ChannelCompletionSink, CompletionPublisher, CompletionSink, HttpCompletionSink};
pub use ingress::{Ingress, StartOutcome};
