//! Error taxonomy for the orchestration core

use approvals_models::{InstanceStatus, ValidationError};
use thiserror::Error;

/// Instance Store failures. Invariant violations are always surfaced.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("instance '{0}' already exists")]
    DuplicateInstance(String),

    #[error("instance '{0}' not found")]
    NotFound(String),

    #[error("invalid status transition for instance '{id}': {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: InstanceStatus,
        to: InstanceStatus,
    },

    #[error("corrupt data for instance '{id}': {message}")]
    Corrupt { id: String, message: String },

    #[error("database error: {0}")]
    Backend(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum InvokerError {
    /// Retries exhausted; the owning instance is failed by the engine.
    #[error("activity '{activity}' failed after {attempts} attempt(s): {error}")]
    ActivityFailed {
        activity: String,
        attempts: u32,
        error: String,
    },

    #[error("activity '{0}' is not registered")]
    UnknownActivity(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum CorrelatorError {
    /// No waiter registered for the pair; the event is dropped.
    #[error("no instance '{instance_id}' is waiting for event '{event_name}'")]
    NoSuchInstance {
        instance_id: String,
        event_name: String,
    },

    #[error("instance '{instance_id}' already waits for event '{event_name}'")]
    WaiterExists {
        instance_id: String,
        event_name: String,
    },

    #[error("invalid payload for event '{event_name}': {message}")]
    InvalidPayload { event_name: String, message: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to publish completion for correlation id '{correlation_id}' after {attempts} attempt(s): {error}")]
    Exhausted {
        correlation_id: String,
        attempts: u32,
        error: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Invoker(#[from] InvokerError),

    #[error(transparent)]
    Correlator(#[from] CorrelatorError),

    #[error("invalid workflow input: {0}")]
    Validation(#[from] ValidationError),
}
