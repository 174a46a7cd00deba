//! Instance Store: durable persistence of instances and their history
//!
//! The store is the single source of truth. Every mutation goes through
//! [`InstanceStore::append_history`] or [`InstanceStore::set_status`], both of
//! which serialize concurrent writers on the same instance id and are durable
//! once they return.

mod memory;
mod postgres;

pub use memory::MemoryInstanceStore;
pub use postgres::PostgresInstanceStore;

use approvals_models::{
    HistoryEntry, HistoryEvent, InstanceStatus, InstanceSummary, WorkflowInput, WorkflowInstance,
};
use async_trait::async_trait;

use crate::error::StoreError;

#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Backend name for diagnostics
    fn name(&self) -> &str;

    /// Creates an instance in `Created` status. Fails with `DuplicateInstance`
    /// if the id is taken.
    async fn create(&self, id: &str, input: &WorkflowInput) -> Result<WorkflowInstance, StoreError>;

    async fn load(&self, id: &str) -> Result<WorkflowInstance, StoreError>;

    /// Appends one entry to the instance history, atomically with respect to
    /// other writers on the same id.
    async fn append_history(&self, id: &str, event: HistoryEvent) -> Result<HistoryEntry, StoreError>;

    /// Moves the instance to `status`, validating the forward-only transition
    /// table.
    async fn set_status(&self, id: &str, status: InstanceStatus) -> Result<(), StoreError>;

    /// Lists instances, newest first, optionally filtered by status.
    async fn list(&self, status: Option<InstanceStatus>) -> Result<Vec<InstanceSummary>, StoreError>;
}

pub(crate) fn check_transition(
    id: &str,
    from: InstanceStatus,
    to: InstanceStatus,
) -> Result<(), StoreError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(StoreError::InvalidTransition {
            id: id.to_string(),
            from,
            to,
        })
    }
}
