use std::collections::HashMap;

use approvals_models::{
    HistoryEntry, HistoryEvent, InstanceStatus, InstanceSummary, WorkflowInput, WorkflowInstance,
};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{check_transition, InstanceStore};
use crate::error::StoreError;

/// Process-local store. Writes are serialized by a single lock; nothing
/// survives a restart, so it backs tests and local runs without a database.
#[derive(Debug, Default)]
pub struct MemoryInstanceStore {
    instances: Mutex<HashMap<String, WorkflowInstance>>,
}

impl MemoryInstanceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InstanceStore for MemoryInstanceStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create(&self, id: &str, input: &WorkflowInput) -> Result<WorkflowInstance, StoreError> {
        let mut instances = self.instances.lock().await;
        if instances.contains_key(id) {
            return Err(StoreError::DuplicateInstance(id.to_string()));
        }

        let instance = WorkflowInstance::new(id, input.clone(), Utc::now());
        instances.insert(id.to_string(), instance.clone());
        Ok(instance)
    }

    async fn load(&self, id: &str) -> Result<WorkflowInstance, StoreError> {
        self.instances
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn append_history(&self, id: &str, event: HistoryEvent) -> Result<HistoryEntry, StoreError> {
        let mut instances = self.instances.lock().await;
        let instance = instances
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let now = Utc::now();
        let entry = HistoryEntry {
            sequence_number: instance.history.len() as u64,
            recorded_at: now,
            event,
        };
        instance.history.push(entry.clone());
        instance.updated_at = now;
        Ok(entry)
    }

    async fn set_status(&self, id: &str, status: InstanceStatus) -> Result<(), StoreError> {
        let mut instances = self.instances.lock().await;
        let instance = instances
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        check_transition(id, instance.status, status)?;
        instance.status = status;
        instance.updated_at = Utc::now();
        Ok(())
    }

    async fn list(&self, status: Option<InstanceStatus>) -> Result<Vec<InstanceSummary>, StoreError> {
        let instances = self.instances.lock().await;
        let mut summaries: Vec<InstanceSummary> = instances
            .values()
            .filter(|instance| status.map_or(true, |s| instance.status == s))
            .map(WorkflowInstance::summary)
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(summaries)
    }
}
