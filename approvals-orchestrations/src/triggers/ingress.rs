//! Ingress: starts new approval instances

use std::sync::Arc;

use approvals_models::{InstanceStatus, StartApprovalRequest};
use uuid::Uuid;

use crate::engine::OrchestrationEngine;
use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOutcome {
    pub instance_id: String,
    pub status: InstanceStatus,
}

#[derive(Clone)]
pub struct Ingress {
    engine: Arc<OrchestrationEngine>,
}

impl Ingress {
    pub fn new(engine: Arc<OrchestrationEngine>) -> Self {
        Self { engine }
    }

    /// Creates the instance and drives its first turn. An id that already
    /// exists is rejected and the existing instance is left untouched.
    pub async fn start(&self, request: StartApprovalRequest) -> Result<StartOutcome, EngineError> {
        request.input.validate()?;

        let instance_id = request
            .instance_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        self.engine.store().create(&instance_id, &request.input).await?;
        tracing::info!(
            instance_id = %instance_id,
            correlation_id = %request.input.correlation_id,
            "Approval instance created"
        );

        let status = self.engine.run_turn(&instance_id).await?;
        Ok(StartOutcome { instance_id, status })
    }
}
