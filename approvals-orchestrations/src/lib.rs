//! Approvals Orchestrations - durable human-in-the-loop approval workflow
//!
//! This crate provides the orchestration core: the instance store, the
//! activity invoker with retry, the external event correlator, the replay
//! engine and the ingress/egress trigger adapters, plus the concrete
//! approval activities.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use approvals_models::StartApprovalRequest;
//! use approvals_orchestrations::activities::HttpEndpoint;
//! use approvals_orchestrations::registry::{create_activity_registry, ActivityEndpoints};
//! use approvals_orchestrations::store::{InstanceStore, MemoryInstanceStore};
//! use approvals_orchestrations::triggers::{ChannelCompletionSink, CompletionPublisher, Ingress};
//! use approvals_orchestrations::{ActivityInvoker, EventCorrelator, OrchestrationEngine, RetryPolicy};
//!
//! # async fn example(request: StartApprovalRequest) -> anyhow::Result<()> {
//! let store: Arc<dyn InstanceStore> = Arc::new(MemoryInstanceStore::new());
//! let client = reqwest::Client::new();
//! let activities = create_activity_registry(ActivityEndpoints {
//!     approval_request: HttpEndpoint::new(client.clone(), "http://localhost:5000/start-approval"),
//!     notification: HttpEndpoint::new(client, "http://localhost:5000/send-email"),
//! });
//! let (sink, _completions) = ChannelCompletionSink::new();
//!
//! let engine = Arc::new(OrchestrationEngine::new(
//!     store.clone(),
//!     ActivityInvoker::new(store.clone(), Arc::new(activities), RetryPolicy::default()),
//!     EventCorrelator::new(store.clone()),
//!     CompletionPublisher::new(Arc::new(sink), store, RetryPolicy::default()),
//! ));
//!
//! let outcome = Ingress::new(engine).start(request).await?;
//! println!("{} is {}", outcome.instance_id, outcome.status);
//! # Ok(())
//! # }
//! ```

// Orchestration exports
pub mod names;
pub mod orchestrations;
pub mod registry;
pub mod replay;

// Activity exports
pub mod activities;
pub mod activity_names;
pub mod activity_types;

pub mod correlator;
pub mod engine;
pub mod error;
pub mod invoker;
pub mod retry;
pub mod store;
pub mod triggers;

// Re-export key types for convenience
pub use activity_types::*;
pub use correlator::{EventCorrelator, ExpiredWaiters};
pub use engine::{EngineOptions, OrchestrationEngine, SweepReport};
pub use error::{CorrelatorError, EngineError, InvokerError, PublishError, StoreError};
pub use invoker::ActivityInvoker;
pub use retry::{BackoffStrategy, RetryPolicy};
