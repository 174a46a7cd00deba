//! Side-effecting activities and the plumbing to run them
//!
//! An activity is the only place allowed to touch the outside world (network,
//! clock, randomness). The orchestration only ever sees the recorded result.

pub mod send_approval_request;
pub mod send_notification;

use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::activity_types::ActivityReceipt;

/// Per-attempt context handed to an activity
#[derive(Debug, Clone)]
pub struct ActivityContext {
    instance_id: String,
    activity_name: String,
    attempt: u32,
}

impl ActivityContext {
    pub fn new(instance_id: &str, activity_name: &str, attempt: u32) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            activity_name: activity_name.to_string(),
            attempt,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn activity_name(&self) -> &str {
        &self.activity_name
    }

    pub fn trace_info(&self, message: impl AsRef<str>) {
        tracing::info!(
            instance_id = %self.instance_id,
            activity = %self.activity_name,
            attempt = self.attempt,
            "{}",
            message.as_ref()
        );
    }

    pub fn trace_warn(&self, message: impl AsRef<str>) {
        tracing::warn!(
            instance_id = %self.instance_id,
            activity = %self.activity_name,
            attempt = self.attempt,
            "{}",
            message.as_ref()
        );
    }
}

/// A named side-effecting operation. An `Err` is treated as retryable by the
/// invoker.
#[async_trait]
pub trait Activity: Send + Sync {
    async fn execute(&self, ctx: &ActivityContext, input: Value) -> Result<Value, String>;
}

/// Adapts a typed async function into an [`Activity`], decoding the input
/// and encoding the output as JSON.
pub(crate) struct TypedActivity<F, I, O> {
    f: F,
    _types: PhantomData<fn(I) -> O>,
}

impl<F, I, O> TypedActivity<F, I, O> {
    pub(crate) fn new(f: F) -> Self {
        Self {
            f,
            _types: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut, I, O> Activity for TypedActivity<F, I, O>
where
    F: Fn(ActivityContext, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, String>> + Send + 'static,
    I: DeserializeOwned + Send + 'static,
    O: Serialize + Send + 'static,
{
    async fn execute(&self, ctx: &ActivityContext, input: Value) -> Result<Value, String> {
        let input: I = serde_json::from_value(input)
            .map_err(|e| format!("Invalid input for activity '{}': {}", ctx.activity_name(), e))?;

        let output = (self.f)(ctx.clone(), input).await?;

        serde_json::to_value(output)
            .map_err(|e| format!("Failed to encode output of '{}': {}", ctx.activity_name(), e))
    }
}

/// Outbound HTTP target shared by the HTTP activities
#[derive(Debug, Clone)]
pub struct HttpEndpoint {
    client: reqwest::Client,
    url: String,
}

impl HttpEndpoint {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POSTs `body` as JSON. Transport errors and non-2xx responses both
    /// come back as `Err`.
    pub async fn post_json<T: Serialize + ?Sized>(&self, body: &T) -> Result<ActivityReceipt, String> {
        let response = self
            .client
            .post(&self.url)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("Request to {} failed: {}", self.url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("{} responded with status {}", self.url, status));
        }

        Ok(ActivityReceipt {
            status_code: status.as_u16(),
        })
    }
}
