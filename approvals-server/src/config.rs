use std::time::Duration;

use anyhow::{Context, Result};
use approvals_orchestrations::{BackoffStrategy, RetryPolicy};

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string; the in-memory store is used when unset
    pub database_url: Option<String>,
    pub server_host: String,
    pub server_port: u16,
    pub approval_request_url: String,
    pub notification_url: String,
    /// Completion queue endpoint; results are only logged when unset
    pub completion_sink_url: Option<String>,
    pub activity_max_attempts: u32,
    pub activity_backoff_ms: u64,
    pub publish_max_attempts: u32,
    pub approval_timeout_secs: Option<u64>,
    pub http_timeout_secs: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_source(|key| std::env::var(key).ok())
    }

    fn from_source(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            database_url: get("DATABASE_URL"),
            server_host: get("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            server_port: get("SERVER_PORT")
                .unwrap_or_else(|| "8080".to_string())
                .parse()
                .context("SERVER_PORT must be a valid port number")?,
            approval_request_url: get("APPROVAL_REQUEST_URL")
                .context("APPROVAL_REQUEST_URL must be set")?,
            notification_url: get("NOTIFICATION_URL").context("NOTIFICATION_URL must be set")?,
            completion_sink_url: get("COMPLETION_SINK_URL"),
            activity_max_attempts: get("ACTIVITY_MAX_ATTEMPTS")
                .unwrap_or_else(|| "3".to_string())
                .parse()
                .context("ACTIVITY_MAX_ATTEMPTS must be a positive integer")?,
            activity_backoff_ms: get("ACTIVITY_BACKOFF_MS")
                .unwrap_or_else(|| "1000".to_string())
                .parse()
                .context("ACTIVITY_BACKOFF_MS must be a number of milliseconds")?,
            publish_max_attempts: get("PUBLISH_MAX_ATTEMPTS")
                .unwrap_or_else(|| "5".to_string())
                .parse()
                .context("PUBLISH_MAX_ATTEMPTS must be a positive integer")?,
            approval_timeout_secs: get("APPROVAL_TIMEOUT_SECS")
                .map(|v| v.parse::<u64>())
                .transpose()
                .context("APPROVAL_TIMEOUT_SECS must be a number of seconds")?,
            http_timeout_secs: get("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|| "30".to_string())
                .parse()
                .context("HTTP_TIMEOUT_SECS must be a number of seconds")?,
        })
    }

    pub fn activity_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.activity_max_attempts).with_backoff(self.backoff())
    }

    pub fn publish_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.publish_max_attempts).with_backoff(self.backoff())
    }

    pub fn approval_timeout(&self) -> Option<Duration> {
        self.approval_timeout_secs.map(Duration::from_secs)
    }

    fn backoff(&self) -> BackoffStrategy {
        BackoffStrategy::Exponential {
            base: Duration::from_millis(self.activity_backoff_ms),
            multiplier: 2.0,
            max: Duration::from_secs(60),
        }
    }
}
