//! Activity registry: maps activity names to implementations

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::activities::{self, Activity, ActivityContext, HttpEndpoint, TypedActivity};

#[derive(Clone, Default)]
pub struct ActivityRegistry {
    activities: HashMap<String, Arc<dyn Activity>>,
}

impl std::fmt::Debug for ActivityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityRegistry")
            .field("activities", &self.names())
            .finish()
    }
}

impl ActivityRegistry {
    pub fn builder() -> ActivityRegistryBuilder {
        ActivityRegistryBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Activity>> {
        self.activities.get(name).cloned()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.activities.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[derive(Default)]
pub struct ActivityRegistryBuilder {
    activities: HashMap<String, Arc<dyn Activity>>,
}

impl ActivityRegistryBuilder {
    pub fn register(mut self, name: &str, activity: Arc<dyn Activity>) -> Self {
        self.activities.insert(name.to_string(), activity);
        self
    }

    /// Registers a typed async function; input and output go through JSON.
    pub fn register_typed<F, Fut, I, O>(self, name: &str, f: F) -> Self
    where
        F: Fn(ActivityContext, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, String>> + Send + 'static,
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
    {
        self.register(name, Arc::new(TypedActivity::new(f)))
    }

    pub fn build(self) -> ActivityRegistry {
        ActivityRegistry {
            activities: self.activities,
        }
    }
}

/// Outbound endpoints used by the approval activities
#[derive(Debug, Clone)]
pub struct ActivityEndpoints {
    pub approval_request: HttpEndpoint,
    pub notification: HttpEndpoint,
}

/// Create an ActivityRegistry with all approval activities
///
/// # Example
///
/// ```rust,no_run
/// use approvals_orchestrations::activities::HttpEndpoint;
/// use approvals_orchestrations::registry::{create_activity_registry, ActivityEndpoints};
///
/// let client = reqwest::Client::new();
/// let activities = create_activity_registry(ActivityEndpoints {
///     approval_request: HttpEndpoint::new(client.clone(), "http://localhost:5000/start-approval"),
///     notification: HttpEndpoint::new(client, "http://localhost:5000/send-email"),
/// });
/// ```
pub fn create_activity_registry(endpoints: ActivityEndpoints) -> ActivityRegistry {
    let ActivityEndpoints {
        approval_request,
        notification,
    } = endpoints;

    ActivityRegistry::builder()
        .register_typed(activities::send_approval_request::NAME, move |ctx, input| {
            activities::send_approval_request::activity(ctx, approval_request.clone(), input)
        })
        .register_typed(activities::send_notification::NAME, move |ctx, input| {
            activities::send_notification::activity(ctx, notification.clone(), input)
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity_names::activities as names;

    #[test]
    fn test_activity_registry_contains_approval_activities() {
        let client = reqwest::Client::new();
        let registry = create_activity_registry(ActivityEndpoints {
            approval_request: HttpEndpoint::new(client.clone(), "http://localhost/approve"),
            notification: HttpEndpoint::new(client, "http://localhost/notify"),
        });

        assert_eq!(
            registry.names(),
            vec![names::SEND_APPROVAL_REQUEST, names::SEND_NOTIFICATION]
        );
        assert!(registry.get("missing").is_none());
    }

    #[tokio::test]
    async fn test_typed_activity_rejects_bad_input() {
        let registry = ActivityRegistry::builder()
            .register_typed("double", |_ctx, n: u32| async move { Ok::<_, String>(n * 2) })
            .build();

        let activity = registry.get("double").unwrap();
        let ctx = ActivityContext::new("i-1", "double", 1);

        let out = activity.execute(&ctx, serde_json::json!(21)).await.unwrap();
        assert_eq!(out, serde_json::json!(42));

        let err = activity
            .execute(&ctx, serde_json::json!("not a number"))
            .await
            .unwrap_err();
        assert!(err.contains("Invalid input"));
    }
}
