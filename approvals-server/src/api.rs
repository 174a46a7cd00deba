use std::sync::Arc;

use anyhow::Result;
use approvals_models::{
    AbandonRequest, ApprovalDecision, InstanceDetail, InstanceStatus, InstanceSummary, RaiseEventRequest,
    RaiseEventResponse, StartApprovalRequest, StartApprovalResponse,
};
use approvals_orchestrations::names::orchestrations;
use approvals_orchestrations::orchestrations::flows;
use approvals_orchestrations::triggers::Ingress;
use approvals_orchestrations::{CorrelatorError, EngineError, OrchestrationEngine, StoreError};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared API state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<OrchestrationEngine>,
    pub ingress: Ingress,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/approvals", get(list_approvals).post(start_approval))
        .route("/api/approvals/raise", post(raise_event))
        .route("/api/approvals/flow", get(approval_flow))
        .route("/api/approvals/:id", get(get_approval))
        .route("/api/approvals/:id/abandon", post(abandon_approval))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the API server
pub async fn start_server(host: &str, port: u16, state: AppState) -> Result<()> {
    let app = create_router(state);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("✓ API server listening on {}", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}

// ============================================================================
// Health Check
// ============================================================================

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "approvals",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

// ============================================================================
// Approvals
// ============================================================================

async fn start_approval(
    State(state): State<AppState>,
    body: Result<Json<StartApprovalRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<StartApprovalResponse>), AppError> {
    let request = json_body(body)?;
    let outcome = state.ingress.start(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(StartApprovalResponse {
            instance_id: outcome.instance_id,
            status: outcome.status,
        }),
    ))
}

async fn raise_event(
    State(state): State<AppState>,
    body: Result<Json<RaiseEventRequest>, JsonRejection>,
) -> Result<Json<RaiseEventResponse>, AppError> {
    let request = json_body(body)?;
    let instance_id = request
        .instance_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("instanceId is required".to_string()))?;
    let approved = request
        .approved
        .ok_or_else(|| AppError::BadRequest("approved is required".to_string()))?;

    let decision = ApprovalDecision::new(approved, request.reason);
    state.engine.submit_decision(&instance_id, &decision).await?;

    Ok(Json(RaiseEventResponse { approved }))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    status: Option<String>,
}

async fn list_approvals(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<InstanceSummary>>, AppError> {
    let status = query
        .status
        .map(|s| s.parse::<InstanceStatus>())
        .transpose()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    Ok(Json(state.engine.list(status).await?))
}

async fn get_approval(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<InstanceDetail>, AppError> {
    let instance = state.engine.instance(&id).await?;
    Ok(Json(InstanceDetail::from(&instance)))
}

async fn abandon_approval(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<AbandonRequest>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let reason = body
        .and_then(|Json(request)| request.reason)
        .unwrap_or_else(|| "abandoned by operator".to_string());

    let status = state.engine.abandon(&id, &reason).await?;

    Ok(Json(serde_json::json!({
        "instanceId": id,
        "status": status,
    })))
}

async fn approval_flow() -> Result<Json<serde_json::Value>, AppError> {
    let flow = flows::get_flow_by_name(orchestrations::APPROVAL_WORKFLOW)
        .ok_or_else(|| AppError::NotFound("No flow diagram for the approval workflow".to_string()))?;

    Ok(Json(serde_json::json!({
        "orchestrationName": flow.orchestration_name,
        "mermaid": flow.mermaid,
        "nodeMappings": flow.node_mappings,
    })))
}

// ============================================================================
// Error Handling
// ============================================================================

/// Malformed bodies are client errors like any other validation failure.
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match &err {
            EngineError::Validation(_) | EngineError::Correlator(CorrelatorError::NoSuchInstance { .. }) => {
                tracing::warn!("Rejected request: {}", err);
                AppError::BadRequest(err.to_string())
            }
            EngineError::Store(StoreError::NotFound(_)) => AppError::NotFound(err.to_string()),
            EngineError::Store(StoreError::DuplicateInstance(_)) => AppError::Conflict(err.to_string()),
            _ => {
                tracing::error!("Request failed: {}", err);
                AppError::Internal(err.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approvals_orchestrations::activity_names::activities;
    use approvals_orchestrations::activity_types::ActivityReceipt;
    use approvals_orchestrations::registry::ActivityRegistry;
    use approvals_orchestrations::store::{InstanceStore, MemoryInstanceStore};
    use approvals_orchestrations::triggers::{ChannelCompletionSink, CompletionPublisher};
    use approvals_orchestrations::{ActivityInvoker, EventCorrelator, RetryPolicy};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> Router {
        let store: Arc<dyn InstanceStore> = Arc::new(MemoryInstanceStore::new());
        let registry = ActivityRegistry::builder()
            .register_typed(activities::SEND_APPROVAL_REQUEST, |_ctx, _input: serde_json::Value| async {
                Ok::<_, String>(ActivityReceipt { status_code: 202 })
            })
            .register_typed(activities::SEND_NOTIFICATION, |_ctx, _input: serde_json::Value| async {
                Ok::<_, String>(ActivityReceipt { status_code: 200 })
            })
            .build();
        let (sink, _completions) = ChannelCompletionSink::new();

        let engine = Arc::new(OrchestrationEngine::new(
            store.clone(),
            ActivityInvoker::new(store.clone(), Arc::new(registry), RetryPolicy::new(1)),
            EventCorrelator::new(store.clone()),
            CompletionPublisher::new(Arc::new(sink), store, RetryPolicy::new(1)),
        ));

        create_router(AppState {
            ingress: Ingress::new(engine.clone()),
            engine,
        })
    }

    fn post(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn start_body(id: &str) -> serde_json::Value {
        serde_json::json!({
            "instanceId": id,
            "subject": "Automation proposal",
            "message": "Hello",
            "correlationId": "corr-1"
        })
    }

    #[tokio::test]
    async fn test_start_raise_and_get() {
        let app = app();

        let response = app.clone().oneshot(post("/api/approvals", start_body("lead-1"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            json(response).await,
            serde_json::json!({"instanceId": "lead-1", "status": "WaitingForEvent"})
        );

        let response = app
            .clone()
            .oneshot(post(
                "/api/approvals/raise",
                serde_json::json!({"instanceId": "lead-1", "approved": false, "reason": "too costly"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await, serde_json::json!({"approved": false}));

        let response = app
            .oneshot(Request::get("/api/approvals/lead-1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let detail = json(response).await;
        assert_eq!(detail["status"], "Completed");
        assert_eq!(detail["completion"]["value"], "REJECTED, Reason: too costly");
        assert_eq!(detail["delivered"], true);
    }

    #[tokio::test]
    async fn test_duplicate_start_is_conflict() {
        let app = app();

        let first = app.clone().oneshot(post("/api/approvals", start_body("lead-1"))).await.unwrap();
        assert_eq!(first.status(), StatusCode::CREATED);

        let second = app.oneshot(post("/api/approvals", start_body("lead-1"))).await.unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_raise_validation_errors() {
        let app = app();

        let missing = app
            .clone()
            .oneshot(post("/api/approvals/raise", serde_json::json!({"approved": true})))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

        let unknown = app
            .oneshot(post(
                "/api/approvals/raise",
                serde_json::json!({"instanceId": "nobody", "approved": true}),
            ))
            .await
            .unwrap();
        assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_raise_body_is_bad_request() {
        let app = app();

        let mistyped = app
            .clone()
            .oneshot(post(
                "/api/approvals/raise",
                serde_json::json!({"instanceId": "lead-1", "approved": "yes"}),
            ))
            .await
            .unwrap();
        assert_eq!(mistyped.status(), StatusCode::BAD_REQUEST);

        let plain_text = app
            .clone()
            .oneshot(
                Request::post("/api/approvals/raise")
                    .header("content-type", "text/plain")
                    .body(Body::from("approve lead-1"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(plain_text.status(), StatusCode::BAD_REQUEST);

        let truncated = app
            .oneshot(
                Request::post("/api/approvals")
                    .header("content-type", "application/json")
                    .body(Body::from("{\"subject\":"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(truncated.status(), StatusCode::BAD_REQUEST);
        assert!(json(truncated).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_unknown_instance_is_not_found() {
        let response = app()
            .oneshot(Request::get("/api/approvals/nobody").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_rejects_unknown_status() {
        let response = app()
            .oneshot(Request::get("/api/approvals?status=Paused").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
