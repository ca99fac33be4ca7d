#![deny(unsafe_code)]

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bankings_adapters::{HttpAppsAccsNotifier, LogOnlyNotifier};
use bankings_core::{
    AccountRecord, AuthorizationGate, DownstreamNotifier, ProvisioningError, ProvisioningReceipt,
    ProvisioningRequest, ProvisioningWorkflow, ResultUpdate, WorkflowConfig,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;

pub const DEFAULT_SECRET: &str = "secret-async-key";

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub secret: String,
    /// Base URL of the apps_accs service. `None` logs completions instead.
    pub downstream_url: Option<String>,
    pub workflow: WorkflowConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            secret: DEFAULT_SECRET.to_string(),
            downstream_url: None,
            workflow: WorkflowConfig::default(),
        }
    }
}

#[derive(Clone)]
pub struct ServiceState {
    pub workflow: Arc<ProvisioningWorkflow>,
    pub gate: Arc<AuthorizationGate>,
}

impl ServiceState {
    pub fn bootstrap(config: ServiceConfig) -> Result<Self, ServiceError> {
        let notifier: Arc<dyn DownstreamNotifier> = match config.downstream_url.as_deref() {
            Some(url) => {
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(ServiceError::Config(format!(
                        "downstream url '{}' must start with http:// or https://",
                        url
                    )));
                }
                Arc::new(HttpAppsAccsNotifier::new(url))
            }
            None => Arc::new(LogOnlyNotifier),
        };

        Self::with_notifier(config, notifier)
    }

    pub fn with_notifier(
        config: ServiceConfig,
        notifier: Arc<dyn DownstreamNotifier>,
    ) -> Result<Self, ServiceError> {
        if config.secret.is_empty() {
            return Err(ServiceError::Config("secret must not be empty".to_string()));
        }

        Ok(Self {
            workflow: Arc::new(ProvisioningWorkflow::new(config.workflow, notifier)),
            gate: Arc::new(AuthorizationGate::new(&config.secret)),
        })
    }

    pub async fn shutdown(&self) {
        self.workflow.shutdown().await;
    }
}

pub fn build_router(state: ServiceState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/accounts", post(create_account))
        .route("/v1/accounts/result", post(submit_result))
        .route("/v1/accounts/:id", get(get_account))
        .route("/get_number", post(create_account))
        .route("/set_result", post(submit_result))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("configuration error: {0}")]
    Config(String),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Http { status: StatusCode, message: String },
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self::Http {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::Http {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Http { status, .. } => *status,
            ApiError::Provisioning(err) => match err {
                ProvisioningError::Unauthorized => StatusCode::UNAUTHORIZED,
                ProvisioningError::InvalidCurrency(_)
                | ProvisioningError::InvalidRequest(_)
                | ProvisioningError::NonDigit { .. } => StatusCode::BAD_REQUEST,
                ProvisioningError::SchedulerSaturated { .. } | ProvisioningError::ShuttingDown => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                ProvisioningError::StageViolation(_) | ProvisioningError::Downstream { .. } => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

fn authorize(state: &ServiceState, headers: &HeaderMap) -> Result<(), ApiError> {
    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    state.gate.check(presented).map_err(|err| {
        tracing::warn!("rejected request with invalid secret");
        ApiError::from(err)
    })
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|err| ApiError::bad_request(format!("malformed body: {}", err)))
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    pending_tasks: usize,
    records: usize,
}

async fn health(State(state): State<ServiceState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "bankings-service",
        pending_tasks: state.workflow.in_flight(),
        records: state.workflow.registry().len().await,
    })
}

#[derive(Debug, Clone, Serialize)]
struct CreateResponse {
    message: &'static str,
    #[serde(flatten)]
    receipt: ProvisioningReceipt,
}

async fn create_account(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<CreateResponse>), ApiError> {
    authorize(&state, &headers)?;
    let request: ProvisioningRequest = parse_body(&body)?;
    let receipt = state.workflow.provision(request).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateResponse {
            message: "Status update initiated",
            receipt,
        }),
    ))
}

#[derive(Debug, Clone, Serialize)]
struct ResultResponse {
    message: &'static str,
}

/// Always 200 once authorized and well-formed; ignored updates are only logged.
async fn submit_result(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ResultResponse>, ApiError> {
    authorize(&state, &headers)?;
    let update: ResultUpdate = parse_body(&body)?;
    if update.id.trim().is_empty() {
        return Err(ApiError::bad_request("id is required"));
    }
    if update.result.is_empty() {
        return Err(ApiError::bad_request("result is required"));
    }

    state.workflow.apply_result(update).await;

    Ok(Json(ResultResponse {
        message: "Result received",
    }))
}

async fn get_account(
    Path(id): Path<String>,
    State(state): State<ServiceState>,
    headers: HeaderMap,
) -> Result<Json<AccountRecord>, ApiError> {
    authorize(&state, &headers)?;
    state
        .workflow
        .record(&id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("account record '{}' not found", id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use bankings_core::RetentionPolicy;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_state(finalize_after: Duration, max_in_flight: usize) -> ServiceState {
        ServiceState::with_notifier(
            ServiceConfig {
                secret: DEFAULT_SECRET.to_string(),
                downstream_url: None,
                workflow: WorkflowConfig {
                    finalize_after,
                    retention: RetentionPolicy::RetainUntilResult,
                    max_in_flight,
                    ..WorkflowConfig::default()
                },
            },
            Arc::new(LogOnlyNotifier),
        )
        .unwrap()
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        secret: Option<&str>,
        body: Option<String>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(secret) = secret {
            request = request.header("authorization", secret);
        }
        let body = match body {
            Some(body) => {
                request = request.header("content-type", "application/json");
                Body::from(body)
            }
            None => Body::empty(),
        };

        let response = app
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(250)).await;
    }

    #[tokio::test]
    async fn create_returns_provisional_number() {
        let state = test_state(Duration::from_secs(30), 16);
        let app = build_router(state.clone());

        let (status, body) = send(
            &app,
            "POST",
            "/v1/accounts",
            Some(DEFAULT_SECRET),
            Some(json!({ "currency": "810" }).to_string()),
        )
        .await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], json!("processing"));
        assert_eq!(body["message"], json!("Status update initiated"));
        let number = body["account_number"].as_str().unwrap();
        assert!(number.starts_with("40817810"));
        assert_eq!(number.len(), 19);

        let id = body["id"].as_str().unwrap();
        let (status, record) = send(
            &app,
            "GET",
            &format!("/v1/accounts/{}", id),
            Some(DEFAULT_SECRET),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(record["status"], json!("processing"));
        assert_eq!(record["account_number"], json!(number));

        state.shutdown().await;
    }

    #[tokio::test]
    async fn wrong_or_missing_secret_never_touches_state() {
        let state = test_state(Duration::from_secs(30), 16);
        let app = build_router(state.clone());
        let payload = json!({ "currency": "810" }).to_string();

        for secret in [None, Some("wrong"), Some("")] {
            let (status, body) =
                send(&app, "POST", "/v1/accounts", secret, Some(payload.clone())).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert!(body["error"].is_string());
        }
        assert!(state.workflow.registry().is_empty().await);

        let (status, body) = send(
            &app,
            "POST",
            "/v1/accounts",
            Some(DEFAULT_SECRET),
            Some(json!({ "account_id": 1, "application_id": 2, "currency": "810" }).to_string()),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let id = body["id"].as_str().unwrap().to_string();
        state.workflow.cancel(&id).await;
        state.workflow.complete(&id).await;

        let (status, _) = send(
            &app,
            "POST",
            "/v1/accounts/result",
            Some("wrong"),
            Some(json!({ "id": id, "result": "approved" }).to_string()),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            state.workflow.record(&id).await.unwrap().status.label(),
            "completed"
        );

        state.shutdown().await;
    }

    #[tokio::test]
    async fn unauthorized_wins_over_malformed_body() {
        let state = test_state(Duration::from_secs(30), 16);
        let app = build_router(state);

        let (status, _) = send(
            &app,
            "POST",
            "/v1/accounts",
            Some("wrong"),
            Some("{not json".to_string()),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_or_invalid_create_is_bad_request() {
        let state = test_state(Duration::from_secs(30), 16);
        let app = build_router(state.clone());

        for payload in [
            "{not json".to_string(),
            json!({}).to_string(),
            json!({ "currency": "" }).to_string(),
            json!({ "currency": "RUB" }).to_string(),
            json!({ "currency": "810", "account_id": "seven" }).to_string(),
        ] {
            let (status, _) = send(
                &app,
                "POST",
                "/v1/accounts",
                Some(DEFAULT_SECRET),
                Some(payload),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
        assert!(state.workflow.registry().is_empty().await);
    }

    #[tokio::test]
    async fn result_flow_after_background_completion() {
        let state = test_state(Duration::from_millis(20), 16);
        let app = build_router(state.clone());

        let (status, body) = send(
            &app,
            "POST",
            "/get_number",
            Some(DEFAULT_SECRET),
            Some(
                json!({
                    "account_id": 7,
                    "application_id": 8,
                    "number": 0,
                    "currency": "810"
                })
                .to_string(),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["id"], json!("7-8"));

        settle().await;

        let (_, record) = send(&app, "GET", "/v1/accounts/7-8", Some(DEFAULT_SECRET), None).await;
        assert_eq!(record["status"], json!("completed"));

        let (status, body) = send(
            &app,
            "POST",
            "/set_result",
            Some(DEFAULT_SECRET),
            Some(json!({ "id": "7-8", "result": "approved" }).to_string()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], json!("Result received"));

        let (_, record) = send(&app, "GET", "/v1/accounts/7-8", Some(DEFAULT_SECRET), None).await;
        assert_eq!(record["status"], json!("approved"));

        let (status, _) = send(
            &app,
            "POST",
            "/v1/accounts/result",
            Some(DEFAULT_SECRET),
            Some(json!({ "id": "7-8", "result": "rejected" }).to_string()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, record) = send(&app, "GET", "/v1/accounts/7-8", Some(DEFAULT_SECRET), None).await;
        assert_eq!(record["status"], json!("approved"));
    }

    #[tokio::test]
    async fn ignored_results_still_return_ok() {
        let state = test_state(Duration::from_secs(30), 16);
        let app = build_router(state.clone());

        let (_, body) = send(
            &app,
            "POST",
            "/v1/accounts",
            Some(DEFAULT_SECRET),
            Some(json!({ "currency": "643" }).to_string()),
        )
        .await;
        let id = body["id"].as_str().unwrap().to_string();

        for target in [id.as_str(), "unknown-id"] {
            let (status, _) = send(
                &app,
                "POST",
                "/v1/accounts/result",
                Some(DEFAULT_SECRET),
                Some(json!({ "id": target, "result": "approved" }).to_string()),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }

        let (_, record) = send(
            &app,
            "GET",
            &format!("/v1/accounts/{}", id),
            Some(DEFAULT_SECRET),
            None,
        )
        .await;
        assert_eq!(record["status"], json!("processing"));

        state.shutdown().await;
    }

    #[tokio::test]
    async fn malformed_result_is_bad_request() {
        let state = test_state(Duration::from_secs(30), 16);
        let app = build_router(state);

        for payload in [
            "[]".to_string(),
            json!({ "id": "x" }).to_string(),
            json!({ "id": "x", "result": "" }).to_string(),
            json!({ "id": " ", "result": "ok" }).to_string(),
        ] {
            let (status, _) = send(
                &app,
                "POST",
                "/v1/accounts/result",
                Some(DEFAULT_SECRET),
                Some(payload),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn unknown_account_is_not_found() {
        let state = test_state(Duration::from_secs(30), 16);
        let app = build_router(state);

        let (status, _) = send(
            &app,
            "GET",
            "/v1/accounts/missing",
            Some(DEFAULT_SECRET),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn saturated_scheduler_is_service_unavailable() {
        let state = test_state(Duration::from_secs(30), 1);
        let app = build_router(state.clone());
        let payload = json!({ "currency": "810" }).to_string();

        let (status, _) = send(
            &app,
            "POST",
            "/v1/accounts",
            Some(DEFAULT_SECRET),
            Some(payload.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let (status, _) =
            send(&app, "POST", "/v1/accounts", Some(DEFAULT_SECRET), Some(payload)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        state.shutdown().await;
    }

    #[tokio::test]
    async fn health_reports_counts_without_auth() {
        let state = test_state(Duration::from_secs(30), 16);
        let app = build_router(state);

        let (status, body) = send(&app, "GET", "/v1/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("ok"));
        assert_eq!(body["records"], json!(0));
        assert_eq!(body["pending_tasks"], json!(0));
    }

    #[test]
    fn bootstrap_validates_config() {
        let err = ServiceState::bootstrap(ServiceConfig {
            secret: String::new(),
            ..ServiceConfig::default()
        })
        .err()
        .unwrap();
        assert!(err.to_string().contains("secret"));

        let err = ServiceState::bootstrap(ServiceConfig {
            downstream_url: Some("localhost:8000".to_string()),
            ..ServiceConfig::default()
        })
        .err()
        .unwrap();
        assert!(err.to_string().contains("http://"));

        assert!(ServiceState::bootstrap(ServiceConfig {
            downstream_url: Some("http://localhost:8000".to_string()),
            ..ServiceConfig::default()
        })
        .is_ok());
    }
}
