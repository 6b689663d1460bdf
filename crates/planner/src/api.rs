//! HTTP API for planning, health checks and Prometheus metrics

use planner_lib::{
    health::{components, ComponentStatus, HealthRegistry},
    observability::{PlannerMetrics, StructuredLogger},
    planner::{PlannerConfig, RoundPlanner},
    solver::SolverKind,
    ClusterSnapshot, Plan, PlanError,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: PlannerMetrics,
    pub logger: StructuredLogger,
    /// Planner settings for requests without overrides
    pub defaults: PlannerConfig,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: PlannerMetrics,
        logger: StructuredLogger,
        defaults: PlannerConfig,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            logger,
            defaults,
        }
    }
}

/// Body of `POST /api/v1/plans`
#[derive(Debug, Clone, Deserialize)]
pub struct PlanRequest {
    #[serde(flatten)]
    pub snapshot: ClusterSnapshot,
    #[serde(default)]
    pub solver: Option<SolverKind>,
    #[serde(default)]
    pub deadline_ms: Option<u64>,
    #[serde(default)]
    pub max_steps: Option<u64>,
    #[serde(default)]
    pub parallel: Option<bool>,
}

impl PlanRequest {
    /// Request overrides applied on top of the service defaults
    pub fn config(&self, defaults: PlannerConfig) -> PlannerConfig {
        let mut config = defaults;
        if let Some(solver) = self.solver {
            config.solver = solver;
        }
        if let Some(deadline_ms) = self.deadline_ms {
            config.limits.deadline_ms = Some(deadline_ms);
        }
        if let Some(max_steps) = self.max_steps {
            config.limits.max_steps = Some(max_steps);
        }
        if let Some(parallel) = self.parallel {
            config.parallel = parallel;
        }
        config
    }
}

/// JSON error body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_plan: Option<Plan>,
}

impl From<&PlanError> for ErrorBody {
    fn from(err: &PlanError) -> Self {
        Self {
            error: err.kind().to_string(),
            message: err.to_string(),
            partial_plan: err.partial_plan().cloned(),
        }
    }
}

/// HTTP status for a planning failure
pub fn status_for(err: &PlanError) -> StatusCode {
    match err {
        PlanError::InfeasibleInput { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        PlanError::DeadlineExceeded { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_REQUEST,
    }
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %err, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Compute an upgrade plan for the posted snapshot
async fn create_plan(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PlanRequest>,
) -> Response {
    let config = request.config(state.defaults);
    let snapshot = request.snapshot;
    state
        .logger
        .log_plan_request("api", snapshot.machines.len(), snapshot.budgets.len());

    let metrics = state.metrics.clone();
    let joined = tokio::task::spawn_blocking(move || {
        RoundPlanner::new(config)
            .with_metrics(metrics)
            .run(&snapshot)
    })
    .await;

    let result = match joined {
        Ok(result) => result,
        Err(err) => {
            error!(error = %err, "Planning task failed");
            let body = ErrorBody {
                error: "internal".to_string(),
                message: err.to_string(),
                partial_plan: None,
            };
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
        }
    };

    state.health_registry.record_plan_result(&result).await;

    match result {
        Ok(report) => {
            state.logger.log_plan_completed(&report);
            (StatusCode::OK, Json(report)).into_response()
        }
        Err(err) => {
            state.logger.log_plan_failed(&err);
            (status_for(&err), Json(ErrorBody::from(&err))).into_response()
        }
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/plans", post(create_plan))
        .with_state(state)
}

/// Start the API server, stopping when `shutdown` resolves
pub async fn serve<F>(port: u16, state: Arc<AppState>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            state
                .health_registry
                .set_unhealthy(components::API, format!("Failed to bind {}: {}", addr, err))
                .await;
            return Err(err.into());
        }
    };
    state.health_registry.set_healthy(components::API).await;

    let registry = state.health_registry.clone();
    let app = create_router(state);
    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        error!(error = %err, "API server failed");
        registry
            .set_unhealthy(components::API, format!("Server error: {}", err))
            .await;
        return Err(err.into());
    }

    Ok(())
}
