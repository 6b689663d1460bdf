//! Integration tests for the planner API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use planner_lib::{
    health::{components, ComponentStatus, HealthRegistry},
    observability::{PlannerMetrics, StructuredLogger},
    planner::PlannerConfig,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use upgrade_planner::api::{create_router, serve, AppState};

async fn setup_test_app() -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::PLANNER).await;
    health_registry.register(components::API).await;

    let state = Arc::new(AppState::new(
        health_registry,
        PlannerMetrics::new(),
        StructuredLogger::new("upgrade-planner-test"),
        PlannerConfig::default(),
    ));
    let router = create_router(state.clone());

    (router, state)
}

fn reference_request() -> Value {
    json!({
        "machines": [{"name": "n1"}, {"name": "n2"}, {"name": "n3"}],
        "placements": [
            {"machine": "n1", "application": "app1"},
            {"machine": "n2", "application": "app1"},
            {"machine": "n1", "application": "app2"},
            {"machine": "n2", "application": "app2"},
            {"machine": "n2", "application": "app3"},
            {"machine": "n3", "application": "app3"}
        ],
        "budgets": {"app1": 1, "app2": 1, "app3": 1}
    })
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

async fn post_plan(app: Router, body: &Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/plans")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_plan_reference_fleet() {
    let (app, _state) = setup_test_app().await;

    let (status, report) = post_plan(app, &reference_request()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["plan"]["complete"], true);
    assert_eq!(report["plan"]["batches"][0]["machines"], json!(["n1", "n3"]));
    assert_eq!(report["plan"]["batches"][1]["machines"], json!(["n2"]));
    assert_eq!(report["stats"]["solver"], "exact");
    assert_eq!(report["stats"]["rounds"], 2);
}

#[tokio::test]
async fn test_plan_with_greedy_override() {
    let (app, _state) = setup_test_app().await;
    let mut request = reference_request();
    request["solver"] = json!("greedy");

    let (status, report) = post_plan(app, &request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["stats"]["solver"], "greedy");
}

#[tokio::test]
async fn test_plan_rejects_negative_budget() {
    let (app, _state) = setup_test_app().await;
    let mut request = reference_request();
    request["budgets"]["app2"] = json!(-1);

    let (status, body) = post_plan(app, &request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_budget");
    assert!(body.get("partial_plan").is_none());
}

#[tokio::test]
async fn test_plan_rejects_unknown_machine() {
    let (app, _state) = setup_test_app().await;
    let mut request = reference_request();
    request["placements"]
        .as_array_mut()
        .unwrap()
        .push(json!({"machine": "n9", "application": "app1"}));

    let (status, body) = post_plan(app, &request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "unknown_machine");
}

#[tokio::test]
async fn test_plan_infeasible_returns_422() {
    let (app, state) = setup_test_app().await;
    let request = json!({
        "machines": [{"name": "n1"}],
        "placements": [{"machine": "n1", "application": "db"}],
        "budgets": {"db": 0}
    });

    let (status, body) = post_plan(app, &request).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "infeasible_input");
    assert!(body["message"].as_str().unwrap().contains("n1"));

    // infeasible input is the caller's problem, not the planner's
    let health = state.health_registry.health().await;
    assert_eq!(
        health.components[components::PLANNER].status,
        ComponentStatus::Healthy
    );
}

#[tokio::test]
async fn test_plan_step_limit_returns_partial_plan() {
    let (app, state) = setup_test_app().await;
    let mut request = reference_request();
    request["max_steps"] = json!(1);

    let (status, body) = post_plan(app.clone(), &request).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "deadline_exceeded");
    assert_eq!(body["partial_plan"]["complete"], false);
    assert_eq!(body["partial_plan"]["batches"], json!([]));

    // search limits degrade the planner but keep it serving
    let (status, health) = get(app, "/healthz").await;
    let health: Value = serde_json::from_slice(&health).unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");

    state.health_registry.set_ready(true).await;
    assert!(state.health_registry.readiness().await.ready);
}

#[tokio::test]
async fn test_plan_malformed_body_rejected() {
    let (app, _state) = setup_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/plans")
                .header("content-type", "application/json")
                .body(Body::from("{\"machines\": 3}"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app, "/healthz").await;
    let health: Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert!(health["components"]["planner"].is_object());
    assert!(health["components"]["api"].is_object());
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .set_unhealthy(components::API, "Listener closed")
        .await;

    let (status, body) = get(app, "/healthz").await;
    let health: Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_follows_ready_flag() {
    let (app, state) = setup_test_app().await;

    let (status, body) = get(app.clone(), "/readyz").await;
    let readiness: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);

    state.health_registry.set_ready(true).await;

    let (status, body) = get(app, "/readyz").await;
    let readiness: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, _state) = setup_test_app().await;

    // one run so the labelled counters have a series
    let (status, _) = post_plan(app.clone(), &reference_request()).await;
    assert_eq!(status, StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();

    assert!(metrics_text.contains("upgrade_planner_plan_latency_seconds_bucket"));
    assert!(metrics_text.contains("upgrade_planner_round_latency_seconds_count"));
    assert!(metrics_text.contains("upgrade_planner_plans_total{outcome=\"ok\"}"));
    assert!(metrics_text.contains("upgrade_planner_search_steps_total"));
}

#[tokio::test]
async fn test_serve_marks_api_unhealthy_when_port_taken() {
    let (_, state) = setup_test_app().await;
    let taken = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
    let port = taken.local_addr().unwrap().port();

    let result = serve(port, state.clone(), async {}).await;

    assert!(result.is_err());
    let health = state.health_registry.health().await;
    assert_eq!(health.status, ComponentStatus::Unhealthy);
    let api = &health.components[components::API];
    assert!(api.message.as_deref().unwrap_or("").contains("Failed to bind"));
}

#[tokio::test]
async fn test_serve_marks_api_healthy_after_bind() {
    let (_, state) = setup_test_app().await;
    state
        .health_registry
        .set_unhealthy(components::API, "Not started")
        .await;
    let free = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
    let port = free.local_addr().unwrap().port();
    drop(free);

    serve(port, state.clone(), async {}).await.unwrap();

    let health = state.health_registry.health().await;
    assert_eq!(health.components[components::API].status, ComponentStatus::Healthy);
}
