//! HTTP-level tests for the scan API.
//!
//! No workers run here: triggered runs stay pending, which is enough to
//! exercise the route contracts (status codes, error mapping, lifecycle).

use axum_test::TestServer;
use db::{create_pool, run_migrations, RunRepository};
use events::ProgressBus;
use orchestrator::ScanService;
use queue::{JobQueue, QueueConfig};
use serde_json::{json, Value};
use server::state::AppState;
use server::create_router;
use uuid::Uuid;

async fn test_server() -> (TestServer, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("test.db").display());
    let pool = create_pool(&url).await.unwrap();
    run_migrations(&pool).await.unwrap();

    let repo = RunRepository::new(pool.clone());
    let queue = JobQueue::new(pool, QueueConfig::default());
    let bus = ProgressBus::new();
    let service = ScanService::new(repo, queue, bus.clone());
    let state = AppState::new(service, bus);

    (TestServer::new(create_router(state)).unwrap(), dir)
}

fn trigger_body() -> Value {
    json!({
        "case_id": "case-1",
        "company_name": "Acme",
        "website_url": "https://acme.example",
        "budget_hint": "10-50k"
    })
}

#[tokio::test]
async fn test_health() {
    let (server, _dir) = test_server().await;

    let response = server.get("/health").await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "ok");
}

#[tokio::test]
async fn test_trigger_creates_pending_run() {
    let (server, _dir) = test_server().await;

    let response = server.post("/api/scans").json(&trigger_body()).await;
    response.assert_status(axum::http::StatusCode::CREATED);

    let snapshot = response.json::<Value>();
    assert_eq!(snapshot["status"], "pending");
    assert_eq!(snapshot["subject_id"], "case-1");
    assert_eq!(snapshot["progress"], 0);

    let id = snapshot["id"].as_str().unwrap();
    let fetched = server.get(&format!("/api/scans/{id}")).await;
    fetched.assert_status_ok();
    assert_eq!(fetched.json::<Value>()["status"], "pending");
}

#[tokio::test]
async fn test_duplicate_trigger_conflicts() {
    let (server, _dir) = test_server().await;

    server.post("/api/scans").json(&trigger_body()).await;
    let response = server.post("/api/scans").json(&trigger_body()).await;
    response.assert_status(axum::http::StatusCode::CONFLICT);
    assert_eq!(response.json::<Value>()["error"], "conflict");
}

#[tokio::test]
async fn test_invalid_subject_rejected() {
    let (server, _dir) = test_server().await;

    let response = server
        .post("/api/scans")
        .json(&json!({"case_id": "c", "company_name": ""}))
        .await;
    response.assert_status(axum::http::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_unknown_run() {
    let (server, _dir) = test_server().await;

    let response = server.get(&format!("/api/scans/{}", Uuid::new_v4())).await;
    response.assert_status(axum::http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_answer_on_non_waiting_run() {
    let (server, _dir) = test_server().await;

    let created = server.post("/api/scans").json(&trigger_body()).await;
    let id = created.json::<Value>()["id"].as_str().unwrap().to_string();

    let response = server
        .post(&format!("/api/scans/{id}/answer"))
        .json(&json!({"answer": "25-50k"}))
        .await;
    response.assert_status(axum::http::StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_cancel_and_delete_lifecycle() {
    let (server, _dir) = test_server().await;

    let created = server.post("/api/scans").json(&trigger_body()).await;
    let id = created.json::<Value>()["id"].as_str().unwrap().to_string();

    let response = server.post(&format!("/api/scans/{id}/cancel")).await;
    response.assert_status_ok();

    let fetched = server.get(&format!("/api/scans/{id}")).await;
    assert_eq!(fetched.json::<Value>()["status"], "cancelled");

    // Cancelling a terminal run conflicts.
    let response = server.post(&format!("/api/scans/{id}/cancel")).await;
    response.assert_status(axum::http::StatusCode::CONFLICT);

    let response = server.delete(&format!("/api/scans/{id}")).await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["deleted"], true);

    let fetched = server.get(&format!("/api/scans/{id}")).await;
    fetched.assert_status(axum::http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_scans() {
    let (server, _dir) = test_server().await;

    server.post("/api/scans").json(&trigger_body()).await;
    let response = server.get("/api/scans").await;
    response.assert_status_ok();

    let runs = response.json::<Vec<Value>>();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0]["subject_id"], "case-1");
}
