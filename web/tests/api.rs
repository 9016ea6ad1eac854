//! End-to-end HTTP tests over the full router, exercising spec §8 seed
//! scenario 1 (create an organization with its first admin user) and
//! scenario 4 (label-policy inheritance) through the wire, not just the
//! command layer directly.

use axum_test::TestServer;
use iam_projections::ProjectionRegistry;
use iam_testing::{InMemoryEventStore, InMemoryLabelPolicyProjection, InMemoryProjectionCheckpointStore};
use iam_web::{router, state::AppState};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn test_server() -> TestServer {
    let (server, _registry) = label_policy_test_server();
    server
}

/// Builds a server whose `label_policies` reader is wired through a real
/// [`ProjectionRegistry`] worker, so a test can await `catch_up` between a
/// `PUT` and a `GET` instead of sleeping (spec §4.6).
fn label_policy_test_server() -> (TestServer, Arc<ProjectionRegistry>) {
    let event_store = Arc::new(InMemoryEventStore::new());
    let checkpoints = Arc::new(InMemoryProjectionCheckpointStore::new());
    let reader = Arc::new(InMemoryLabelPolicyProjection::new());

    let registry = Arc::new(ProjectionRegistry::new(
        event_store.clone(),
        checkpoints,
        "instance-1",
        "worker-test",
    ));
    registry.register(reader.clone());
    registry.start_all().expect("projection worker should start");

    let state = AppState::new(event_store, reader);
    (TestServer::new(router(state)).expect("test server"), registry)
}

#[tokio::test]
async fn creating_an_organization_returns_201_with_object_details() {
    let server = test_server();

    let response = server
        .post("/organizations")
        .json(&json!({
            "org_id": "org-1",
            "name": "Acme",
            "admin_username": "alice",
            "admin_email": "alice@acme.test",
            "admin_first_name": "Alice",
            "admin_last_name": "Admin",
            "caller_id": "system",
            "instance_id": "instance-1",
        }))
        .await;

    response.assert_status(axum::http::StatusCode::CREATED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["sequence"], 2);
    assert_eq!(body["resourceOwner"], "org-1");
}

#[tokio::test]
async fn recreating_the_same_organization_returns_409() {
    let server = test_server();
    let payload = json!({
        "org_id": "org-1",
        "name": "Acme",
        "admin_username": "alice",
        "admin_email": "alice@acme.test",
        "admin_first_name": "Alice",
        "admin_last_name": "Admin",
        "caller_id": "system",
        "instance_id": "instance-1",
    });

    server.post("/organizations").json(&payload).await.assert_status(axum::http::StatusCode::CREATED);
    let second = server.post("/organizations").json(&payload).await;
    second.assert_status(axum::http::StatusCode::CONFLICT);
}

#[tokio::test]
async fn label_policy_resolves_to_the_builtin_default_when_unset() {
    let server = test_server();

    let response = server
        .get("/organizations/org-1/label-policy")
        .add_query_param("instanceId", "instance-1")
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["isDefault"], true);
}

#[tokio::test]
async fn org_label_policy_override_wins_over_the_builtin() {
    let (server, registry) = label_policy_test_server();

    server
        .put("/organizations/org-1/label-policy")
        .json(&json!({
            "primary_color": "#112233",
            "caller_id": "system",
            "instance_id": "instance-1",
        }))
        .await
        .assert_status_ok();

    registry
        .catch_up(&["label_policies".to_string()], Duration::from_secs(2))
        .await
        .expect("projection should catch up to the tip");

    let response = server
        .get("/organizations/org-1/label-policy")
        .add_query_param("instanceId", "instance-1")
        .await;

    let body: serde_json::Value = response.json();
    assert_eq!(body["primaryColor"], "#112233");
    assert_eq!(body["isDefault"], false);
}

#[tokio::test]
async fn health_endpoints_report_ready() {
    let server = test_server();

    server.get("/health").await.assert_status_ok();
    server.get("/health/ready").await.assert_status_ok();
}
