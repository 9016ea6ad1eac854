//! Health check endpoints.
//!
//! Used by load balancers and monitoring systems to verify service
//! health.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::state::AppState;

/// Simple liveness check. Does not touch the eventstore.
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Readiness response body.
#[derive(Debug, Serialize, PartialEq)]
pub struct ReadinessResponse {
    /// Whether the eventstore can currently accept `push`/`query` calls.
    pub available: bool,
    /// Human-readable detail, e.g. the last error observed.
    pub detail: Option<String>,
}

/// Readiness check: pings the eventstore via [`iam_core::event_store::
/// EventStore::health`].
///
/// # Status codes
///
/// - `200 OK`: available.
/// - `503 Service Unavailable`: not available.
///
/// # Endpoint
///
/// ```text
/// GET /health/ready
/// ```
pub async fn health_check_ready(
    State(state): State<AppState>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let health = state.store.health().await;
    let status = if health.available { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(ReadinessResponse { available: health.available, detail: health.detail }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use iam_testing::{InMemoryEventStore, InMemoryLabelPolicyProjection};
    use std::sync::Arc;

    #[tokio::test]
    async fn simple_health_check_is_always_ok() {
        let (status, body) = health_check().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn readiness_reflects_store_health() {
        let state = AppState::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryLabelPolicyProjection::new()),
        );
        let (status, Json(body)) = health_check_ready(State(state)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.available);
    }
}
