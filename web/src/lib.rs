//! Axum handlers over the command and query layers (spec §4.8, component
//! C8): the external API boundary.
//!
//! # Request flow
//!
//! 1. **HTTP request** arrives at an axum handler.
//! 2. **Extract data** from the request (JSON body, path, query).
//! 3. **Build a `CommandContext`** or query parameters from the request.
//! 4. **Call the command or query layer** directly (`iam-domain`,
//!    `iam-query`) — no intermediate dispatch layer.
//! 5. **Map the result** (`ObjectDetails` or a read-model view) to a
//!    wire response, or a typed [`iam_core::error::Error`] to an HTTP
//!    status via [`AppError`].
//!
//! Handlers translate wire field names to canonical internal ones and
//! validate only what structurally belongs at the boundary (spec §4.8);
//! business validation happens in the command layer itself.

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod state;

use axum::{
    routing::{delete, get, patch, post, put},
    Router,
};

pub use error::AppError;
pub use extractors::{ClientIp, CorrelationId, UserAgent};
pub use middleware::{correlation_id_layer, CorrelationIdExt, CORRELATION_ID_HEADER};
pub use state::AppState;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;

/// Build the full axum router over every handler in this crate, layered
/// with correlation-id tracking.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/health/ready", get(handlers::health::health_check_ready))
        .route("/organizations", post(handlers::organizations::create_organization))
        .route("/organizations/:org_id/name", patch(handlers::organizations::rename_organization))
        .route("/organizations/:org_id/users", post(handlers::users::add_human_user))
        .route(
            "/organizations/:org_id/users/:user_id",
            delete(handlers::users::remove_human_user),
        )
        .route(
            "/organizations/:org_id/label-policy",
            get(handlers::label_policy::resolve_label_policy)
                .put(handlers::label_policy::set_org_label_policy),
        )
        .route("/instance/label-policy", put(handlers::label_policy::set_instance_label_policy))
        .layer(correlation_id_layer())
        .with_state(state)
}
