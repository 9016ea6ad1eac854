//! Human user endpoints (spec §8 seed scenarios 1 and 5).

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use iam_core::command::CommandContext;
use iam_domain::user::{self, AddHumanUser};
use serde::Deserialize;

use crate::{extractors::CorrelationId, handlers::organizations::ObjectDetailsResponse, state::AppState, AppError};

/// `POST /organizations/:org_id/users` request body.
#[derive(Debug, Deserialize)]
pub struct AddHumanUserRequest {
    /// Aggregate id for the new user, chosen by the caller.
    pub user_id: String,
    /// Username, unique within the org.
    pub username: String,
    /// Email address.
    pub email: String,
    /// First name.
    pub first_name: String,
    /// Last name.
    pub last_name: String,
    /// Caller id to attribute the command to.
    pub caller_id: String,
    /// Tenant scope.
    pub instance_id: String,
}

/// `POST /organizations/:org_id/users`: add a human user to an
/// organization (`COMMAND-User1`).
///
/// # Errors
///
/// Returns `409 Conflict` if `user_id` or `username` is already claimed
/// within the org (spec §8 seed scenario 5), `400 Bad Request` for empty
/// required fields.
pub async fn add_human_user(
    State(state): State<AppState>,
    Path(org_id): Path<String>,
    _correlation_id: CorrelationId,
    Json(request): Json<AddHumanUserRequest>,
) -> Result<(StatusCode, Json<ObjectDetailsResponse>), AppError> {
    let ctx = CommandContext::new(request.caller_id, request.instance_id, "COMMAND-User1");
    let details = user::add_human(
        state.store.as_ref(),
        &ctx,
        AddHumanUser {
            user_id: request.user_id,
            org_id,
            username: request.username,
            email: request.email,
            first_name: request.first_name,
            last_name: request.last_name,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(details.into())))
}

/// Query parameters for `DELETE /organizations/:org_id/users/:user_id`.
#[derive(Debug, Deserialize)]
pub struct RemoveHumanUserQuery {
    /// Caller id to attribute the command to.
    pub caller_id: String,
    /// Tenant scope.
    pub instance_id: String,
}

/// `DELETE /organizations/:org_id/users/:user_id`: remove a human user,
/// releasing its username's uniqueness claim (`COMMAND-User2`, spec §8
/// seed scenario 5).
///
/// # Errors
///
/// Returns `404 Not Found` if `user_id` does not exist in `org_id`.
pub async fn remove_human_user(
    State(state): State<AppState>,
    Path((org_id, user_id)): Path<(String, String)>,
    _correlation_id: CorrelationId,
    Query(query): Query<RemoveHumanUserQuery>,
) -> Result<Json<ObjectDetailsResponse>, AppError> {
    let ctx = CommandContext::new(query.caller_id, query.instance_id, "COMMAND-User2");
    let details = user::remove_human(state.store.as_ref(), &ctx, &org_id, &user_id).await?;
    Ok(Json(details.into()))
}
