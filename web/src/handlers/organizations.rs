//! Organization endpoints: create (with first admin user) and rename
//! (spec §8 seed scenarios 1 and 2).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use iam_core::command::CommandContext;
use iam_domain::organization::{self, CreateOrganizationWithAdmin};
use serde::{Deserialize, Serialize};

use crate::{extractors::CorrelationId, state::AppState, AppError};

/// `POST /organizations` request body.
#[derive(Debug, Deserialize)]
pub struct CreateOrganizationRequest {
    /// Aggregate id for the new organization, chosen by the caller.
    pub org_id: String,
    /// Display name.
    pub name: String,
    /// First admin user's username.
    pub admin_username: String,
    /// First admin user's email.
    pub admin_email: String,
    /// First admin user's first name.
    pub admin_first_name: String,
    /// First admin user's last name.
    pub admin_last_name: String,
    /// Caller id to attribute the command to (spec §4.4 step 3).
    pub caller_id: String,
    /// Tenant scope.
    pub instance_id: String,
}

/// `POST /organizations` / `PATCH /organizations/:org_id` response body.
#[derive(Debug, Serialize)]
pub struct ObjectDetailsResponse {
    /// The aggregate's version after this command's events were applied.
    pub sequence: i64,
    /// When the command's events were committed.
    #[serde(rename = "eventDate")]
    pub event_date: chrono::DateTime<chrono::Utc>,
    /// The resource owner the affected aggregate belongs to.
    #[serde(rename = "resourceOwner")]
    pub resource_owner: String,
}

impl From<iam_core::command::ObjectDetails> for ObjectDetailsResponse {
    fn from(details: iam_core::command::ObjectDetails) -> Self {
        Self {
            sequence: details.sequence,
            event_date: details.event_date,
            resource_owner: details.resource_owner,
        }
    }
}

/// `POST /organizations`: create an organization with its first admin
/// user (`COMMAND-Org1`).
///
/// # Errors
///
/// Returns `409 Conflict` if `org_id` or `admin_username` is already
/// claimed, `400 Bad Request` for empty required fields.
pub async fn create_organization(
    State(state): State<AppState>,
    _correlation_id: CorrelationId,
    Json(request): Json<CreateOrganizationRequest>,
) -> Result<(StatusCode, Json<ObjectDetailsResponse>), AppError> {
    let ctx = CommandContext::new(request.caller_id, request.instance_id, "COMMAND-Org1");
    let details = organization::create_with_admin(
        state.store.as_ref(),
        &ctx,
        CreateOrganizationWithAdmin {
            org_id: request.org_id,
            name: request.name,
            admin_username: request.admin_username,
            admin_email: request.admin_email,
            admin_first_name: request.admin_first_name,
            admin_last_name: request.admin_last_name,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(details.into())))
}

/// `PATCH /organizations/:org_id/name` request body.
#[derive(Debug, Deserialize)]
pub struct RenameOrganizationRequest {
    /// The organization's new display name.
    pub name: String,
    /// Caller id to attribute the command to.
    pub caller_id: String,
    /// Tenant scope.
    pub instance_id: String,
}

/// `PATCH /organizations/:org_id/name`: rename an organization
/// (`COMMAND-Org2`).
///
/// # Errors
///
/// Returns `404 Not Found` if `org_id` doesn't exist, `409 Conflict` on
/// an optimistic-concurrency conflict from a concurrent rename (spec §8
/// seed scenario 2).
pub async fn rename_organization(
    State(state): State<AppState>,
    Path(org_id): Path<String>,
    _correlation_id: CorrelationId,
    Json(request): Json<RenameOrganizationRequest>,
) -> Result<Json<ObjectDetailsResponse>, AppError> {
    let ctx = CommandContext::new(request.caller_id, request.instance_id, "COMMAND-Org2");
    let details = organization::rename(state.store.as_ref(), &ctx, &org_id, &request.name).await?;
    Ok(Json(details.into()))
}
