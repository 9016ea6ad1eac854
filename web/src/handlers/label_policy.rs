//! Label policy endpoints: resolve (org → instance-default → built-in)
//! and set at either scope (spec §8 seed scenario 4).

use axum::{
    extract::{Path, State},
    Json,
};
use iam_core::command::CommandContext;
use iam_domain::label_policy;
use serde::{Deserialize, Serialize};

use crate::{extractors::CorrelationId, handlers::organizations::ObjectDetailsResponse, state::AppState, AppError};

/// `GET /organizations/:org_id/label-policy` response body.
#[derive(Debug, Serialize)]
pub struct LabelPolicyResponse {
    /// The resolved color, `#rrggbb`.
    #[serde(rename = "primaryColor")]
    pub primary_color: String,
    /// Whether this came from a fallback level rather than an
    /// org-specific override.
    #[serde(rename = "isDefault")]
    pub is_default: bool,
}

impl From<label_policy::LabelPolicyView> for LabelPolicyResponse {
    fn from(view: label_policy::LabelPolicyView) -> Self {
        Self { primary_color: view.primary_color, is_default: view.is_default }
    }
}

/// `GET /organizations/:org_id/label-policy?instanceId=...`: resolve the
/// effective label policy.
///
/// # Errors
///
/// Propagates any underlying query error as a `500` (the chain itself
/// never returns `not_found` — it always resolves to at least the
/// built-in default).
pub async fn resolve_label_policy(
    State(state): State<AppState>,
    Path(org_id): Path<String>,
    axum::extract::Query(query): axum::extract::Query<InstanceQuery>,
) -> Result<Json<LabelPolicyResponse>, AppError> {
    let view = label_policy::resolve(state.label_policies.as_ref(), &query.instance_id, &org_id).await?;
    Ok(Json(view.into()))
}

/// Query parameters shared by the label-policy endpoints.
#[derive(Debug, Deserialize)]
pub struct InstanceQuery {
    /// Tenant scope.
    #[serde(rename = "instanceId")]
    pub instance_id: String,
}

/// `PUT /organizations/:org_id/label-policy` request body.
#[derive(Debug, Deserialize)]
pub struct SetLabelPolicyRequest {
    /// The new color, `#rrggbb`.
    pub primary_color: String,
    /// Caller id to attribute the command to.
    pub caller_id: String,
    /// Tenant scope.
    pub instance_id: String,
}

/// `PUT /organizations/:org_id/label-policy`: set the org-scoped
/// override (`COMMAND-LabelPolicy1`).
///
/// # Errors
///
/// Returns `400 Bad Request` if `primary_color` is empty.
pub async fn set_org_label_policy(
    State(state): State<AppState>,
    Path(org_id): Path<String>,
    _correlation_id: CorrelationId,
    Json(request): Json<SetLabelPolicyRequest>,
) -> Result<Json<ObjectDetailsResponse>, AppError> {
    let ctx = CommandContext::new(request.caller_id, request.instance_id, "COMMAND-LabelPolicy1");
    let details =
        label_policy::set_org_policy(state.store.as_ref(), &ctx, &org_id, &request.primary_color)
            .await?;
    Ok(Json(details.into()))
}

/// `PUT /instance/label-policy` request body.
#[derive(Debug, Deserialize)]
pub struct SetInstanceLabelPolicyRequest {
    /// The new color, `#rrggbb`.
    pub primary_color: String,
    /// Caller id to attribute the command to.
    pub caller_id: String,
    /// Tenant scope.
    pub instance_id: String,
}

/// `PUT /instance/label-policy`: set the instance-wide default
/// (`COMMAND-LabelPolicy2`).
///
/// # Errors
///
/// Returns `400 Bad Request` if `primary_color` is empty.
pub async fn set_instance_label_policy(
    State(state): State<AppState>,
    _correlation_id: CorrelationId,
    Json(request): Json<SetInstanceLabelPolicyRequest>,
) -> Result<Json<ObjectDetailsResponse>, AppError> {
    let ctx = CommandContext::new(request.caller_id, request.instance_id, "COMMAND-LabelPolicy2");
    let details =
        label_policy::set_instance_default_policy(state.store.as_ref(), &ctx, &request.primary_color)
            .await?;
    Ok(Json(details.into()))
}
