use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::dtos::provisioning::{
    CompleteOrphanRequest, OrphanAccountResponse, ProvisionAccountRequest,
    ProvisionAccountResponse, RolesResponse,
};
use crate::models::IdentityId;
use crate::services::ProvisionOutcome;
use crate::utils::ValidatedJson;
use crate::AppState;

/// Map a workflow outcome onto the HTTP surface.
///
/// `Failed` becomes an ordinary classified error (nothing was created, the
/// console may retry). `Orphan` gets its own payload shape so it can never
/// be mistaken for a retry-safe failure: re-running the whole workflow would
/// collide on the already-registered email.
fn outcome_response(outcome: ProvisionOutcome) -> Response {
    match outcome {
        ProvisionOutcome::Completed(record) => (
            StatusCode::CREATED,
            Json(ProvisionAccountResponse::completed(record)),
        )
            .into_response(),
        ProvisionOutcome::Failed(err) => AppError::from(err).into_response(),
        ProvisionOutcome::Orphan {
            identity_id,
            reason,
        } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(OrphanAccountResponse::new(identity_id, reason.to_string())),
        )
            .into_response(),
    }
}

/// Provision a new account across the identity provider and the directory
#[utoipa::path(
    post,
    path = "/admin/provision",
    request_body = ProvisionAccountRequest,
    responses(
        (status = 201, description = "Account provisioned", body = ProvisionAccountResponse),
        (status = 400, description = "Invalid request"),
        (status = 409, description = "An account already exists for this email"),
        (status = 500, description = "Identity created but directory record missing", body = OrphanAccountResponse),
        (status = 502, description = "Identity provider unavailable"),
    ),
    security(("admin_api_key" = [])),
    tag = "Provisioning"
)]
pub async fn provision_account(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ProvisionAccountRequest>,
) -> Response {
    outcome_response(state.provisioning.provision(req).await)
}

/// Retry the directory half for an orphaned identity account
#[utoipa::path(
    post,
    path = "/admin/provision/{identity_id}/directory",
    params(
        ("identity_id" = Uuid, Path, description = "Identity account left without a directory record")
    ),
    request_body = CompleteOrphanRequest,
    responses(
        (status = 201, description = "Directory record written (or already present)", body = ProvisionAccountResponse),
        (status = 400, description = "Invalid request"),
        (status = 500, description = "Directory record still missing", body = OrphanAccountResponse),
    ),
    security(("admin_api_key" = [])),
    tag = "Provisioning"
)]
pub async fn complete_orphan(
    State(state): State<AppState>,
    Path(identity_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<CompleteOrphanRequest>,
) -> Response {
    let outcome = state
        .provisioning
        .complete_orphan(IdentityId(identity_id), req.profile(), req.role_id)
        .await;
    outcome_response(outcome)
}

/// List the role catalog
#[utoipa::path(
    get,
    path = "/admin/roles",
    responses(
        (status = 200, description = "Role catalog", body = RolesResponse),
    ),
    security(("admin_api_key" = [])),
    tag = "Provisioning"
)]
pub async fn list_roles(State(state): State<AppState>) -> Json<RolesResponse> {
    Json(RolesResponse {
        roles: state.catalog.all().await,
    })
}
