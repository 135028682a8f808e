//! SCIM Group resource handlers.

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    response::Response,
    Extension, Json,
};
use uuid::Uuid;

use crate::auth::ScimAuthContext;
use crate::error::ScimError;
use crate::handlers::common::{scim_response, ListQuery};
use crate::models::{CreateScimGroupRequest, ScimPatchRequest};
use crate::service::ScimGroupService;

/// GET /scim/v2/Groups
#[utoipa::path(
    get,
    path = "/scim/v2/Groups",
    responses(
        (status = 200, description = "List of SCIM groups"),
        (status = 401, description = "Not authenticated"),
    ),
    tag = "SCIM Groups"
)]
pub async fn list_groups(
    Extension(auth): Extension<ScimAuthContext>,
    Extension(groups): Extension<ScimGroupService>,
    Query(query): Query<ListQuery>,
) -> Result<Response, ScimError> {
    let response = groups
        .list(auth.tenant_id, query.filter.as_deref(), query.pagination())
        .await?;
    Ok(scim_response(StatusCode::OK, &response))
}

/// GET /scim/v2/Groups/{id}
#[utoipa::path(
    get,
    path = "/scim/v2/Groups/{id}",
    responses(
        (status = 200, description = "SCIM group"),
        (status = 404, description = "Group not found"),
    ),
    tag = "SCIM Groups"
)]
pub async fn get_group(
    Extension(auth): Extension<ScimAuthContext>,
    Extension(groups): Extension<ScimGroupService>,
    Path(id): Path<Uuid>,
) -> Result<Response, ScimError> {
    let group = groups.get(auth.tenant_id, id).await?;
    Ok(scim_response(StatusCode::OK, &group))
}

/// POST /scim/v2/Groups
#[utoipa::path(
    post,
    path = "/scim/v2/Groups",
    responses(
        (status = 201, description = "Group created"),
        (status = 409, description = "displayName already exists"),
    ),
    tag = "SCIM Groups"
)]
pub async fn create_group(
    Extension(auth): Extension<ScimAuthContext>,
    Extension(groups): Extension<ScimGroupService>,
    Json(request): Json<CreateScimGroupRequest>,
) -> Result<Response, ScimError> {
    let group = groups.create(auth.tenant_id, &request).await?;
    Ok(scim_response(StatusCode::CREATED, &group))
}

/// PUT /scim/v2/Groups/{id}
#[utoipa::path(
    put,
    path = "/scim/v2/Groups/{id}",
    responses(
        (status = 200, description = "Group replaced"),
        (status = 404, description = "Group not found"),
    ),
    tag = "SCIM Groups"
)]
pub async fn replace_group(
    Extension(auth): Extension<ScimAuthContext>,
    Extension(groups): Extension<ScimGroupService>,
    Path(id): Path<Uuid>,
    Json(request): Json<CreateScimGroupRequest>,
) -> Result<Response, ScimError> {
    let group = groups.replace(auth.tenant_id, id, &request).await?;
    Ok(scim_response(StatusCode::OK, &group))
}

/// PATCH /scim/v2/Groups/{id}
#[utoipa::path(
    patch,
    path = "/scim/v2/Groups/{id}",
    responses(
        (status = 200, description = "Group updated"),
        (status = 400, description = "Invalid PATCH request"),
        (status = 404, description = "Group not found"),
    ),
    tag = "SCIM Groups"
)]
pub async fn patch_group(
    Extension(auth): Extension<ScimAuthContext>,
    Extension(groups): Extension<ScimGroupService>,
    Path(id): Path<Uuid>,
    Json(request): Json<ScimPatchRequest>,
) -> Result<Response, ScimError> {
    let group = groups.patch(auth.tenant_id, id, &request).await?;
    Ok(scim_response(StatusCode::OK, &group))
}

/// DELETE /scim/v2/Groups/{id}
#[utoipa::path(
    delete,
    path = "/scim/v2/Groups/{id}",
    responses(
        (status = 204, description = "Group deleted"),
        (status = 404, description = "Group not found"),
    ),
    tag = "SCIM Groups"
)]
pub async fn delete_group(
    Extension(auth): Extension<ScimAuthContext>,
    Extension(groups): Extension<ScimGroupService>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ScimError> {
    groups.delete(auth.tenant_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
