//! SCIM User resource handlers.

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
use crate::models::{CreateScimUserRequest, ScimPatchRequest};
use crate::service::ScimUserService;

/// GET /scim/v2/Users
#[utoipa::path(
    get,
    path = "/scim/v2/Users",
    responses(
        (status = 200, description = "List of SCIM users"),
        (status = 400, description = "Invalid filter"),
        (status = 401, description = "Not authenticated"),
    ),
    tag = "SCIM Users"
)]
pub async fn list_users(
    Extension(auth): Extension<ScimAuthContext>,
    Extension(users): Extension<ScimUserService>,
    Query(query): Query<ListQuery>,
) -> Result<Response, ScimError> {
    let response = users
        .list(auth.tenant_id, query.filter.as_deref(), query.pagination())
        .await?;
    Ok(scim_response(StatusCode::OK, &response))
}

/// GET /scim/v2/Users/{id}
#[utoipa::path(
    get,
    path = "/scim/v2/Users/{id}",
    responses(
        (status = 200, description = "SCIM user"),
        (status = 404, description = "User not found"),
    ),
    tag = "SCIM Users"
)]
pub async fn get_user(
    Extension(auth): Extension<ScimAuthContext>,
    Extension(users): Extension<ScimUserService>,
    Path(id): Path<Uuid>,
) -> Result<Response, ScimError> {
    let user = users.get(auth.tenant_id, id).await?;
    Ok(scim_response(StatusCode::OK, &user))
}

/// POST /scim/v2/Users
#[utoipa::path(
    post,
    path = "/scim/v2/Users",
    responses(
        (status = 201, description = "User created"),
        (status = 409, description = "userName already exists"),
    ),
    tag = "SCIM Users"
)]
pub async fn create_user(
    Extension(auth): Extension<ScimAuthContext>,
    Extension(users): Extension<ScimUserService>,
    Json(request): Json<CreateScimUserRequest>,
) -> Result<Response, ScimError> {
    let user = users.create(auth.tenant_id, &request).await?;
    Ok(scim_response(StatusCode::CREATED, &user))
}

/// PUT /scim/v2/Users/{id}
#[utoipa::path(
    put,
    path = "/scim/v2/Users/{id}",
    responses(
        (status = 200, description = "User replaced"),
        (status = 404, description = "User not found"),
    ),
    tag = "SCIM Users"
)]
pub async fn replace_user(
    Extension(auth): Extension<ScimAuthContext>,
    Extension(users): Extension<ScimUserService>,
    Path(id): Path<Uuid>,
    Json(request): Json<CreateScimUserRequest>,
) -> Result<Response, ScimError> {
    let user = users.replace(auth.tenant_id, id, &request).await?;
    Ok(scim_response(StatusCode::OK, &user))
}

/// PATCH /scim/v2/Users/{id}
#[utoipa::path(
    patch,
    path = "/scim/v2/Users/{id}",
    responses(
        (status = 200, description = "User updated"),
        (status = 400, description = "Invalid PATCH request"),
        (status = 404, description = "User not found"),
    ),
    tag = "SCIM Users"
)]
pub async fn patch_user(
    Extension(auth): Extension<ScimAuthContext>,
    Extension(users): Extension<ScimUserService>,
    Path(id): Path<Uuid>,
    Json(request): Json<ScimPatchRequest>,
) -> Result<Response, ScimError> {
    let user = users.patch(auth.tenant_id, id, &request).await?;
    Ok(scim_response(StatusCode::OK, &user))
}

/// DELETE /scim/v2/Users/{id}
///
/// Deactivates the account; the row is kept.
#[utoipa::path(
    delete,
    path = "/scim/v2/Users/{id}",
    responses(
        (status = 204, description = "User deactivated"),
        (status = 404, description = "User not found"),
    ),
    tag = "SCIM Users"
)]
pub async fn delete_user(
    Extension(auth): Extension<ScimAuthContext>,
    Extension(users): Extension<ScimUserService>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ScimError> {
    users.delete(auth.tenant_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
