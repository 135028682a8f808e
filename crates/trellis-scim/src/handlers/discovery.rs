//! Discovery endpoint handlers.

use axum::{http::StatusCode, response::Response, Extension};

use crate::discovery;
use crate::handlers::common::scim_response;
use crate::router::BaseUrl;

/// GET /scim/v2/ServiceProviderConfig
#[utoipa::path(
    get,
    path = "/scim/v2/ServiceProviderConfig",
    responses((status = 200, description = "Service provider capabilities")),
    tag = "SCIM Discovery"
)]
pub async fn service_provider_config(Extension(base_url): Extension<BaseUrl>) -> Response {
    scim_response(
        StatusCode::OK,
        &discovery::service_provider_config(&base_url.0),
    )
}

/// GET /scim/v2/ResourceTypes
#[utoipa::path(
    get,
    path = "/scim/v2/ResourceTypes",
    responses((status = 200, description = "Supported resource types")),
    tag = "SCIM Discovery"
)]
pub async fn resource_types(Extension(base_url): Extension<BaseUrl>) -> Response {
    scim_response(StatusCode::OK, &discovery::resource_types(&base_url.0))
}

/// GET /scim/v2/Schemas
#[utoipa::path(
    get,
    path = "/scim/v2/Schemas",
    responses((status = 200, description = "Resource schemas")),
    tag = "SCIM Discovery"
)]
pub async fn schemas() -> Response {
    scim_response(StatusCode::OK, &discovery::schemas())
}
