//! SCIM 2.0 router assembly.

use axum::{middleware, routing::get, Extension, Router};
use std::sync::Arc;
use trellis_directory::Directory;

use crate::auth::{self, TokenService};
use crate::handlers::{discovery, groups, users};
use crate::service::{ScimGroupService, ScimUserService};

/// Base URL used when rendering resource locations.
#[derive(Debug, Clone)]
pub struct BaseUrl(pub String);

/// Everything the router needs.
pub struct ScimRouterConfig {
    pub directory: Arc<dyn Directory>,
    pub tokens: TokenService,
    pub base_url: String,
}

/// Build the /scim/v2 resource router.
///
/// All routes require a bearer token; the authenticated tenant scopes
/// every operation.
pub fn scim_router(config: ScimRouterConfig) -> Router {
    let user_service = ScimUserService::new(config.directory.clone(), config.base_url.clone());
    let group_service = ScimGroupService::new(config.directory, config.base_url.clone());

    Router::new()
        .route("/Users", get(users::list_users).post(users::create_user))
        .route(
            "/Users/{id}",
            get(users::get_user)
                .put(users::replace_user)
                .patch(users::patch_user)
                .delete(users::delete_user),
        )
        .route(
            "/Groups",
            get(groups::list_groups).post(groups::create_group),
        )
        .route(
            "/Groups/{id}",
            get(groups::get_group)
                .put(groups::replace_group)
                .patch(groups::patch_group)
                .delete(groups::delete_group),
        )
        .route(
            "/ServiceProviderConfig",
            get(discovery::service_provider_config),
        )
        .route("/ResourceTypes", get(discovery::resource_types))
        .route("/Schemas", get(discovery::schemas))
        .layer(middleware::from_fn(auth::require_scim_token))
        .layer(Extension(config.tokens))
        .layer(Extension(user_service))
        .layer(Extension(group_service))
        .layer(Extension(BaseUrl(config.base_url)))
}
