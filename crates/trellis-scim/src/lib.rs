//! SCIM 2.0 provisioning server.
//!
//! Implements the RFC 7643/7644 subset that Okta, Azure AD and OneLogin
//! actually exercise: User and Group CRUD, PATCH, `eq`/`co`/`sw` filters
//! and the discovery endpoints. Every operation is scoped to the tenant
//! of the bearer token that authenticated it.

pub mod auth;
pub mod discovery;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod models;
pub mod patch;
pub mod router;
pub mod service;

pub use auth::{
    require_scim_token, InMemoryTokenStore, IssuedToken, PgTokenStore, ScimAuthContext,
    TokenService, TokenStore,
};
pub use error::{ScimError, ScimResult};
pub use filter::FilterExpr;
pub use models::{
    CreateScimGroupRequest, CreateScimUserRequest, ScimGroup, ScimListResponse, ScimPagination,
    ScimPatchRequest, ScimUser,
};
pub use router::{scim_router, BaseUrl, ScimRouterConfig};
pub use service::{ScimGroupService, ScimUserService};
