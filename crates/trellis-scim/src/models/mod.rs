//! SCIM resource schemas.

pub mod group;
pub mod response;
pub mod user;

pub use group::{CreateScimGroupRequest, ScimGroup, ScimGroupMember};
pub use response::{ScimListResponse, ScimPagination, ScimPatchOp, ScimPatchRequest};
pub use user::{CreateScimUserRequest, ScimEmail, ScimMeta, ScimName, ScimUser, ScimUserGroup};
