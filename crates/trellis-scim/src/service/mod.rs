//! Resource services bridging SCIM requests to the directory.

pub mod groups;
pub mod users;

pub use groups::ScimGroupService;
pub use users::ScimUserService;
