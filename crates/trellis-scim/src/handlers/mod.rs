//! HTTP handlers for the SCIM endpoints.

pub mod common;
pub mod discovery;
pub mod groups;
pub mod users;
