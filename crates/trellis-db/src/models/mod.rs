//! Database entity models.

pub mod mfa_policy;
pub mod provider_config;
pub mod scim_token;
