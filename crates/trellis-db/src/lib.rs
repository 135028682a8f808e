//! Database models and Postgres-backed stores.
//!
//! Runtime-checked `sqlx` queries over `PgPool`; no compile-time query
//! macros so the crate builds without a live database.

pub mod models;
pub mod pg_directory;
pub mod pg_policy_store;

pub use models::mfa_policy::MfaPolicyRecord;
pub use models::provider_config::{
    CreateProviderConfig, Protocol, ProviderConfig, UpdateProviderConfig,
};
pub use models::scim_token::ScimToken;
pub use pg_directory::PgDirectory;
pub use pg_policy_store::PgPolicyStore;
