//! Tenant-scoped MFA policy.
//!
//! Stores at most one active policy per tenant and evaluates whether a
//! given account must present a second factor. Evaluation fails open:
//! missing policies and unrecognized enforcement values never lock a
//! tenant out of login.

pub mod policy;
pub mod service;
pub mod store;

pub use policy::{
    is_required, MfaEnforcement, MfaMethod, MfaPolicy, MfaPolicyInput, ADMIN_ROLE_KEYS,
};
pub use service::MfaService;
pub use store::{InMemoryPolicyStore, PolicyStore};

use thiserror::Error;

/// Errors from MFA policy operations.
#[derive(Debug, Error)]
pub enum MfaError {
    #[error("Policy storage error: {0}")]
    Storage(String),
}

impl From<trellis_core::CoreError> for MfaError {
    fn from(err: trellis_core::CoreError) -> Self {
        MfaError::Storage(err.to_string())
    }
}
