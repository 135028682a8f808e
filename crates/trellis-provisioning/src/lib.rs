//! Just-in-time account provisioning.
//!
//! Takes a validated [`trellis_core::FederatedIdentity`] and reconciles
//! it against the identity store: find-or-create the account, refresh
//! profile fields, and grant roles mapped from federated groups.

pub mod error;
pub mod provisioner;
pub mod username;

pub use error::{ProvisionError, ProvisionResult};
pub use provisioner::JitProvisioner;
