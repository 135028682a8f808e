//! Shared types for the trellis identity-federation core.
//!
//! This crate defines the strongly typed identifiers, the tenant-scoping
//! trait, and the protocol-agnostic [`FederatedIdentity`] bag that the
//! SAML and OIDC handlers produce and the JIT provisioner consumes.

pub mod error;
pub mod identity;
pub mod ids;
pub mod traits;

pub use error::CoreError;
pub use identity::{AttributeResolver, FederatedIdentity, FederatedTokens};
pub use ids::{ParseIdError, ProviderId, RoleId, TenantId, UserId};
pub use traits::TenantAware;
