//! Multi-tenant traits.

use crate::ids::TenantId;

/// Trait for entities that belong to a specific tenant.
///
/// Implementing this trait marks an entity as tenant-scoped, enabling
/// generic code to verify tenant isolation before acting on an entity.
///
/// The trait is object-safe and may be used as `&dyn TenantAware`.
pub trait TenantAware {
    /// Returns the tenant ID associated with this entity.
    fn tenant_id(&self) -> TenantId;
}
