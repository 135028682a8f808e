//! MFA policy service.

use std::sync::Arc;
use trellis_core::TenantId;

use crate::policy::{self, MfaMethod, MfaPolicy, MfaPolicyInput};
use crate::store::PolicyStore;
use crate::MfaError;

/// Tenant MFA policy lookup, upsert, and enforcement evaluation.
#[derive(Clone)]
pub struct MfaService {
    store: Arc<dyn PolicyStore>,
}

impl MfaService {
    #[must_use]
    pub fn new(store: Arc<dyn PolicyStore>) -> Self {
        Self { store }
    }

    /// The tenant's active policy, if any.
    pub async fn get_policy(&self, tenant_id: TenantId) -> Result<Option<MfaPolicy>, MfaError> {
        self.store.get_active(tenant_id).await
    }

    /// Upsert the tenant's policy; the new record supersedes any
    /// previously active one.
    pub async fn set_policy(
        &self,
        tenant_id: TenantId,
        input: MfaPolicyInput,
    ) -> Result<MfaPolicy, MfaError> {
        let policy = self.store.upsert(tenant_id, input).await?;
        tracing::info!(
            tenant_id = %tenant_id,
            enforcement = %policy.enforcement,
            "MFA policy updated"
        );
        Ok(policy)
    }

    /// Whether an account holding `role_keys` must present a second
    /// factor under the tenant's active policy.
    pub async fn is_required(
        &self,
        tenant_id: TenantId,
        role_keys: &[String],
    ) -> Result<bool, MfaError> {
        let policy = self.store.get_active(tenant_id).await?;
        Ok(policy::is_required(role_keys, policy.as_ref()))
    }

    /// Allowed second-factor methods for the tenant, defaulting to TOTP.
    pub async fn allowed_methods(&self, tenant_id: TenantId) -> Result<Vec<MfaMethod>, MfaError> {
        let policy = self.store.get_active(tenant_id).await?;
        Ok(policy
            .map(|p| p.allowed_methods())
            .unwrap_or_else(|| vec![MfaMethod::Totp]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::MfaEnforcement;
    use crate::store::InMemoryPolicyStore;

    fn service() -> MfaService {
        MfaService::new(Arc::new(InMemoryPolicyStore::new()))
    }

    #[tokio::test]
    async fn test_is_required_without_policy() {
        let svc = service();
        let required = svc
            .is_required(TenantId::new(), &["admin".to_string()])
            .await
            .unwrap();
        assert!(!required);
    }

    #[tokio::test]
    async fn test_admins_only_distinguishes_roles() {
        let svc = service();
        let tenant = TenantId::new();
        svc.set_policy(
            tenant,
            MfaPolicyInput {
                enforcement: Some(MfaEnforcement::AdminsOnly),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert!(svc
            .is_required(tenant, &["administrator".to_string()])
            .await
            .unwrap());
        assert!(!svc
            .is_required(tenant, &["member".to_string()])
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_required_applies_to_all() {
        let svc = service();
        let tenant = TenantId::new();
        svc.set_policy(
            tenant,
            MfaPolicyInput {
                enforcement: Some(MfaEnforcement::Required),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert!(svc.is_required(tenant, &[]).await.unwrap());
    }

    #[tokio::test]
    async fn test_allowed_methods_default() {
        let svc = service();
        assert_eq!(
            svc.allowed_methods(TenantId::new()).await.unwrap(),
            vec![MfaMethod::Totp]
        );
    }

    #[tokio::test]
    async fn test_allowed_methods_from_policy() {
        let svc = service();
        let tenant = TenantId::new();
        svc.set_policy(
            tenant,
            MfaPolicyInput {
                allowed_methods: Some(vec![MfaMethod::Webauthn]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(
            svc.allowed_methods(tenant).await.unwrap(),
            vec![MfaMethod::Webauthn]
        );
    }
}
