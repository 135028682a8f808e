//! Policy persistence.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use trellis_core::TenantId;

use crate::policy::{MfaPolicy, MfaPolicyInput};
use crate::MfaError;

/// Storage for the per-tenant active MFA policy.
///
/// At most one active policy per tenant; an upsert supersedes the
/// previous one. No history is retained here.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Fetch the tenant's active policy.
    async fn get_active(&self, tenant_id: TenantId) -> Result<Option<MfaPolicy>, MfaError>;

    /// Update the active policy in place, or create one from defaults.
    async fn upsert(
        &self,
        tenant_id: TenantId,
        input: MfaPolicyInput,
    ) -> Result<MfaPolicy, MfaError>;
}

/// In-memory policy store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryPolicyStore {
    policies: Arc<DashMap<TenantId, MfaPolicy>>,
}

impl InMemoryPolicyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn get_active(&self, tenant_id: TenantId) -> Result<Option<MfaPolicy>, MfaError> {
        Ok(self
            .policies
            .get(&tenant_id)
            .filter(|p| p.is_active)
            .map(|p| p.clone()))
    }

    async fn upsert(
        &self,
        tenant_id: TenantId,
        input: MfaPolicyInput,
    ) -> Result<MfaPolicy, MfaError> {
        let mut entry = self
            .policies
            .entry(tenant_id)
            .or_insert_with(|| MfaPolicy::defaults(tenant_id));
        let policy = entry.value_mut();

        if let Some(enforcement) = input.enforcement {
            policy.enforcement = enforcement.to_string();
        }
        if let Some(methods) = input.allowed_methods {
            policy.allowed_methods = methods;
        }
        if let Some(days) = input.grace_period_days {
            policy.grace_period_days = days;
        }
        if let Some(hours) = input.session_duration_hours {
            policy.session_duration_hours = hours;
        }
        if let Some(sessions) = input.max_concurrent_sessions {
            policy.max_concurrent_sessions = sessions;
        }
        policy.is_active = true;
        policy.updated_at = Utc::now();

        Ok(policy.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{MfaEnforcement, MfaMethod};

    #[tokio::test]
    async fn test_get_active_none_without_upsert() {
        let store = InMemoryPolicyStore::new();
        assert!(store.get_active(TenantId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_creates_with_defaults() {
        let store = InMemoryPolicyStore::new();
        let tenant = TenantId::new();
        let policy = store.upsert(tenant, MfaPolicyInput::default()).await.unwrap();

        assert_eq!(policy.enforcement, "disabled");
        assert_eq!(policy.allowed_methods, vec![MfaMethod::Totp]);
        assert_eq!(policy.grace_period_days, 7);
    }

    #[tokio::test]
    async fn test_upsert_supersedes_previous() {
        let store = InMemoryPolicyStore::new();
        let tenant = TenantId::new();

        store
            .upsert(
                tenant,
                MfaPolicyInput {
                    enforcement: Some(MfaEnforcement::Required),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        store
            .upsert(
                tenant,
                MfaPolicyInput {
                    enforcement: Some(MfaEnforcement::AdminsOnly),
                    grace_period_days: Some(14),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let active = store.get_active(tenant).await.unwrap().unwrap();
        assert_eq!(active.enforcement, "admins_only");
        assert_eq!(active.grace_period_days, 14);
    }

    #[tokio::test]
    async fn test_partial_upsert_keeps_existing_fields() {
        let store = InMemoryPolicyStore::new();
        let tenant = TenantId::new();

        store
            .upsert(
                tenant,
                MfaPolicyInput {
                    allowed_methods: Some(vec![MfaMethod::Webauthn, MfaMethod::Totp]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let policy = store
            .upsert(
                tenant,
                MfaPolicyInput {
                    session_duration_hours: Some(12),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(
            policy.allowed_methods,
            vec![MfaMethod::Webauthn, MfaMethod::Totp]
        );
        assert_eq!(policy.session_duration_hours, 12);
    }
}
