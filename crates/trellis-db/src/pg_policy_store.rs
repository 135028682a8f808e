//! Postgres-backed MFA [`PolicyStore`].

use async_trait::async_trait;
use sqlx::PgPool;
use trellis_core::TenantId;
use trellis_mfa::{MfaError, MfaPolicy, MfaPolicyInput, PolicyStore};

use crate::models::mfa_policy::MfaPolicyRecord;

/// Production policy store over the `mfa_policies` table.
#[derive(Clone)]
pub struct PgPolicyStore {
    pool: PgPool,
}

impl PgPolicyStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PolicyStore for PgPolicyStore {
    async fn get_active(&self, tenant_id: TenantId) -> Result<Option<MfaPolicy>, MfaError> {
        let record = MfaPolicyRecord::find_active(&self.pool, *tenant_id.as_uuid())
            .await
            .map_err(|e| MfaError::Storage(e.to_string()))?;
        Ok(record.map(MfaPolicyRecord::into_policy))
    }

    async fn upsert(
        &self,
        tenant_id: TenantId,
        input: MfaPolicyInput,
    ) -> Result<MfaPolicy, MfaError> {
        let mut policy = self
            .get_active(tenant_id)
            .await?
            .unwrap_or_else(|| MfaPolicy::defaults(tenant_id));

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

        let record = MfaPolicyRecord::insert_active(&self.pool, &policy)
            .await
            .map_err(|e| MfaError::Storage(e.to_string()))?;
        Ok(record.into_policy())
    }
}
