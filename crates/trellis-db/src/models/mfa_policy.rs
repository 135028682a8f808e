//! Tenant MFA policy row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use trellis_core::TenantId;
use trellis_mfa::{MfaMethod, MfaPolicy};
use uuid::Uuid;

/// Stored MFA policy. At most one row per tenant has `is_active = true`;
/// an upsert deactivates the previous row inside a transaction.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MfaPolicyRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub enforcement: String,
    /// JSON array of method names.
    pub allowed_methods: serde_json::Value,
    pub grace_period_days: i32,
    pub session_duration_hours: i32,
    pub max_concurrent_sessions: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MfaPolicyRecord {
    /// The active policy for a tenant.
    pub async fn find_active(
        pool: &sqlx::PgPool,
        tenant_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM mfa_policies
            WHERE tenant_id = $1 AND is_active = true
            ORDER BY updated_at DESC
            LIMIT 1
            ",
        )
        .bind(tenant_id)
        .fetch_optional(pool)
        .await
    }

    /// Insert a new active policy, deactivating any previous one.
    pub async fn insert_active(
        pool: &sqlx::PgPool,
        policy: &MfaPolicy,
    ) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("UPDATE mfa_policies SET is_active = false WHERE tenant_id = $1")
            .bind(policy.tenant_id.as_uuid())
            .execute(&mut *tx)
            .await?;

        let methods: Vec<String> = policy
            .allowed_methods
            .iter()
            .map(ToString::to_string)
            .collect();

        let record: Self = sqlx::query_as(
            r"
            INSERT INTO mfa_policies (
                tenant_id, enforcement, allowed_methods, grace_period_days,
                session_duration_hours, max_concurrent_sessions, is_active
            )
            VALUES ($1, $2, $3, $4, $5, $6, true)
            RETURNING *
            ",
        )
        .bind(policy.tenant_id.as_uuid())
        .bind(&policy.enforcement)
        .bind(serde_json::json!(methods))
        .bind(policy.grace_period_days)
        .bind(policy.session_duration_hours)
        .bind(policy.max_concurrent_sessions)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(record)
    }

    /// Convert to the domain policy type. Unknown method names are
    /// dropped.
    #[must_use]
    pub fn into_policy(self) -> MfaPolicy {
        let allowed_methods: Vec<MfaMethod> = self
            .allowed_methods
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .filter_map(|s| s.parse().ok())
                    .collect()
            })
            .unwrap_or_default();

        MfaPolicy {
            tenant_id: TenantId::from_uuid(self.tenant_id),
            enforcement: self.enforcement,
            allowed_methods,
            grace_period_days: self.grace_period_days,
            session_duration_hours: self.session_duration_hours,
            max_concurrent_sessions: self.max_concurrent_sessions,
            is_active: self.is_active,
            updated_at: self.updated_at,
        }
    }
}
