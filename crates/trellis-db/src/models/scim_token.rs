//! SCIM bearer token row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Per-tenant SCIM bearer credential.
///
/// Only the SHA-256 hash of the token is stored; the raw value is shown
/// once at creation time.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ScimToken {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// Hex-encoded SHA-256 of the raw token.
    pub token_hash: String,
    pub description: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ScimToken {
    /// Store a new token hash.
    pub async fn create(
        pool: &sqlx::PgPool,
        tenant_id: Uuid,
        token_hash: &str,
        description: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r"
            INSERT INTO scim_tokens (tenant_id, token_hash, description, expires_at)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            ",
        )
        .bind(tenant_id)
        .bind(token_hash)
        .bind(description)
        .bind(expires_at)
        .fetch_one(pool)
        .await
    }

    /// Look up a usable token by hash.
    pub async fn find_valid_by_hash(
        pool: &sqlx::PgPool,
        token_hash: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM scim_tokens
            WHERE token_hash = $1
              AND revoked_at IS NULL
              AND (expires_at IS NULL OR expires_at > NOW())
            ",
        )
        .bind(token_hash)
        .fetch_optional(pool)
        .await
    }

    /// Revoke a token.
    pub async fn revoke(pool: &sqlx::PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE scim_tokens SET revoked_at = NOW() WHERE id = $1 AND revoked_at IS NULL")
                .bind(id)
                .execute(pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Whether the token is currently usable.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        if self.revoked_at.is_some() {
            return false;
        }
        match self.expires_at {
            Some(expires_at) => Utc::now() < expires_at,
            None => true,
        }
    }
}
