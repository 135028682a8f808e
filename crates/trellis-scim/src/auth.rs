//! Bearer-token authentication for the SCIM endpoints.
//!
//! Tokens are opaque `tscim_`-prefixed secrets; only their SHA-256 hash
//! is stored. The middleware resolves the token to a tenant and injects
//! a [`ScimAuthContext`] into the request extensions.

use async_trait::async_trait;
use axum::{
    extract::Request,
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
    Extension,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use trellis_core::TenantId;
use uuid::Uuid;

use crate::error::{ScimError, ScimResult};

/// Prefix on every issued token.
pub const TOKEN_PREFIX: &str = "tscim_";

/// The authenticated tenant behind a SCIM request.
#[derive(Debug, Clone)]
pub struct ScimAuthContext {
    pub tenant_id: TenantId,
    pub token_id: Uuid,
}

/// A stored token credential.
#[derive(Debug, Clone)]
pub struct TokenRecord {
    pub id: Uuid,
    pub tenant_id: TenantId,
    /// Hex-encoded SHA-256 of the raw token.
    pub token_hash: String,
    pub description: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked: bool,
}

impl TokenRecord {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.revoked && self.expires_at.map_or(true, |at| Utc::now() < at)
    }
}

/// Storage for SCIM token credentials.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert(&self, record: TokenRecord) -> ScimResult<()>;
    async fn find_valid_by_hash(&self, token_hash: &str) -> ScimResult<Option<TokenRecord>>;
    async fn revoke(&self, id: Uuid) -> ScimResult<bool>;
}

/// Process-local token store.
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    tokens: DashMap<Uuid, TokenRecord>,
}

impl InMemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn insert(&self, record: TokenRecord) -> ScimResult<()> {
        self.tokens.insert(record.id, record);
        Ok(())
    }

    async fn find_valid_by_hash(&self, token_hash: &str) -> ScimResult<Option<TokenRecord>> {
        Ok(self
            .tokens
            .iter()
            .find(|entry| entry.token_hash == token_hash && entry.is_valid())
            .map(|entry| entry.value().clone()))
    }

    async fn revoke(&self, id: Uuid) -> ScimResult<bool> {
        match self.tokens.get_mut(&id) {
            Some(mut entry) if !entry.revoked => {
                entry.revoked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Postgres-backed token store.
#[derive(Clone)]
pub struct PgTokenStore {
    pool: sqlx::PgPool,
}

impl PgTokenStore {
    #[must_use]
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn insert(&self, record: TokenRecord) -> ScimResult<()> {
        trellis_db::ScimToken::create(
            &self.pool,
            record.tenant_id.into(),
            &record.token_hash,
            record.description.as_deref(),
            record.expires_at,
        )
        .await
        .map_err(|e| ScimError::Internal(e.to_string()))?;
        Ok(())
    }

    async fn find_valid_by_hash(&self, token_hash: &str) -> ScimResult<Option<TokenRecord>> {
        let row = trellis_db::ScimToken::find_valid_by_hash(&self.pool, token_hash)
            .await
            .map_err(|e| ScimError::Internal(e.to_string()))?;
        Ok(row.map(|t| TokenRecord {
            id: t.id,
            tenant_id: TenantId::from_uuid(t.tenant_id),
            token_hash: t.token_hash,
            description: t.description,
            expires_at: t.expires_at,
            revoked: t.revoked_at.is_some(),
        }))
    }

    async fn revoke(&self, id: Uuid) -> ScimResult<bool> {
        trellis_db::ScimToken::revoke(&self.pool, id)
            .await
            .map_err(|e| ScimError::Internal(e.to_string()))
    }
}

/// A freshly issued token. The raw value is returned exactly once.
#[derive(Debug)]
pub struct IssuedToken {
    pub id: Uuid,
    pub raw: String,
}

/// Issues and validates SCIM bearer tokens.
#[derive(Clone)]
pub struct TokenService {
    store: Arc<dyn TokenStore>,
}

impl TokenService {
    #[must_use]
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }

    /// Mint a token for the tenant.
    pub async fn issue(
        &self,
        tenant_id: TenantId,
        description: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> ScimResult<IssuedToken> {
        let mut random_bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut random_bytes);
        let raw = format!("{TOKEN_PREFIX}{}", URL_SAFE_NO_PAD.encode(random_bytes));

        let record = TokenRecord {
            id: Uuid::new_v4(),
            tenant_id,
            token_hash: hash_token(&raw),
            description: description.map(str::to_string),
            expires_at,
            revoked: false,
        };
        let id = record.id;
        self.store.insert(record).await?;

        tracing::info!(tenant_id = %tenant_id, token_id = %id, "issued SCIM token");
        Ok(IssuedToken { id, raw })
    }

    /// Resolve a bearer token to its tenant.
    pub async fn authenticate(&self, bearer_token: &str) -> ScimResult<ScimAuthContext> {
        if !bearer_token.starts_with(TOKEN_PREFIX) {
            return Err(ScimError::Unauthorized);
        }

        let record = self
            .store
            .find_valid_by_hash(&hash_token(bearer_token))
            .await?
            .ok_or(ScimError::Unauthorized)?;

        Ok(ScimAuthContext {
            tenant_id: record.tenant_id,
            token_id: record.id,
        })
    }

    /// Revoke a token by ID.
    pub async fn revoke(&self, id: Uuid) -> ScimResult<()> {
        if self.store.revoke(id).await? {
            Ok(())
        } else {
            Err(ScimError::NotFound("token".to_string()))
        }
    }
}

/// Hex-encoded SHA-256 of a raw token.
#[must_use]
pub fn hash_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Axum middleware enforcing bearer auth on the resource routes.
pub async fn require_scim_token(
    Extension(tokens): Extension<TokenService>,
    mut request: Request,
    next: Next,
) -> Result<Response, ScimError> {
    let bearer = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ScimError::Unauthorized)?;

    let context = tokens.authenticate(bearer).await?;
    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new(Arc::new(InMemoryTokenStore::new()))
    }

    #[tokio::test]
    async fn test_issue_and_authenticate() {
        let service = service();
        let tenant_id = TenantId::new();

        let issued = service.issue(tenant_id, Some("Okta"), None).await.unwrap();
        assert!(issued.raw.starts_with(TOKEN_PREFIX));

        let context = service.authenticate(&issued.raw).await.unwrap();
        assert_eq!(context.tenant_id, tenant_id);
        assert_eq!(context.token_id, issued.id);
    }

    #[tokio::test]
    async fn test_wrong_prefix_rejected() {
        let service = service();
        assert!(matches!(
            service.authenticate("Basic xyz").await,
            Err(ScimError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_unknown_token_rejected() {
        let service = service();
        assert!(matches!(
            service.authenticate("tscim_nonexistent").await,
            Err(ScimError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_revoked_token_rejected() {
        let service = service();
        let issued = service.issue(TenantId::new(), None, None).await.unwrap();

        service.revoke(issued.id).await.unwrap();
        assert!(matches!(
            service.authenticate(&issued.raw).await,
            Err(ScimError::Unauthorized)
        ));
        // Double revoke reports not found.
        assert!(service.revoke(issued.id).await.is_err());
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let service = service();
        let issued = service
            .issue(
                TenantId::new(),
                None,
                Some(Utc::now() - chrono::Duration::hours(1)),
            )
            .await
            .unwrap();

        assert!(matches!(
            service.authenticate(&issued.raw).await,
            Err(ScimError::Unauthorized)
        ));
    }

    #[test]
    fn test_hash_is_stable_hex() {
        let h1 = hash_token("tscim_abc");
        let h2 = hash_token("tscim_abc");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert_ne!(h1, hash_token("tscim_abd"));
    }
}
