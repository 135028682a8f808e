//! Per-tenant identity-provider configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashMap;
use uuid::Uuid;

/// Federation protocol spoken by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    Saml,
    Oidc,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Saml => write!(f, "saml"),
            Protocol::Oidc => write!(f, "oidc"),
        }
    }
}

impl std::str::FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "saml" => Ok(Protocol::Saml),
            "oidc" => Ok(Protocol::Oidc),
            _ => Err(format!("Unknown protocol: {s}")),
        }
    }
}

/// Identity-provider configuration entity.
///
/// One record per tenant+protocol; looked up on every federation
/// attempt. The `protocol` field determines which handler may use the
/// record; handlers reject configs of the wrong protocol.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub provider_name: String,
    pub protocol: String,
    /// IdP single-sign-on endpoint (SAML) or authorization endpoint (OIDC).
    pub sso_url: String,
    /// SAML single-logout endpoint.
    pub slo_url: Option<String>,
    /// OIDC token endpoint.
    pub token_url: Option<String>,
    /// OIDC userinfo endpoint.
    pub userinfo_url: Option<String>,
    /// SAML IdP entity ID / OIDC issuer.
    pub entity_id: Option<String>,
    /// OIDC client identifier.
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// PEM-encoded IdP signing certificate (SAML).
    pub certificate: Option<String>,
    /// Map of logical field name to IdP claim/attribute name.
    pub attribute_mapping: serde_json::Value,
    /// Role key assigned to newly provisioned accounts.
    pub default_role: Option<String>,
    pub is_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a provider configuration.
#[derive(Debug, Clone)]
pub struct CreateProviderConfig {
    pub tenant_id: Uuid,
    pub provider_name: String,
    pub protocol: Protocol,
    pub sso_url: String,
    pub slo_url: Option<String>,
    pub token_url: Option<String>,
    pub userinfo_url: Option<String>,
    pub entity_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub certificate: Option<String>,
    pub attribute_mapping: serde_json::Value,
    pub default_role: Option<String>,
}

/// Input for updating a provider configuration.
#[derive(Debug, Clone, Default)]
pub struct UpdateProviderConfig {
    pub provider_name: Option<String>,
    pub sso_url: Option<String>,
    pub slo_url: Option<String>,
    pub token_url: Option<String>,
    pub userinfo_url: Option<String>,
    pub entity_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub certificate: Option<String>,
    pub attribute_mapping: Option<serde_json::Value>,
    pub default_role: Option<String>,
}

impl ProviderConfig {
    /// Create a new provider configuration.
    pub async fn create(
        pool: &sqlx::PgPool,
        input: CreateProviderConfig,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r"
            INSERT INTO provider_configs (
                tenant_id, provider_name, protocol, sso_url, slo_url,
                token_url, userinfo_url, entity_id, client_id, client_secret,
                certificate, attribute_mapping, default_role
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            ",
        )
        .bind(input.tenant_id)
        .bind(&input.provider_name)
        .bind(input.protocol.to_string())
        .bind(&input.sso_url)
        .bind(&input.slo_url)
        .bind(&input.token_url)
        .bind(&input.userinfo_url)
        .bind(&input.entity_id)
        .bind(&input.client_id)
        .bind(&input.client_secret)
        .bind(&input.certificate)
        .bind(&input.attribute_mapping)
        .bind(&input.default_role)
        .fetch_one(pool)
        .await
    }

    /// Find by ID within a tenant.
    pub async fn find_by_id_and_tenant(
        pool: &sqlx::PgPool,
        id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM provider_configs WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(tenant_id)
            .fetch_optional(pool)
            .await
    }

    /// The enabled config for a tenant+protocol, the hot lookup on every
    /// federation attempt.
    pub async fn find_by_tenant_and_protocol(
        pool: &sqlx::PgPool,
        tenant_id: Uuid,
        protocol: Protocol,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM provider_configs
            WHERE tenant_id = $1 AND protocol = $2 AND is_enabled = true
            ORDER BY created_at ASC
            LIMIT 1
            ",
        )
        .bind(tenant_id)
        .bind(protocol.to_string())
        .fetch_optional(pool)
        .await
    }

    /// List all configs for a tenant.
    pub async fn list_by_tenant(
        pool: &sqlx::PgPool,
        tenant_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            "SELECT * FROM provider_configs WHERE tenant_id = $1 ORDER BY created_at ASC",
        )
        .bind(tenant_id)
        .fetch_all(pool)
        .await
    }

    /// Administrative update.
    pub async fn update(
        pool: &sqlx::PgPool,
        id: Uuid,
        input: UpdateProviderConfig,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r"
            UPDATE provider_configs
            SET
                provider_name = COALESCE($2, provider_name),
                sso_url = COALESCE($3, sso_url),
                slo_url = COALESCE($4, slo_url),
                token_url = COALESCE($5, token_url),
                userinfo_url = COALESCE($6, userinfo_url),
                entity_id = COALESCE($7, entity_id),
                client_id = COALESCE($8, client_id),
                client_secret = COALESCE($9, client_secret),
                certificate = COALESCE($10, certificate),
                attribute_mapping = COALESCE($11, attribute_mapping),
                default_role = COALESCE($12, default_role),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            ",
        )
        .bind(id)
        .bind(&input.provider_name)
        .bind(&input.sso_url)
        .bind(&input.slo_url)
        .bind(&input.token_url)
        .bind(&input.userinfo_url)
        .bind(&input.entity_id)
        .bind(&input.client_id)
        .bind(&input.client_secret)
        .bind(&input.certificate)
        .bind(&input.attribute_mapping)
        .bind(&input.default_role)
        .fetch_one(pool)
        .await
    }

    /// Toggle enabled status.
    pub async fn set_enabled(
        pool: &sqlx::PgPool,
        id: Uuid,
        is_enabled: bool,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r"
            UPDATE provider_configs
            SET is_enabled = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            ",
        )
        .bind(id)
        .bind(is_enabled)
        .fetch_one(pool)
        .await
    }

    /// Delete all configs for a tenant (tenant deletion cascade).
    pub async fn delete_by_tenant(
        pool: &sqlx::PgPool,
        tenant_id: Uuid,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM provider_configs WHERE tenant_id = $1")
            .bind(tenant_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Parsed protocol enum.
    pub fn get_protocol(&self) -> Result<Protocol, String> {
        self.protocol.parse()
    }

    /// The attribute mapping as a flat string map. Non-string values are
    /// skipped.
    #[must_use]
    pub fn attribute_mapping_map(&self) -> HashMap<String, String> {
        self.attribute_mapping
            .as_object()
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Create a default SAML instance for testing.
    /// Available in all builds for downstream crate tests.
    #[must_use]
    pub fn default_for_test_saml() -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            provider_name: "Test SAML IdP".to_string(),
            protocol: "saml".to_string(),
            sso_url: "https://idp.example.com/sso".to_string(),
            slo_url: Some("https://idp.example.com/slo".to_string()),
            token_url: None,
            userinfo_url: None,
            entity_id: Some("https://idp.example.com/metadata".to_string()),
            client_id: None,
            client_secret: None,
            certificate: None,
            attribute_mapping: serde_json::json!({}),
            default_role: None,
            is_enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    /// Create a default OIDC instance for testing.
    /// Available in all builds for downstream crate tests.
    #[must_use]
    pub fn default_for_test_oidc() -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            provider_name: "Test OIDC IdP".to_string(),
            protocol: "oidc".to_string(),
            sso_url: "https://idp.example.com/authorize".to_string(),
            slo_url: None,
            token_url: Some("https://idp.example.com/token".to_string()),
            userinfo_url: Some("https://idp.example.com/userinfo".to_string()),
            entity_id: Some("https://idp.example.com".to_string()),
            client_id: Some("test-client".to_string()),
            client_secret: Some("test-secret".to_string()),
            certificate: None,
            attribute_mapping: serde_json::json!({}),
            default_role: None,
            is_enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_round_trip() {
        assert_eq!("saml".parse::<Protocol>().unwrap(), Protocol::Saml);
        assert_eq!("oidc".parse::<Protocol>().unwrap(), Protocol::Oidc);
        assert_eq!(Protocol::Saml.to_string(), "saml");
        assert!("ldap".parse::<Protocol>().is_err());
    }

    #[test]
    fn test_attribute_mapping_map_skips_non_strings() {
        let mut config = ProviderConfig::default_for_test_saml();
        config.attribute_mapping = serde_json::json!({
            "email": "mail",
            "department": "dept",
            "flags": 3,
        });

        let map = config.attribute_mapping_map();
        assert_eq!(map.get("email").map(String::as_str), Some("mail"));
        assert_eq!(map.get("department").map(String::as_str), Some("dept"));
        assert!(!map.contains_key("flags"));
    }

    #[test]
    fn test_default_for_test_protocols() {
        assert_eq!(
            ProviderConfig::default_for_test_saml().get_protocol().unwrap(),
            Protocol::Saml
        );
        assert_eq!(
            ProviderConfig::default_for_test_oidc().get_protocol().unwrap(),
            Protocol::Oidc
        );
    }
}
