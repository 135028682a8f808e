//! The protocol-agnostic federated identity bag.
//!
//! Both the SAML and OIDC handlers reduce a validated federation response
//! to a [`FederatedIdentity`]; the JIT provisioner consumes it without
//! knowing which protocol produced it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Tokens obtained from an OIDC token exchange.
///
/// Absent for SAML logins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FederatedTokens {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

/// Normalized attribute set produced by a validated federation response.
///
/// `email` is the primary matching key for provisioning; `external_id`
/// (SAML NameID or OIDC `sub`) is the secondary key. `raw_attributes`
/// preserves protocol-specific claim names so custom attribute mappings
/// can resolve against them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FederatedIdentity {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub raw_attributes: HashMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<FederatedTokens>,
}

impl FederatedIdentity {
    /// Look up a raw attribute value as a string.
    ///
    /// Arrays resolve to their first element; non-string scalars are
    /// rendered with `to_string`.
    #[must_use]
    pub fn raw_attribute_str(&self, name: &str) -> Option<String> {
        let value = self.raw_attributes.get(name)?;
        json_value_to_str(value)
    }
}

fn json_value_to_str(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Array(items) => items.first().and_then(json_value_to_str),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Resolves protocol-specific claims or attributes into a
/// [`FederatedIdentity`].
///
/// The SAML handler implements this over assertion attributes and the
/// claim-URI fallback table; the OIDC handler over standard OIDC claims.
/// Both feed the same downstream provisioning path.
pub trait AttributeResolver {
    /// Build a normalized identity from the raw attribute map, applying
    /// the per-provider `attribute_mapping` before any protocol
    /// fallbacks.
    fn resolve(
        &self,
        raw: &HashMap<String, serde_json::Value>,
        mapping: &HashMap<String, String>,
    ) -> FederatedIdentity;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_raw_attribute_str_variants() {
        let mut raw = HashMap::new();
        raw.insert("plain".to_string(), json!("value"));
        raw.insert("list".to_string(), json!(["first", "second"]));
        raw.insert("number".to_string(), json!(42));
        raw.insert("nothing".to_string(), json!(null));

        let identity = FederatedIdentity {
            raw_attributes: raw,
            ..Default::default()
        };

        assert_eq!(identity.raw_attribute_str("plain").as_deref(), Some("value"));
        assert_eq!(identity.raw_attribute_str("list").as_deref(), Some("first"));
        assert_eq!(identity.raw_attribute_str("number").as_deref(), Some("42"));
        assert_eq!(identity.raw_attribute_str("nothing"), None);
        assert_eq!(identity.raw_attribute_str("missing"), None);
    }

    #[test]
    fn test_identity_serializes_without_empty_options() {
        let identity = FederatedIdentity {
            email: "user@example.com".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_string(&identity).unwrap();
        assert!(json.contains("user@example.com"));
        assert!(!json.contains("first_name"));
        assert!(!json.contains("tokens"));
    }
}
