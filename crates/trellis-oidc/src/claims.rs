//! Claim resolution for ID-token and userinfo payloads.

use std::collections::HashMap;
use trellis_core::{AttributeResolver, FederatedIdentity, FederatedTokens};

/// Resolves standard OIDC claims into a [`FederatedIdentity`].
///
/// The per-provider attribute mapping takes precedence over the
/// standard claim names. `sub` becomes the external ID, and the tokens
/// from the exchange travel with the identity.
#[derive(Debug, Clone, Default)]
pub struct OidcClaimsResolver {
    pub tokens: Option<FederatedTokens>,
}

impl OidcClaimsResolver {
    #[must_use]
    pub fn new(tokens: Option<FederatedTokens>) -> Self {
        Self { tokens }
    }
}

impl AttributeResolver for OidcClaimsResolver {
    fn resolve(
        &self,
        raw: &HashMap<String, serde_json::Value>,
        mapping: &HashMap<String, String>,
    ) -> FederatedIdentity {
        FederatedIdentity {
            email: resolve_single(raw, mapping, "email", &["email"]).unwrap_or_default(),
            first_name: resolve_single(raw, mapping, "first_name", &["given_name"]),
            last_name: resolve_single(raw, mapping, "last_name", &["family_name"]),
            external_id: resolve_single(raw, mapping, "external_id", &["sub"]),
            groups: resolve_groups(raw, mapping),
            raw_attributes: raw.clone(),
            tokens: self.tokens.clone(),
        }
    }
}

fn resolve_single(
    raw: &HashMap<String, serde_json::Value>,
    mapping: &HashMap<String, String>,
    field: &str,
    fallbacks: &[&str],
) -> Option<String> {
    if let Some(mapped) = mapping.get(field) {
        if let Some(value) = raw.get(mapped).and_then(value_as_string) {
            return Some(value);
        }
    }
    fallbacks
        .iter()
        .find_map(|claim| raw.get(*claim).and_then(value_as_string))
}

fn resolve_groups(
    raw: &HashMap<String, serde_json::Value>,
    mapping: &HashMap<String, String>,
) -> Vec<String> {
    let value = mapping
        .get("groups")
        .and_then(|mapped| raw.get(mapped))
        .or_else(|| raw.get("groups"))
        .or_else(|| raw.get("roles"));

    match value {
        Some(serde_json::Value::Array(items)) => {
            items.iter().filter_map(value_as_string).collect()
        }
        Some(single) => value_as_string(single).map(|v| vec![v]).unwrap_or_default(),
        None => Vec::new(),
    }
}

fn value_as_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(entries: &[(&str, serde_json::Value)]) -> HashMap<String, serde_json::Value> {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_standard_claims_resolve() {
        let raw = raw(&[
            ("sub", json!("idp-user-42")),
            ("email", json!("jdoe@example.com")),
            ("given_name", json!("Jane")),
            ("family_name", json!("Doe")),
            ("groups", json!(["eng", "admins"])),
        ]);

        let identity = OidcClaimsResolver::default().resolve(&raw, &HashMap::new());
        assert_eq!(identity.email, "jdoe@example.com");
        assert_eq!(identity.first_name.as_deref(), Some("Jane"));
        assert_eq!(identity.last_name.as_deref(), Some("Doe"));
        assert_eq!(identity.external_id.as_deref(), Some("idp-user-42"));
        assert_eq!(identity.groups, vec!["eng", "admins"]);
    }

    #[test]
    fn test_mapping_overrides_standard_claims() {
        let raw = raw(&[
            ("email", json!("standard@example.com")),
            ("upn", json!("mapped@example.com")),
        ]);
        let mapping: HashMap<String, String> = [("email".to_string(), "upn".to_string())].into();

        let identity = OidcClaimsResolver::default().resolve(&raw, &mapping);
        assert_eq!(identity.email, "mapped@example.com");
    }

    #[test]
    fn test_roles_claim_as_group_fallback() {
        let raw = raw(&[("roles", json!(["viewer"]))]);
        let identity = OidcClaimsResolver::default().resolve(&raw, &HashMap::new());
        assert_eq!(identity.groups, vec!["viewer"]);
    }

    #[test]
    fn test_tokens_travel_with_identity() {
        let tokens = FederatedTokens {
            access_token: "at".to_string(),
            refresh_token: Some("rt".to_string()),
            id_token: Some("it".to_string()),
        };
        let identity =
            OidcClaimsResolver::new(Some(tokens)).resolve(&HashMap::new(), &HashMap::new());
        let carried = identity.tokens.unwrap();
        assert_eq!(carried.access_token, "at");
    }
}
