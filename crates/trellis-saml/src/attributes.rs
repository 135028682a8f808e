//! Assertion attribute resolution.
//!
//! Logical identity fields are resolved from the per-provider attribute
//! mapping first, then from a table of well-known claim URIs that the
//! major IdPs emit.

use std::collections::HashMap;
use trellis_core::{AttributeResolver, FederatedIdentity};

/// Claim names checked for the email field, in order.
pub const EMAIL_CLAIMS: &[&str] = &[
    "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/emailaddress",
    "urn:oid:0.9.2342.19200300.100.1.3",
    "mail",
    "email",
];

/// Claim names checked for the first name.
pub const FIRST_NAME_CLAIMS: &[&str] = &[
    "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/givenname",
    "urn:oid:2.5.4.42",
    "givenName",
    "first_name",
];

/// Claim names checked for the last name.
pub const LAST_NAME_CLAIMS: &[&str] = &[
    "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/surname",
    "urn:oid:2.5.4.4",
    "sn",
    "last_name",
];

/// Claim names checked for group membership.
pub const GROUP_CLAIMS: &[&str] = &[
    "http://schemas.xmlsoap.org/claims/Group",
    "memberOf",
    "groups",
];

/// Resolves SAML assertion attributes into a [`FederatedIdentity`].
///
/// Carries the assertion's NameID: it becomes the `external_id` and the
/// email fallback when no email attribute is present.
#[derive(Debug, Clone, Default)]
pub struct SamlAttributeResolver {
    pub name_id: Option<String>,
}

impl SamlAttributeResolver {
    #[must_use]
    pub fn new(name_id: Option<String>) -> Self {
        Self { name_id }
    }
}

impl AttributeResolver for SamlAttributeResolver {
    fn resolve(
        &self,
        raw: &HashMap<String, serde_json::Value>,
        mapping: &HashMap<String, String>,
    ) -> FederatedIdentity {
        let email = resolve_single(raw, mapping, "email", EMAIL_CLAIMS)
            .or_else(|| self.name_id.clone())
            .unwrap_or_default();

        FederatedIdentity {
            email,
            first_name: resolve_single(raw, mapping, "first_name", FIRST_NAME_CLAIMS),
            last_name: resolve_single(raw, mapping, "last_name", LAST_NAME_CLAIMS),
            external_id: self.name_id.clone(),
            groups: resolve_groups(raw, mapping),
            raw_attributes: raw.clone(),
            tokens: None,
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
        if let Some(value) = value_as_string(raw.get(mapped)?) {
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
        .or_else(|| GROUP_CLAIMS.iter().find_map(|claim| raw.get(*claim)));

    match value {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(value_as_string)
            .collect(),
        Some(single) => value_as_string(single).map(|v| vec![v]).unwrap_or_default(),
        None => Vec::new(),
    }
}

fn value_as_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Array(items) => items.first().and_then(value_as_string),
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
    fn test_microsoft_claim_uris_resolve() {
        let raw = raw(&[
            (
                "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/emailaddress",
                json!(["jdoe@example.com"]),
            ),
            (
                "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/givenname",
                json!("Jane"),
            ),
            (
                "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/surname",
                json!("Doe"),
            ),
        ]);

        let resolver = SamlAttributeResolver::new(Some("jdoe@example.com".to_string()));
        let identity = resolver.resolve(&raw, &HashMap::new());
        assert_eq!(identity.email, "jdoe@example.com");
        assert_eq!(identity.first_name.as_deref(), Some("Jane"));
        assert_eq!(identity.last_name.as_deref(), Some("Doe"));
    }

    #[test]
    fn test_oid_and_bare_names_resolve() {
        let raw = raw(&[
            ("urn:oid:0.9.2342.19200300.100.1.3", json!("oid@example.com")),
            ("sn", json!("Smith")),
        ]);

        let identity = SamlAttributeResolver::default().resolve(&raw, &HashMap::new());
        assert_eq!(identity.email, "oid@example.com");
        assert_eq!(identity.last_name.as_deref(), Some("Smith"));
        assert_eq!(identity.first_name, None);
    }

    #[test]
    fn test_custom_mapping_wins_over_fallbacks() {
        let raw = raw(&[
            ("corpMail", json!("mapped@example.com")),
            ("mail", json!("fallback@example.com")),
        ]);
        let mapping: HashMap<String, String> =
            [("email".to_string(), "corpMail".to_string())].into();

        let identity = SamlAttributeResolver::default().resolve(&raw, &mapping);
        assert_eq!(identity.email, "mapped@example.com");
    }

    #[test]
    fn test_email_defaults_to_name_id() {
        let resolver = SamlAttributeResolver::new(Some("subject@example.com".to_string()));
        let identity = resolver.resolve(&HashMap::new(), &HashMap::new());
        assert_eq!(identity.email, "subject@example.com");
        assert_eq!(identity.external_id.as_deref(), Some("subject@example.com"));
    }

    #[test]
    fn test_groups_collect_all_values() {
        let raw = raw(&[(
            "http://schemas.xmlsoap.org/claims/Group",
            json!(["Engineering", "Admins"]),
        )]);
        let identity = SamlAttributeResolver::default().resolve(&raw, &HashMap::new());
        assert_eq!(identity.groups, vec!["Engineering", "Admins"]);
    }

    #[test]
    fn test_single_group_value() {
        let raw = raw(&[("memberOf", json!("Staff"))]);
        let identity = SamlAttributeResolver::default().resolve(&raw, &HashMap::new());
        assert_eq!(identity.groups, vec!["Staff"]);
    }
}
