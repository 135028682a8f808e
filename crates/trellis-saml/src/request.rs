//! Outgoing AuthnRequest and LogoutRequest documents.

use chrono::Utc;
use rand::RngCore;

/// SAML protocol namespace.
pub const NS_PROTOCOL: &str = "urn:oasis:names:tc:SAML:2.0:protocol";
/// SAML assertion namespace.
pub const NS_ASSERTION: &str = "urn:oasis:names:tc:SAML:2.0:assertion";
/// HTTP-POST binding URI, requested for the assertion consumer service.
pub const BINDING_HTTP_POST: &str = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST";
/// HTTP-Redirect binding URI, used for single logout.
pub const BINDING_HTTP_REDIRECT: &str = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect";
/// Email-address NameID format requested from the IdP.
pub const NAMEID_EMAIL: &str = "urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress";

/// Random 128-bit request ID in the `_` + 32 hex chars form.
///
/// XML IDs must not start with a digit, hence the underscore prefix.
#[must_use]
pub fn generate_request_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    let mut id = String::with_capacity(33);
    id.push('_');
    for b in bytes {
        id.push_str(&format!("{b:02x}"));
    }
    id
}

/// Current instant in the `YYYY-MM-DDTHH:MM:SSZ` form SAML expects.
#[must_use]
pub fn issue_instant() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Build an AuthnRequest targeting `sso_url`, asking the IdP to post
/// the response to `acs_url`.
#[must_use]
pub fn build_authn_request(
    request_id: &str,
    sp_entity_id: &str,
    acs_url: &str,
    sso_url: &str,
) -> String {
    format!(
        r#"<samlp:AuthnRequest xmlns:samlp="{NS_PROTOCOL}" xmlns:saml="{NS_ASSERTION}" ID="{request_id}" Version="2.0" IssueInstant="{instant}" Destination="{sso_url}" ProtocolBinding="{BINDING_HTTP_POST}" AssertionConsumerServiceURL="{acs_url}"><saml:Issuer>{sp_entity_id}</saml:Issuer><samlp:NameIDPolicy Format="{NAMEID_EMAIL}" AllowCreate="true"/></samlp:AuthnRequest>"#,
        instant = issue_instant(),
    )
}

/// Build a LogoutRequest targeting `slo_url` for the given subject.
#[must_use]
pub fn build_logout_request(
    request_id: &str,
    sp_entity_id: &str,
    slo_url: &str,
    name_id: &str,
) -> String {
    format!(
        r#"<samlp:LogoutRequest xmlns:samlp="{NS_PROTOCOL}" xmlns:saml="{NS_ASSERTION}" ID="{request_id}" Version="2.0" IssueInstant="{instant}" Destination="{slo_url}"><saml:Issuer>{sp_entity_id}</saml:Issuer><saml:NameID Format="{NAMEID_EMAIL}">{name_id}</saml:NameID></samlp:LogoutRequest>"#,
        instant = issue_instant(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_shape() {
        let id = generate_request_id();
        assert_eq!(id.len(), 33);
        assert!(id.starts_with('_'));
        assert!(id[1..].chars().all(|c| c.is_ascii_hexdigit()));

        // 128 bits of randomness: two draws never collide in practice.
        assert_ne!(id, generate_request_id());
    }

    #[test]
    fn test_issue_instant_format() {
        let instant = issue_instant();
        assert_eq!(instant.len(), 20);
        assert!(instant.ends_with('Z'));
        assert_eq!(&instant[4..5], "-");
        assert_eq!(&instant[10..11], "T");
    }

    #[test]
    fn test_authn_request_shape() {
        let xml = build_authn_request(
            "_abc",
            "https://sp.example.com/metadata",
            "https://sp.example.com/acs",
            "https://idp.example.com/sso",
        );
        assert!(xml.contains(r#"ID="_abc""#));
        assert!(xml.contains(r#"Destination="https://idp.example.com/sso""#));
        assert!(xml.contains(r#"AssertionConsumerServiceURL="https://sp.example.com/acs""#));
        assert!(xml.contains(BINDING_HTTP_POST));
        assert!(xml.contains(r#"AllowCreate="true""#));
        assert!(xml.contains("<saml:Issuer>https://sp.example.com/metadata</saml:Issuer>"));
    }

    #[test]
    fn test_logout_request_carries_name_id() {
        let xml = build_logout_request(
            "_def",
            "https://sp.example.com/metadata",
            "https://idp.example.com/slo",
            "jdoe@example.com",
        );
        assert!(xml.contains("jdoe@example.com</saml:NameID>"));
        assert!(xml.contains(r#"Destination="https://idp.example.com/slo""#));
    }
}
