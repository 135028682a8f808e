//! The SAML service-provider handler.

use chrono::Utc;
use trellis_core::{AttributeResolver, FederatedIdentity};
use trellis_db::{Protocol, ProviderConfig};

use crate::attributes::SamlAttributeResolver;
use crate::binding::{append_query_param, encode_redirect_payload};
use crate::error::{SamlError, SamlResult};
use crate::metadata;
use crate::request::{build_authn_request, build_logout_request, generate_request_id};
use crate::response::{check_conditions, parse_response};
use crate::signature::verify_response_signature;

/// This deployment's service-provider endpoints.
#[derive(Debug, Clone)]
pub struct SpSettings {
    /// SP entity ID, conventionally the metadata URL.
    pub entity_id: String,
    /// Assertion consumer service URL (receives HTTP-POST responses).
    pub acs_url: String,
    /// Single-logout service URL.
    pub sls_url: String,
}

/// SAML 2.0 SP handler: builds requests, validates signed responses,
/// and serves SP metadata.
///
/// Validation is a pure function of the response plus the configured
/// certificate; no request/response correlation state is kept, so the
/// replay window is bounded by the assertion validity conditions alone.
#[derive(Debug, Clone)]
pub struct SamlService {
    sp: SpSettings,
}

impl SamlService {
    #[must_use]
    pub fn new(sp: SpSettings) -> Self {
        Self { sp }
    }

    fn check_protocol(config: &ProviderConfig) -> SamlResult<()> {
        match config.get_protocol() {
            Ok(Protocol::Saml) => Ok(()),
            _ => Err(SamlError::WrongProtocol(config.protocol.clone())),
        }
    }

    /// Build the IdP redirect URL carrying a fresh AuthnRequest.
    pub fn initiate_login(&self, config: &ProviderConfig) -> SamlResult<String> {
        Self::check_protocol(config)?;

        let request_id = generate_request_id();
        let xml = build_authn_request(
            &request_id,
            &self.sp.entity_id,
            &self.sp.acs_url,
            &config.sso_url,
        );
        let payload = encode_redirect_payload(&xml)?;

        tracing::debug!(
            tenant_id = %config.tenant_id,
            provider = %config.provider_name,
            request_id = %request_id,
            "SAML AuthnRequest issued"
        );

        Ok(append_query_param(&config.sso_url, "SAMLRequest", &payload))
    }

    /// Validate a base64-encoded response from the ACS post and reduce
    /// it to a normalized identity.
    pub fn process_response(
        &self,
        base64_response: &str,
        config: &ProviderConfig,
    ) -> SamlResult<FederatedIdentity> {
        Self::check_protocol(config)?;

        let certificate = config
            .certificate
            .as_deref()
            .ok_or(SamlError::MissingConfig("certificate"))?;

        let xml_bytes = base64::Engine::decode(
            &base64::engine::general_purpose::STANDARD,
            base64_response.trim(),
        )
        .map_err(|e| SamlError::InvalidResponse(format!("Invalid base64: {e}")))?;
        let xml = String::from_utf8(xml_bytes)
            .map_err(|e| SamlError::InvalidResponse(format!("Invalid UTF-8: {e}")))?;

        if let Err(err) = verify_response_signature(&xml, certificate) {
            tracing::warn!(
                tenant_id = %config.tenant_id,
                provider = %config.provider_name,
                error = %err,
                "SAML response signature rejected"
            );
            return Err(err);
        }

        let parsed = parse_response(&xml)?;

        if let Err(err) = check_conditions(&parsed, Utc::now()) {
            tracing::warn!(
                tenant_id = %config.tenant_id,
                provider = %config.provider_name,
                error = %err,
                "SAML assertion outside validity window"
            );
            return Err(err);
        }

        let resolver = SamlAttributeResolver::new(parsed.name_id.clone());
        let identity = resolver.resolve(&parsed.attributes, &config.attribute_mapping_map());

        if identity.email.is_empty() {
            return Err(SamlError::MissingSubject);
        }

        tracing::info!(
            tenant_id = %config.tenant_id,
            provider = %config.provider_name,
            "SAML response validated"
        );
        Ok(identity)
    }

    /// SP metadata document for this deployment.
    #[must_use]
    pub fn generate_metadata(&self) -> String {
        metadata::generate_metadata(&self.sp.entity_id, &self.sp.acs_url, &self.sp.sls_url)
    }

    /// Build the IdP redirect URL carrying a LogoutRequest for the
    /// given subject.
    pub fn initiate_logout(&self, config: &ProviderConfig, name_id: &str) -> SamlResult<String> {
        Self::check_protocol(config)?;

        let slo_url = config
            .slo_url
            .as_deref()
            .ok_or(SamlError::MissingConfig("slo_url"))?;

        let xml = build_logout_request(
            &generate_request_id(),
            &self.sp.entity_id,
            slo_url,
            name_id,
        );
        let payload = encode_redirect_payload(&xml)?;
        Ok(append_query_param(slo_url, "SAMLRequest", &payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use openssl::asn1::Asn1Time;
    use openssl::hash::MessageDigest;
    use openssl::pkey::{PKey, Private};
    use openssl::rsa::Rsa;
    use openssl::sign::Signer;
    use openssl::x509::{X509NameBuilder, X509};

    use crate::canonical::canonicalize;

    fn sp_settings() -> SpSettings {
        SpSettings {
            entity_id: "https://sp.example.com/metadata".to_string(),
            acs_url: "https://sp.example.com/acs".to_string(),
            sls_url: "https://sp.example.com/sls".to_string(),
        }
    }

    fn generate_keypair_and_cert() -> (PKey<Private>, String) {
        let rsa = Rsa::generate(2048).unwrap();
        let key = PKey::from_rsa(rsa).unwrap();

        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("CN", "test-idp").unwrap();
        let name = name.build();

        let mut builder = X509::builder().unwrap();
        builder.set_version(2).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&key).unwrap();
        builder
            .set_not_before(&Asn1Time::days_from_now(0).unwrap())
            .unwrap();
        builder
            .set_not_after(&Asn1Time::days_from_now(365).unwrap())
            .unwrap();
        builder.sign(&key, MessageDigest::sha256()).unwrap();
        let cert = builder.build();

        let pem = String::from_utf8(cert.to_pem().unwrap()).unwrap();
        (key, pem)
    }

    fn unsigned_response(not_before: &str, not_on_or_after: &str) -> (String, String) {
        let prefix = format!(
            concat!(
                r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_resp1" Version="2.0">"#,
                r#"<saml:Assertion ID="_assert1">"#,
                r#"<saml:Subject><saml:NameID>jdoe@example.com</saml:NameID></saml:Subject>"#,
                r#"<saml:Conditions NotBefore="{nb}" NotOnOrAfter="{noa}"></saml:Conditions>"#,
                r#"<saml:AttributeStatement>"#,
                r#"<saml:Attribute Name="mail"><saml:AttributeValue>jdoe@example.com</saml:AttributeValue></saml:Attribute>"#,
                r#"<saml:Attribute Name="givenName"><saml:AttributeValue>Jane</saml:AttributeValue></saml:Attribute>"#,
                r#"<saml:Attribute Name="sn"><saml:AttributeValue>Doe</saml:AttributeValue></saml:Attribute>"#,
                r#"<saml:Attribute Name="memberOf"><saml:AttributeValue>Engineering</saml:AttributeValue></saml:Attribute>"#,
                r#"</saml:AttributeStatement>"#,
                r#"</saml:Assertion>"#,
            ),
            nb = not_before,
            noa = not_on_or_after,
        );
        let suffix = "</samlp:Response>".to_string();
        (prefix, suffix)
    }

    fn sign_response(
        prefix: &str,
        suffix: &str,
        key: &PKey<Private>,
        digest: MessageDigest,
    ) -> String {
        let unsigned = format!("{prefix}{suffix}");
        let canonical_doc = canonicalize(&unsigned).unwrap();
        let doc_digest =
            openssl::hash::hash(MessageDigest::sha256(), canonical_doc.as_bytes()).unwrap();
        let digest_b64 = STANDARD.encode(doc_digest);

        let signed_info = format!(
            concat!(
                r#"<ds:SignedInfo xmlns:ds="http://www.w3.org/2000/09/xmldsig#">"#,
                r#"<ds:CanonicalizationMethod Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/>"#,
                r#"<ds:SignatureMethod Algorithm="http://www.w3.org/2001/04/xmldsig-more#rsa-sha256"/>"#,
                r#"<ds:Reference URI=""><ds:DigestMethod Algorithm="http://www.w3.org/2001/04/xmlenc#sha256"/>"#,
                r#"<ds:DigestValue>{digest}</ds:DigestValue></ds:Reference>"#,
                r#"</ds:SignedInfo>"#,
            ),
            digest = digest_b64,
        );

        let canonical_signed_info = canonicalize(&signed_info).unwrap();
        let mut signer = Signer::new(digest, key).unwrap();
        signer.update(canonical_signed_info.as_bytes()).unwrap();
        let signature = STANDARD.encode(signer.sign_to_vec().unwrap());

        let signature_block = format!(
            r#"<ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#">{signed_info}<ds:SignatureValue>{signature}</ds:SignatureValue></ds:Signature>"#
        );

        format!("{prefix}{signature_block}{suffix}")
    }

    fn config_with_cert(cert_pem: &str) -> ProviderConfig {
        let mut config = ProviderConfig::default_for_test_saml();
        config.certificate = Some(cert_pem.to_string());
        config
    }

    fn valid_window() -> (String, String) {
        let now = Utc::now();
        (
            (now - chrono::Duration::minutes(2))
                .format("%Y-%m-%dT%H:%M:%SZ")
                .to_string(),
            (now + chrono::Duration::minutes(10))
                .format("%Y-%m-%dT%H:%M:%SZ")
                .to_string(),
        )
    }

    #[test]
    fn test_initiate_login_builds_redirect_url() {
        let service = SamlService::new(sp_settings());
        let config = ProviderConfig::default_for_test_saml();

        let url = service.initiate_login(&config).unwrap();
        assert!(url.starts_with("https://idp.example.com/sso?SAMLRequest="));
    }

    #[test]
    fn test_initiate_login_rejects_oidc_config() {
        let service = SamlService::new(sp_settings());
        let config = ProviderConfig::default_for_test_oidc();

        assert!(matches!(
            service.initiate_login(&config),
            Err(SamlError::WrongProtocol(_))
        ));
    }

    #[test]
    fn test_process_response_accepts_valid_signature() {
        let service = SamlService::new(sp_settings());
        let (key, cert) = generate_keypair_and_cert();
        let (nb, noa) = valid_window();
        let (prefix, suffix) = unsigned_response(&nb, &noa);
        let signed = sign_response(&prefix, &suffix, &key, MessageDigest::sha256());
        let payload = STANDARD.encode(signed);

        let config = config_with_cert(&cert);
        let identity = service.process_response(&payload, &config).unwrap();
        assert_eq!(identity.email, "jdoe@example.com");
        assert_eq!(identity.first_name.as_deref(), Some("Jane"));
        assert_eq!(identity.last_name.as_deref(), Some("Doe"));
        assert_eq!(identity.external_id.as_deref(), Some("jdoe@example.com"));
        assert_eq!(identity.groups, vec!["Engineering"]);
    }

    #[test]
    fn test_process_response_accepts_legacy_sha1_signature() {
        let service = SamlService::new(sp_settings());
        let (key, cert) = generate_keypair_and_cert();
        let (nb, noa) = valid_window();
        let (prefix, suffix) = unsigned_response(&nb, &noa);
        let signed = sign_response(&prefix, &suffix, &key, MessageDigest::sha1());
        let payload = STANDARD.encode(signed);

        let config = config_with_cert(&cert);
        assert!(service.process_response(&payload, &config).is_ok());
    }

    #[test]
    fn test_process_response_rejects_wrong_key() {
        let service = SamlService::new(sp_settings());
        let (key, _) = generate_keypair_and_cert();
        let (_, other_cert) = generate_keypair_and_cert();
        let (nb, noa) = valid_window();
        let (prefix, suffix) = unsigned_response(&nb, &noa);
        let signed = sign_response(&prefix, &suffix, &key, MessageDigest::sha256());
        let payload = STANDARD.encode(signed);

        let config = config_with_cert(&other_cert);
        assert!(matches!(
            service.process_response(&payload, &config),
            Err(SamlError::SignatureInvalid(_))
        ));
    }

    #[test]
    fn test_process_response_rejects_tampered_content() {
        let service = SamlService::new(sp_settings());
        let (key, cert) = generate_keypair_and_cert();
        let (nb, noa) = valid_window();
        let (prefix, suffix) = unsigned_response(&nb, &noa);
        let signed = sign_response(&prefix, &suffix, &key, MessageDigest::sha256());
        let tampered = signed.replace("jdoe@example.com", "mallory@example.com");
        let payload = STANDARD.encode(tampered);

        let config = config_with_cert(&cert);
        assert!(matches!(
            service.process_response(&payload, &config),
            Err(SamlError::SignatureInvalid(_))
        ));
    }

    #[test]
    fn test_process_response_rejects_unsigned() {
        let service = SamlService::new(sp_settings());
        let (_, cert) = generate_keypair_and_cert();
        let (nb, noa) = valid_window();
        let (prefix, suffix) = unsigned_response(&nb, &noa);
        let payload = STANDARD.encode(format!("{prefix}{suffix}"));

        let config = config_with_cert(&cert);
        assert!(matches!(
            service.process_response(&payload, &config),
            Err(SamlError::MissingSignature)
        ));
    }

    #[test]
    fn test_process_response_rejects_expired_assertion() {
        let service = SamlService::new(sp_settings());
        let (key, cert) = generate_keypair_and_cert();
        let now = Utc::now();
        let nb = (now - chrono::Duration::hours(2))
            .format("%Y-%m-%dT%H:%M:%SZ")
            .to_string();
        let noa = (now - chrono::Duration::hours(1))
            .format("%Y-%m-%dT%H:%M:%SZ")
            .to_string();
        let (prefix, suffix) = unsigned_response(&nb, &noa);
        let signed = sign_response(&prefix, &suffix, &key, MessageDigest::sha256());
        let payload = STANDARD.encode(signed);

        let config = config_with_cert(&cert);
        assert!(matches!(
            service.process_response(&payload, &config),
            Err(SamlError::AssertionExpired { .. })
        ));
    }

    #[test]
    fn test_process_response_requires_certificate() {
        let service = SamlService::new(sp_settings());
        let config = ProviderConfig::default_for_test_saml();

        assert!(matches!(
            service.process_response("aGVsbG8=", &config),
            Err(SamlError::MissingConfig("certificate"))
        ));
    }

    #[test]
    fn test_process_response_rejects_garbage_payload() {
        let service = SamlService::new(sp_settings());
        let (_, cert) = generate_keypair_and_cert();
        let config = config_with_cert(&cert);

        assert!(service.process_response("%%%not-base64%%%", &config).is_err());
    }

    #[test]
    fn test_custom_attribute_mapping_applies() {
        let service = SamlService::new(sp_settings());
        let (key, cert) = generate_keypair_and_cert();
        let (nb, noa) = valid_window();
        let (prefix, suffix) = unsigned_response(&nb, &noa);
        let signed = sign_response(&prefix, &suffix, &key, MessageDigest::sha256());
        let payload = STANDARD.encode(signed);

        let mut config = config_with_cert(&cert);
        // Map first_name to the surname attribute to prove the mapping
        // takes precedence over the fallback table.
        config.attribute_mapping = serde_json::json!({"first_name": "sn"});

        let identity = service.process_response(&payload, &config).unwrap();
        assert_eq!(identity.first_name.as_deref(), Some("Doe"));
    }

    #[test]
    fn test_initiate_logout_requires_slo_url() {
        let service = SamlService::new(sp_settings());
        let mut config = ProviderConfig::default_for_test_saml();
        config.slo_url = None;

        assert!(matches!(
            service.initiate_logout(&config, "jdoe@example.com"),
            Err(SamlError::MissingConfig("slo_url"))
        ));
    }

    #[test]
    fn test_initiate_logout_builds_redirect_url() {
        let service = SamlService::new(sp_settings());
        let config = ProviderConfig::default_for_test_saml();

        let url = service
            .initiate_logout(&config, "jdoe@example.com")
            .unwrap();
        assert!(url.starts_with("https://idp.example.com/slo?SAMLRequest="));
    }

    #[test]
    fn test_metadata_mentions_sp_endpoints() {
        let service = SamlService::new(sp_settings());
        let xml = service.generate_metadata();
        assert!(xml.contains("https://sp.example.com/acs"));
        assert!(xml.contains("https://sp.example.com/sls"));
    }
}
