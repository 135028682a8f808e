//! XML signature verification for IdP responses.
//!
//! Verifies the enveloped signature of a SAML Response: the reference
//! digest over the document with the `Signature` element removed, then
//! the RSA signature over the canonicalized `SignedInfo`. SHA-256 is
//! tried first with a SHA-1 fallback for legacy IdPs.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Public};
use openssl::sign::Verifier;
use openssl::x509::X509;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::canonical::canonicalize;
use crate::error::{SamlError, SamlResult};

/// Components of an embedded XML signature.
pub(crate) struct SignatureInfo {
    pub signed_info: String,
    pub signature_value: String,
    pub digest_value: String,
}

/// Parse an X.509 certificate, accepting PEM with or without headers.
pub fn parse_certificate(pem: &str) -> SamlResult<X509> {
    let pem_data = if pem.contains("-----BEGIN CERTIFICATE-----") {
        pem.to_string()
    } else {
        format!(
            "-----BEGIN CERTIFICATE-----\n{}\n-----END CERTIFICATE-----",
            pem.trim()
        )
    };

    X509::from_pem(pem_data.as_bytes())
        .map_err(|e| SamlError::InvalidCertificate(e.to_string()))
}

/// Verify the embedded signature of a response document against the
/// IdP certificate.
pub fn verify_response_signature(xml: &str, certificate_pem: &str) -> SamlResult<()> {
    let cert = parse_certificate(certificate_pem)?;
    let public_key = cert
        .public_key()
        .map_err(|e| SamlError::InvalidCertificate(e.to_string()))?;

    let sig_info = extract_signature_info(xml)?;

    verify_reference_digest(xml, &sig_info)?;

    let canonical_signed_info = canonicalize(&sig_info.signed_info)?;
    let signature_bytes = STANDARD
        .decode(sig_info.signature_value.replace(['\n', '\r', ' '], ""))
        .map_err(|e| SamlError::SignatureInvalid(format!("Invalid signature encoding: {e}")))?;

    if verify_rsa(
        &public_key,
        MessageDigest::sha256(),
        canonical_signed_info.as_bytes(),
        &signature_bytes,
    )? {
        return Ok(());
    }

    // Legacy IdPs still sign with SHA-1.
    if verify_rsa(
        &public_key,
        MessageDigest::sha1(),
        canonical_signed_info.as_bytes(),
        &signature_bytes,
    )? {
        tracing::warn!("SAML response verified with legacy SHA-1 signature");
        return Ok(());
    }

    Err(SamlError::SignatureInvalid(
        "signature does not match certificate".to_string(),
    ))
}

fn verify_rsa(
    public_key: &PKey<Public>,
    digest: MessageDigest,
    data: &[u8],
    signature: &[u8],
) -> SamlResult<bool> {
    let mut verifier = Verifier::new(digest, public_key)
        .map_err(|e| SamlError::SignatureInvalid(format!("Verifier creation failed: {e}")))?;
    verifier
        .update(data)
        .map_err(|e| SamlError::SignatureInvalid(format!("Signature update failed: {e}")))?;
    verifier
        .verify(signature)
        .map_err(|e| SamlError::SignatureInvalid(format!("Verification failed: {e}")))
}

/// Extract `SignedInfo` (as raw text, whitespace preserved), the
/// signature value, and the reference digest from the document.
pub(crate) fn extract_signature_info(xml: &str) -> SamlResult<SignatureInfo> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut in_signed_info = false;
    let mut in_signature_value = false;
    let mut in_digest_value = false;
    let mut signed_info = String::new();
    let mut signature_value = String::new();
    let mut digest_value = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let local = e.local_name();
                let name = std::str::from_utf8(local.as_ref()).unwrap_or("");

                if name == "SignedInfo" || in_signed_info {
                    if name == "SignedInfo" {
                        in_signed_info = true;
                    }
                    let raw = std::str::from_utf8(&e).unwrap_or("");
                    signed_info.push('<');
                    signed_info.push_str(raw);
                    signed_info.push('>');
                } else if name == "SignatureValue" {
                    in_signature_value = true;
                } else if name == "DigestValue" {
                    in_digest_value = true;
                }
            }
            Ok(Event::Empty(e)) => {
                if in_signed_info {
                    let raw = std::str::from_utf8(&e).unwrap_or("");
                    signed_info.push('<');
                    signed_info.push_str(raw);
                    signed_info.push_str("/>");
                }
            }
            Ok(Event::End(e)) => {
                let name_bytes = e.name();
                let full_name = std::str::from_utf8(name_bytes.as_ref()).unwrap_or("");
                let local = e.local_name();
                let name = std::str::from_utf8(local.as_ref()).unwrap_or("");

                if in_signed_info {
                    signed_info.push_str("</");
                    signed_info.push_str(full_name);
                    signed_info.push('>');
                    if name == "SignedInfo" {
                        in_signed_info = false;
                    }
                } else if name == "SignatureValue" {
                    in_signature_value = false;
                } else if name == "DigestValue" {
                    in_digest_value = false;
                }
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().unwrap_or_default();
                if in_signed_info {
                    signed_info.push_str(&text);
                } else if in_signature_value {
                    signature_value.push_str(&text);
                } else if in_digest_value {
                    digest_value.push_str(&text);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(SamlError::InvalidResponse(format!("XML parse error: {e}")));
            }
            _ => {}
        }
    }

    if signed_info.is_empty() || signature_value.is_empty() {
        return Err(SamlError::MissingSignature);
    }

    Ok(SignatureInfo {
        signed_info,
        signature_value,
        digest_value,
    })
}

/// Verify the reference digest: SHA-256 over the canonicalized document
/// with the enveloped `Signature` element removed.
fn verify_reference_digest(xml: &str, sig_info: &SignatureInfo) -> SamlResult<()> {
    let without_signature = remove_signature_element(xml);
    let canonical = canonicalize(&without_signature)?;

    let digest = openssl::hash::hash(MessageDigest::sha256(), canonical.as_bytes())
        .map_err(|e| SamlError::SignatureInvalid(format!("Hash failed: {e}")))?;
    let computed = STANDARD.encode(digest);

    let expected = sig_info.digest_value.replace(['\n', '\r', ' '], "");
    if computed != expected {
        return Err(SamlError::SignatureInvalid("reference digest mismatch".to_string()));
    }
    Ok(())
}

/// Remove the enveloped `Signature` element (with or without the `ds`
/// prefix).
pub(crate) fn remove_signature_element(xml: &str) -> String {
    for (open, close) in [
        ("<ds:Signature", "</ds:Signature>"),
        ("<Signature", "</Signature>"),
    ] {
        if let (Some(start), Some(end)) = (xml.find(open), xml.find(close)) {
            if start < end {
                let mut result = String::with_capacity(xml.len());
                result.push_str(&xml[..start]);
                result.push_str(&xml[end + close.len()..]);
                return result;
            }
        }
    }
    xml.to_string()
}
