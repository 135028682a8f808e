//! SAML HTTP-Redirect binding encoding.
//!
//! Outgoing AuthnRequest/LogoutRequest documents are raw-deflated,
//! base64-encoded, and percent-encoded into a query parameter on the
//! IdP endpoint URL.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use std::io::{Read, Write};

use crate::error::{SamlError, SamlResult};

/// Deflate + base64 + percent-encode an XML document for the redirect
/// binding.
pub fn encode_redirect_payload(xml: &str) -> SamlResult<String> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(xml.as_bytes())
        .map_err(|e| SamlError::Encoding(e.to_string()))?;
    let deflated = encoder
        .finish()
        .map_err(|e| SamlError::Encoding(e.to_string()))?;

    let encoded = STANDARD.encode(deflated);
    Ok(utf8_percent_encode(&encoded, NON_ALPHANUMERIC).to_string())
}

/// Reverse of [`encode_redirect_payload`], for the percent-decoded
/// parameter value.
pub fn decode_redirect_payload(value: &str) -> SamlResult<String> {
    let deflated = STANDARD
        .decode(value)
        .map_err(|e| SamlError::InvalidResponse(format!("Invalid base64: {e}")))?;

    let mut decoder = DeflateDecoder::new(deflated.as_slice());
    let mut xml = String::new();
    decoder
        .read_to_string(&mut xml)
        .map_err(|e| SamlError::InvalidResponse(format!("Invalid deflate stream: {e}")))?;
    Ok(xml)
}

/// Append a query parameter to a URL, using `?` or `&` depending on
/// whether the URL already carries a query string.
#[must_use]
pub fn append_query_param(url: &str, name: &str, encoded_value: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{name}={encoded_value}")
}
