//! SAML handler errors.

use thiserror::Error;

/// Errors from SAML request building and response validation.
///
/// Validation failures are security signals; callers log them at warn
/// level and must never provision an account or establish a session
/// from a failed response.
#[derive(Debug, Error)]
pub enum SamlError {
    /// The provider configuration is for a different protocol.
    #[error("Provider configuration is not SAML (protocol: {0})")]
    WrongProtocol(String),

    /// The configuration lacks a required endpoint or field.
    #[error("Provider configuration is missing {0}")]
    MissingConfig(&'static str),

    /// The response payload could not be decoded or parsed.
    #[error("Invalid SAML response: {0}")]
    InvalidResponse(String),

    /// The response carries no XML signature.
    #[error("SAML response is not signed")]
    MissingSignature,

    /// Signature or reference digest verification failed.
    #[error("Signature validation failed: {0}")]
    SignatureInvalid(String),

    /// The IdP certificate could not be used.
    #[error("Invalid IdP certificate: {0}")]
    InvalidCertificate(String),

    /// The assertion's validity window has passed (beyond clock skew).
    #[error("Assertion expired at {not_on_or_after}")]
    AssertionExpired { not_on_or_after: String },

    /// The assertion is not yet valid (beyond clock skew).
    #[error("Assertion not valid before {not_before}")]
    AssertionNotYetValid { not_before: String },

    /// No NameID and no email attribute in the assertion.
    #[error("Assertion carries no subject identifier")]
    MissingSubject,

    /// Deflate/base64 encoding of an outgoing request failed.
    #[error("Request encoding failed: {0}")]
    Encoding(String),
}

pub type SamlResult<T> = Result<T, SamlError>;
