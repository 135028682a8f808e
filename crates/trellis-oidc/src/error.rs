//! OIDC handler errors.

use thiserror::Error;

/// Errors from the OIDC authorization-code flow.
#[derive(Debug, Error)]
pub enum OidcError {
    #[error("Provider is configured for protocol '{0}', not oidc")]
    WrongProtocol(String),

    #[error("Provider configuration is missing required field: {0}")]
    MissingConfig(&'static str),

    #[error("No pending login session for this request")]
    SessionNotFound,

    #[error("State parameter does not match the pending session")]
    StateMismatch,

    #[error("ID token nonce does not match the pending session")]
    NonceMismatch,

    #[error("ID token audience does not include client '{client_id}'")]
    AudienceMismatch { client_id: String },

    #[error("Invalid ID token: {0}")]
    InvalidToken(String),

    #[error("Token response did not include an access token")]
    MissingAccessToken,

    #[error("Upstream provider '{provider}' request failed: {detail}")]
    Upstream { provider: String, detail: String },
}

pub type OidcResult<T> = Result<T, OidcError>;
