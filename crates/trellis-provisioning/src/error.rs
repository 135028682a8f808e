use thiserror::Error;
use trellis_core::CoreError;

/// Errors from just-in-time provisioning.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Federated identity carries no email address")]
    MissingEmail,

    #[error("Could not find a free username derived from '{base}'")]
    UsernameExhausted { base: String },

    #[error(transparent)]
    Store(#[from] CoreError),
}

pub type ProvisionResult<T> = Result<T, ProvisionError>;
