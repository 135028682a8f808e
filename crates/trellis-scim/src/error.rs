//! SCIM error responses (RFC 7644 Section 3.12).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use trellis_core::CoreError;

/// SCIM `scimType` values used by this server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScimErrorType {
    InvalidFilter,
    Uniqueness,
    InvalidSyntax,
    InvalidPath,
    InvalidValue,
}

impl std::fmt::Display for ScimErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScimErrorType::InvalidFilter => "invalidFilter",
            ScimErrorType::Uniqueness => "uniqueness",
            ScimErrorType::InvalidSyntax => "invalidSyntax",
            ScimErrorType::InvalidPath => "invalidPath",
            ScimErrorType::InvalidValue => "invalidValue",
        };
        write!(f, "{s}")
    }
}

/// Wire shape of a SCIM error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScimErrorResponse {
    pub schemas: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scim_type: Option<String>,
    pub detail: String,
    pub status: String,
}

impl ScimErrorResponse {
    pub const SCHEMA: &'static str = "urn:ietf:params:scim:api:messages:2.0:Error";

    pub fn new(
        status: StatusCode,
        detail: impl Into<String>,
        scim_type: Option<ScimErrorType>,
    ) -> Self {
        Self {
            schemas: vec![Self::SCHEMA.to_string()],
            scim_type: scim_type.map(|t| t.to_string()),
            detail: detail.into(),
            status: status.as_u16().to_string(),
        }
    }
}

/// SCIM API errors.
#[derive(Debug, Error)]
pub enum ScimError {
    #[error("Invalid or expired bearer token")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("A {resource_type} with {field} '{value}' already exists")]
    Conflict {
        resource_type: String,
        field: String,
        value: String,
    },

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ScimError {
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            ScimError::Unauthorized => StatusCode::UNAUTHORIZED,
            ScimError::NotFound(_) => StatusCode::NOT_FOUND,
            ScimError::Conflict { .. } => StatusCode::CONFLICT,
            ScimError::InvalidFilter(_) | ScimError::BadRequest(_) | ScimError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            ScimError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[must_use]
    pub fn scim_type(&self) -> Option<ScimErrorType> {
        match self {
            ScimError::Conflict { .. } => Some(ScimErrorType::Uniqueness),
            ScimError::InvalidFilter(_) => Some(ScimErrorType::InvalidFilter),
            ScimError::BadRequest(_) => Some(ScimErrorType::InvalidSyntax),
            ScimError::Validation(_) => Some(ScimErrorType::InvalidValue),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_response(&self) -> ScimErrorResponse {
        ScimErrorResponse::new(self.status_code(), self.to_string(), self.scim_type())
    }
}

impl From<CoreError> for ScimError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound { resource, id } => {
                ScimError::NotFound(format!("{resource} {}", id.unwrap_or_default()))
            }
            CoreError::Conflict(detail) => ScimError::Conflict {
                resource_type: "resource".to_string(),
                field: "value".to_string(),
                value: detail,
            },
            CoreError::Validation { field, message } => {
                ScimError::Validation(format!("{field}: {message}"))
            }
            other => ScimError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ScimError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut response = (status, Json(self.to_response())).into_response();
        if let Ok(content_type) = "application/scim+json".parse() {
            response.headers_mut().insert("Content-Type", content_type);
        }
        response
    }
}

pub type ScimResult<T> = Result<T, ScimError>;
