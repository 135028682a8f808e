//! Shared handler helpers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::models::ScimPagination;

/// Serialize a body with the SCIM media type.
pub fn scim_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_string(body) {
        Ok(json) => {
            let mut response = (status, json).into_response();
            if let Ok(content_type) = "application/scim+json".parse() {
                response.headers_mut().insert("Content-Type", content_type);
            }
            response
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("serialization failed: {e}"),
        )
            .into_response(),
    }
}

/// Query parameters accepted on list endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub filter: Option<String>,
    pub start_index: Option<i64>,
    pub count: Option<i64>,
}

impl ListQuery {
    #[must_use]
    pub fn pagination(&self) -> ScimPagination {
        ScimPagination::from_query(self.start_index, self.count)
    }
}
