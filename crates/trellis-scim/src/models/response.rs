//! SCIM protocol envelopes (RFC 7644).

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// List Response envelope (RFC 7644 Section 3.4.2).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScimListResponse<T> {
    pub schemas: Vec<String>,
    pub total_results: i64,
    /// 1-based index of the first result in this page.
    pub start_index: i64,
    pub items_per_page: i64,
    #[serde(rename = "Resources")]
    pub resources: Vec<T>,
}

impl<T> ScimListResponse<T> {
    pub const SCHEMA: &'static str = "urn:ietf:params:scim:api:messages:2.0:ListResponse";

    #[must_use]
    pub fn new(resources: Vec<T>, total_results: i64, start_index: i64) -> Self {
        Self {
            schemas: vec![Self::SCHEMA.to_string()],
            total_results,
            start_index,
            items_per_page: resources.len() as i64,
            resources,
        }
    }
}

/// A single PATCH operation (RFC 7644 Section 3.5.2).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScimPatchOp {
    /// "add", "remove", or "replace" (case-insensitive on the wire).
    pub op: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

/// PATCH request envelope.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScimPatchRequest {
    pub schemas: Vec<String>,
    #[serde(rename = "Operations")]
    pub operations: Vec<ScimPatchOp>,
}

impl ScimPatchRequest {
    pub const SCHEMA: &'static str = "urn:ietf:params:scim:api:messages:2.0:PatchOp";

    /// Structural validation of the envelope.
    ///
    /// Op names are not checked here: unrecognized operations are
    /// logged and ignored at application time, the same way unknown
    /// attribute paths are.
    pub fn validate(&self) -> Result<(), String> {
        if !self.schemas.iter().any(|s| s == Self::SCHEMA) {
            return Err("Missing PatchOp schema".to_string());
        }
        for (i, op) in self.operations.iter().enumerate() {
            let op_lower = op.op.to_lowercase();
            if op_lower == "remove" && op.path.is_none() {
                return Err(format!("Remove operation at index {i} requires a path"));
            }
            if op_lower != "remove" && op.value.is_none() && op.path.is_none() {
                return Err(format!(
                    "Operation '{}' at index {i} requires a value",
                    op.op
                ));
            }
        }
        Ok(())
    }
}

/// Normalized pagination parameters.
#[derive(Debug, Clone, Copy)]
pub struct ScimPagination {
    /// 1-based start index.
    pub start_index: i64,
    pub count: i64,
}

impl ScimPagination {
    pub const DEFAULT_COUNT: i64 = 25;
    pub const MAX_COUNT: i64 = 100;

    #[must_use]
    pub fn from_query(start_index: Option<i64>, count: Option<i64>) -> Self {
        Self {
            start_index: start_index.unwrap_or(1).max(1),
            count: count
                .unwrap_or(Self::DEFAULT_COUNT)
                .clamp(1, Self::MAX_COUNT),
        }
    }

    /// 0-based offset into the result set.
    #[must_use]
    pub fn offset(&self) -> usize {
        (self.start_index - 1).max(0) as usize
    }
}

impl Default for ScimPagination {
    fn default() -> Self {
        Self::from_query(None, None)
    }
}
