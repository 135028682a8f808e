//! SCIM Group resource schema (RFC 7643 Section 4.2).
//!
//! Groups map onto directory roles: `displayName` is the role label and
//! members are the accounts holding the role.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use trellis_directory::Role;

use super::user::ScimMeta;

/// Group member reference.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScimGroupMember {
    /// Member user ID.
    pub value: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

/// SCIM Group resource.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScimGroup {
    pub schemas: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,

    pub display_name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<ScimGroupMember>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ScimMeta>,
}

impl ScimGroup {
    /// SCIM Core Group schema URI.
    pub const SCHEMA: &'static str = "urn:ietf:params:scim:schemas:core:2.0:Group";

    /// Render a role as a SCIM Group.
    #[must_use]
    pub fn from_role(role: &Role, members: Vec<ScimGroupMember>, base_url: &str) -> Self {
        let id: Uuid = role.id.into();
        let now = chrono::Utc::now();
        Self {
            schemas: vec![Self::SCHEMA.to_string()],
            id: Some(id),
            external_id: None,
            display_name: role.label.clone(),
            members,
            meta: Some(ScimMeta {
                resource_type: "Group".to_string(),
                created: now,
                last_modified: now,
                location: Some(format!("{base_url}/scim/v2/Groups/{id}")),
            }),
        }
    }
}

/// Request body for POST /Groups and PUT /Groups/{id}.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateScimGroupRequest {
    pub schemas: Vec<String>,
    pub display_name: String,
    #[serde(default)]
    pub members: Vec<ScimGroupMember>,
}
