//! SCIM User resource schema (RFC 7643 Section 4.1).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use trellis_directory::Account;

/// SCIM User name component.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScimName {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted: Option<String>,

    /// Family name (last name).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,

    /// Given name (first name).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
}

/// SCIM Email value.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScimEmail {
    pub value: String,

    /// Email type, e.g. "work" or "home".
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub email_type: Option<String>,

    #[serde(default)]
    pub primary: bool,
}

/// Group reference on a user (read-only).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScimUserGroup {
    pub value: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

/// Resource metadata.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScimMeta {
    /// "User" or "Group".
    pub resource_type: String,
    pub created: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// SCIM User resource.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScimUser {
    pub schemas: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,

    /// Identifier assigned by the provisioning IdP.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,

    pub user_name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<ScimName>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(default = "default_active")]
    pub active: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub emails: Vec<ScimEmail>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<ScimUserGroup>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ScimMeta>,
}

fn default_active() -> bool {
    true
}

impl ScimUser {
    /// SCIM Core User schema URI.
    pub const SCHEMA: &'static str = "urn:ietf:params:scim:schemas:core:2.0:User";

    /// Render a directory account as a SCIM User.
    ///
    /// Empty-string name parts count as absent; a PATCH remove clears
    /// them to the empty string.
    #[must_use]
    pub fn from_account(account: &Account, base_url: &str) -> Self {
        let id: Uuid = account.id.into();
        let first_name = account.first_name.as_deref().filter(|s| !s.is_empty());
        let last_name = account.last_name.as_deref().filter(|s| !s.is_empty());
        let name = if first_name.is_some() || last_name.is_some() {
            Some(ScimName {
                formatted: match (first_name, last_name) {
                    (Some(first), Some(last)) => Some(format!("{first} {last}")),
                    _ => None,
                },
                family_name: last_name.map(str::to_string),
                given_name: first_name.map(str::to_string),
            })
        } else {
            None
        };

        Self {
            schemas: vec![Self::SCHEMA.to_string()],
            id: Some(id),
            external_id: account.external_id.clone(),
            user_name: account.username.clone(),
            display_name: name.as_ref().and_then(|n| n.formatted.clone()),
            name,
            active: account.active,
            emails: vec![ScimEmail {
                value: account.email.clone(),
                email_type: Some("work".to_string()),
                primary: true,
            }],
            groups: Vec::new(),
            meta: Some(ScimMeta {
                resource_type: "User".to_string(),
                created: account.created_at,
                last_modified: account.updated_at,
                location: Some(format!("{base_url}/scim/v2/Users/{id}")),
            }),
        }
    }
}

/// Request body for POST /Users and PUT /Users/{id}.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateScimUserRequest {
    pub schemas: Vec<String>,
    pub user_name: String,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub name: Option<ScimName>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub emails: Vec<ScimEmail>,
}

impl CreateScimUserRequest {
    /// The email to record: the primary (or first) email value, falling
    /// back to the userName when it looks like an address.
    #[must_use]
    pub fn effective_email(&self) -> Option<String> {
        self.emails
            .iter()
            .find(|e| e.primary)
            .or_else(|| self.emails.first())
            .map(|e| e.value.clone())
            .or_else(|| self.user_name.contains('@').then(|| self.user_name.clone()))
    }
}
