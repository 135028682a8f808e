//! Group resource operations.
//!
//! A SCIM Group is a view over a directory role: `displayName` is the
//! role label and the members are the accounts holding the role.

use std::sync::Arc;
use trellis_core::{RoleId, TenantId, UserId};
use trellis_directory::{Account, Directory, NewRole, Role};
use uuid::Uuid;

use crate::error::{ScimError, ScimResult};
use crate::filter::FilterExpr;
use crate::models::{
    CreateScimGroupRequest, ScimGroup, ScimGroupMember, ScimListResponse, ScimPagination,
    ScimPatchRequest,
};

#[derive(Clone)]
pub struct ScimGroupService {
    directory: Arc<dyn Directory>,
    base_url: String,
}

impl ScimGroupService {
    #[must_use]
    pub fn new(directory: Arc<dyn Directory>, base_url: String) -> Self {
        Self { directory, base_url }
    }

    pub async fn list(
        &self,
        tenant_id: TenantId,
        filter: Option<&str>,
        pagination: ScimPagination,
    ) -> ScimResult<ScimListResponse<ScimGroup>> {
        let roles = self.directory.list_roles(tenant_id).await?;
        let accounts = self.directory.list_accounts(tenant_id).await?;

        let matched: Vec<&Role> = match filter {
            Some(raw) => {
                let expr = FilterExpr::parse(raw)?;
                roles
                    .iter()
                    .filter(|r| expr.matches(&role_lookup(r)))
                    .collect()
            }
            None => roles.iter().collect(),
        };

        let total = matched.len() as i64;
        let page: Vec<ScimGroup> = matched
            .into_iter()
            .skip(pagination.offset())
            .take(pagination.count as usize)
            .map(|role| self.render(role, &accounts))
            .collect();

        Ok(ScimListResponse::new(page, total, pagination.start_index))
    }

    pub async fn get(&self, tenant_id: TenantId, id: Uuid) -> ScimResult<ScimGroup> {
        let role = self.require_role(tenant_id, id).await?;
        let accounts = self.directory.list_accounts(tenant_id).await?;
        Ok(self.render(&role, &accounts))
    }

    /// Create a role for the group. The role key is derived from the
    /// display name; duplicate keys conflict.
    pub async fn create(
        &self,
        tenant_id: TenantId,
        request: &CreateScimGroupRequest,
    ) -> ScimResult<ScimGroup> {
        if request.display_name.trim().is_empty() {
            return Err(ScimError::Validation("displayName must not be empty".to_string()));
        }

        let role = self
            .directory
            .create_role(NewRole {
                tenant_id,
                key: role_key(&request.display_name),
                label: request.display_name.clone(),
            })
            .await
            .map_err(|err| match err {
                trellis_core::CoreError::Conflict(_) => ScimError::Conflict {
                    resource_type: "Group".to_string(),
                    field: "displayName".to_string(),
                    value: request.display_name.clone(),
                },
                other => other.into(),
            })?;

        for member in &request.members {
            self.add_member(tenant_id, role.id, member.value).await?;
        }

        tracing::info!(
            tenant_id = %tenant_id,
            role_id = %role.id,
            "SCIM group created"
        );
        let accounts = self.directory.list_accounts(tenant_id).await?;
        Ok(self.render(&role, &accounts))
    }

    /// Replace the group: rename and reconcile the full member list.
    pub async fn replace(
        &self,
        tenant_id: TenantId,
        id: Uuid,
        request: &CreateScimGroupRequest,
    ) -> ScimResult<ScimGroup> {
        let role = self.require_role(tenant_id, id).await?;

        let role = if role.label != request.display_name {
            self.directory
                .update_role_label(tenant_id, role.id, &request.display_name)
                .await?
        } else {
            role
        };

        let accounts = self.directory.list_accounts(tenant_id).await?;
        let desired: Vec<Uuid> = request.members.iter().map(|m| m.value).collect();

        for account in accounts.iter().filter(|a| a.has_role(role.id)) {
            let account_uuid: Uuid = account.id.into();
            if !desired.contains(&account_uuid) {
                self.directory
                    .remove_role(tenant_id, account.id, role.id)
                    .await?;
            }
        }
        for member in &desired {
            self.add_member(tenant_id, role.id, *member).await?;
        }

        let accounts = self.directory.list_accounts(tenant_id).await?;
        Ok(self.render(&role, &accounts))
    }

    /// Apply a PATCH: rename via `displayName`, membership via
    /// add/remove on `members`. Other paths are logged and ignored.
    pub async fn patch(
        &self,
        tenant_id: TenantId,
        id: Uuid,
        request: &ScimPatchRequest,
    ) -> ScimResult<ScimGroup> {
        request.validate().map_err(ScimError::BadRequest)?;
        let mut role = self.require_role(tenant_id, id).await?;

        for op in &request.operations {
            let op_kind = op.op.to_lowercase();
            let path = op.path.as_deref().map(str::to_lowercase);
            match (op_kind.as_str(), path.as_deref()) {
                ("replace", Some("displayname")) | ("add", Some("displayname")) => {
                    if let Some(label) = op.value.as_ref().and_then(|v| v.as_str()) {
                        role = self
                            .directory
                            .update_role_label(tenant_id, role.id, label)
                            .await?;
                    }
                }
                ("add", Some("members")) | ("replace", Some("members")) => {
                    for member in member_values(op.value.as_ref()) {
                        self.add_member(tenant_id, role.id, member).await?;
                    }
                }
                ("remove", Some("members")) => {
                    for member in member_values(op.value.as_ref()) {
                        self.directory
                            .remove_role(tenant_id, UserId::from_uuid(member), role.id)
                            .await?;
                    }
                }
                ("remove", Some(path)) if path.starts_with("members[") => {
                    if let Some(member) = member_from_value_filter(path) {
                        self.directory
                            .remove_role(tenant_id, UserId::from_uuid(member), role.id)
                            .await?;
                    }
                }
                (_, path) => {
                    tracing::warn!(
                        op = %op.op,
                        path = path.unwrap_or("<none>"),
                        "ignoring unsupported group PATCH operation"
                    );
                }
            }
        }

        let accounts = self.directory.list_accounts(tenant_id).await?;
        Ok(self.render(&role, &accounts))
    }

    pub async fn delete(&self, tenant_id: TenantId, id: Uuid) -> ScimResult<()> {
        let role = self.require_role(tenant_id, id).await?;
        self.directory.delete_role(tenant_id, role.id).await?;
        tracing::info!(tenant_id = %tenant_id, role_id = %role.id, "SCIM group deleted");
        Ok(())
    }

    async fn add_member(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
        member: Uuid,
    ) -> ScimResult<()> {
        self.directory
            .assign_role(tenant_id, UserId::from_uuid(member), role_id)
            .await
            .map_err(|err| match err {
                trellis_core::CoreError::NotFound { .. } => {
                    ScimError::BadRequest(format!("member {member} does not exist"))
                }
                other => other.into(),
            })
    }

    async fn require_role(&self, tenant_id: TenantId, id: Uuid) -> ScimResult<Role> {
        self.directory
            .get_role(tenant_id, RoleId::from_uuid(id))
            .await?
            .ok_or_else(|| ScimError::NotFound(format!("Group {id}")))
    }

    fn render(&self, role: &Role, accounts: &[Account]) -> ScimGroup {
        let members = accounts
            .iter()
            .filter(|a| a.has_role(role.id))
            .map(|a| ScimGroupMember {
                value: a.id.into(),
                display: Some(a.username.clone()),
            })
            .collect();
        ScimGroup::from_role(role, members, &self.base_url)
    }
}

fn role_lookup(role: &Role) -> impl Fn(&str) -> Option<String> + '_ {
    move |attribute: &str| match attribute.to_lowercase().as_str() {
        "displayname" => Some(role.label.clone()),
        _ => None,
    }
}

/// Derive a stable role key from a display name.
fn role_key(display_name: &str) -> String {
    display_name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

/// Pull member IDs from an operation value: either a list of
/// `{"value": "<uuid>"}` objects or a single such object.
fn member_values(value: Option<&serde_json::Value>) -> Vec<Uuid> {
    let mut members = Vec::new();
    match value {
        Some(serde_json::Value::Array(items)) => {
            for item in items {
                if let Some(id) = member_uuid(item) {
                    members.push(id);
                }
            }
        }
        Some(single) => {
            if let Some(id) = member_uuid(single) {
                members.push(id);
            }
        }
        None => {}
    }
    members
}

fn member_uuid(value: &serde_json::Value) -> Option<Uuid> {
    value
        .get("value")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
}

/// Extract the UUID from a `members[value eq "<uuid>"]` path.
fn member_from_value_filter(path: &str) -> Option<Uuid> {
    let start = path.find('"')? + 1;
    let end = path[start..].find('"')? + start;
    Uuid::parse_str(&path[start..end]).ok()
}
