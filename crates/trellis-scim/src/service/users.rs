//! User resource operations.

use std::sync::Arc;
use trellis_core::{TenantId, UserId};
use trellis_directory::{Account, AccountUpdate, Directory, NewAccount, Role};
use uuid::Uuid;

use crate::error::{ScimError, ScimResult};
use crate::filter::FilterExpr;
use crate::models::{
    CreateScimUserRequest, ScimListResponse, ScimPagination, ScimPatchRequest, ScimUser,
    ScimUserGroup,
};
use crate::patch::apply_user_patch;

/// SCIM User operations over the directory.
///
/// DELETE deactivates rather than destroys: IdPs re-provision users
/// routinely, and a destroyed account would sever role history.
#[derive(Clone)]
pub struct ScimUserService {
    directory: Arc<dyn Directory>,
    base_url: String,
}

impl ScimUserService {
    #[must_use]
    pub fn new(directory: Arc<dyn Directory>, base_url: String) -> Self {
        Self { directory, base_url }
    }

    /// List users, optionally filtered, always paginated.
    pub async fn list(
        &self,
        tenant_id: TenantId,
        filter: Option<&str>,
        pagination: ScimPagination,
    ) -> ScimResult<ScimListResponse<ScimUser>> {
        let accounts = self.directory.list_accounts(tenant_id).await?;
        let roles = self.directory.list_roles(tenant_id).await?;

        let matched: Vec<&Account> = match filter {
            Some(raw) => {
                let expr = FilterExpr::parse(raw)?;
                accounts
                    .iter()
                    .filter(|a| expr.matches(&account_lookup(a)))
                    .collect()
            }
            None => accounts.iter().collect(),
        };

        let total = matched.len() as i64;
        let page: Vec<ScimUser> = matched
            .into_iter()
            .skip(pagination.offset())
            .take(pagination.count as usize)
            .map(|a| self.render(a, &roles))
            .collect();

        Ok(ScimListResponse::new(page, total, pagination.start_index))
    }

    /// Fetch one user by resource ID.
    pub async fn get(&self, tenant_id: TenantId, id: Uuid) -> ScimResult<ScimUser> {
        let account = self.require_account(tenant_id, id).await?;
        let roles = self.directory.list_roles(tenant_id).await?;
        Ok(self.render(&account, &roles))
    }

    /// Create a user from a provisioning request.
    pub async fn create(
        &self,
        tenant_id: TenantId,
        request: &CreateScimUserRequest,
    ) -> ScimResult<ScimUser> {
        let email = request.effective_email().ok_or_else(|| {
            ScimError::Validation("no email value and userName is not an address".to_string())
        })?;

        let (first_name, last_name) = match &request.name {
            Some(name) => (name.given_name.clone(), name.family_name.clone()),
            None => (None, None),
        };

        let account = self
            .directory
            .create_account(NewAccount {
                tenant_id,
                username: request.user_name.clone(),
                email,
                active: request.active,
                first_name,
                last_name,
                external_id: request.external_id.clone(),
            })
            .await
            .map_err(|err| match err {
                trellis_core::CoreError::Conflict(_) => ScimError::Conflict {
                    resource_type: "User".to_string(),
                    field: "userName".to_string(),
                    value: request.user_name.clone(),
                },
                other => other.into(),
            })?;

        tracing::info!(
            tenant_id = %tenant_id,
            user_id = %account.id,
            "SCIM user created"
        );
        Ok(self.render(&account, &[]))
    }

    /// Replace a user (PUT semantics over the attributes we store).
    pub async fn replace(
        &self,
        tenant_id: TenantId,
        id: Uuid,
        request: &CreateScimUserRequest,
    ) -> ScimResult<ScimUser> {
        let account = self.require_account(tenant_id, id).await?;

        let (first_name, last_name) = match &request.name {
            Some(name) => (name.given_name.clone(), name.family_name.clone()),
            None => (None, None),
        };

        let update = AccountUpdate {
            username: Some(request.user_name.clone()),
            email: request.effective_email(),
            first_name,
            last_name,
            external_id: request.external_id.clone(),
        };
        let mut updated = self
            .directory
            .update_account(tenant_id, account.id, update)
            .await?;

        if updated.active != request.active {
            updated = self
                .directory
                .set_account_active(tenant_id, account.id, request.active)
                .await?;
        }

        let roles = self.directory.list_roles(tenant_id).await?;
        Ok(self.render(&updated, &roles))
    }

    /// Apply a PATCH request.
    pub async fn patch(
        &self,
        tenant_id: TenantId,
        id: Uuid,
        request: &ScimPatchRequest,
    ) -> ScimResult<ScimUser> {
        request.validate().map_err(ScimError::BadRequest)?;
        let account = self.require_account(tenant_id, id).await?;

        let changes = apply_user_patch(request);

        let update = AccountUpdate {
            username: changes.username,
            email: changes.email,
            first_name: changes.given_name,
            last_name: changes.family_name,
            external_id: None,
        };
        let has_field_changes = update.username.is_some()
            || update.email.is_some()
            || update.first_name.is_some()
            || update.last_name.is_some();

        let mut updated = if has_field_changes {
            self.directory
                .update_account(tenant_id, account.id, update)
                .await?
        } else {
            account
        };

        if let Some(active) = changes.active {
            if updated.active != active {
                updated = self
                    .directory
                    .set_account_active(tenant_id, updated.id, active)
                    .await?;
            }
        }

        let roles = self.directory.list_roles(tenant_id).await?;
        Ok(self.render(&updated, &roles))
    }

    /// Soft-delete: deactivate the account.
    pub async fn delete(&self, tenant_id: TenantId, id: Uuid) -> ScimResult<()> {
        let account = self.require_account(tenant_id, id).await?;
        self.directory
            .set_account_active(tenant_id, account.id, false)
            .await?;
        tracing::info!(
            tenant_id = %tenant_id,
            user_id = %account.id,
            "SCIM user deactivated"
        );
        Ok(())
    }

    async fn require_account(&self, tenant_id: TenantId, id: Uuid) -> ScimResult<Account> {
        self.directory
            .get_account(tenant_id, UserId::from_uuid(id))
            .await?
            .ok_or_else(|| ScimError::NotFound(format!("User {id}")))
    }

    fn render(&self, account: &Account, roles: &[Role]) -> ScimUser {
        let mut user = ScimUser::from_account(account, &self.base_url);
        user.groups = account
            .roles
            .iter()
            .filter_map(|role_id| roles.iter().find(|r| r.id == *role_id))
            .map(|role| ScimUserGroup {
                value: role.id.into(),
                display: Some(role.label.clone()),
            })
            .collect();
        user
    }
}

/// Attribute lookup for filter evaluation against an account.
fn account_lookup(account: &Account) -> impl Fn(&str) -> Option<String> + '_ {
    move |attribute: &str| match attribute.to_lowercase().as_str() {
        "username" => Some(account.username.clone()),
        "externalid" => account.external_id.clone(),
        "emails" | "emails.value" => Some(account.email.clone()),
        "active" => Some(account.active.to_string()),
        "name.givenname" => account.first_name.clone(),
        "name.familyname" => account.last_name.clone(),
        "displayname" => match (&account.first_name, &account.last_name) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            _ => None,
        },
        _ => None,
    }
}
