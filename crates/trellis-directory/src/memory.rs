//! In-memory [`Directory`] implementation.
//!
//! Backs tests and embedded deployments; the Postgres implementation
//! lives in the database crate.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use trellis_core::{CoreError, RoleId, TenantId, UserId};

use crate::types::{Account, AccountUpdate, NewAccount, NewRole, Role};
use crate::Directory;

/// Concurrent in-memory account/role store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDirectory {
    accounts: Arc<DashMap<UserId, Account>>,
    roles: Arc<DashMap<RoleId, Role>>,
    memberships: Arc<DashMap<(TenantId, UserId), ()>>,
}

impl InMemoryDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a tenant membership was recorded for the account.
    #[must_use]
    pub fn has_membership(&self, tenant_id: TenantId, user_id: UserId) -> bool {
        self.memberships.contains_key(&(tenant_id, user_id))
    }

    fn email_taken(&self, tenant_id: TenantId, email: &str, exclude: Option<UserId>) -> bool {
        self.accounts.iter().any(|entry| {
            let a = entry.value();
            a.tenant_id == tenant_id
                && a.active
                && a.email.eq_ignore_ascii_case(email)
                && Some(a.id) != exclude
        })
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn find_account_by_email(
        &self,
        tenant_id: TenantId,
        email: &str,
    ) -> Result<Option<Account>, CoreError> {
        Ok(self
            .accounts
            .iter()
            .find(|entry| {
                let a = entry.value();
                a.tenant_id == tenant_id && a.active && a.email.eq_ignore_ascii_case(email)
            })
            .map(|entry| entry.value().clone()))
    }

    async fn find_account_by_external_id(
        &self,
        tenant_id: TenantId,
        external_id: &str,
    ) -> Result<Option<Account>, CoreError> {
        Ok(self
            .accounts
            .iter()
            .find(|entry| {
                let a = entry.value();
                a.tenant_id == tenant_id && a.external_id.as_deref() == Some(external_id)
            })
            .map(|entry| entry.value().clone()))
    }

    async fn get_account(
        &self,
        tenant_id: TenantId,
        id: UserId,
    ) -> Result<Option<Account>, CoreError> {
        Ok(self
            .accounts
            .get(&id)
            .filter(|a| a.tenant_id == tenant_id)
            .map(|a| a.clone()))
    }

    async fn list_accounts(&self, tenant_id: TenantId) -> Result<Vec<Account>, CoreError> {
        let mut accounts: Vec<Account> = self
            .accounts
            .iter()
            .filter(|entry| entry.value().tenant_id == tenant_id)
            .map(|entry| entry.value().clone())
            .collect();
        accounts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.to_string().cmp(&b.id.to_string())));
        Ok(accounts)
    }

    async fn create_account(&self, input: NewAccount) -> Result<Account, CoreError> {
        if self.email_taken(input.tenant_id, &input.email, None) {
            return Err(CoreError::Conflict(format!(
                "email already registered: {}",
                input.email
            )));
        }
        if self.username_exists(input.tenant_id, &input.username).await? {
            return Err(CoreError::Conflict(format!(
                "username already taken: {}",
                input.username
            )));
        }

        let now = Utc::now();
        let account = Account {
            id: UserId::new(),
            tenant_id: input.tenant_id,
            username: input.username,
            email: input.email,
            active: input.active,
            first_name: input.first_name,
            last_name: input.last_name,
            external_id: input.external_id,
            roles: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn update_account(
        &self,
        tenant_id: TenantId,
        id: UserId,
        update: AccountUpdate,
    ) -> Result<Account, CoreError> {
        if let Some(new_email) = &update.email {
            if self.email_taken(tenant_id, new_email, Some(id)) {
                return Err(CoreError::Conflict(format!(
                    "email already registered: {new_email}"
                )));
            }
        }

        let mut entry = self
            .accounts
            .get_mut(&id)
            .filter(|a| a.tenant_id == tenant_id)
            .ok_or_else(|| CoreError::NotFound {
                resource: "Account".to_string(),
                id: Some(id.to_string()),
            })?;

        let account = entry.value_mut();
        if let Some(username) = update.username {
            account.username = username;
        }
        if let Some(email) = update.email {
            account.email = email;
        }
        if let Some(first_name) = update.first_name {
            account.first_name = Some(first_name);
        }
        if let Some(last_name) = update.last_name {
            account.last_name = Some(last_name);
        }
        if let Some(external_id) = update.external_id {
            account.external_id = Some(external_id);
        }
        account.updated_at = Utc::now();
        Ok(account.clone())
    }

    async fn set_account_active(
        &self,
        tenant_id: TenantId,
        id: UserId,
        active: bool,
    ) -> Result<Account, CoreError> {
        let mut entry = self
            .accounts
            .get_mut(&id)
            .filter(|a| a.tenant_id == tenant_id)
            .ok_or_else(|| CoreError::NotFound {
                resource: "Account".to_string(),
                id: Some(id.to_string()),
            })?;
        let account = entry.value_mut();
        account.active = active;
        account.updated_at = Utc::now();
        Ok(account.clone())
    }

    async fn username_exists(
        &self,
        tenant_id: TenantId,
        username: &str,
    ) -> Result<bool, CoreError> {
        Ok(self.accounts.iter().any(|entry| {
            let a = entry.value();
            a.tenant_id == tenant_id && a.username == username
        }))
    }

    async fn list_roles(&self, tenant_id: TenantId) -> Result<Vec<Role>, CoreError> {
        let mut roles: Vec<Role> = self
            .roles
            .iter()
            .filter(|entry| entry.value().tenant_id == tenant_id)
            .map(|entry| entry.value().clone())
            .collect();
        roles.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(roles)
    }

    async fn get_role(&self, tenant_id: TenantId, id: RoleId) -> Result<Option<Role>, CoreError> {
        Ok(self
            .roles
            .get(&id)
            .filter(|r| r.tenant_id == tenant_id)
            .map(|r| r.clone()))
    }

    async fn create_role(&self, input: NewRole) -> Result<Role, CoreError> {
        let duplicate = self.roles.iter().any(|entry| {
            let r = entry.value();
            r.tenant_id == input.tenant_id && r.key == input.key
        });
        if duplicate {
            return Err(CoreError::Conflict(format!(
                "role key already exists: {}",
                input.key
            )));
        }
        let role = Role {
            id: RoleId::new(),
            tenant_id: input.tenant_id,
            key: input.key,
            label: input.label,
        };
        self.roles.insert(role.id, role.clone());
        Ok(role)
    }

    async fn update_role_label(
        &self,
        tenant_id: TenantId,
        id: RoleId,
        label: &str,
    ) -> Result<Role, CoreError> {
        let mut entry = self
            .roles
            .get_mut(&id)
            .filter(|r| r.tenant_id == tenant_id)
            .ok_or_else(|| CoreError::NotFound {
                resource: "Role".to_string(),
                id: Some(id.to_string()),
            })?;
        entry.value_mut().label = label.to_string();
        Ok(entry.value().clone())
    }

    async fn delete_role(&self, tenant_id: TenantId, id: RoleId) -> Result<bool, CoreError> {
        let removed = self
            .roles
            .remove_if(&id, |_, r| r.tenant_id == tenant_id)
            .is_some();
        if removed {
            for mut entry in self.accounts.iter_mut() {
                entry.value_mut().roles.retain(|r| *r != id);
            }
        }
        Ok(removed)
    }

    async fn assign_role(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        role_id: RoleId,
    ) -> Result<(), CoreError> {
        let mut entry = self
            .accounts
            .get_mut(&user_id)
            .filter(|a| a.tenant_id == tenant_id)
            .ok_or_else(|| CoreError::NotFound {
                resource: "Account".to_string(),
                id: Some(user_id.to_string()),
            })?;
        let account = entry.value_mut();
        if !account.roles.contains(&role_id) {
            account.roles.push(role_id);
            account.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn remove_role(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        role_id: RoleId,
    ) -> Result<(), CoreError> {
        let mut entry = self
            .accounts
            .get_mut(&user_id)
            .filter(|a| a.tenant_id == tenant_id)
            .ok_or_else(|| CoreError::NotFound {
                resource: "Account".to_string(),
                id: Some(user_id.to_string()),
            })?;
        entry.value_mut().roles.retain(|r| *r != role_id);
        Ok(())
    }

    async fn attach_tenant_membership(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> Result<(), CoreError> {
        if !self.accounts.contains_key(&user_id) {
            return Err(CoreError::NotFound {
                resource: "Account".to_string(),
                id: Some(user_id.to_string()),
            });
        }
        self.memberships.insert((tenant_id, user_id), ());
        Ok(())
    }
}
