//! Identity-store collaborator interface.
//!
//! The federation core never owns accounts or roles; it mutates them
//! through the [`Directory`] trait. Production deployments implement it
//! over Postgres, tests and embedded use the in-memory implementation.

pub mod memory;
pub mod types;

use async_trait::async_trait;
use trellis_core::{CoreError, TenantId, UserId};

use trellis_core::RoleId;

pub use memory::InMemoryDirectory;
pub use types::{Account, AccountUpdate, NewAccount, NewRole, Role};

/// Account and role primitives exposed by the identity store.
///
/// All operations are tenant-scoped. Implementations are responsible for
/// enforcing email uniqueness among active accounts atomically; two
/// near-simultaneous first logins by the same user may race on
/// [`Directory::create_account`] and exactly one must win.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Look up an active account by email.
    async fn find_account_by_email(
        &self,
        tenant_id: TenantId,
        email: &str,
    ) -> Result<Option<Account>, CoreError>;

    /// Look up an account by the external identifier recorded at
    /// provisioning time (SAML NameID or OIDC `sub`).
    async fn find_account_by_external_id(
        &self,
        tenant_id: TenantId,
        external_id: &str,
    ) -> Result<Option<Account>, CoreError>;

    /// Fetch an account by ID.
    async fn get_account(
        &self,
        tenant_id: TenantId,
        id: UserId,
    ) -> Result<Option<Account>, CoreError>;

    /// List all accounts for a tenant.
    async fn list_accounts(&self, tenant_id: TenantId) -> Result<Vec<Account>, CoreError>;

    /// Create an account. Fails with [`CoreError::Conflict`] when the
    /// email is already held by an active account or the username is
    /// taken.
    async fn create_account(&self, input: NewAccount) -> Result<Account, CoreError>;

    /// Apply a partial update to an account.
    async fn update_account(
        &self,
        tenant_id: TenantId,
        id: UserId,
        update: AccountUpdate,
    ) -> Result<Account, CoreError>;

    /// Activate or deactivate an account.
    async fn set_account_active(
        &self,
        tenant_id: TenantId,
        id: UserId,
        active: bool,
    ) -> Result<Account, CoreError>;

    /// Whether a username is already taken within the tenant.
    async fn username_exists(
        &self,
        tenant_id: TenantId,
        username: &str,
    ) -> Result<bool, CoreError>;

    /// List the tenant's roles.
    async fn list_roles(&self, tenant_id: TenantId) -> Result<Vec<Role>, CoreError>;

    /// Fetch a role by ID.
    async fn get_role(&self, tenant_id: TenantId, id: RoleId) -> Result<Option<Role>, CoreError>;

    /// Create a role.
    async fn create_role(&self, input: NewRole) -> Result<Role, CoreError>;

    /// Rename a role's display label.
    async fn update_role_label(
        &self,
        tenant_id: TenantId,
        id: RoleId,
        label: &str,
    ) -> Result<Role, CoreError>;

    /// Delete a role. Returns whether a role was removed.
    async fn delete_role(&self, tenant_id: TenantId, id: RoleId) -> Result<bool, CoreError>;

    /// Grant a role to an account. Idempotent.
    async fn assign_role(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        role_id: RoleId,
    ) -> Result<(), CoreError>;

    /// Revoke a role from an account. Idempotent.
    async fn remove_role(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        role_id: RoleId,
    ) -> Result<(), CoreError>;

    /// Record the account's membership in the tenant.
    async fn attach_tenant_membership(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> Result<(), CoreError>;
}
