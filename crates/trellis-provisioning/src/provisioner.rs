//! Just-in-time provisioning of federated identities.

use std::sync::Arc;

use trellis_core::{FederatedIdentity, TenantId};
use trellis_db::ProviderConfig;
use trellis_directory::{Account, AccountUpdate, Directory, NewAccount, Role};

use crate::error::{ProvisionError, ProvisionResult};
use crate::username;

/// Role key that every account holds implicitly; a provider configured
/// with it as the default role assigns nothing.
const IMPLICIT_ROLE_KEY: &str = "authenticated";

/// Maximum username collision suffixes tried before giving up.
const MAX_USERNAME_ATTEMPTS: u32 = 50;

/// Creates or updates local accounts from validated federated
/// identities.
///
/// Matching is email-first, then external ID. Provisioning is
/// additive: repeat logins update profile fields and may grant roles,
/// but never revoke any.
#[derive(Clone)]
pub struct JitProvisioner {
    directory: Arc<dyn Directory>,
}

impl JitProvisioner {
    #[must_use]
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self { directory }
    }

    /// Provision the identity into the tenant: find-or-create the
    /// account, then sync profile fields, tenant membership, and roles.
    pub async fn provision(
        &self,
        tenant_id: TenantId,
        identity: &FederatedIdentity,
        config: &ProviderConfig,
    ) -> ProvisionResult<Account> {
        if identity.email.is_empty() {
            return Err(ProvisionError::MissingEmail);
        }

        let account = match self.find_existing(tenant_id, identity).await? {
            Some(existing) => self.update_existing(existing, identity).await?,
            None => self.create_account(tenant_id, identity, config).await?,
        };

        self.sync_group_roles(&account, identity).await;
        Ok(account)
    }

    /// Email first; the external ID catches accounts whose email
    /// changed at the IdP since first login.
    async fn find_existing(
        &self,
        tenant_id: TenantId,
        identity: &FederatedIdentity,
    ) -> ProvisionResult<Option<Account>> {
        if let Some(account) = self
            .directory
            .find_account_by_email(tenant_id, &identity.email)
            .await?
        {
            return Ok(Some(account));
        }

        if let Some(external_id) = identity.external_id.as_deref() {
            if let Some(account) = self
                .directory
                .find_account_by_external_id(tenant_id, external_id)
                .await?
            {
                return Ok(Some(account));
            }
        }

        Ok(None)
    }

    async fn update_existing(
        &self,
        account: Account,
        identity: &FederatedIdentity,
    ) -> ProvisionResult<Account> {
        let update = AccountUpdate {
            email: (account.email != identity.email).then(|| identity.email.clone()),
            first_name: changed(&account.first_name, &identity.first_name),
            last_name: changed(&account.last_name, &identity.last_name),
            external_id: changed(&account.external_id, &identity.external_id),
            ..Default::default()
        };

        if update.email.is_none()
            && update.first_name.is_none()
            && update.last_name.is_none()
            && update.external_id.is_none()
        {
            return Ok(account);
        }

        tracing::debug!(
            tenant_id = %account.tenant_id,
            user_id = %account.id,
            "refreshing provisioned account from identity provider"
        );
        let updated = self
            .directory
            .update_account(account.tenant_id, account.id, update)
            .await?;
        Ok(updated)
    }

    async fn create_account(
        &self,
        tenant_id: TenantId,
        identity: &FederatedIdentity,
        config: &ProviderConfig,
    ) -> ProvisionResult<Account> {
        let username = self.unique_username(tenant_id, identity).await?;

        let account = self
            .directory
            .create_account(NewAccount {
                tenant_id,
                username,
                email: identity.email.clone(),
                active: true,
                first_name: identity.first_name.clone(),
                last_name: identity.last_name.clone(),
                external_id: identity.external_id.clone(),
            })
            .await?;

        tracing::info!(
            tenant_id = %tenant_id,
            user_id = %account.id,
            provider = %config.provider_name,
            "provisioned new account"
        );

        // Membership and default-role grants must not fail the login.
        if let Err(err) = self
            .directory
            .attach_tenant_membership(tenant_id, account.id)
            .await
        {
            tracing::warn!(
                tenant_id = %tenant_id,
                user_id = %account.id,
                error = %err,
                "failed to record tenant membership"
            );
        }

        if let Some(default_role) = config.default_role.as_deref() {
            if default_role != IMPLICIT_ROLE_KEY {
                self.assign_role_by_name(&account, default_role).await;
            }
        }

        Ok(account)
    }

    async fn unique_username(
        &self,
        tenant_id: TenantId,
        identity: &FederatedIdentity,
    ) -> ProvisionResult<String> {
        let base = username::base_candidate(identity);
        if !self.directory.username_exists(tenant_id, &base).await? {
            return Ok(base);
        }

        for attempt in 1..=MAX_USERNAME_ATTEMPTS {
            let candidate = username::with_suffix(&base, attempt);
            if !self.directory.username_exists(tenant_id, &candidate).await? {
                return Ok(candidate);
            }
        }

        Err(ProvisionError::UsernameExhausted { base })
    }

    /// Grant roles for the identity's groups. Unknown groups are
    /// skipped; grant failures are logged and swallowed.
    async fn sync_group_roles(&self, account: &Account, identity: &FederatedIdentity) {
        if identity.groups.is_empty() {
            return;
        }

        let roles = match self.directory.list_roles(account.tenant_id).await {
            Ok(roles) => roles,
            Err(err) => {
                tracing::warn!(
                    tenant_id = %account.tenant_id,
                    error = %err,
                    "failed to list roles for group sync"
                );
                return;
            }
        };

        for group in &identity.groups {
            match resolve_role(&roles, group) {
                Some(role) => self.grant(account, role).await,
                None => {
                    tracing::debug!(
                        tenant_id = %account.tenant_id,
                        group = %group,
                        "no role matches federated group"
                    );
                }
            }
        }
    }

    async fn assign_role_by_name(&self, account: &Account, name: &str) {
        let roles = match self.directory.list_roles(account.tenant_id).await {
            Ok(roles) => roles,
            Err(err) => {
                tracing::warn!(
                    tenant_id = %account.tenant_id,
                    error = %err,
                    "failed to list roles for default-role grant"
                );
                return;
            }
        };

        match resolve_role(&roles, name) {
            Some(role) => self.grant(account, role).await,
            None => {
                tracing::warn!(
                    tenant_id = %account.tenant_id,
                    role = %name,
                    "configured default role does not exist"
                );
            }
        }
    }

    async fn grant(&self, account: &Account, role: &Role) {
        if account.has_role(role.id) {
            return;
        }
        if let Err(err) = self
            .directory
            .assign_role(account.tenant_id, account.id, role.id)
            .await
        {
            tracing::warn!(
                tenant_id = %account.tenant_id,
                user_id = %account.id,
                role = %role.key,
                error = %err,
                "failed to grant role"
            );
        }
    }
}

/// Match a federated group to a role: exact key match first, then
/// case-insensitive label match.
fn resolve_role<'a>(roles: &'a [Role], group: &str) -> Option<&'a Role> {
    roles
        .iter()
        .find(|role| role.key == group)
        .or_else(|| {
            roles
                .iter()
                .find(|role| role.label.eq_ignore_ascii_case(group))
        })
}

fn changed(current: &Option<String>, incoming: &Option<String>) -> Option<String> {
    match incoming {
        Some(value) if current.as_deref() != Some(value.as_str()) => Some(value.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use trellis_core::{CoreError, RoleId, UserId};
    use trellis_directory::{InMemoryDirectory, NewRole};

    fn identity(email: &str) -> FederatedIdentity {
        FederatedIdentity {
            email: email.to_string(),
            first_name: Some("Jane".to_string()),
            last_name: Some("Doe".to_string()),
            external_id: Some("idp-42".to_string()),
            ..Default::default()
        }
    }

    fn saml_config() -> ProviderConfig {
        ProviderConfig::default_for_test_saml()
    }

    async fn seed_role(directory: &InMemoryDirectory, tenant_id: TenantId, key: &str, label: &str) -> Role {
        directory
            .create_role(NewRole {
                tenant_id,
                key: key.to_string(),
                label: label.to_string(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_first_login_creates_account() {
        let directory = Arc::new(InMemoryDirectory::new());
        let provisioner = JitProvisioner::new(directory.clone());
        let tenant_id = TenantId::new();

        let account = provisioner
            .provision(tenant_id, &identity("jdoe@example.com"), &saml_config())
            .await
            .unwrap();

        assert_eq!(account.username, "jane.doe");
        assert_eq!(account.email, "jdoe@example.com");
        assert!(account.active);
        assert_eq!(account.external_id.as_deref(), Some("idp-42"));
    }

    #[tokio::test]
    async fn test_empty_email_is_rejected() {
        let directory = Arc::new(InMemoryDirectory::new());
        let provisioner = JitProvisioner::new(directory);

        let result = provisioner
            .provision(TenantId::new(), &FederatedIdentity::default(), &saml_config())
            .await;
        assert!(matches!(result, Err(ProvisionError::MissingEmail)));
    }

    #[tokio::test]
    async fn test_repeat_login_is_idempotent() {
        let directory = Arc::new(InMemoryDirectory::new());
        let provisioner = JitProvisioner::new(directory.clone());
        let tenant_id = TenantId::new();

        let first = provisioner
            .provision(tenant_id, &identity("jdoe@example.com"), &saml_config())
            .await
            .unwrap();
        let second = provisioner
            .provision(tenant_id, &identity("jdoe@example.com"), &saml_config())
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(directory.list_accounts(tenant_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_profile_fields_refresh_on_login() {
        let directory = Arc::new(InMemoryDirectory::new());
        let provisioner = JitProvisioner::new(directory.clone());
        let tenant_id = TenantId::new();

        provisioner
            .provision(tenant_id, &identity("jdoe@example.com"), &saml_config())
            .await
            .unwrap();

        let mut renamed = identity("jdoe@example.com");
        renamed.last_name = Some("Doe-Smith".to_string());
        let account = provisioner
            .provision(tenant_id, &renamed, &saml_config())
            .await
            .unwrap();

        assert_eq!(account.last_name.as_deref(), Some("Doe-Smith"));
        // Username is assigned once and never regenerated.
        assert_eq!(account.username, "jane.doe");
    }

    #[tokio::test]
    async fn test_email_change_matches_by_external_id() {
        let directory = Arc::new(InMemoryDirectory::new());
        let provisioner = JitProvisioner::new(directory.clone());
        let tenant_id = TenantId::new();

        let original = provisioner
            .provision(tenant_id, &identity("jdoe@example.com"), &saml_config())
            .await
            .unwrap();

        let moved = identity("jane.doe@example.com");
        let updated = provisioner
            .provision(tenant_id, &moved, &saml_config())
            .await
            .unwrap();

        assert_eq!(original.id, updated.id);
        assert_eq!(updated.email, "jane.doe@example.com");
    }

    #[tokio::test]
    async fn test_username_collision_gets_suffix() {
        let directory = Arc::new(InMemoryDirectory::new());
        let provisioner = JitProvisioner::new(directory.clone());
        let tenant_id = TenantId::new();

        provisioner
            .provision(tenant_id, &identity("jdoe@example.com"), &saml_config())
            .await
            .unwrap();

        let mut other = identity("jane.d@other.example.com");
        other.external_id = Some("idp-43".to_string());
        let account = provisioner
            .provision(tenant_id, &other, &saml_config())
            .await
            .unwrap();

        assert_eq!(account.username, "jane.doe2");
    }

    #[tokio::test]
    async fn test_default_role_granted_on_create() {
        let directory = Arc::new(InMemoryDirectory::new());
        let provisioner = JitProvisioner::new(directory.clone());
        let tenant_id = TenantId::new();
        let role = seed_role(&directory, tenant_id, "member", "Member").await;

        let mut config = saml_config();
        config.default_role = Some("member".to_string());
        let account = provisioner
            .provision(tenant_id, &identity("jdoe@example.com"), &config)
            .await
            .unwrap();

        let reloaded = directory
            .get_account(tenant_id, account.id)
            .await
            .unwrap()
            .unwrap();
        assert!(reloaded.has_role(role.id));
    }

    #[tokio::test]
    async fn test_implicit_default_role_is_not_granted() {
        let directory = Arc::new(InMemoryDirectory::new());
        let provisioner = JitProvisioner::new(directory.clone());
        let tenant_id = TenantId::new();

        let mut config = saml_config();
        config.default_role = Some("authenticated".to_string());
        let account = provisioner
            .provision(tenant_id, &identity("jdoe@example.com"), &config)
            .await
            .unwrap();

        let reloaded = directory
            .get_account(tenant_id, account.id)
            .await
            .unwrap()
            .unwrap();
        assert!(reloaded.roles.is_empty());
    }

    #[tokio::test]
    async fn test_groups_grant_roles_by_key_and_label() {
        let directory = Arc::new(InMemoryDirectory::new());
        let provisioner = JitProvisioner::new(directory.clone());
        let tenant_id = TenantId::new();
        let by_key = seed_role(&directory, tenant_id, "eng", "Engineering").await;
        let by_label = seed_role(&directory, tenant_id, "support-tier1", "Support").await;

        let mut id = identity("jdoe@example.com");
        id.groups = vec![
            "eng".to_string(),
            "SUPPORT".to_string(),
            "no-such-group".to_string(),
        ];
        let account = provisioner
            .provision(tenant_id, &id, &saml_config())
            .await
            .unwrap();

        let reloaded = directory
            .get_account(tenant_id, account.id)
            .await
            .unwrap()
            .unwrap();
        assert!(reloaded.has_role(by_key.id));
        assert!(reloaded.has_role(by_label.id));
        assert_eq!(reloaded.roles.len(), 2);
    }

    #[tokio::test]
    async fn test_repeat_login_never_revokes_roles() {
        let directory = Arc::new(InMemoryDirectory::new());
        let provisioner = JitProvisioner::new(directory.clone());
        let tenant_id = TenantId::new();
        let role = seed_role(&directory, tenant_id, "eng", "Engineering").await;

        let mut with_group = identity("jdoe@example.com");
        with_group.groups = vec!["eng".to_string()];
        let account = provisioner
            .provision(tenant_id, &with_group, &saml_config())
            .await
            .unwrap();

        // Next assertion omits the group; the role stays.
        provisioner
            .provision(tenant_id, &identity("jdoe@example.com"), &saml_config())
            .await
            .unwrap();

        let reloaded = directory
            .get_account(tenant_id, account.id)
            .await
            .unwrap()
            .unwrap();
        assert!(reloaded.has_role(role.id));
    }

    /// Directory wrapper whose membership writes always fail.
    struct FlakyMembership {
        inner: InMemoryDirectory,
        attach_called: AtomicBool,
    }

    #[async_trait]
    impl Directory for FlakyMembership {
        async fn find_account_by_email(
            &self,
            tenant_id: TenantId,
            email: &str,
        ) -> Result<Option<Account>, CoreError> {
            self.inner.find_account_by_email(tenant_id, email).await
        }

        async fn find_account_by_external_id(
            &self,
            tenant_id: TenantId,
            external_id: &str,
        ) -> Result<Option<Account>, CoreError> {
            self.inner
                .find_account_by_external_id(tenant_id, external_id)
                .await
        }

        async fn get_account(
            &self,
            tenant_id: TenantId,
            id: UserId,
        ) -> Result<Option<Account>, CoreError> {
            self.inner.get_account(tenant_id, id).await
        }

        async fn list_accounts(&self, tenant_id: TenantId) -> Result<Vec<Account>, CoreError> {
            self.inner.list_accounts(tenant_id).await
        }

        async fn create_account(&self, input: NewAccount) -> Result<Account, CoreError> {
            self.inner.create_account(input).await
        }

        async fn update_account(
            &self,
            tenant_id: TenantId,
            id: UserId,
            update: AccountUpdate,
        ) -> Result<Account, CoreError> {
            self.inner.update_account(tenant_id, id, update).await
        }

        async fn set_account_active(
            &self,
            tenant_id: TenantId,
            id: UserId,
            active: bool,
        ) -> Result<Account, CoreError> {
            self.inner.set_account_active(tenant_id, id, active).await
        }

        async fn username_exists(
            &self,
            tenant_id: TenantId,
            username: &str,
        ) -> Result<bool, CoreError> {
            self.inner.username_exists(tenant_id, username).await
        }

        async fn list_roles(&self, tenant_id: TenantId) -> Result<Vec<Role>, CoreError> {
            self.inner.list_roles(tenant_id).await
        }

        async fn get_role(
            &self,
            tenant_id: TenantId,
            id: RoleId,
        ) -> Result<Option<Role>, CoreError> {
            self.inner.get_role(tenant_id, id).await
        }

        async fn create_role(&self, input: NewRole) -> Result<Role, CoreError> {
            self.inner.create_role(input).await
        }

        async fn update_role_label(
            &self,
            tenant_id: TenantId,
            id: RoleId,
            label: &str,
        ) -> Result<Role, CoreError> {
            self.inner.update_role_label(tenant_id, id, label).await
        }

        async fn delete_role(&self, tenant_id: TenantId, id: RoleId) -> Result<bool, CoreError> {
            self.inner.delete_role(tenant_id, id).await
        }

        async fn assign_role(
            &self,
            tenant_id: TenantId,
            user_id: UserId,
            role_id: RoleId,
        ) -> Result<(), CoreError> {
            self.inner.assign_role(tenant_id, user_id, role_id).await
        }

        async fn remove_role(
            &self,
            tenant_id: TenantId,
            user_id: UserId,
            role_id: RoleId,
        ) -> Result<(), CoreError> {
            self.inner.remove_role(tenant_id, user_id, role_id).await
        }

        async fn attach_tenant_membership(
            &self,
            _tenant_id: TenantId,
            _user_id: UserId,
        ) -> Result<(), CoreError> {
            self.attach_called.store(true, Ordering::SeqCst);
            Err(CoreError::Storage("membership table unavailable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_membership_failure_does_not_fail_login() {
        let directory = Arc::new(FlakyMembership {
            inner: InMemoryDirectory::new(),
            attach_called: AtomicBool::new(false),
        });
        let provisioner = JitProvisioner::new(directory.clone());

        let account = provisioner
            .provision(TenantId::new(), &identity("jdoe@example.com"), &saml_config())
            .await
            .unwrap();

        assert!(account.active);
        assert!(directory.attach_called.load(Ordering::SeqCst));
    }
}
