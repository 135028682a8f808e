//! Postgres-backed [`Directory`] implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use trellis_core::{CoreError, RoleId, TenantId, UserId};
use trellis_directory::{Account, AccountUpdate, Directory, NewAccount, NewRole, Role};
use uuid::Uuid;

/// Production directory over the platform's account tables.
#[derive(Clone)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn storage(err: sqlx::Error) -> CoreError {
        CoreError::Storage(err.to_string())
    }

    fn account_from_row(row: &sqlx::postgres::PgRow, roles: Vec<RoleId>) -> Account {
        let id: Uuid = row.get("id");
        let tenant_id: Uuid = row.get("tenant_id");
        let created_at: DateTime<Utc> = row.get("created_at");
        let updated_at: DateTime<Utc> = row.get("updated_at");
        Account {
            id: UserId::from_uuid(id),
            tenant_id: TenantId::from_uuid(tenant_id),
            username: row.get("username"),
            email: row.get("email"),
            active: row.get("active"),
            first_name: row.get("first_name"),
            last_name: row.get("last_name"),
            external_id: row.get("external_id"),
            roles,
            created_at,
            updated_at,
        }
    }

    async fn roles_for_account(&self, account_id: Uuid) -> Result<Vec<RoleId>, CoreError> {
        let rows = sqlx::query("SELECT role_id FROM account_roles WHERE account_id = $1")
            .bind(account_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Self::storage)?;
        Ok(rows
            .iter()
            .map(|r| RoleId::from_uuid(r.get("role_id")))
            .collect())
    }

    async fn fetch_account(
        &self,
        tenant_id: TenantId,
        query: &str,
        bind: &str,
    ) -> Result<Option<Account>, CoreError> {
        let row = sqlx::query(query)
            .bind(tenant_id.as_uuid())
            .bind(bind)
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::storage)?;

        match row {
            Some(row) => {
                let id: Uuid = row.get("id");
                let roles = self.roles_for_account(id).await?;
                Ok(Some(Self::account_from_row(&row, roles)))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl Directory for PgDirectory {
    async fn find_account_by_email(
        &self,
        tenant_id: TenantId,
        email: &str,
    ) -> Result<Option<Account>, CoreError> {
        self.fetch_account(
            tenant_id,
            r"
            SELECT * FROM accounts
            WHERE tenant_id = $1 AND lower(email) = lower($2) AND active = true
            ",
            email,
        )
        .await
    }

    async fn find_account_by_external_id(
        &self,
        tenant_id: TenantId,
        external_id: &str,
    ) -> Result<Option<Account>, CoreError> {
        self.fetch_account(
            tenant_id,
            "SELECT * FROM accounts WHERE tenant_id = $1 AND external_id = $2",
            external_id,
        )
        .await
    }

    async fn get_account(
        &self,
        tenant_id: TenantId,
        id: UserId,
    ) -> Result<Option<Account>, CoreError> {
        let row = sqlx::query("SELECT * FROM accounts WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id.as_uuid())
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::storage)?;

        match row {
            Some(row) => {
                let roles = self.roles_for_account(*id.as_uuid()).await?;
                Ok(Some(Self::account_from_row(&row, roles)))
            }
            None => Ok(None),
        }
    }

    async fn list_accounts(&self, tenant_id: TenantId) -> Result<Vec<Account>, CoreError> {
        let rows = sqlx::query(
            "SELECT * FROM accounts WHERE tenant_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(tenant_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(Self::storage)?;

        let role_rows = sqlx::query(
            r"
            SELECT ar.account_id, ar.role_id
            FROM account_roles ar
            JOIN accounts a ON a.id = ar.account_id
            WHERE a.tenant_id = $1
            ",
        )
        .bind(tenant_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(Self::storage)?;

        let mut roles_by_account: HashMap<Uuid, Vec<RoleId>> = HashMap::new();
        for row in &role_rows {
            let account_id: Uuid = row.get("account_id");
            roles_by_account
                .entry(account_id)
                .or_default()
                .push(RoleId::from_uuid(row.get("role_id")));
        }

        Ok(rows
            .iter()
            .map(|row| {
                let id: Uuid = row.get("id");
                let roles = roles_by_account.remove(&id).unwrap_or_default();
                Self::account_from_row(row, roles)
            })
            .collect())
    }

    async fn create_account(&self, input: NewAccount) -> Result<Account, CoreError> {
        // Uniqueness of email among active accounts is enforced by a
        // partial unique index; a constraint violation surfaces as a
        // conflict so racing first logins resolve to one winner.
        let row = sqlx::query(
            r"
            INSERT INTO accounts (
                tenant_id, username, email, active, first_name, last_name, external_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            ",
        )
        .bind(input.tenant_id.as_uuid())
        .bind(&input.username)
        .bind(&input.email)
        .bind(input.active)
        .bind(&input.first_name)
        .bind(&input.last_name)
        .bind(&input.external_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                CoreError::Conflict(format!("account already exists: {}", input.email))
            }
            _ => Self::storage(e),
        })?;

        Ok(Self::account_from_row(&row, Vec::new()))
    }

    async fn update_account(
        &self,
        tenant_id: TenantId,
        id: UserId,
        update: AccountUpdate,
    ) -> Result<Account, CoreError> {
        let row = sqlx::query(
            r"
            UPDATE accounts
            SET
                username = COALESCE($3, username),
                email = COALESCE($4, email),
                first_name = COALESCE($5, first_name),
                last_name = COALESCE($6, last_name),
                external_id = COALESCE($7, external_id),
                updated_at = NOW()
            WHERE tenant_id = $1 AND id = $2
            RETURNING *
            ",
        )
        .bind(tenant_id.as_uuid())
        .bind(id.as_uuid())
        .bind(&update.username)
        .bind(&update.email)
        .bind(&update.first_name)
        .bind(&update.last_name)
        .bind(&update.external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::storage)?
        .ok_or_else(|| CoreError::NotFound {
            resource: "Account".to_string(),
            id: Some(id.to_string()),
        })?;

        let roles = self.roles_for_account(*id.as_uuid()).await?;
        Ok(Self::account_from_row(&row, roles))
    }

    async fn set_account_active(
        &self,
        tenant_id: TenantId,
        id: UserId,
        active: bool,
    ) -> Result<Account, CoreError> {
        let row = sqlx::query(
            r"
            UPDATE accounts
            SET active = $3, updated_at = NOW()
            WHERE tenant_id = $1 AND id = $2
            RETURNING *
            ",
        )
        .bind(tenant_id.as_uuid())
        .bind(id.as_uuid())
        .bind(active)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::storage)?
        .ok_or_else(|| CoreError::NotFound {
            resource: "Account".to_string(),
            id: Some(id.to_string()),
        })?;

        let roles = self.roles_for_account(*id.as_uuid()).await?;
        Ok(Self::account_from_row(&row, roles))
    }

    async fn username_exists(
        &self,
        tenant_id: TenantId,
        username: &str,
    ) -> Result<bool, CoreError> {
        let row: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM accounts WHERE tenant_id = $1 AND username = $2)",
        )
        .bind(tenant_id.as_uuid())
        .bind(username)
        .fetch_one(&self.pool)
        .await
        .map_err(Self::storage)?;
        Ok(row.0)
    }

    async fn list_roles(&self, tenant_id: TenantId) -> Result<Vec<Role>, CoreError> {
        let rows = sqlx::query("SELECT * FROM roles WHERE tenant_id = $1 ORDER BY key ASC")
            .bind(tenant_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(Self::storage)?;

        Ok(rows
            .iter()
            .map(|row| Role {
                id: RoleId::from_uuid(row.get("id")),
                tenant_id: TenantId::from_uuid(row.get("tenant_id")),
                key: row.get("key"),
                label: row.get("label"),
            })
            .collect())
    }

    async fn get_role(&self, tenant_id: TenantId, id: RoleId) -> Result<Option<Role>, CoreError> {
        let row = sqlx::query("SELECT * FROM roles WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id.as_uuid())
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::storage)?;

        Ok(row.map(|row| Role {
            id: RoleId::from_uuid(row.get("id")),
            tenant_id: TenantId::from_uuid(row.get("tenant_id")),
            key: row.get("key"),
            label: row.get("label"),
        }))
    }

    async fn create_role(&self, input: NewRole) -> Result<Role, CoreError> {
        let row = sqlx::query(
            r"
            INSERT INTO roles (tenant_id, key, label)
            VALUES ($1, $2, $3)
            RETURNING *
            ",
        )
        .bind(input.tenant_id.as_uuid())
        .bind(&input.key)
        .bind(&input.label)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                CoreError::Conflict(format!("role key already exists: {}", input.key))
            }
            _ => Self::storage(e),
        })?;

        Ok(Role {
            id: RoleId::from_uuid(row.get("id")),
            tenant_id: TenantId::from_uuid(row.get("tenant_id")),
            key: row.get("key"),
            label: row.get("label"),
        })
    }

    async fn update_role_label(
        &self,
        tenant_id: TenantId,
        id: RoleId,
        label: &str,
    ) -> Result<Role, CoreError> {
        let row = sqlx::query(
            r"
            UPDATE roles SET label = $3
            WHERE tenant_id = $1 AND id = $2
            RETURNING *
            ",
        )
        .bind(tenant_id.as_uuid())
        .bind(id.as_uuid())
        .bind(label)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::storage)?
        .ok_or_else(|| CoreError::NotFound {
            resource: "Role".to_string(),
            id: Some(id.to_string()),
        })?;

        Ok(Role {
            id: RoleId::from_uuid(row.get("id")),
            tenant_id: TenantId::from_uuid(row.get("tenant_id")),
            key: row.get("key"),
            label: row.get("label"),
        })
    }

    async fn delete_role(&self, tenant_id: TenantId, id: RoleId) -> Result<bool, CoreError> {
        let result = sqlx::query("DELETE FROM roles WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id.as_uuid())
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(Self::storage)?;
        Ok(result.rows_affected() > 0)
    }

    async fn assign_role(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        role_id: RoleId,
    ) -> Result<(), CoreError> {
        sqlx::query(
            r"
            INSERT INTO account_roles (account_id, role_id)
            SELECT a.id, $3 FROM accounts a
            WHERE a.tenant_id = $1 AND a.id = $2
            ON CONFLICT DO NOTHING
            ",
        )
        .bind(tenant_id.as_uuid())
        .bind(user_id.as_uuid())
        .bind(role_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(Self::storage)?;
        Ok(())
    }

    async fn remove_role(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        role_id: RoleId,
    ) -> Result<(), CoreError> {
        sqlx::query(
            r"
            DELETE FROM account_roles ar
            USING accounts a
            WHERE ar.account_id = a.id
              AND a.tenant_id = $1 AND a.id = $2 AND ar.role_id = $3
            ",
        )
        .bind(tenant_id.as_uuid())
        .bind(user_id.as_uuid())
        .bind(role_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(Self::storage)?;
        Ok(())
    }

    async fn attach_tenant_membership(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> Result<(), CoreError> {
        sqlx::query(
            r"
            INSERT INTO tenant_memberships (tenant_id, account_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            ",
        )
        .bind(tenant_id.as_uuid())
        .bind(user_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(Self::storage)?;
        Ok(())
    }
}
