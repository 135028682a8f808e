//! Account and role records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use trellis_core::{RoleId, TenantAware, TenantId, UserId};

/// A local user account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: UserId,
    pub tenant_id: TenantId,
    /// Machine-safe login name: lowercase `[a-z0-9._-]`, unique per tenant.
    pub username: String,
    /// Unique among active accounts within the tenant.
    pub email: String,
    pub active: bool,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// External identifier recorded at provisioning (NameID / `sub`).
    pub external_id: Option<String>,
    pub roles: Vec<RoleId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Whether the account holds the given role.
    #[must_use]
    pub fn has_role(&self, role_id: RoleId) -> bool {
        self.roles.contains(&role_id)
    }
}

impl TenantAware for Account {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Input for creating an account.
///
/// Accounts created through federation carry no usable password; the
/// store records them in a disabled-password state.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub tenant_id: TenantId,
    pub username: String,
    pub email: String,
    pub active: bool,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub external_id: Option<String>,
}

/// Partial account update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct AccountUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub external_id: Option<String>,
}

/// A role in the identity store. SCIM Groups map onto roles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub tenant_id: TenantId,
    /// Stable machine name, e.g. `admin`. Group-to-role resolution
    /// matches on this first.
    pub key: String,
    /// Human-readable label, matched case-insensitively as a fallback.
    pub label: String,
}

impl TenantAware for Role {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Input for creating a role.
#[derive(Debug, Clone)]
pub struct NewRole {
    pub tenant_id: TenantId,
    pub key: String,
    pub label: String,
}
