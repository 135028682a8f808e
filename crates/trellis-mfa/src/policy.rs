//! MFA policy types and the pure enforcement evaluation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use trellis_core::TenantId;

/// Role keys that count as administrative for `admins_only` enforcement.
pub const ADMIN_ROLE_KEYS: &[&str] = &["admin", "administrator"];

/// Enforcement levels. Stored as text; unknown stored values evaluate as
/// [`MfaEnforcement::Disabled`] (see [`MfaPolicy::enforcement_level`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MfaEnforcement {
    Disabled,
    AdminsOnly,
    Required,
}

impl std::fmt::Display for MfaEnforcement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MfaEnforcement::Disabled => write!(f, "disabled"),
            MfaEnforcement::AdminsOnly => write!(f, "admins_only"),
            MfaEnforcement::Required => write!(f, "required"),
        }
    }
}

impl std::str::FromStr for MfaEnforcement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disabled" => Ok(MfaEnforcement::Disabled),
            "admins_only" => Ok(MfaEnforcement::AdminsOnly),
            "required" => Ok(MfaEnforcement::Required),
            _ => Err(format!("Unknown enforcement value: {s}")),
        }
    }
}

/// Second-factor methods a tenant may allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MfaMethod {
    Totp,
    Webauthn,
    Sms,
}

impl std::fmt::Display for MfaMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MfaMethod::Totp => write!(f, "totp"),
            MfaMethod::Webauthn => write!(f, "webauthn"),
            MfaMethod::Sms => write!(f, "sms"),
        }
    }
}

impl std::str::FromStr for MfaMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "totp" => Ok(MfaMethod::Totp),
            "webauthn" => Ok(MfaMethod::Webauthn),
            "sms" => Ok(MfaMethod::Sms),
            _ => Err(format!("Unknown MFA method: {s}")),
        }
    }
}

/// The single active MFA policy for a tenant.
///
/// `enforcement` is kept as stored text so that values written by newer
/// versions of the platform survive a rollback; evaluation treats
/// anything unrecognized as disabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MfaPolicy {
    pub tenant_id: TenantId,
    pub enforcement: String,
    pub allowed_methods: Vec<MfaMethod>,
    pub grace_period_days: i32,
    pub session_duration_hours: i32,
    pub max_concurrent_sessions: i32,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

impl MfaPolicy {
    /// Policy created when a tenant first enables MFA configuration.
    #[must_use]
    pub fn defaults(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            enforcement: MfaEnforcement::Disabled.to_string(),
            allowed_methods: vec![MfaMethod::Totp],
            grace_period_days: 7,
            session_duration_hours: 8,
            max_concurrent_sessions: 3,
            is_active: true,
            updated_at: Utc::now(),
        }
    }

    /// Parse the stored enforcement value, falling back to disabled.
    ///
    /// Unknown values are logged at warn level; fail-open here is the
    /// documented behavior, not an accident.
    #[must_use]
    pub fn enforcement_level(&self) -> MfaEnforcement {
        self.enforcement.parse().unwrap_or_else(|_| {
            tracing::warn!(
                tenant_id = %self.tenant_id,
                enforcement = %self.enforcement,
                "Unrecognized MFA enforcement value, treating as disabled"
            );
            MfaEnforcement::Disabled
        })
    }

    /// Allowed second-factor methods, defaulting to TOTP when unset.
    #[must_use]
    pub fn allowed_methods(&self) -> Vec<MfaMethod> {
        if self.allowed_methods.is_empty() {
            vec![MfaMethod::Totp]
        } else {
            self.allowed_methods.clone()
        }
    }
}

/// Partial policy input for upserts; `None` fields keep the current
/// value (or the default on first creation).
#[derive(Debug, Clone, Default)]
pub struct MfaPolicyInput {
    pub enforcement: Option<MfaEnforcement>,
    pub allowed_methods: Option<Vec<MfaMethod>>,
    pub grace_period_days: Option<i32>,
    pub session_duration_hours: Option<i32>,
    pub max_concurrent_sessions: Option<i32>,
}

/// Whether the account must present a second factor.
///
/// `role_keys` are the machine names of the roles the account holds.
/// No policy means no requirement.
#[must_use]
pub fn is_required(role_keys: &[String], policy: Option<&MfaPolicy>) -> bool {
    let Some(policy) = policy else {
        return false;
    };
    if !policy.is_active {
        return false;
    }

    match policy.enforcement_level() {
        MfaEnforcement::Disabled => false,
        MfaEnforcement::Required => true,
        MfaEnforcement::AdminsOnly => role_keys
            .iter()
            .any(|key| ADMIN_ROLE_KEYS.contains(&key.as_str())),
    }
}
