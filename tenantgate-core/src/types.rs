use std::fmt;

use serde::{Deserialize, Serialize};

/// Internal identifier of a tenant (a customer business).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub i64);

impl TenantId {
    /// Tag under which every cache entry describing this tenant is registered.
    pub fn cache_tag(&self) -> String {
        format!("tenant_{}", self.0)
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for TenantId {
    fn from(id: i64) -> Self {
        TenantId(id)
    }
}

/// A tenant as returned by the upstream directory.
///
/// Records are immutable within a cache window; an edit on the upstream side
/// becomes visible after TTL expiry or an explicit invalidation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRecord {
    pub tenant_id: TenantId,
    pub display_name: String,
    pub permalink: String,
    pub dashboard_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl TenantRecord {
    /// Build a dashboard-enabled record with no display metadata.
    pub fn new(
        tenant_id: impl Into<TenantId>,
        display_name: impl Into<String>,
        permalink: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            display_name: display_name.into(),
            permalink: permalink.into(),
            dashboard_enabled: true,
            avatar_url: None,
            city: None,
            state: None,
        }
    }

    pub fn with_dashboard_enabled(mut self, enabled: bool) -> Self {
        self.dashboard_enabled = enabled;
        self
    }

    pub fn with_avatar(mut self, url: impl Into<String>) -> Self {
        self.avatar_url = Some(url.into());
        self
    }

    pub fn with_location(mut self, city: impl Into<String>, state: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self.state = Some(state.into());
        self
    }
}

/// Role of an authenticated principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    /// May act on every dashboard-enabled tenant.
    SuperAdmin,
    /// May act only on tenants linked through the membership table.
    Standard,
}

impl Role {
    /// Parse a role claim. Anything unrecognised maps to `Standard`.
    pub fn from_claim(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "superadmin" | "super_admin" | "super-admin" => Role::SuperAdmin,
            _ => Role::Standard,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::SuperAdmin => write!(f, "SUPERADMIN"),
            Role::Standard => write!(f, "STANDARD"),
        }
    }
}

/// An authenticated actor, as supplied by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub principal_id: String,
    pub role: Role,
    #[serde(default)]
    pub home_tenant_id: Option<TenantId>,
}

impl Principal {
    pub fn new(principal_id: impl Into<String>, role: Role) -> Self {
        Self {
            principal_id: principal_id.into(),
            role,
            home_tenant_id: None,
        }
    }

    pub fn standard(principal_id: impl Into<String>) -> Self {
        Self::new(principal_id, Role::Standard)
    }

    pub fn super_admin(principal_id: impl Into<String>) -> Self {
        Self::new(principal_id, Role::SuperAdmin)
    }

    pub fn with_home_tenant(mut self, tenant_id: impl Into<TenantId>) -> Self {
        self.home_tenant_id = Some(tenant_id.into());
        self
    }

    pub fn is_super_admin(&self) -> bool {
        self.role == Role::SuperAdmin
    }
}
