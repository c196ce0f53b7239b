use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tenantgate_core::TenantId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// First event of a session; binds it to a principal.
    Login,
    TenantSwitch,
    /// The session touched tenant-scoped data.
    ResourceAccess,
}

/// One observation of a session, as recorded by request middleware.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub session_id: String,
    pub principal_id: Option<String>,
    pub tenant_id: Option<TenantId>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
}

impl SessionEvent {
    /// An anonymous event stamped with the current time.
    pub fn new(session_id: impl Into<String>, kind: EventKind) -> Self {
        Self {
            session_id: session_id.into(),
            principal_id: None,
            tenant_id: None,
            ip_address: None,
            user_agent: None,
            kind,
            timestamp: Utc::now(),
        }
    }

    pub fn with_principal(mut self, principal_id: impl Into<String>) -> Self {
        self.principal_id = Some(principal_id.into());
        self
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<TenantId>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_ip_address(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Override the timestamp.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// One session attributed to two different principals ("session bleeding").
    MultiPrincipalSession,
    RapidTenantSwitch,
    UnauthorizedTenantAccess,
}

impl AnomalyKind {
    pub fn severity(&self) -> Severity {
        match self {
            AnomalyKind::MultiPrincipalSession => Severity::Critical,
            AnomalyKind::RapidTenantSwitch => Severity::Medium,
            AnomalyKind::UnauthorizedTenantAccess => Severity::High,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::MultiPrincipalSession => "multi_principal_session",
            AnomalyKind::RapidTenantSwitch => "rapid_tenant_switch",
            AnomalyKind::UnauthorizedTenantAccess => "unauthorized_tenant_access",
        }
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// A detected integrity problem, with the events that triggered it.
///
/// Advisory: anomalies are reported, never used to reject a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub session_id: String,
    pub events: Vec<SessionEvent>,
    pub detected_at: DateTime<Utc>,
}

impl Anomaly {
    pub(crate) fn new(kind: AnomalyKind, session_id: &str, events: Vec<SessionEvent>) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            session_id: session_id.to_string(),
            events,
            detected_at: Utc::now(),
        }
    }
}
