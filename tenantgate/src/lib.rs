//! tenantgate: tenant resolution and session integrity for multi-tenant services.
//!
//! This facade crate wires the sub-crates together behind [`TenantGate`] and
//! re-exports them. Import everything you need with:
//!
//! ```ignore
//! use tenantgate::prelude::*;
//! ```
//!
//! | Crate                   | Provides                                        |
//! |-------------------------|-------------------------------------------------|
//! | `tenantgate-core`       | domain types, upstream traits, config, tracing  |
//! | `tenantgate-cache`      | TTL cache with tag invalidation                 |
//! | `tenantgate-rate-limit` | per-key exponential backoff                     |
//! | `tenantgate-tenant`     | permalink to tenant resolution                  |
//! | `tenantgate-security`   | request context and access sets                 |
//! | `tenantgate-session`    | session integrity monitor                       |
//!
//! # Example
//!
//! ```ignore
//! use tenantgate::prelude::*;
//!
//! tenantgate::init_tracing();
//! let config = GateConfig::load("prod")?;
//! let gate = TenantGate::new(config, directory, memberships)?;
//! let _maintenance = gate.spawn_maintenance(shutdown.child_token());
//!
//! // Per request
//! let tenant = gate.resolve(permalink).await.ok_or(NotFound)?;
//! let ctx = RequestContext::new(session_id, principal_from_claims(&claims)?);
//! if !gate.can_access(&ctx, tenant.tenant_id).await {
//!     return Err(Forbidden);
//! }
//! gate.observe(&ctx, EventKind::ResourceAccess, Some(tenant.tenant_id)).await;
//! ```

pub mod gate;
pub mod maintenance;

pub use gate::TenantGate;
pub use maintenance::SweepStats;

pub use tenantgate_cache;
pub use tenantgate_core;
pub use tenantgate_rate_limit;
pub use tenantgate_security;
pub use tenantgate_session;
pub use tenantgate_tenant;

pub use tenantgate_core::init_tracing;

pub mod prelude {
    //! Re-exports of the most commonly used types.
    pub use crate::{SweepStats, TenantGate};
    pub use tenantgate_cache::{CacheStats, Invalidation, TagCache};
    pub use tenantgate_core::{
        ConfigError, GateConfig, LookupError, MembershipSource, Principal, ResolveError, Role,
        TenantDirectory, TenantId, TenantRecord,
    };
    pub use tenantgate_rate_limit::{BackoffPolicy, BackoffTracker};
    pub use tenantgate_security::{principal_from_claims, AccessSet, RequestContext};
    pub use tenantgate_session::{
        Anomaly, AnomalyKind, EventKind, MonitorReport, SessionEvent, Severity,
    };
    pub use tenantgate_tenant::{ResolutionSource, Resolved, TenantResolver};
    pub use tokio_util::sync::CancellationToken;
}
