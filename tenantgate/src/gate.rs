use std::sync::Arc;

use tenantgate_core::{
    ConfigError, GateConfig, MembershipSource, TenantDirectory, TenantId, TenantRecord,
};
use tenantgate_security::{AccessResolver, AccessSet, RequestContext};
use tenantgate_session::{
    Anomaly, EventKind, MonitorReport, MonitorSettings, SessionEvent, SessionMonitor,
};
use tenantgate_tenant::TenantResolver;

/// The tenant resolution layer, wired from one [`GateConfig`].
///
/// Cloning is cheap; clones share the cache, backoff state and session
/// histories.
#[derive(Clone)]
pub struct TenantGate {
    config: Arc<GateConfig>,
    resolver: TenantResolver,
    access: AccessResolver,
    monitor: SessionMonitor,
}

impl TenantGate {
    /// Validate `config` and build every component around `directory` and
    /// `memberships`.
    pub fn new(
        config: GateConfig,
        directory: impl TenantDirectory,
        memberships: impl MembershipSource,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let directory: Arc<dyn TenantDirectory> = Arc::new(directory);
        let memberships: Arc<dyn MembershipSource> = Arc::new(memberships);

        let resolver = TenantResolver::from_config(Arc::clone(&directory), &config);
        let access = AccessResolver::new(directory, memberships);
        let monitor = SessionMonitor::new(MonitorSettings::from(&config.session));

        tracing::debug!(
            positive_ttl_secs = config.cache.positive_ttl_secs,
            negative_ttl_secs = config.cache.negative_ttl_secs,
            lookup_timeout_ms = config.resolver.lookup_timeout_ms,
            "tenant gate initialised"
        );
        Ok(Self::from_parts(config, resolver, access, monitor))
    }

    /// Assemble a gate from separately built components.
    pub fn from_parts(
        config: GateConfig,
        resolver: TenantResolver,
        access: AccessResolver,
        monitor: SessionMonitor,
    ) -> Self {
        Self {
            config: Arc::new(config),
            resolver,
            access,
            monitor,
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn resolver(&self) -> &TenantResolver {
        &self.resolver
    }

    pub fn access(&self) -> &AccessResolver {
        &self.access
    }

    pub fn monitor(&self) -> &SessionMonitor {
        &self.monitor
    }

    pub async fn resolve(&self, permalink: &str) -> Option<TenantRecord> {
        self.resolver.resolve(permalink).await
    }

    pub async fn accessible_tenants(&self, ctx: &RequestContext) -> Arc<AccessSet> {
        self.access.accessible_tenants(ctx).await
    }

    pub async fn can_access(&self, ctx: &RequestContext, tenant_id: TenantId) -> bool {
        self.access.can_access(ctx, tenant_id).await
    }

    /// Record what `ctx` just did and return any anomalies it raised.
    ///
    /// Uses the request's memoised access set, computing it if needed.
    /// The result is advisory; the caller's decision to serve the request
    /// must come from [`can_access`](Self::can_access).
    pub async fn observe(
        &self,
        ctx: &RequestContext,
        kind: EventKind,
        tenant_id: Option<TenantId>,
    ) -> Vec<Anomaly> {
        let access = self.access.accessible_tenants(ctx).await;

        let mut event = SessionEvent::new(ctx.session_id(), kind)
            .with_principal(ctx.principal().principal_id.as_str());
        event.tenant_id = tenant_id;
        event.ip_address = ctx.ip_address().map(str::to_owned);
        event.user_agent = ctx.user_agent().map(str::to_owned);

        self.monitor.record_event(event, &access)
    }

    /// The monitor's report, for `SUPERADMIN` principals only.
    pub fn diagnostics(&self, ctx: &RequestContext) -> Option<MonitorReport> {
        if !ctx.principal().is_super_admin() {
            tracing::debug!(
                request_id = %ctx.request_id(),
                principal = %ctx.principal().principal_id,
                "diagnostics refused"
            );
            return None;
        }
        Some(self.monitor.report())
    }
}
