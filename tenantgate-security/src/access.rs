use std::collections::HashSet;
use std::sync::Arc;

use tenantgate_core::{LookupError, MembershipSource, Principal, TenantDirectory, TenantId, TenantRecord};

use crate::context::RequestContext;

/// The tenants a principal may act on during one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccessSet {
    records: Vec<TenantRecord>,
    ids: HashSet<TenantId>,
}

impl AccessSet {
    /// Build a set from `records`, keeping the first record seen for each id.
    pub fn new(records: impl IntoIterator<Item = TenantRecord>) -> Self {
        let mut ids = HashSet::new();
        let records = records
            .into_iter()
            .filter(|record| ids.insert(record.tenant_id))
            .collect();
        Self { records, ids }
    }

    /// The set granting nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn contains(&self, tenant_id: TenantId) -> bool {
        self.ids.contains(&tenant_id)
    }

    pub fn ids(&self) -> &HashSet<TenantId> {
        &self.ids
    }

    pub fn records(&self) -> &[TenantRecord] {
        &self.records
    }

    pub fn get(&self, tenant_id: TenantId) -> Option<&TenantRecord> {
        self.records.iter().find(|r| r.tenant_id == tenant_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Computes access sets from the tenant directory and the membership table.
///
/// - `SUPERADMIN`: every dashboard-enabled tenant.
/// - `STANDARD`: every tenant linked to the principal in the membership table.
///
/// Any upstream failure yields the empty set.
#[derive(Clone)]
pub struct AccessResolver {
    directory: Arc<dyn TenantDirectory>,
    memberships: Arc<dyn MembershipSource>,
}

impl AccessResolver {
    pub fn new(directory: Arc<dyn TenantDirectory>, memberships: Arc<dyn MembershipSource>) -> Self {
        Self {
            directory,
            memberships,
        }
    }

    /// The tenants `ctx`'s principal may act on.
    ///
    /// Computed on the first call for a given context; later calls with the
    /// same context return the same `Arc` without touching the upstream.
    pub async fn accessible_tenants(&self, ctx: &RequestContext) -> Arc<AccessSet> {
        ctx.access
            .get_or_init(|| async { Arc::new(self.compute(ctx.principal()).await) })
            .await
            .clone()
    }

    /// Whether `ctx`'s principal may act on `tenant_id`.
    pub async fn can_access(&self, ctx: &RequestContext, tenant_id: TenantId) -> bool {
        let allowed = self.accessible_tenants(ctx).await.contains(tenant_id);
        if !allowed {
            tracing::debug!(
                request_id = %ctx.request_id(),
                principal = %ctx.principal().principal_id,
                tenant_id = %tenant_id,
                "tenant access denied"
            );
        }
        allowed
    }

    /// Compute an access set without memoisation.
    pub async fn compute(&self, principal: &Principal) -> AccessSet {
        match self.lookup(principal).await {
            Ok(records) => {
                let set = AccessSet::new(records);
                tracing::debug!(
                    principal = %principal.principal_id,
                    role = %principal.role,
                    tenants = set.len(),
                    "access set computed"
                );
                set
            }
            Err(err) => {
                tracing::warn!(
                    principal = %principal.principal_id,
                    role = %principal.role,
                    error = %err,
                    "access lookup failed, denying all tenants"
                );
                AccessSet::empty()
            }
        }
    }

    async fn lookup(&self, principal: &Principal) -> Result<Vec<TenantRecord>, LookupError> {
        if principal.is_super_admin() {
            return self.directory.list_dashboard_tenants().await;
        }
        let ids = self
            .memberships
            .tenant_ids_for(&principal.principal_id)
            .await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.directory.find_by_ids(&ids).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_ids_collapse() {
        let set = AccessSet::new(vec![
            TenantRecord::new(1, "One", "one"),
            TenantRecord::new(1, "One again", "one-again"),
            TenantRecord::new(2, "Two", "two"),
        ]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(TenantId(1)).map(|r| r.permalink.as_str()), Some("one"));
    }

    #[test]
    fn empty_set_contains_nothing() {
        let set = AccessSet::empty();
        assert!(set.is_empty());
        assert!(!set.contains(TenantId(0)));
    }
}
