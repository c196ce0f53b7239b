//! Permalink to tenant resolution.
//!
//! [`TenantResolver`] wraps any [`TenantDirectory`] and adds positive and
//! negative caching, per-permalink backoff when the directory throttles us,
//! and stale-cache fallback while the directory is unavailable.
//!
//! # Usage pattern
//!
//! ```ignore
//! use std::sync::Arc;
//! use tenantgate_tenant::TenantResolver;
//!
//! let resolver = TenantResolver::from_config(Arc::new(directory), &config);
//!
//! match resolver.resolve("acme-roofing").await {
//!     Some(tenant) => { /* serve tenant-scoped page */ }
//!     None => { /* 404 */ }
//! }
//!
//! // After an admin edits the tenant
//! resolver.invalidate_tenant(tenant.tenant_id);
//! ```
//!
//! # Resolution order
//!
//! 1. A negative entry for the permalink answers "no such tenant" without an
//!    upstream call.
//! 2. A fresh positive entry is returned as is.
//! 3. While the permalink is blocked by backoff, an expired entry still in
//!    the cache's stale grace period is served; otherwise the lookup fails.
//! 4. Otherwise the directory is queried, bounded by the lookup timeout.
//!
//! Concurrent resolutions of an uncached permalink each reach the directory;
//! there is no single-flight coalescing.

use std::sync::Arc;
use std::time::Duration;

use tenantgate_cache::{CacheStats, Invalidation, TagCache};
use tenantgate_core::{GateConfig, LookupError, ResolveError, TenantDirectory, TenantId, TenantRecord};
use tenantgate_rate_limit::{BackoffPolicy, BackoffTracker};

/// Tag carried by every entry the resolver writes.
pub const TENANT_TAG: &str = "tenant";

/// Default TTL of a resolved tenant.
pub const POSITIVE_TTL: Duration = Duration::from_secs(15 * 60);

/// Default TTL of a "no such permalink" entry. Short, so a just-created
/// tenant becomes visible quickly.
pub const NEGATIVE_TTL: Duration = Duration::from_secs(2 * 60);

/// Default bound on a single directory lookup.
pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Default time an expired entry remains available for stale fallback.
pub const STALE_GRACE: Duration = Duration::from_secs(60 * 60);

/// What the resolver keeps in its cache.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedTenant {
    Found(TenantRecord),
    /// Negative entry: the directory said the permalink does not exist.
    Invalid,
}

/// Where a resolved record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    Cache,
    Upstream,
    /// An expired entry served because the directory is throttling or timing out.
    Stale,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub record: TenantRecord,
    pub source: ResolutionSource,
}

#[derive(Debug, Clone)]
pub struct ResolverOptions {
    pub positive_ttl: Duration,
    pub negative_ttl: Duration,
    pub lookup_timeout: Duration,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            positive_ttl: POSITIVE_TTL,
            negative_ttl: NEGATIVE_TTL,
            lookup_timeout: LOOKUP_TIMEOUT,
        }
    }
}

impl From<&GateConfig> for ResolverOptions {
    fn from(config: &GateConfig) -> Self {
        Self {
            positive_ttl: config.cache.positive_ttl(),
            negative_ttl: config.cache.negative_ttl(),
            lookup_timeout: config.resolver.lookup_timeout(),
        }
    }
}

fn positive_key(permalink: &str) -> String {
    format!("tenant:{permalink}")
}

fn negative_key(permalink: &str) -> String {
    format!("tenant:invalid:{permalink}")
}

/// Clonable handle resolving permalinks to tenant records.
///
/// The cache and backoff tracker are injected, so several resolvers (or a
/// resolver and an admin tool) can share them, and tests can build isolated
/// instances.
#[derive(Clone)]
pub struct TenantResolver {
    directory: Arc<dyn TenantDirectory>,
    cache: TagCache<CachedTenant>,
    backoff: BackoffTracker,
    options: ResolverOptions,
}

impl TenantResolver {
    pub fn new(
        directory: Arc<dyn TenantDirectory>,
        cache: TagCache<CachedTenant>,
        backoff: BackoffTracker,
        options: ResolverOptions,
    ) -> Self {
        Self {
            directory,
            cache,
            backoff,
            options,
        }
    }

    /// Create a resolver with default TTLs, backoff schedule and timeout.
    pub fn with_defaults(directory: impl TenantDirectory) -> Self {
        Self::new(
            Arc::new(directory),
            TagCache::with_stale_grace(STALE_GRACE),
            BackoffTracker::default(),
            ResolverOptions::default(),
        )
    }

    /// Create a resolver with a fresh cache and tracker sized from `config`.
    pub fn from_config(directory: Arc<dyn TenantDirectory>, config: &GateConfig) -> Self {
        Self::new(
            directory,
            TagCache::with_stale_grace(config.cache.stale_grace()),
            BackoffTracker::new(BackoffPolicy::from(&config.backoff)),
            ResolverOptions::from(config),
        )
    }

    // ── Resolve ────────────────────────────────────────────────────────

    /// Resolve `permalink` to its tenant, or `None` when it cannot be resolved.
    pub async fn resolve(&self, permalink: &str) -> Option<TenantRecord> {
        self.resolve_detailed(permalink)
            .await
            .ok()
            .map(|resolved| resolved.record)
    }

    /// Resolve `permalink`, reporting where the record came from or why the
    /// resolution failed.
    pub async fn resolve_detailed(&self, permalink: &str) -> Result<Resolved, ResolveError> {
        let permalink = permalink.trim();
        if permalink.is_empty() {
            return Err(ResolveError::NotFound);
        }
        let positive = positive_key(permalink);
        let negative = negative_key(permalink);

        if self.cache.contains(&negative) {
            tracing::trace!(permalink, "negative cache hit");
            return Err(ResolveError::NotFound);
        }

        if let Some(CachedTenant::Found(record)) = self.cache.get(&positive) {
            tracing::trace!(permalink, tenant_id = %record.tenant_id, "cache hit");
            return Ok(Resolved {
                record,
                source: ResolutionSource::Cache,
            });
        }

        if self.backoff.is_blocked(permalink) {
            tracing::debug!(permalink, "lookup skipped while backing off");
            return self.stale_or(permalink, &positive, ResolveError::RateLimited);
        }

        tracing::debug!(permalink, "tenant lookup");
        let lookup = self.directory.find_by_permalink(permalink);
        match tokio::time::timeout(self.options.lookup_timeout, lookup).await {
            Ok(Ok(record)) => {
                let tenant_tag = record.tenant_id.cache_tag();
                self.cache.set(
                    &positive,
                    CachedTenant::Found(record.clone()),
                    self.options.positive_ttl,
                    &[TENANT_TAG, &tenant_tag],
                );
                self.backoff.clear(permalink);
                Ok(Resolved {
                    record,
                    source: ResolutionSource::Upstream,
                })
            }
            Ok(Err(LookupError::NotFound)) => {
                self.cache.invalidate(Invalidation::key(&positive));
                self.cache.set(
                    &negative,
                    CachedTenant::Invalid,
                    self.options.negative_ttl,
                    &[TENANT_TAG],
                );
                self.backoff.clear(permalink);
                Err(ResolveError::NotFound)
            }
            Ok(Err(LookupError::RateLimited { retry_after })) => {
                let delay = self.backoff.record_failure(permalink, retry_after);
                tracing::warn!(
                    permalink,
                    delay_ms = delay.as_millis() as u64,
                    "tenant lookup rate limited"
                );
                self.stale_or(permalink, &positive, ResolveError::RateLimited)
            }
            Ok(Err(LookupError::Transient(msg))) => {
                tracing::warn!(permalink, error = %msg, "tenant lookup failed");
                Err(ResolveError::Transient(msg))
            }
            Err(_elapsed) => {
                let delay = self.backoff.record_failure(permalink, None);
                tracing::warn!(
                    permalink,
                    timeout_ms = self.options.lookup_timeout.as_millis() as u64,
                    delay_ms = delay.as_millis() as u64,
                    "tenant lookup timed out"
                );
                self.stale_or(
                    permalink,
                    &positive,
                    ResolveError::Transient("tenant lookup timed out".into()),
                )
            }
        }
    }

    fn stale_or(
        &self,
        permalink: &str,
        positive: &str,
        err: ResolveError,
    ) -> Result<Resolved, ResolveError> {
        match self.cache.get_stale(positive) {
            Some(CachedTenant::Found(record)) => {
                tracing::warn!(permalink, tenant_id = %record.tenant_id, "serving stale tenant");
                Ok(Resolved {
                    record,
                    source: ResolutionSource::Stale,
                })
            }
            _ => Err(err),
        }
    }

    // ── Cache management ───────────────────────────────────────────────

    /// Drop the positive and negative entries for `permalink` and its
    /// backoff state.
    ///
    /// Call this when a tenant's permalink or dashboard flag changes.
    pub fn invalidate(&self, permalink: &str) {
        let permalink = permalink.trim();
        self.cache.invalidate(Invalidation::key(&positive_key(permalink)));
        self.cache.invalidate(Invalidation::key(&negative_key(permalink)));
        self.backoff.clear(permalink);
    }

    /// Drop every entry describing `tenant_id`, whatever permalink it was
    /// resolved through.
    pub fn invalidate_tenant(&self, tenant_id: TenantId) {
        let tag = tenant_id.cache_tag();
        let removed = self.cache.invalidate(Invalidation::tags(&[&tag]));
        tracing::debug!(tenant_id = %tenant_id, removed, "tenant invalidated");
    }

    /// Drop every entry the resolver wrote, positive and negative.
    pub fn invalidate_all(&self) {
        self.cache.invalidate(Invalidation::tags(&[TENANT_TAG]));
    }

    /// Hit/miss counters of the underlying cache.
    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// The cache this resolver writes to.
    pub fn cache(&self) -> &TagCache<CachedTenant> {
        &self.cache
    }

    /// The backoff tracker guarding directory lookups.
    pub fn backoff(&self) -> &BackoffTracker {
        &self.backoff
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }
}
