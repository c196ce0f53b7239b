//! Upstream collaborator traits and their in-memory implementations.
//!
//! [`TenantDirectory`] and [`MembershipSource`] are the only seams through
//! which tenantgate talks to the backing store. Implement them over your
//! database client; the in-memory versions here back the test suites.
//!
//! ```ignore
//! use tenantgate_core::{InMemoryDirectory, TenantRecord};
//!
//! let directory = InMemoryDirectory::new();
//! directory.insert(TenantRecord::new(42, "Acme Roofing", "acme-roofing"));
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;

use crate::error::LookupError;
use crate::types::{TenantId, TenantRecord};

/// Boxed future returned by the upstream traits.
pub type LookupFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, LookupError>> + Send + 'a>>;

/// Tenant lookups against the backing store.
pub trait TenantDirectory: Send + Sync + 'static {
    /// Find the tenant whose permalink is `permalink`.
    ///
    /// Must return [`LookupError::NotFound`] when no tenant matches, and
    /// [`LookupError::RateLimited`] when the store throttles the call.
    fn find_by_permalink<'a>(&'a self, permalink: &'a str) -> LookupFuture<'a, TenantRecord>;

    /// All tenants whose dashboard is enabled.
    fn list_dashboard_tenants(&self) -> LookupFuture<'_, Vec<TenantRecord>>;

    /// The tenants matching `ids`. Unknown ids are skipped.
    fn find_by_ids<'a>(&'a self, ids: &'a [TenantId]) -> LookupFuture<'a, Vec<TenantRecord>>;
}

/// The external membership table linking principals to tenants.
pub trait MembershipSource: Send + Sync + 'static {
    fn tenant_ids_for<'a>(&'a self, principal_id: &'a str) -> LookupFuture<'a, Vec<TenantId>>;
}

// ── InMemoryDirectory ──────────────────────────────────────────────────

/// In-memory tenant directory.
///
/// Besides storing records it can script failures for the next permalink
/// lookups, add artificial latency, and counts how many permalink lookups
/// reached it.
#[derive(Clone, Default)]
pub struct InMemoryDirectory {
    tenants: Arc<DashMap<TenantId, TenantRecord>>,
    scripted: Arc<Mutex<VecDeque<LookupError>>>,
    listing_failure: Arc<Mutex<Option<LookupError>>>,
    latency: Arc<Mutex<Option<Duration>>>,
    lookups: Arc<AtomicUsize>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a tenant.
    pub fn insert(&self, record: TenantRecord) {
        self.tenants.insert(record.tenant_id, record);
    }

    /// Remove a tenant.
    pub fn remove(&self, tenant_id: TenantId) {
        self.tenants.remove(&tenant_id);
    }

    /// Make the next permalink lookup fail with `err`. Calls queue up.
    pub fn fail_next(&self, err: LookupError) {
        if let Ok(mut queue) = self.scripted.lock() {
            queue.push_back(err);
        }
    }

    /// Make `list_dashboard_tenants` and `find_by_ids` fail until reset with `None`.
    pub fn set_listing_failure(&self, err: Option<LookupError>) {
        if let Ok(mut slot) = self.listing_failure.lock() {
            *slot = err;
        }
    }

    /// Delay every permalink lookup by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut slot) = self.latency.lock() {
            *slot = latency;
        }
    }

    /// Number of permalink lookups served so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn next_scripted(&self) -> Option<LookupError> {
        self.scripted.lock().ok().and_then(|mut q| q.pop_front())
    }

    fn listing_failure(&self) -> Option<LookupError> {
        self.listing_failure.lock().ok().and_then(|slot| slot.clone())
    }

    fn latency(&self) -> Option<Duration> {
        self.latency.lock().ok().and_then(|slot| *slot)
    }
}

impl TenantDirectory for InMemoryDirectory {
    fn find_by_permalink<'a>(&'a self, permalink: &'a str) -> LookupFuture<'a, TenantRecord> {
        Box::pin(async move {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if let Some(latency) = self.latency() {
                tokio::time::sleep(latency).await;
            }
            if let Some(err) = self.next_scripted() {
                return Err(err);
            }
            self.tenants
                .iter()
                .find(|entry| entry.permalink == permalink)
                .map(|entry| entry.value().clone())
                .ok_or(LookupError::NotFound)
        })
    }

    fn list_dashboard_tenants(&self) -> LookupFuture<'_, Vec<TenantRecord>> {
        Box::pin(async move {
            if let Some(err) = self.listing_failure() {
                return Err(err);
            }
            let mut records: Vec<TenantRecord> = self
                .tenants
                .iter()
                .filter(|entry| entry.dashboard_enabled)
                .map(|entry| entry.value().clone())
                .collect();
            records.sort_by_key(|r| r.tenant_id);
            Ok(records)
        })
    }

    fn find_by_ids<'a>(&'a self, ids: &'a [TenantId]) -> LookupFuture<'a, Vec<TenantRecord>> {
        Box::pin(async move {
            if let Some(err) = self.listing_failure() {
                return Err(err);
            }
            Ok(ids
                .iter()
                .filter_map(|id| self.tenants.get(id).map(|entry| entry.value().clone()))
                .collect())
        })
    }
}

// ── InMemoryMemberships ────────────────────────────────────────────────

/// In-memory membership table.
#[derive(Clone, Default)]
pub struct InMemoryMemberships {
    links: Arc<DashMap<String, Vec<TenantId>>>,
    failure: Arc<Mutex<Option<LookupError>>>,
    lookups: Arc<AtomicUsize>,
}

impl InMemoryMemberships {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link a principal to a tenant.
    pub fn link(&self, principal_id: &str, tenant_id: impl Into<TenantId>) {
        let tenant_id = tenant_id.into();
        let mut entry = self.links.entry(principal_id.to_string()).or_default();
        if !entry.contains(&tenant_id) {
            entry.push(tenant_id);
        }
    }

    /// Remove a link.
    pub fn unlink(&self, principal_id: &str, tenant_id: impl Into<TenantId>) {
        let tenant_id = tenant_id.into();
        if let Some(mut entry) = self.links.get_mut(principal_id) {
            entry.retain(|id| *id != tenant_id);
        }
    }

    /// Make every lookup fail with `err` until reset with `None`.
    pub fn set_failure(&self, err: Option<LookupError>) {
        if let Ok(mut slot) = self.failure.lock() {
            *slot = err;
        }
    }

    /// Number of membership lookups served so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl MembershipSource for InMemoryMemberships {
    fn tenant_ids_for<'a>(&'a self, principal_id: &'a str) -> LookupFuture<'a, Vec<TenantId>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let failure = self.failure.lock().ok().and_then(|slot| slot.clone());
        let ids = self
            .links
            .get(principal_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        Box::pin(async move {
            match failure {
                Some(err) => Err(err),
                None => Ok(ids),
            }
        })
    }
}
