use std::time::Duration;

use tenantgate::prelude::*;
use tenantgate_core::{InMemoryDirectory, InMemoryMemberships};

struct Fixture {
    directory: InMemoryDirectory,
    memberships: InMemoryMemberships,
    gate: TenantGate,
}

fn fixture_with(config: GateConfig) -> Fixture {
    let directory = InMemoryDirectory::new();
    directory.insert(TenantRecord::new(42, "Acme Roofing", "acme-roofing"));
    directory.insert(TenantRecord::new(99, "Globex", "globex"));

    let memberships = InMemoryMemberships::new();
    memberships.link("alice", 42);
    memberships.link("bob", 99);

    let gate = TenantGate::new(config, directory.clone(), memberships.clone()).unwrap();
    Fixture {
        directory,
        memberships,
        gate,
    }
}

fn fixture() -> Fixture {
    fixture_with(GateConfig::default())
}

fn short_ttl_config() -> GateConfig {
    GateConfig::from_yaml_str(
        "cache:\n  positive_ttl_secs: 10\n  negative_ttl_secs: 5\n  stale_grace_secs: 5\n  sweep_interval_secs: 1\n",
    )
    .unwrap()
}

#[test]
fn test_new_rejects_invalid_config() {
    let mut config = GateConfig::default();
    config.cache.negative_ttl_secs = config.cache.positive_ttl_secs;

    let result = TenantGate::new(config, InMemoryDirectory::new(), InMemoryMemberships::new());
    assert!(matches!(
        result,
        Err(ConfigError::Invalid { key: "cache.negative_ttl_secs", .. })
    ));
}

#[tokio::test]
async fn test_resolve_then_authorize() {
    let f = fixture();

    let tenant = f.gate.resolve("acme-roofing").await.unwrap();
    assert_eq!(tenant.tenant_id, TenantId(42));

    let alice = RequestContext::new("sess-a", Principal::standard("alice"));
    let bob = RequestContext::new("sess-b", Principal::standard("bob"));
    assert!(f.gate.can_access(&alice, tenant.tenant_id).await);
    assert!(!f.gate.can_access(&bob, tenant.tenant_id).await);

    // Served from cache the second time.
    f.gate.resolve("acme-roofing").await.unwrap();
    assert_eq!(f.directory.lookups(), 1);
}

#[tokio::test]
async fn test_observe_records_request_metadata() {
    let f = fixture();
    let ctx = RequestContext::new("sess-a", Principal::standard("alice"))
        .with_ip_address("198.51.100.4")
        .with_user_agent("curl/8.5");

    let anomalies = f
        .gate
        .observe(&ctx, EventKind::TenantSwitch, Some(TenantId(42)))
        .await;
    assert!(anomalies.is_empty());

    let events = f.gate.monitor().events_for("sess-a");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].principal_id.as_deref(), Some("alice"));
    assert_eq!(events[0].tenant_id, Some(TenantId(42)));
    assert_eq!(events[0].ip_address.as_deref(), Some("198.51.100.4"));
    assert_eq!(events[0].user_agent.as_deref(), Some("curl/8.5"));
}

#[tokio::test]
async fn test_observe_flags_unauthorized_switch() {
    let f = fixture();
    let ctx = RequestContext::new("sess-a", Principal::standard("alice"));

    let anomalies = f
        .gate
        .observe(&ctx, EventKind::TenantSwitch, Some(TenantId(99)))
        .await;
    assert_eq!(anomalies.len(), 1);
    assert_eq!(anomalies[0].kind, AnomalyKind::UnauthorizedTenantAccess);

    // Observation reuses the request's access set.
    f.gate.can_access(&ctx, TenantId(42)).await;
    assert_eq!(f.memberships.lookups(), 1);
}

#[tokio::test]
async fn test_observe_detects_session_bleeding() {
    let f = fixture();
    let first = RequestContext::new("shared", Principal::standard("alice"));
    let second = RequestContext::new("shared", Principal::standard("bob"));

    assert!(f.gate.observe(&first, EventKind::Login, None).await.is_empty());
    let anomalies = f.gate.observe(&second, EventKind::Login, None).await;

    assert_eq!(anomalies.len(), 1);
    assert_eq!(anomalies[0].kind, AnomalyKind::MultiPrincipalSession);
    assert_eq!(anomalies[0].severity, Severity::Critical);
}

#[tokio::test]
async fn test_diagnostics_are_super_admin_only() {
    let f = fixture();
    let user = RequestContext::new("sess-a", Principal::standard("alice"));
    let admin = RequestContext::new("sess-root", Principal::super_admin("root"));

    f.gate
        .observe(&user, EventKind::ResourceAccess, Some(TenantId(42)))
        .await;

    assert!(f.gate.diagnostics(&user).is_none());
    let report = f.gate.diagnostics(&admin).unwrap();
    assert_eq!(report.events.len(), 1);
    assert_eq!(report.health, 100);
}

#[tokio::test(start_paused = true)]
async fn test_sweep_purges_expired_entries() {
    let f = fixture_with(short_ttl_config());
    f.gate.resolve("acme-roofing").await.unwrap();
    f.gate.resolve("missing").await;

    assert_eq!(f.gate.sweep(), SweepStats::default());

    tokio::time::advance(Duration::from_secs(16)).await;
    let stats = f.gate.sweep();
    assert_eq!(stats.cache_entries, 2);
    assert!(f.gate.resolver().cache().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_maintenance_task_sweeps_until_cancelled() {
    let f = fixture_with(short_ttl_config());
    f.gate.resolve("acme-roofing").await.unwrap();
    assert_eq!(f.gate.resolver().cache().len(), 1);

    let token = CancellationToken::new();
    let handle = f.gate.spawn_maintenance(token.clone());

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert!(f.gate.resolver().cache().is_empty());

    token.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_clones_share_state() {
    let f = fixture();
    let other = f.gate.clone();

    f.gate.resolve("acme-roofing").await.unwrap();
    other.resolve("acme-roofing").await.unwrap();
    assert_eq!(f.directory.lookups(), 1);

    let ctx = RequestContext::new("s", Principal::standard("alice"));
    other.observe(&ctx, EventKind::Login, None).await;
    assert_eq!(f.gate.monitor().session_count(), 1);
}
