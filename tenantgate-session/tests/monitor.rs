use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tenantgate_core::{TenantId, TenantRecord};
use tenantgate_security::AccessSet;
use tenantgate_session::{
    AnomalyKind, EventKind, MonitorSettings, SessionEvent, SessionMonitor, Severity,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

fn at(secs: i64) -> DateTime<Utc> {
    t0() + chrono::Duration::seconds(secs)
}

fn access(ids: &[i64]) -> AccessSet {
    AccessSet::new(
        ids.iter()
            .map(|id| TenantRecord::new(*id, format!("Tenant {id}"), format!("tenant-{id}"))),
    )
}

fn event(session: &str, principal: &str, kind: EventKind, secs: i64) -> SessionEvent {
    SessionEvent::new(session, kind)
        .with_principal(principal)
        .at(at(secs))
}

#[test]
fn test_second_principal_on_session_is_critical() {
    let monitor = SessionMonitor::default();
    let set = access(&[42]);

    let first = monitor.record_event(
        event("sess-1", "alice", EventKind::Login, 0).with_tenant(42),
        &set,
    );
    assert!(first.is_empty());

    let second = monitor.record_event(
        event("sess-1", "bob", EventKind::ResourceAccess, 1).with_tenant(42),
        &set,
    );
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].kind, AnomalyKind::MultiPrincipalSession);
    assert_eq!(second[0].severity, Severity::Critical);
    assert_eq!(second[0].session_id, "sess-1");

    let principals: Vec<Option<&str>> = second[0]
        .events
        .iter()
        .map(|e| e.principal_id.as_deref())
        .collect();
    assert_eq!(principals, vec![Some("alice"), Some("bob")]);
}

#[test]
fn test_principal_pair_is_reported_once_while_retained() {
    let monitor = SessionMonitor::default();
    let set = access(&[]);

    monitor.record_event(event("s", "alice", EventKind::Login, 0), &set);
    assert_eq!(
        monitor
            .record_event(event("s", "bob", EventKind::Login, 1), &set)
            .len(),
        1
    );
    assert!(monitor
        .record_event(event("s", "alice", EventKind::Login, 2), &set)
        .is_empty());
    assert!(monitor
        .record_event(event("s", "bob", EventKind::Login, 3), &set)
        .is_empty());

    // A third principal forms a new pair.
    let third = monitor.record_event(event("s", "carol", EventKind::Login, 4), &set);
    assert_eq!(third.len(), 1);
    assert_eq!(third[0].kind, AnomalyKind::MultiPrincipalSession);
}

#[test]
fn test_anonymous_events_never_bleed() {
    let monitor = SessionMonitor::default();
    let set = access(&[]);

    monitor.record_event(SessionEvent::new("s", EventKind::Login).at(at(0)), &set);
    let anomalies = monitor.record_event(event("s", "alice", EventKind::Login, 1), &set);
    assert!(anomalies.is_empty());
}

#[test]
fn test_sessions_are_independent() {
    let monitor = SessionMonitor::default();
    let set = access(&[]);

    monitor.record_event(event("s1", "alice", EventKind::Login, 0), &set);
    let anomalies = monitor.record_event(event("s2", "bob", EventKind::Login, 1), &set);
    assert!(anomalies.is_empty());
    assert_eq!(monitor.session_count(), 2);
}

#[test]
fn test_switch_outside_access_set_is_unauthorized() {
    let monitor = SessionMonitor::default();
    let set = access(&[42]);

    monitor.record_event(event("s", "p", EventKind::Login, 0), &set);
    assert!(monitor
        .record_event(event("s", "p", EventKind::TenantSwitch, 1).with_tenant(42), &set)
        .is_empty());

    let anomalies =
        monitor.record_event(event("s", "p", EventKind::TenantSwitch, 2).with_tenant(99), &set);
    assert_eq!(anomalies.len(), 1);
    assert_eq!(anomalies[0].kind, AnomalyKind::UnauthorizedTenantAccess);
    assert_eq!(anomalies[0].severity, Severity::High);
    assert_eq!(anomalies[0].events[0].tenant_id, Some(TenantId(99)));
}

#[test]
fn test_resource_access_outside_access_set_is_unauthorized() {
    let monitor = SessionMonitor::default();
    let anomalies = monitor.record_event(
        event("s", "p", EventKind::ResourceAccess, 0).with_tenant(7),
        &access(&[42]),
    );
    assert_eq!(anomalies.len(), 1);
    assert_eq!(anomalies[0].kind, AnomalyKind::UnauthorizedTenantAccess);
}

#[test]
fn test_login_is_not_an_access_check() {
    let monitor = SessionMonitor::default();
    let anomalies = monitor.record_event(
        event("s", "p", EventKind::Login, 0).with_tenant(7),
        &access(&[]),
    );
    assert!(anomalies.is_empty());
}

#[test]
fn test_rapid_tenant_switching_is_flagged_once() {
    let monitor = SessionMonitor::default();
    let set = access(&[1, 2, 3, 4, 5, 6, 7, 8]);

    for (i, tenant) in (1..=5i64).enumerate() {
        let anomalies = monitor.record_event(
            event("s", "root", EventKind::TenantSwitch, i as i64 * 5).with_tenant(tenant),
            &set,
        );
        assert!(anomalies.is_empty(), "switch {tenant} flagged too early");
    }

    let sixth =
        monitor.record_event(event("s", "root", EventKind::TenantSwitch, 30).with_tenant(6), &set);
    assert_eq!(sixth.len(), 1);
    assert_eq!(sixth[0].kind, AnomalyKind::RapidTenantSwitch);
    assert_eq!(sixth[0].severity, Severity::Medium);
    assert_eq!(sixth[0].events.len(), 6);

    // Still inside the same burst.
    let seventh =
        monitor.record_event(event("s", "root", EventKind::TenantSwitch, 35).with_tenant(7), &set);
    assert!(seventh.is_empty());
}

#[test]
fn test_slow_tenant_switching_is_not_flagged() {
    let monitor = SessionMonitor::default();
    let set = access(&[1, 2, 3, 4, 5, 6, 7, 8]);

    for tenant in 1..=8i64 {
        let anomalies = monitor.record_event(
            event("s", "root", EventKind::TenantSwitch, tenant * 15).with_tenant(tenant),
            &set,
        );
        assert!(anomalies.is_empty());
    }
}

#[test]
fn test_repeated_switches_between_two_tenants_are_not_rapid() {
    let monitor = SessionMonitor::default();
    let set = access(&[1, 2]);

    for i in 0..10i64 {
        let tenant = 1 + i % 2;
        let anomalies = monitor.record_event(
            event("s", "p", EventKind::TenantSwitch, i).with_tenant(tenant),
            &set,
        );
        assert!(anomalies.is_empty());
    }
}

#[test]
fn test_ring_buffer_evicts_oldest() {
    let monitor = SessionMonitor::new(MonitorSettings {
        buffer_capacity: 3,
        ..MonitorSettings::default()
    });
    let set = access(&[1, 2, 3, 4, 5]);

    for tenant in 1..=5i64 {
        monitor.record_event(
            event("s", "p", EventKind::ResourceAccess, tenant).with_tenant(tenant),
            &set,
        );
    }
    let events = monitor.events_for("s");
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].tenant_id, Some(TenantId(3)));
    assert_eq!(events[2].tenant_id, Some(TenantId(5)));
}

#[test]
fn test_evicted_principal_no_longer_bleeds() {
    let monitor = SessionMonitor::new(MonitorSettings {
        buffer_capacity: 2,
        ..MonitorSettings::default()
    });
    let set = access(&[]);

    monitor.record_event(event("s", "alice", EventKind::Login, 0), &set);
    monitor.record_event(SessionEvent::new("s", EventKind::ResourceAccess).at(at(1)), &set);
    monitor.record_event(SessionEvent::new("s", EventKind::ResourceAccess).at(at(2)), &set);

    let anomalies = monitor.record_event(event("s", "bob", EventKind::Login, 3), &set);
    assert!(anomalies.is_empty());
}

#[test]
fn test_bleeding_recurs_after_first_incident_is_evicted() {
    let monitor = SessionMonitor::new(MonitorSettings {
        buffer_capacity: 2,
        ..MonitorSettings::default()
    });
    let set = access(&[]);

    monitor.record_event(event("s", "alice", EventKind::Login, 0), &set);
    let first = monitor.record_event(event("s", "bob", EventKind::Login, 1), &set);
    assert_eq!(first.len(), 1);

    // Both principals leave the retained window.
    monitor.record_event(SessionEvent::new("s", EventKind::ResourceAccess).at(at(2)), &set);
    monitor.record_event(SessionEvent::new("s", EventKind::ResourceAccess).at(at(3)), &set);

    assert!(monitor
        .record_event(event("s", "alice", EventKind::Login, 4), &set)
        .is_empty());
    let second = monitor.record_event(event("s", "bob", EventKind::Login, 5), &set);
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].kind, AnomalyKind::MultiPrincipalSession);
    assert_eq!(second[0].events[0].timestamp, at(4));
    assert_eq!(monitor.anomalies_for("s").len(), 2);
}

#[test]
fn test_report_health_and_counts() {
    let monitor = SessionMonitor::default();
    let set = access(&[42]);
    assert_eq!(monitor.health(), 100);

    monitor.record_event(event("s1", "alice", EventKind::Login, 0), &set);
    monitor.record_event(event("s1", "alice", EventKind::TenantSwitch, 1).with_tenant(42), &set);
    monitor.record_event(event("s1", "alice", EventKind::ResourceAccess, 2).with_tenant(42), &set);
    monitor.record_event(event("s2", "bob", EventKind::TenantSwitch, 3).with_tenant(99), &set);

    let report = monitor.report();
    assert_eq!(report.health, 75);
    assert_eq!(report.sessions, 2);
    assert_eq!(report.events.len(), 4);
    assert!(report.events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert_eq!(report.anomalies.len(), 1);
    assert_eq!(report.counts.unauthorized_tenant_access, 1);
    assert_eq!(report.counts.multi_principal_session, 0);

    assert_eq!(monitor.anomalies_for("s2").len(), 1);
    assert!(monitor.anomalies_for("s1").is_empty());
}

#[test]
fn test_anomaly_log_is_bounded() {
    let monitor = SessionMonitor::new(MonitorSettings {
        anomaly_log_capacity: 2,
        ..MonitorSettings::default()
    });
    let set = access(&[]);
    for i in 0..5i64 {
        monitor.record_event(
            event("s", "p", EventKind::ResourceAccess, i).with_tenant(i + 100),
            &set,
        );
    }
    let report = monitor.report();
    assert_eq!(report.anomalies.len(), 2);
    assert_eq!(report.anomalies[1].events[0].tenant_id, Some(TenantId(104)));
    assert_eq!(report.health, 0);
}

#[test]
fn test_clear_discards_everything() {
    let monitor = SessionMonitor::default();
    let set = access(&[]);
    monitor.record_event(event("s", "alice", EventKind::Login, 0), &set);
    monitor.record_event(event("s", "bob", EventKind::Login, 1), &set);

    monitor.clear();
    let report = monitor.report();
    assert!(report.events.is_empty());
    assert!(report.anomalies.is_empty());
    assert_eq!(report.sessions, 0);
    assert_eq!(report.health, 100);

    // History is gone, so the pair is new again.
    monitor.record_event(event("s", "alice", EventKind::Login, 2), &set);
    assert_eq!(
        monitor
            .record_event(event("s", "bob", EventKind::Login, 3), &set)
            .len(),
        1
    );
}

#[test]
fn test_prune_idle_sessions() {
    let monitor = SessionMonitor::new(MonitorSettings {
        idle_session_ttl: Duration::from_secs(3600),
        ..MonitorSettings::default()
    });
    let set = access(&[]);
    monitor.record_event(event("old", "a", EventKind::Login, 0), &set);
    monitor.record_event(event("fresh", "b", EventKind::Login, 3 * 3600), &set);

    assert_eq!(monitor.prune_idle(at(3 * 3600 + 60)), 1);
    assert!(monitor.events_for("old").is_empty());
    assert_eq!(monitor.events_for("fresh").len(), 1);
}

#[test]
fn test_report_serializes_snake_case() {
    let monitor = SessionMonitor::default();
    monitor.record_event(
        event("s", "p", EventKind::TenantSwitch, 0).with_tenant(5),
        &access(&[]),
    );
    let json = serde_json::to_value(monitor.report()).unwrap();
    assert_eq!(json["anomalies"][0]["kind"], "unauthorized_tenant_access");
    assert_eq!(json["anomalies"][0]["severity"], "high");
    assert_eq!(json["events"][0]["kind"], "tenant_switch");
    assert_eq!(json["events"][0]["tenant_id"], 5);
}

#[test]
fn test_concurrent_sessions() {
    let monitor = SessionMonitor::default();
    let set = access(&[1]);

    std::thread::scope(|scope| {
        for n in 0..8 {
            let monitor = monitor.clone();
            let set = &set;
            scope.spawn(move || {
                for i in 0..10i64 {
                    monitor.record_event(
                        event(&format!("s{n}"), &format!("p{n}"), EventKind::ResourceAccess, i)
                            .with_tenant(1),
                        set,
                    );
                }
            });
        }
    });

    let report = monitor.report();
    assert_eq!(report.sessions, 8);
    assert_eq!(report.events.len(), 80);
    assert!(report.anomalies.is_empty());
}
