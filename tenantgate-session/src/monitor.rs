use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tenantgate_core::{SessionSettings, TenantId};
use tenantgate_security::AccessSet;

use crate::event::{Anomaly, AnomalyKind, EventKind, SessionEvent};

/// Limits and thresholds of a [`SessionMonitor`].
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// Events retained per session; the oldest is evicted first.
    pub buffer_capacity: usize,
    /// Distinct tenants a principal may switch between inside the window
    /// before it is flagged.
    pub rapid_switch_threshold: usize,
    pub rapid_switch_window: Duration,
    pub anomaly_log_capacity: usize,
    pub health_window: usize,
    pub idle_session_ttl: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self::from(&SessionSettings::default())
    }
}

impl From<&SessionSettings> for MonitorSettings {
    fn from(settings: &SessionSettings) -> Self {
        Self {
            buffer_capacity: settings.buffer_capacity,
            rapid_switch_threshold: settings.rapid_switch_threshold,
            rapid_switch_window: settings.rapid_switch_window(),
            anomaly_log_capacity: settings.anomaly_log_capacity,
            health_window: settings.health_window,
            idle_session_ttl: settings.idle_session_ttl(),
        }
    }
}

/// Anomaly totals by kind, over the retained anomaly log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AnomalyCounts {
    pub multi_principal_session: usize,
    pub rapid_tenant_switch: usize,
    pub unauthorized_tenant_access: usize,
}

impl AnomalyCounts {
    fn add(&mut self, kind: AnomalyKind) {
        match kind {
            AnomalyKind::MultiPrincipalSession => self.multi_principal_session += 1,
            AnomalyKind::RapidTenantSwitch => self.rapid_tenant_switch += 1,
            AnomalyKind::UnauthorizedTenantAccess => self.unauthorized_tenant_access += 1,
        }
    }
}

/// Diagnostic snapshot of the monitor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorReport {
    /// Retained events of every session, oldest first.
    pub events: Vec<SessionEvent>,
    pub anomalies: Vec<Anomaly>,
    /// 0 to 100: share of recently recorded events that raised no anomaly.
    pub health: u8,
    pub sessions: usize,
    pub counts: AnomalyCounts,
}

#[derive(Default)]
struct SessionHistory {
    events: VecDeque<SessionEvent>,
    /// Principal pairs already reported as sharing this session, stored
    /// sorted. A pair is kept only while both principals are retained.
    reported_pairs: HashSet<(String, String)>,
    /// Principals currently flagged for rapid switching.
    rapid_flagged: HashSet<Option<String>>,
    last_seen: Option<DateTime<Utc>>,
}

impl SessionHistory {
    /// Forget reported pairs and rapid-switch flags whose principals have
    /// left the retained events, so a later recurrence is reported afresh.
    fn forget_departed(&mut self) {
        let retained: HashSet<Option<&str>> = self
            .events
            .iter()
            .map(|e| e.principal_id.as_deref())
            .collect();
        self.reported_pairs.retain(|(a, b)| {
            retained.contains(&Some(a.as_str())) && retained.contains(&Some(b.as_str()))
        });
        self.rapid_flagged
            .retain(|principal| retained.contains(&principal.as_deref()));
    }
}

#[derive(Default)]
struct MonitorLog {
    anomalies: VecDeque<Anomaly>,
    /// `true` per recorded event that raised no anomaly.
    outcomes: VecDeque<bool>,
}

/// Incremental session integrity checks.
///
/// Per-session histories live in a sharded map; recording an event locks
/// only that session's shard, so events of one session are evaluated in
/// arrival order while sessions proceed independently.
///
/// ```ignore
/// let monitor = SessionMonitor::new(MonitorSettings::default());
/// let access = access_resolver.accessible_tenants(&ctx).await;
/// for anomaly in monitor.record_event(event, &access) {
///     // already logged; forward to alerting if wanted
/// }
/// ```
#[derive(Clone)]
pub struct SessionMonitor {
    sessions: Arc<DashMap<String, SessionHistory>>,
    log: Arc<Mutex<MonitorLog>>,
    settings: MonitorSettings,
}

impl Default for SessionMonitor {
    fn default() -> Self {
        Self::new(MonitorSettings::default())
    }
}

impl SessionMonitor {
    pub fn new(settings: MonitorSettings) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            log: Arc::new(Mutex::new(MonitorLog::default())),
            settings,
        }
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    fn lock_log(&self) -> Option<MutexGuard<'_, MonitorLog>> {
        match self.log.lock() {
            Ok(guard) => Some(guard),
            Err(_) => {
                tracing::warn!("session monitor log poisoned, dropping diagnostics");
                None
            }
        }
    }

    /// Append `event` to its session and return the anomalies it raised.
    ///
    /// `access` is the access set of the request that produced the event;
    /// tenant switches and resource accesses outside it are flagged.
    pub fn record_event(&self, event: SessionEvent, access: &AccessSet) -> Vec<Anomaly> {
        let capacity = self.settings.buffer_capacity.max(1);
        let mut anomalies = Vec::new();
        {
            let mut history = self.sessions.entry(event.session_id.clone()).or_default();
            if history.events.len() == capacity {
                history.events.pop_front();
            }
            history.events.push_back(event.clone());
            history.forget_departed();
            history.last_seen = Some(match history.last_seen {
                Some(seen) => seen.max(event.timestamp),
                None => event.timestamp,
            });

            if let Some(anomaly) = self.check_multi_principal(&mut history, &event) {
                anomalies.push(anomaly);
            }
            if let Some(anomaly) = self.check_rapid_switch(&mut history, &event) {
                anomalies.push(anomaly);
            }
        }
        if let Some(anomaly) = check_unauthorized(&event, access) {
            anomalies.push(anomaly);
        }

        for anomaly in &anomalies {
            tracing::warn!(
                kind = %anomaly.kind,
                severity = %anomaly.severity,
                session_id = %anomaly.session_id,
                principal = ?event.principal_id,
                tenant_id = ?event.tenant_id.map(|t| t.0),
                "session anomaly detected"
            );
        }
        self.log_outcome(&anomalies);
        anomalies
    }

    fn check_multi_principal(
        &self,
        history: &mut SessionHistory,
        event: &SessionEvent,
    ) -> Option<Anomaly> {
        let principal = event.principal_id.as_deref()?;
        let previous = history
            .events
            .iter()
            .rev()
            .skip(1)
            .find(|e| matches!(e.principal_id.as_deref(), Some(p) if p != principal))?;
        let other = previous.principal_id.as_deref()?;

        let pair = if other < principal {
            (other.to_string(), principal.to_string())
        } else {
            (principal.to_string(), other.to_string())
        };
        if history.reported_pairs.contains(&pair) {
            return None;
        }
        let events = vec![previous.clone(), event.clone()];
        history.reported_pairs.insert(pair);
        Some(Anomaly::new(
            AnomalyKind::MultiPrincipalSession,
            &event.session_id,
            events,
        ))
    }

    fn check_rapid_switch(
        &self,
        history: &mut SessionHistory,
        event: &SessionEvent,
    ) -> Option<Anomaly> {
        if event.kind != EventKind::TenantSwitch {
            return None;
        }
        let window = chrono::Duration::from_std(self.settings.rapid_switch_window).ok()?;
        let cutoff = event
            .timestamp
            .checked_sub_signed(window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let in_window: Vec<&SessionEvent> = history
            .events
            .iter()
            .filter(|e| {
                e.kind == EventKind::TenantSwitch
                    && e.principal_id == event.principal_id
                    && e.tenant_id.is_some()
                    && e.timestamp > cutoff
                    && e.timestamp <= event.timestamp
            })
            .collect();
        let distinct: HashSet<TenantId> = in_window.iter().filter_map(|e| e.tenant_id).collect();

        if distinct.len() <= self.settings.rapid_switch_threshold {
            history.rapid_flagged.remove(&event.principal_id);
            return None;
        }
        if !history.rapid_flagged.insert(event.principal_id.clone()) {
            return None;
        }
        let events = in_window.into_iter().cloned().collect();
        Some(Anomaly::new(
            AnomalyKind::RapidTenantSwitch,
            &event.session_id,
            events,
        ))
    }

    fn log_outcome(&self, anomalies: &[Anomaly]) {
        let Some(mut log) = self.lock_log() else {
            return;
        };
        let window = self.settings.health_window.max(1);
        if log.outcomes.len() == window {
            log.outcomes.pop_front();
        }
        log.outcomes.push_back(anomalies.is_empty());

        let capacity = self.settings.anomaly_log_capacity;
        for anomaly in anomalies {
            if capacity == 0 {
                break;
            }
            if log.anomalies.len() == capacity {
                log.anomalies.pop_front();
            }
            log.anomalies.push_back(anomaly.clone());
        }
    }

    /// 0 to 100; 100 when nothing has been recorded yet.
    pub fn health(&self) -> u8 {
        self.lock_log().map(|log| health_of(&log.outcomes)).unwrap_or(100)
    }

    /// Full diagnostic snapshot.
    pub fn report(&self) -> MonitorReport {
        let mut events: Vec<SessionEvent> = self
            .sessions
            .iter()
            .flat_map(|entry| entry.events.iter().cloned().collect::<Vec<_>>())
            .collect();
        events.sort_by_key(|e| e.timestamp);

        let (anomalies, health) = match self.lock_log() {
            Some(log) => (log.anomalies.iter().cloned().collect(), health_of(&log.outcomes)),
            None => (Vec::new(), 100),
        };
        let mut counts = AnomalyCounts::default();
        for anomaly in &anomalies {
            counts.add(anomaly.kind);
        }

        MonitorReport {
            events,
            anomalies,
            health,
            sessions: self.sessions.len(),
            counts,
        }
    }

    /// Retained anomalies raised by `session_id`.
    pub fn anomalies_for(&self, session_id: &str) -> Vec<Anomaly> {
        self.lock_log()
            .map(|log| {
                log.anomalies
                    .iter()
                    .filter(|a| a.session_id == session_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Retained events of `session_id`, oldest first.
    pub fn events_for(&self, session_id: &str) -> Vec<SessionEvent> {
        self.sessions
            .get(session_id)
            .map(|history| history.events.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of sessions with retained history.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Drop sessions whose latest event is older than the idle TTL at `now`.
    pub fn prune_idle(&self, now: DateTime<Utc>) -> usize {
        let Ok(ttl) = chrono::Duration::from_std(self.settings.idle_session_ttl) else {
            return 0;
        };
        let Some(cutoff) = now.checked_sub_signed(ttl) else {
            return 0;
        };
        let before = self.sessions.len();
        self.sessions
            .retain(|_, history| history.last_seen.is_some_and(|seen| seen >= cutoff));
        let pruned = before.saturating_sub(self.sessions.len());
        if pruned > 0 {
            tracing::debug!(pruned, "idle sessions pruned");
        }
        pruned
    }

    /// Discard all history, anomalies and health samples.
    ///
    /// For operators and tests; request handling never calls this.
    pub fn clear(&self) {
        self.sessions.clear();
        if let Some(mut log) = self.lock_log() {
            log.anomalies.clear();
            log.outcomes.clear();
        }
    }
}

fn check_unauthorized(event: &SessionEvent, access: &AccessSet) -> Option<Anomaly> {
    if !matches!(event.kind, EventKind::TenantSwitch | EventKind::ResourceAccess) {
        return None;
    }
    let tenant_id = event.tenant_id?;
    if access.contains(tenant_id) {
        return None;
    }
    Some(Anomaly::new(
        AnomalyKind::UnauthorizedTenantAccess,
        &event.session_id,
        vec![event.clone()],
    ))
}

fn health_of(outcomes: &VecDeque<bool>) -> u8 {
    if outcomes.is_empty() {
        return 100;
    }
    let clean = outcomes.iter().filter(|clean| **clean).count();
    ((clean * 100 + outcomes.len() / 2) / outcomes.len()) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_rounds_to_nearest() {
        let outcomes: VecDeque<bool> = [true, true, false].into_iter().collect();
        assert_eq!(health_of(&outcomes), 67);
        assert_eq!(health_of(&VecDeque::new()), 100);
    }

    #[test]
    fn poisoned_log_still_reports_anomalies() {
        let monitor = SessionMonitor::default();
        std::thread::scope(|s| {
            let holder = s.spawn(|| {
                let _guard = monitor.log.lock().unwrap();
                panic!("panic while holding the monitor log");
            });
            assert!(holder.join().is_err());
        });
        assert!(monitor.log.is_poisoned());

        let access = AccessSet::empty();
        monitor.record_event(
            SessionEvent::new("s", EventKind::Login).with_principal("alice"),
            &access,
        );
        let anomalies = monitor.record_event(
            SessionEvent::new("s", EventKind::Login).with_principal("bob"),
            &access,
        );
        assert_eq!(anomalies.len(), 1);
        assert_eq!(monitor.health(), 100);
        assert!(monitor.anomalies_for("s").is_empty());
        assert_eq!(monitor.report().events.len(), 2);
    }

    #[test]
    fn settings_follow_config_defaults() {
        let settings = MonitorSettings::default();
        assert_eq!(settings.buffer_capacity, 50);
        assert_eq!(settings.rapid_switch_threshold, 5);
        assert_eq!(settings.rapid_switch_window, Duration::from_secs(60));
    }
}
