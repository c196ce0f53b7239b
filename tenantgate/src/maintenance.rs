use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::gate::TenantGate;

/// What one maintenance pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub cache_entries: usize,
    pub backoff_states: usize,
    pub sessions: usize,
}

impl TenantGate {
    /// Drop cache entries past their stale grace, backoff states idle for as
    /// long, and sessions idle past the configured TTL.
    pub fn sweep(&self) -> SweepStats {
        let grace = self.config().cache.stale_grace();
        let stats = SweepStats {
            cache_entries: self.resolver().cache().purge_expired(),
            backoff_states: self.resolver().backoff().purge_idle(grace),
            sessions: self.monitor().prune_idle(Utc::now()),
        };
        if stats != SweepStats::default() {
            tracing::debug!(
                cache_entries = stats.cache_entries,
                backoff_states = stats.backoff_states,
                sessions = stats.sessions,
                "maintenance sweep"
            );
        }
        stats
    }

    /// Run [`sweep`](Self::sweep) every `cache.sweep_interval_secs` until
    /// `cancel` fires.
    ///
    /// Nothing depends on the sweep for correctness; it only bounds memory.
    pub fn spawn_maintenance(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let gate = self.clone();
        // `interval` panics on a zero period; `from_parts` skips validation.
        let period = self.config().cache.sweep_interval().max(Duration::from_secs(1));
        tokio::spawn(async move {
            tracing::info!(interval_secs = period.as_secs(), "maintenance task started");
            let mut tick = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        gate.sweep();
                    }
                    _ = cancel.cancelled() => {
                        break;
                    }
                }
            }
            tracing::info!("maintenance task stopped");
        })
    }
}
