//! Session integrity monitoring.
//!
//! [`SessionMonitor`] keeps a bounded history of [`SessionEvent`]s per
//! session and evaluates three rules as each event arrives:
//!
//! | Rule                         | Severity | Trigger                                                          |
//! |------------------------------|----------|------------------------------------------------------------------|
//! | `multi_principal_session`    | critical | one session seen with two different principals                   |
//! | `rapid_tenant_switch`        | medium   | more than N distinct tenants switched to within the window        |
//! | `unauthorized_tenant_access` | high     | switch or access to a tenant outside the request's access set     |
//!
//! The monitor is an observer. It never rejects a request; authorization
//! belongs to `AccessResolver::can_access`.

pub mod event;
pub mod monitor;

pub use event::{Anomaly, AnomalyKind, EventKind, SessionEvent, Severity};
pub use monitor::{AnomalyCounts, MonitorReport, MonitorSettings, SessionMonitor};
