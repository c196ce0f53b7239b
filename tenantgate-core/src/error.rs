//! Error types shared by the tenantgate crates.
//!
//! Authorization denials are deliberately absent: `can_access` answers with a
//! plain `bool`, and anomalies are delivered as data by the session monitor.

use std::time::Duration;

/// Outcome of a failed call to an upstream collaborator (tenant directory or
/// membership table).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    /// The requested tenant does not exist.
    #[error("not found")]
    NotFound,

    /// The upstream throttled the call, optionally telling us when to retry.
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// Timeout, network failure, or any other error worth retrying later.
    #[error("transient upstream failure: {0}")]
    Transient(String),
}

impl LookupError {
    pub fn rate_limited() -> Self {
        LookupError::RateLimited { retry_after: None }
    }

    pub fn rate_limited_for(retry_after: Duration) -> Self {
        LookupError::RateLimited {
            retry_after: Some(retry_after),
        }
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        LookupError::Transient(msg.into())
    }
}

/// Why a permalink did not resolve to a tenant.
///
/// Every variant is recoverable; callers map them to a response of their own
/// choosing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// No tenant has this permalink (possibly served from the negative cache).
    #[error("no such tenant")]
    NotFound,

    /// The upstream is throttling lookups and no stale entry was available.
    #[error("tenant lookups are rate limited")]
    RateLimited,

    /// The lookup failed for a reason that should not be remembered.
    #[error("tenant lookup failed: {0}")]
    Transient(String),
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An I/O or YAML parsing error occurred while loading config files.
    #[error("config load error: {0}")]
    Load(String),

    /// An environment override could not be applied.
    #[error("invalid environment override '{key}': {message}")]
    Env { key: String, message: String },

    /// A value is outside its allowed range.
    #[error("invalid config value for '{key}': {message}")]
    Invalid { key: &'static str, message: String },
}
