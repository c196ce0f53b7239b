//! Core types for the tenantgate tenant resolution layer.
//!
//! Holds what every other tenantgate crate shares: the domain types
//! ([`TenantRecord`], [`Principal`]), the error taxonomy, the upstream
//! collaborator traits and the [`GateConfig`] loader.

pub mod config;
pub mod directory;
pub mod error;
pub mod types;

pub use config::{BackoffSettings, CacheSettings, GateConfig, ResolverSettings, SessionSettings};
pub use directory::{
    InMemoryDirectory, InMemoryMemberships, LookupFuture, MembershipSource, TenantDirectory,
};
pub use error::{ConfigError, LookupError, ResolveError};
pub use types::{Principal, Role, TenantId, TenantRecord};

use tracing_subscriber::EnvFilter;

/// Initialise the global `tracing` subscriber with a standard `fmt` layer.
///
/// Respects the `RUST_LOG` environment variable. Falls back to
/// `info,tenantgate=debug` when `RUST_LOG` is not set.
///
/// Call this once, at the very start of `main`, before any tracing macro.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tenantgate=debug"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
