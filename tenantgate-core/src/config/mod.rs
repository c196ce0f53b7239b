mod loader;

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Prefix of the environment variables overriding file values.
pub const ENV_PREFIX: &str = "TENANTGATE_";

fn default_positive_ttl() -> u64 { 15 * 60 }
fn default_negative_ttl() -> u64 { 2 * 60 }
fn default_stale_grace() -> u64 { 60 * 60 }
fn default_sweep_interval() -> u64 { 60 }
fn default_max_attempts() -> u32 { 3 }
fn default_base_delay() -> u64 { 1_000 }
fn default_multiplier() -> f64 { 2.0 }
fn default_max_delay() -> u64 { 8_000 }
fn default_max_retry_after() -> u64 { 60 * 60 * 1_000 }
fn default_lookup_timeout() -> u64 { 5_000 }
fn default_buffer_capacity() -> usize { 50 }
fn default_switch_threshold() -> usize { 5 }
fn default_switch_window() -> u64 { 60 }
fn default_anomaly_capacity() -> usize { 1_000 }
fn default_health_window() -> usize { 100 }
fn default_idle_ttl() -> u64 { 24 * 60 * 60 }

/// Tenant cache settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    /// TTL of a resolved tenant. Default: 900 (15 minutes).
    #[serde(default = "default_positive_ttl")]
    pub positive_ttl_secs: u64,
    /// TTL of a "no such permalink" entry. Default: 120.
    #[serde(default = "default_negative_ttl")]
    pub negative_ttl_secs: u64,
    /// How long an expired entry stays readable as stale data. Default: 3600.
    #[serde(default = "default_stale_grace")]
    pub stale_grace_secs: u64,
    /// Period of the maintenance sweep. Default: 60.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            positive_ttl_secs: default_positive_ttl(),
            negative_ttl_secs: default_negative_ttl(),
            stale_grace_secs: default_stale_grace(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl CacheSettings {
    pub fn positive_ttl(&self) -> Duration {
        Duration::from_secs(self.positive_ttl_secs)
    }

    pub fn negative_ttl(&self) -> Duration {
        Duration::from_secs(self.negative_ttl_secs)
    }

    pub fn stale_grace(&self) -> Duration {
        Duration::from_secs(self.stale_grace_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Exponential backoff applied when the tenant directory throttles us.
#[derive(Debug, Clone, Deserialize)]
pub struct BackoffSettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    /// Cap on the retry-after hint an upstream may ask for.
    #[serde(default = "default_max_retry_after")]
    pub max_retry_after_ms: u64,
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay(),
            max_retry_after_ms: default_max_retry_after(),
        }
    }
}

impl BackoffSettings {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn max_retry_after(&self) -> Duration {
        Duration::from_millis(self.max_retry_after_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolverSettings {
    /// Upper bound on a single upstream permalink lookup. Default: 5000.
    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout_ms: u64,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            lookup_timeout_ms: default_lookup_timeout(),
        }
    }
}

impl ResolverSettings {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

/// Session integrity monitor settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSettings {
    /// Events retained per session. Default: 50.
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    /// Distinct tenants tolerated inside the switch window. Default: 5.
    #[serde(default = "default_switch_threshold")]
    pub rapid_switch_threshold: usize,
    #[serde(default = "default_switch_window")]
    pub rapid_switch_window_secs: u64,
    /// Anomalies kept for the diagnostics report. Default: 1000.
    #[serde(default = "default_anomaly_capacity")]
    pub anomaly_log_capacity: usize,
    /// Recorded events the health score is computed over. Default: 100.
    #[serde(default = "default_health_window")]
    pub health_window: usize,
    #[serde(default = "default_idle_ttl")]
    pub idle_session_ttl_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
            rapid_switch_threshold: default_switch_threshold(),
            rapid_switch_window_secs: default_switch_window(),
            anomaly_log_capacity: default_anomaly_capacity(),
            health_window: default_health_window(),
            idle_session_ttl_secs: default_idle_ttl(),
        }
    }
}

impl SessionSettings {
    pub fn rapid_switch_window(&self) -> Duration {
        Duration::from_secs(self.rapid_switch_window_secs)
    }

    pub fn idle_session_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_session_ttl_secs)
    }
}

/// Configuration of the whole tenant resolution layer.
///
/// Resolution order (lowest to highest priority):
/// 1. `tenantgate.yaml` (base)
/// 2. `tenantgate-{profile}.yaml` (profile override)
/// 3. `.env` and `.env.{profile}` (loaded into the process environment)
/// 4. `TENANTGATE_*` environment variables (`TENANTGATE_CACHE_POSITIVE_TTL_SECS`
///    overrides `cache.positive_ttl_secs`)
///
/// `.env` files never overwrite already-set environment variables.
/// Profile is determined by: `TENANTGATE_PROFILE` env var > argument > `"dev"`.
///
/// ```yaml
/// cache:
///   positive_ttl_secs: 900
///   negative_ttl_secs: 120
/// backoff:
///   max_attempts: 3
///   base_delay_ms: 1000
/// session:
///   buffer_capacity: 50
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GateConfig {
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub backoff: BackoffSettings,
    #[serde(default)]
    pub resolver: ResolverSettings,
    #[serde(default)]
    pub session: SessionSettings,
}

impl GateConfig {
    /// Load configuration for `profile` from the current directory and the
    /// process environment.
    pub fn load(profile: &str) -> Result<Self, ConfigError> {
        let active_profile =
            std::env::var("TENANTGATE_PROFILE").unwrap_or_else(|_| profile.to_string());

        let _ = dotenvy::dotenv();
        let _ = dotenvy::from_filename(format!(".env.{active_profile}"));

        Self::load_from(Path::new("."), &active_profile, std::env::vars())
    }

    /// Load configuration from the YAML files in `dir`, then overlay the
    /// `TENANTGATE_*` entries of `vars`. Other variables are ignored.
    pub fn load_from(
        dir: &Path,
        profile: &str,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self, ConfigError> {
        let mut tree = serde_yaml::Value::Mapping(Default::default());
        loader::merge_yaml_file(&dir.join("tenantgate.yaml"), &mut tree)?;
        loader::merge_yaml_file(&dir.join(format!("tenantgate-{profile}.yaml")), &mut tree)?;
        loader::overlay_env(&mut tree, vars)?;
        Self::from_value(tree)
    }

    /// Parse configuration from a YAML string, without any overlay.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let mut tree = serde_yaml::Value::Mapping(Default::default());
        loader::merge_yaml_str(content, &mut tree)?;
        Self::from_value(tree)
    }

    fn from_value(tree: serde_yaml::Value) -> Result<Self, ConfigError> {
        let config: GateConfig =
            serde_yaml::from_value(tree).map_err(|e| ConfigError::Load(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.negative_ttl_secs >= self.cache.positive_ttl_secs {
            return Err(ConfigError::Invalid {
                key: "cache.negative_ttl_secs",
                message: format!(
                    "must be shorter than cache.positive_ttl_secs ({})",
                    self.cache.positive_ttl_secs
                ),
            });
        }
        if self.backoff.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "backoff.max_attempts",
                message: "must be at least 1".into(),
            });
        }
        if self.backoff.multiplier.is_nan() || self.backoff.multiplier < 1.0 {
            return Err(ConfigError::Invalid {
                key: "backoff.multiplier",
                message: format!("must be >= 1.0, got {}", self.backoff.multiplier),
            });
        }
        if self.backoff.max_delay_ms < self.backoff.base_delay_ms {
            return Err(ConfigError::Invalid {
                key: "backoff.max_delay_ms",
                message: "must not be smaller than backoff.base_delay_ms".into(),
            });
        }
        if self.resolver.lookup_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "resolver.lookup_timeout_ms",
                message: "must be positive".into(),
            });
        }
        if self.cache.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "cache.sweep_interval_secs",
                message: "must be positive".into(),
            });
        }
        if self.session.buffer_capacity == 0 {
            return Err(ConfigError::Invalid {
                key: "session.buffer_capacity",
                message: "must be positive".into(),
            });
        }
        Ok(())
    }
}
