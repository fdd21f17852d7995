use bridge_error::BridgeResult;
use config::{Config, File};
use serde::{self, Deserialize};
use std::{env, ops::Deref, sync::Arc};

use crate::constants::{API_KEY_ENV, CHAOS_DROP_RATE_ENV, CHAOS_LATENCY_ENV, DATA_DIR};

#[derive(Debug, Clone)]
pub struct Settings(Arc<Inner>);

impl Deref for Settings {
    type Target = Inner;
    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl Settings {
    /// Load layered configuration: optional TOML file, `BRIDGE__`-prefixed
    /// environment source, then the plain environment overlays
    /// (`CHAOS_LATENCY`, `CHAOS_DROP_RATE`, `API_KEY`).
    pub fn new(config_path: String) -> BridgeResult<Self> {
        let builder = Config::builder()
            .add_source(File::with_name(config_path.as_str()).required(false))
            .add_source(
                config::Environment::with_prefix("BRIDGE")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("web.cors.origins"),
            );
        let mut inner: Inner = builder.build()?.try_deserialize()?;
        inner.apply_env_overlays()?;
        Ok(Self(Arc::new(inner)))
    }

    /// Build settings directly from an `Inner`, bypassing file and
    /// environment sources. Intended for tests.
    pub fn from_inner(inner: Inner) -> Self {
        Self(Arc::new(inner))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Inner {
    #[serde(default)]
    pub general: General,
    #[serde(default)]
    pub web: Web,
    #[serde(default)]
    pub db: Db,
    #[serde(default)]
    pub dispatch: Dispatch,
    #[serde(default)]
    pub liveness: Liveness,
    #[serde(default)]
    pub telemetry: Telemetry,
    #[serde(default)]
    pub chaos: Chaos,
    #[serde(default)]
    pub metrics: Metrics,
}

impl Inner {
    fn apply_env_overlays(&mut self) -> BridgeResult<()> {
        if let Ok(raw) = env::var(CHAOS_LATENCY_ENV) {
            let (min_ms, max_ms) = parse_latency_range(&raw)?;
            self.chaos.latency_min_ms = Some(min_ms);
            self.chaos.latency_max_ms = Some(max_ms);
        }
        if let Ok(raw) = env::var(CHAOS_DROP_RATE_ENV) {
            let rate: f64 = raw.trim().parse().map_err(|e| {
                format!("invalid {CHAOS_DROP_RATE_ENV} value '{raw}': {e}")
            })?;
            if !(0.0..=1.0).contains(&rate) {
                return Err(format!(
                    "{CHAOS_DROP_RATE_ENV} must be within [0, 1], got {rate}"
                )
                .into());
            }
            self.chaos.drop_rate = rate;
        }
        if let Ok(key) = env::var(API_KEY_ENV) {
            self.web.api_key = key;
        }
        Ok(())
    }
}

/// Parse a `<min>-<max>` latency range in seconds (e.g. `1.0-2.0`) into
/// millisecond bounds.
fn parse_latency_range(raw: &str) -> BridgeResult<(u64, u64)> {
    let (min_part, max_part) = raw
        .trim()
        .split_once('-')
        .ok_or_else(|| format!("invalid {CHAOS_LATENCY_ENV} value '{raw}': expected <min>-<max>"))?;
    let min_s: f64 = min_part
        .trim()
        .parse()
        .map_err(|e| format!("invalid {CHAOS_LATENCY_ENV} minimum '{min_part}': {e}"))?;
    let max_s: f64 = max_part
        .trim()
        .parse()
        .map_err(|e| format!("invalid {CHAOS_LATENCY_ENV} maximum '{max_part}': {e}"))?;
    if min_s < 0.0 || max_s < min_s {
        return Err(format!(
            "{CHAOS_LATENCY_ENV} range '{raw}' must satisfy 0 <= min <= max"
        )
        .into());
    }
    Ok(((min_s * 1000.0) as u64, (max_s * 1000.0) as u64))
}

#[derive(Debug, Clone, Deserialize)]
pub struct General {
    /// Runtime root directory for all relative paths (`./data`, `./logs`).
    /// Applied by switching the process working directory at startup.
    #[serde(default = "General::runtime_dir_default")]
    pub runtime_dir: String,
}

impl Default for General {
    fn default() -> Self {
        General {
            runtime_dir: General::runtime_dir_default(),
        }
    }
}

impl General {
    fn runtime_dir_default() -> String {
        ".".into()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Web {
    #[serde(default = "Web::router_prefix_default")]
    pub router_prefix: String,
    #[serde(default = "Web::host_default")]
    pub host: String,
    #[serde(default = "Web::port_default")]
    pub port: u16,
    #[serde(default = "Web::workers_default")]
    pub workers: i32,
    /// Shared secret expected in the `X-Api-Key` header on protected routes.
    /// Empty is a startup configuration error.
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub cors: Cors,
}

impl Default for Web {
    fn default() -> Self {
        Web {
            router_prefix: Web::router_prefix_default(),
            host: Web::host_default(),
            port: Web::port_default(),
            workers: Web::workers_default(),
            api_key: String::new(),
            cors: Default::default(),
        }
    }
}

impl Web {
    fn router_prefix_default() -> String {
        "/api".into()
    }

    fn host_default() -> String {
        "0.0.0.0".into()
    }

    fn port_default() -> u16 {
        8080
    }

    fn workers_default() -> i32 {
        0
    }

    /// Get actual number of workers based on configuration.
    pub fn get_worker_count(&self) -> usize {
        match self.workers {
            n if n > 0 => n as usize,
            _ => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Cors {
    #[serde(default)]
    pub enabled: bool,
    /// Allowed origins; empty means any origin.
    #[serde(default)]
    pub origins: Vec<String>,
}

impl Default for Cors {
    fn default() -> Self {
        Cors {
            enabled: true,
            origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Db {
    #[serde(default)]
    pub sqlite: Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sqlite {
    #[serde(default = "Sqlite::path_default")]
    pub path: String,
    #[serde(default = "Sqlite::auto_create_default")]
    pub auto_create: bool,
    #[serde(default = "Sqlite::max_connections_default")]
    pub max_connections: u32,
    /// Connect timeout in milliseconds.
    #[serde(default = "Sqlite::timeout_default")]
    pub timeout: u64,
    #[serde(default = "Sqlite::idle_timeout_default")]
    pub idle_timeout: u64,
    #[serde(default = "Sqlite::max_lifetime_default")]
    pub max_lifetime: u64,
}

impl Default for Sqlite {
    fn default() -> Self {
        Sqlite {
            path: Sqlite::path_default(),
            auto_create: Sqlite::auto_create_default(),
            max_connections: Sqlite::max_connections_default(),
            timeout: Sqlite::timeout_default(),
            idle_timeout: Sqlite::idle_timeout_default(),
            max_lifetime: Sqlite::max_lifetime_default(),
        }
    }
}

impl Sqlite {
    fn path_default() -> String {
        format!("{DATA_DIR}/bridge.db")
    }

    fn auto_create_default() -> bool {
        true
    }

    fn max_connections_default() -> u32 {
        16
    }

    fn timeout_default() -> u64 {
        5_000
    }

    fn idle_timeout_default() -> u64 {
        60_000
    }

    fn max_lifetime_default() -> u64 {
        600_000
    }

    pub fn db_path(&self) -> &str {
        &self.path
    }

    /// SQLite connection URL; `mode=rwc` auto-creates the file when enabled.
    pub fn to_url(&self) -> String {
        if self.auto_create {
            format!("sqlite://{}?mode=rwc", self.path)
        } else {
            format!("sqlite://{}", self.path)
        }
    }
}

/// Command routing and dispatch tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct Dispatch {
    /// In-flight queue capacity; a full queue rejects submissions with a
    /// backpressure signal instead of persisting them.
    #[serde(default = "Dispatch::queue_capacity_default")]
    pub queue_capacity: usize,
    /// Deadline for a device to report a command result before the
    /// reconciler fails the command.
    #[serde(default = "Dispatch::response_timeout_ms_default")]
    pub response_timeout_ms: u64,
    /// Base delays between transport send attempts.
    #[serde(default = "Dispatch::retry_base_delays_ms_default")]
    pub retry_base_delays_ms: Vec<u64>,
    /// Upper bound (exclusive) of the uniform jitter added to each delay.
    #[serde(default = "Dispatch::retry_jitter_ms_default")]
    pub retry_jitter_ms: u64,
    /// Consecutive dispatch failures that open a device's breaker.
    #[serde(default = "Dispatch::breaker_failure_threshold_default")]
    pub breaker_failure_threshold: u32,
    /// How long an opened breaker blocks dispatch before going half-open.
    #[serde(default = "Dispatch::breaker_open_ms_default")]
    pub breaker_open_ms: u64,
}

impl Default for Dispatch {
    fn default() -> Self {
        Dispatch {
            queue_capacity: Dispatch::queue_capacity_default(),
            response_timeout_ms: Dispatch::response_timeout_ms_default(),
            retry_base_delays_ms: Dispatch::retry_base_delays_ms_default(),
            retry_jitter_ms: Dispatch::retry_jitter_ms_default(),
            breaker_failure_threshold: Dispatch::breaker_failure_threshold_default(),
            breaker_open_ms: Dispatch::breaker_open_ms_default(),
        }
    }
}

impl Dispatch {
    fn queue_capacity_default() -> usize {
        50
    }

    fn response_timeout_ms_default() -> u64 {
        10_000
    }

    fn retry_base_delays_ms_default() -> Vec<u64> {
        vec![100, 300, 700]
    }

    fn retry_jitter_ms_default() -> u64 {
        50
    }

    fn breaker_failure_threshold_default() -> u32 {
        5
    }

    fn breaker_open_ms_default() -> u64 {
        10_000
    }
}

/// Liveness sweep tuning.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Liveness {
    #[serde(default = "Liveness::sweep_interval_ms_default")]
    pub sweep_interval_ms: u64,
    /// A device whose last-seen is older than this at a sweep goes offline.
    #[serde(default = "Liveness::offline_after_ms_default")]
    pub offline_after_ms: u64,
}

impl Default for Liveness {
    fn default() -> Self {
        Liveness {
            sweep_interval_ms: Liveness::sweep_interval_ms_default(),
            offline_after_ms: Liveness::offline_after_ms_default(),
        }
    }
}

impl Liveness {
    fn sweep_interval_ms_default() -> u64 {
        10_000
    }

    fn offline_after_ms_default() -> u64 {
        30_000
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Telemetry {
    /// Most-recent samples retained per device; older rows are pruned on
    /// ingestion.
    #[serde(default = "Telemetry::window_default")]
    pub window: u64,
}

impl Default for Telemetry {
    fn default() -> Self {
        Telemetry {
            window: Telemetry::window_default(),
        }
    }
}

impl Telemetry {
    fn window_default() -> u64 {
        50
    }
}

/// Fault-injection knobs for resilience testing. Loaded once at startup and
/// read-only afterwards; consumed only by the router worker.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Chaos {
    pub latency_min_ms: Option<u64>,
    pub latency_max_ms: Option<u64>,
    #[serde(default)]
    pub drop_rate: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Metrics {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "Metrics::endpoint_default")]
    pub endpoint: String,
    /// Export interval in milliseconds.
    #[serde(default = "Metrics::export_interval_default")]
    pub export_interval: u64,
    #[serde(default = "Metrics::service_name_default")]
    pub service_name: String,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics {
            enabled: false,
            endpoint: Metrics::endpoint_default(),
            export_interval: Metrics::export_interval_default(),
            service_name: Metrics::service_name_default(),
        }
    }
}

impl Metrics {
    fn endpoint_default() -> String {
        "http://127.0.0.1:4317".into()
    }

    fn export_interval_default() -> u64 {
        10_000
    }

    fn service_name_default() -> String {
        "bridge".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latency_range_parses_fractional_seconds() {
        let (min, max) = parse_latency_range("1.0-2.5").unwrap();
        assert_eq!(min, 1000);
        assert_eq!(max, 2500);
    }

    #[test]
    fn latency_range_allows_zero_minimum() {
        let (min, max) = parse_latency_range("0-0.05").unwrap();
        assert_eq!(min, 0);
        assert_eq!(max, 50);
    }

    #[test]
    fn latency_range_rejects_inverted_bounds() {
        assert!(parse_latency_range("2.0-1.0").is_err());
    }

    #[test]
    fn latency_range_rejects_missing_separator() {
        assert!(parse_latency_range("1.5").is_err());
    }

    #[test]
    fn dispatch_defaults_match_engine_contract() {
        let d = Dispatch::default();
        assert_eq!(d.queue_capacity, 50);
        assert_eq!(d.response_timeout_ms, 10_000);
        assert_eq!(d.retry_base_delays_ms, vec![100, 300, 700]);
        assert_eq!(d.retry_jitter_ms, 50);
        assert_eq!(d.breaker_failure_threshold, 5);
        assert_eq!(d.breaker_open_ms, 10_000);
    }
}
