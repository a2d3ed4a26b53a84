use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Environment variable holding the WiFi network name.
pub const ENV_WIFI_SSID: &str = "WIFI_SSID";
/// Environment variable holding the WiFi passphrase.
pub const ENV_WIFI_PASSWORD: &str = "WIFI_PASSWORD";
/// Environment variable holding the table store REST base URL.
pub const ENV_DB_URL: &str = "DB_URL";
/// Environment variable holding the table store API key.
pub const ENV_DB_API_KEY: &str = "DB_API_KEY";

/// Top-level configuration for the shipdock binary.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Logging verbosity (debug, info, warn, error). Default: "info".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Access point credentials used by the collector.
    #[serde(default)]
    pub wifi: WifiConfig,

    /// Remote table store connection.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Collector sampling loop settings.
    #[serde(default)]
    pub collector: CollectorConfig,

    /// Dashboard web app settings.
    #[serde(default)]
    pub dashboard: DashboardConfig,

    /// Prometheus health metrics server configuration.
    #[serde(default)]
    pub health: HealthConfig,
}

/// Access point credentials.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WifiConfig {
    /// Network name. Overridden by `WIFI_SSID`.
    #[serde(default)]
    pub ssid: String,

    /// Passphrase. Overridden by `WIFI_PASSWORD`.
    #[serde(default)]
    pub password: String,
}

/// Remote table store connection.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// REST base URL; table names are appended as path segments.
    /// Overridden by `DB_URL`.
    #[serde(default)]
    pub url: String,

    /// API key sent as `apikey` and as the bearer token. Overridden by `DB_API_KEY`.
    #[serde(default)]
    pub api_key: String,

    /// Request timeout. Default: 10s.
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Table the collector inserts into and the dashboard reads sensor rows from.
    #[serde(default = "default_environmental_table")]
    pub environmental_table: String,

    /// Table holding order fulfillment rows (read-only).
    #[serde(default = "default_fulfillment_table")]
    pub fulfillment_table: String,
}

/// Collector sampling loop settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    /// Audio samples captured per reading. Default: 160.
    #[serde(default = "default_sample_count")]
    pub sample_count: usize,

    /// Microphone sample rate in Hz. Default: 16000.
    #[serde(default = "default_sample_rate_hz")]
    pub sample_rate_hz: u32,

    /// Pause after sampling sound. Default: 1s.
    #[serde(default = "default_settle", with = "humantime_serde")]
    pub sound_settle: Duration,

    /// Pause after reading temperature. Default: 1s.
    #[serde(default = "default_settle", with = "humantime_serde")]
    pub temperature_settle: Duration,

    /// Sleep between iterations. Default: 60s.
    #[serde(default = "default_collect_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Sample the host device simulators. Their readings are synthetic and
    /// land in the same table as real ones, so this must be set explicitly.
    /// Default: false.
    #[serde(default)]
    pub simulate: bool,
}

/// Dashboard web app settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    /// Listen address. Default: ":8501".
    #[serde(default = "default_dashboard_addr")]
    pub addr: String,
}

/// Prometheus health metrics server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    /// Listen address. Default: ":9090".
    #[serde(default = "default_health_addr")]
    pub addr: String,
}

// --- Default value functions ---

fn default_log_level() -> String {
    "info".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_environmental_table() -> String {
    "shipdock_environmental_data".to_string()
}

fn default_fulfillment_table() -> String {
    "order_fulfillment_data".to_string()
}

fn default_sample_count() -> usize {
    160
}

fn default_sample_rate_hz() -> u32 {
    16_000
}

fn default_settle() -> Duration {
    Duration::from_secs(1)
}

fn default_collect_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_dashboard_addr() -> String {
    ":8501".to_string()
}

fn default_health_addr() -> String {
    ":9090".to_string()
}

// --- Default trait impls ---

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            wifi: WifiConfig::default(),
            database: DatabaseConfig::default(),
            collector: CollectorConfig::default(),
            dashboard: DashboardConfig::default(),
            health: HealthConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            timeout: default_request_timeout(),
            environmental_table: default_environmental_table(),
            fulfillment_table: default_fulfillment_table(),
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            sample_count: default_sample_count(),
            sample_rate_hz: default_sample_rate_hz(),
            sound_settle: default_settle(),
            temperature_settle: default_settle(),
            interval: default_collect_interval(),
            simulate: false,
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            addr: default_dashboard_addr(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            addr: default_health_addr(),
        }
    }
}

// --- Loading, environment overlay and validation ---

impl Config {
    /// Load configuration from an optional YAML file, then apply the process
    /// environment on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(path) => {
                let data = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config file {}", path.display()))?;

                serde_yaml::from_str::<Config>(&data)
                    .with_context(|| format!("parsing config file {}", path.display()))?
            }
            None => Config::default(),
        };

        cfg.apply_env(|key| std::env::var(key).ok());

        Ok(cfg)
    }

    /// Overrides credentials and endpoint from the given variable lookup.
    /// Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = get(ENV_WIFI_SSID) {
            self.wifi.ssid = v;
        }
        if let Some(v) = get(ENV_WIFI_PASSWORD) {
            self.wifi.password = v;
        }
        if let Some(v) = get(ENV_DB_URL) {
            self.database.url = v;
        }
        if let Some(v) = get(ENV_DB_API_KEY) {
            self.database.api_key = v;
        }
    }

    /// Validate the settings the collector needs.
    pub fn validate_collector(&self) -> Result<()> {
        if self.wifi.ssid.is_empty() || self.wifi.password.is_empty() {
            bail!("Wifi settings are unavailable or incorrect.");
        }

        self.database.validate()?;

        if self.database.environmental_table.is_empty() {
            bail!("database.environmental_table is required");
        }

        let collector = &self.collector;
        if collector.sample_count == 0 {
            bail!("collector.sample_count must be positive");
        }
        if collector.sample_rate_hz == 0 {
            bail!("collector.sample_rate_hz must be positive");
        }
        if collector.interval.is_zero() {
            bail!("collector.interval must be positive");
        }

        Ok(())
    }

    /// Refuse to collect unless simulated devices were asked for.
    pub fn require_simulation(&self) -> Result<()> {
        if !self.collector.simulate {
            bail!(
                "no device drivers are available on this host; pass --simulate or set \
                 collector.simulate to post synthetic readings into {}",
                self.database.environmental_table
            );
        }
        Ok(())
    }

    /// Validate the settings the dashboard and report commands need.
    pub fn validate_dashboard(&self) -> Result<()> {
        self.database.validate()?;

        if self.database.environmental_table.is_empty() {
            bail!("database.environmental_table is required");
        }
        if self.database.fulfillment_table.is_empty() {
            bail!("database.fulfillment_table is required");
        }

        Ok(())
    }
}

impl DatabaseConfig {
    fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            bail!("database.url is required (set {ENV_DB_URL})");
        }
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            bail!("database.url must be an http(s) URL: {}", self.url);
        }
        if self.api_key.is_empty() {
            bail!("database.api_key is required (set {ENV_DB_API_KEY})");
        }
        if self.timeout.is_zero() {
            bail!("database.timeout must be positive");
        }
        Ok(())
    }
}

/// Expands the ":port" shorthand into a bindable address.
pub fn bind_addr(addr: &str, fallback: &str) -> String {
    let addr = if addr.is_empty() { fallback } else { addr };
    if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    }
}
