use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::RwLock;
use std::time::Duration;

use anyhow::{ bail, Context, Result };
use once_cell::sync::Lazy;
use serde::{ Deserialize, Serialize };

use crate::logger::{ log, LogTag };
use crate::types::Platform;

/// Runtime configuration. Every option can come from `configs.json` or be
/// overridden through the environment (upper snake case, e.g. `FEED_URL`,
/// `BATCH_SIZE`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Upstream event feed endpoint.
    pub feed_url: String,
    /// Base reconnect backoff in milliseconds.
    pub reconnect_delay_ms: u64,
    /// Reconnect attempts before the terminal give-up signal.
    pub max_reconnect_attempts: u32,
    /// Liveness ping period in milliseconds.
    pub heartbeat_ms: u64,
    /// Bound on a single connect attempt.
    pub connect_timeout_ms: u64,

    /// Soft cap used for informational stats only.
    pub max_tokens_tracked: usize,

    /// Processor flush threshold.
    pub batch_size: usize,
    /// Processor time-based flush in milliseconds.
    pub flush_interval_ms: u64,
    /// Per-mint dedup window in milliseconds.
    pub dedup_window_ms: u64,
    /// Capacity of the ingestion FIFO.
    pub queue_capacity: usize,
    /// How long `submit` waits for a queue slot before `Backpressure`.
    pub submit_deadline_ms: u64,

    /// Trend analysis cadence in milliseconds.
    pub analysis_interval_ms: u64,

    /// Cleanup cadence in milliseconds.
    pub cleanup_interval_ms: u64,
    /// New-token protection window in milliseconds.
    pub grace_period_ms: u64,
    /// Idle-to-inactive threshold in milliseconds.
    pub inactivity_threshold_ms: u64,
    /// Low-volume threshold (24h volume).
    pub min_volume_24h: f64,
    /// Low-volume confirmations required before untracking.
    pub consecutive_zero_volume_periods: u32,
    /// Rug threshold: fractional price drop from peak.
    pub rug_price_drop: f64,
    /// Rug threshold: fractional volume drop from peak.
    pub rug_volume_drop: f64,
    /// Rug liquidity floor in quote units.
    pub liquidity_threshold: f64,
    /// Per-cycle removal cap as a fraction of the tracked population.
    pub max_cleanup_percentage: f64,
    /// Population floor cleanup never crosses.
    pub min_tokens_to_keep: usize,
    /// Permanently protected mints.
    pub whitelist: Vec<String>,
    /// Master switch for the cleanup timer.
    pub cleanup_enabled: bool,

    /// Platform assigned when detection resolves `unknown`. `None` rejects
    /// such updates instead.
    pub fallback_platform: Option<Platform>,

    /// Time-series store location.
    pub db_path: String,
    /// Retention horizon for price points and snapshots, in hours.
    pub retention_max_age_hours: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed_url: "wss://pumpportal.fun/api/data".to_string(),
            reconnect_delay_ms: 5_000,
            max_reconnect_attempts: 10,
            heartbeat_ms: 30_000,
            connect_timeout_ms: 20_000,
            max_tokens_tracked: 1_000,
            batch_size: 100,
            flush_interval_ms: 5_000,
            dedup_window_ms: 1_000,
            queue_capacity: 10_000,
            submit_deadline_ms: 250,
            analysis_interval_ms: 60_000,
            cleanup_interval_ms: 300_000,
            grace_period_ms: 1_800_000,
            inactivity_threshold_ms: 3_600_000,
            min_volume_24h: 10.0,
            consecutive_zero_volume_periods: 3,
            rug_price_drop: 0.95,
            rug_volume_drop: 0.99,
            liquidity_threshold: 100.0,
            max_cleanup_percentage: 0.10,
            min_tokens_to_keep: 100,
            whitelist: Vec::new(),
            cleanup_enabled: true,
            fallback_platform: Some(Platform::PumpFun),
            db_path: "mintwatch.db".to_string(),
            retention_max_age_hours: 168,
        }
    }
}

impl Config {
    pub fn dedup_window(&self) -> Duration {
        Duration::from_millis(self.dedup_window_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn grace_period(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.grace_period_ms as i64)
    }

    pub fn inactivity_threshold(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.inactivity_threshold_ms as i64)
    }

    pub fn whitelist_set(&self) -> HashSet<String> {
        self.whitelist.iter().cloned().collect()
    }

    /// Validate the configuration. Hard errors refuse to start; warnings
    /// are returned so the caller can log them and continue. Tracker
    /// thresholds are checked by the tracker's own validation.
    pub fn validate(&self) -> Result<Vec<String>> {
        if self.feed_url.is_empty() {
            bail!("FEED_URL is required");
        }
        if self.batch_size == 0 {
            bail!("BATCH_SIZE must be positive");
        }
        if self.queue_capacity == 0 {
            bail!("queue_capacity must be positive");
        }
        if self.flush_interval_ms == 0 {
            bail!("FLUSH_INTERVAL_MS must be positive");
        }
        if self.dedup_window_ms == 0 {
            bail!("DEDUP_WINDOW_MS must be positive");
        }
        if self.heartbeat_ms == 0 {
            bail!("HEARTBEAT_MS must be positive");
        }
        crate::tracker::TrackerConfig::from(self).validate()
    }

    /// Apply environment variable overrides for the recognized options.
    pub fn apply_env_overrides(&mut self) {
        fn env_str(key: &str, target: &mut String) {
            if let Ok(v) = std::env::var(key) {
                if !v.is_empty() {
                    *target = v;
                }
            }
        }
        fn env_parse<T: std::str::FromStr>(key: &str, target: &mut T) {
            if let Ok(v) = std::env::var(key) {
                if let Ok(parsed) = v.parse::<T>() {
                    *target = parsed;
                }
            }
        }

        env_str("FEED_URL", &mut self.feed_url);
        env_parse("RECONNECT_DELAY_MS", &mut self.reconnect_delay_ms);
        env_parse("MAX_RECONNECT_ATTEMPTS", &mut self.max_reconnect_attempts);
        env_parse("HEARTBEAT_MS", &mut self.heartbeat_ms);
        env_parse("MAX_TOKENS_TRACKED", &mut self.max_tokens_tracked);
        env_parse("BATCH_SIZE", &mut self.batch_size);
        env_parse("FLUSH_INTERVAL_MS", &mut self.flush_interval_ms);
        env_parse("DEDUP_WINDOW_MS", &mut self.dedup_window_ms);
        env_parse("ANALYSIS_INTERVAL_MS", &mut self.analysis_interval_ms);
        env_parse("CLEANUP_INTERVAL_MS", &mut self.cleanup_interval_ms);
        env_parse("GRACE_PERIOD_MS", &mut self.grace_period_ms);
        env_parse("INACTIVITY_THRESHOLD_MS", &mut self.inactivity_threshold_ms);
        env_parse("MIN_VOLUME_24H", &mut self.min_volume_24h);
        env_parse(
            "CONSECUTIVE_ZERO_VOLUME_PERIODS",
            &mut self.consecutive_zero_volume_periods,
        );
        env_parse("RUG_PRICE_DROP", &mut self.rug_price_drop);
        env_parse("RUG_VOLUME_DROP", &mut self.rug_volume_drop);
        env_parse("LIQ_THRESHOLD", &mut self.liquidity_threshold);
        env_parse("MAX_CLEANUP_PERCENTAGE", &mut self.max_cleanup_percentage);
        env_parse("MIN_TOKENS_TO_KEEP", &mut self.min_tokens_to_keep);
        env_parse("CLEANUP_ENABLED", &mut self.cleanup_enabled);
        env_str("DB_PATH", &mut self.db_path);

        if let Ok(v) = std::env::var("WHITELIST") {
            self.whitelist = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
    }
}

static CONFIG: Lazy<RwLock<Config>> = Lazy::new(|| RwLock::new(Config::default()));

/// Read a configuration file and install it as the process config.
/// A missing file is not an error; defaults plus env overrides apply.
pub fn load_config(path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or("configs.json");
    let mut config = if Path::new(path).exists() {
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        serde_json::from_str::<Config>(&data)
            .with_context(|| format!("Failed to parse config file: {}", path))?
    } else {
        Config::default()
    };

    config.apply_env_overrides();

    if let Some(db) = crate::arguments::db_path_override() {
        config.db_path = db;
    }

    let warnings = config.validate()?;
    for w in &warnings {
        log(LogTag::System, "WARN", &format!("Config warning: {}", w));
    }

    set_config(config);
    Ok(())
}

/// Install a configuration directly (used by tests and tools).
pub fn set_config(config: Config) {
    if let Ok(mut guard) = CONFIG.write() {
        *guard = config;
    }
}

/// Current process configuration.
pub fn get_config() -> Config {
    CONFIG.read().map(|c| c.clone()).unwrap_or_default()
}
