/// Token tracker.
///
/// Sole owner of the in-memory token population and every policy that
/// decides whether a tracked token stays tracked. All mutations go
/// through one `RwLock` write guard, so no two mutations ever
/// interleave; reads share the read guard.
pub mod alerts;
pub mod cleanup;
pub mod health;
pub mod indices;
pub mod trends;

use std::collections::{ HashMap, HashSet, VecDeque };
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use anyhow::{ bail, Result };
use chrono::Utc;
use tokio::sync::RwLock;

use crate::arguments::is_debug_tracker_enabled;
use crate::config::Config;
use crate::database::TimeSeriesSink;
use crate::events::{ BusEvent, EventBus };
use crate::logger::{ log, LogTag };
use crate::types::{
    Alert, AlertSpec, PricePoint, TokenHealth, TokenSnapshot, Trade, Trend, TrendWindow,
};

use indices::TokenIndices;

/// Tracker policy knobs, extracted from the process config.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub grace_period: chrono::Duration,
    pub inactivity_threshold: chrono::Duration,
    pub cleanup_interval: chrono::Duration,
    pub analysis_interval: chrono::Duration,
    pub min_volume_24h: f64,
    pub consecutive_zero_volume_periods: u32,
    pub rug_price_drop: f64,
    pub rug_volume_drop: f64,
    pub liquidity_threshold: f64,
    pub max_cleanup_percentage: f64,
    pub min_tokens_to_keep: usize,
    pub whitelist: HashSet<String>,
    pub cleanup_enabled: bool,
    pub max_tokens_tracked: usize,
    pub history_cap: usize,
}

impl From<&Config> for TrackerConfig {
    fn from(config: &Config) -> Self {
        Self {
            grace_period: config.grace_period(),
            inactivity_threshold: config.inactivity_threshold(),
            cleanup_interval: chrono::Duration::milliseconds(config.cleanup_interval_ms as i64),
            analysis_interval: chrono::Duration::milliseconds(config.analysis_interval_ms as i64),
            min_volume_24h: config.min_volume_24h,
            consecutive_zero_volume_periods: config.consecutive_zero_volume_periods,
            rug_price_drop: config.rug_price_drop,
            rug_volume_drop: config.rug_volume_drop,
            liquidity_threshold: config.liquidity_threshold,
            max_cleanup_percentage: config.max_cleanup_percentage,
            min_tokens_to_keep: config.min_tokens_to_keep,
            whitelist: config.whitelist_set(),
            cleanup_enabled: config.cleanup_enabled,
            max_tokens_tracked: config.max_tokens_tracked,
            history_cap: 1_000,
        }
    }
}

impl TrackerConfig {
    /// Threshold validation. Errors refuse construction; warnings are
    /// returned for the caller to log.
    pub fn validate(&self) -> Result<Vec<String>> {
        if self.grace_period <= chrono::Duration::zero() {
            bail!("GRACE_PERIOD_MS must be positive");
        }
        if self.inactivity_threshold <= chrono::Duration::zero() {
            bail!("INACTIVITY_THRESHOLD_MS must be positive");
        }
        if self.cleanup_interval <= chrono::Duration::zero() {
            bail!("CLEANUP_INTERVAL_MS must be positive");
        }
        if self.analysis_interval <= chrono::Duration::zero() {
            bail!("ANALYSIS_INTERVAL_MS must be positive");
        }
        if self.min_volume_24h <= 0.0 {
            bail!("MIN_VOLUME_24H must be positive");
        }
        if self.liquidity_threshold <= 0.0 {
            bail!("LIQ_THRESHOLD must be positive");
        }
        if self.consecutive_zero_volume_periods == 0 {
            bail!("CONSECUTIVE_ZERO_VOLUME_PERIODS must be positive");
        }
        if !(self.max_cleanup_percentage > 0.0 && self.max_cleanup_percentage <= 1.0) {
            bail!(
                "MAX_CLEANUP_PERCENTAGE must be in (0, 1], got {}",
                self.max_cleanup_percentage
            );
        }
        if !(self.rug_price_drop > 0.0 && self.rug_price_drop <= 1.0) {
            bail!("RUG_PRICE_DROP must be in (0, 1], got {}", self.rug_price_drop);
        }
        if !(self.rug_volume_drop > 0.0 && self.rug_volume_drop <= 1.0) {
            bail!(
                "RUG_VOLUME_DROP must be in (0, 1], got {}",
                self.rug_volume_drop
            );
        }

        let minute = chrono::Duration::minutes(1);
        let mut warnings = Vec::new();
        if self.inactivity_threshold < minute {
            warnings.push("INACTIVITY_THRESHOLD_MS below 1 minute".to_string());
        }
        if self.cleanup_interval < minute {
            warnings.push("CLEANUP_INTERVAL_MS below 1 minute".to_string());
        }
        if self.max_cleanup_percentage > 0.5 {
            warnings.push(format!(
                "MAX_CLEANUP_PERCENTAGE {} is above 0.5",
                self.max_cleanup_percentage
            ));
        }
        if self.grace_period < chrono::Duration::minutes(5) {
            warnings.push("GRACE_PERIOD_MS below 5 minutes".to_string());
        }
        if self.cleanup_interval < self.analysis_interval {
            warnings.push("CLEANUP_INTERVAL_MS below ANALYSIS_INTERVAL_MS".to_string());
        }
        if self.inactivity_threshold < self.grace_period {
            warnings.push(
                "INACTIVITY_THRESHOLD_MS below GRACE_PERIOD_MS: tokens would never be considered inactive"
                    .to_string(),
            );
        }
        Ok(warnings)
    }
}

/// Emergency control flags. `stop_reason` latches until `resume_cleanup`.
#[derive(Debug, Default)]
pub(crate) struct EmergencyState {
    pub stop_reason: Option<String>,
    pub pause_reason: Option<String>,
    pub disable_all_cleanup: bool,
    pub force_minimum_tokens: bool,
    pub emergency_whitelist: HashSet<String>,
}

/// Everything behind the tracker's single write lock.
pub(crate) struct TrackerState {
    pub current: HashMap<String, TokenSnapshot>,
    pub health: HashMap<String, TokenHealth>,
    pub history: HashMap<String, VecDeque<PricePoint>>,
    pub indices: TokenIndices,
    pub alerts: HashMap<String, Alert>,
    pub trends: HashMap<(String, TrendWindow), Trend>,
    pub emergency: EmergencyState,
    pub cleanup_running: bool,
    pub cleanup_cycles: u64,
    pub total_untracked: u64,
}

impl TrackerState {
    fn new() -> Self {
        Self {
            current: HashMap::new(),
            health: HashMap::new(),
            history: HashMap::new(),
            indices: TokenIndices::default(),
            alerts: HashMap::new(),
            trends: HashMap::new(),
            emergency: EmergencyState::default(),
            cleanup_running: false,
            cleanup_cycles: 0,
            total_untracked: 0,
        }
    }
}

/// Stats projection over the tracker.
#[derive(Debug, Clone, Default)]
pub struct TrackerStats {
    pub tracked: usize,
    pub max_tokens_tracked: usize,
    pub new_tokens: usize,
    pub recently_active: usize,
    pub inactive: usize,
    pub low_volume: usize,
    pub rugged_candidates: usize,
    pub alerts: usize,
    pub trends: usize,
    pub cleanup_cycles: u64,
    pub total_untracked: u64,
    pub cleanup_paused: bool,
    pub emergency_stopped: bool,
}

pub struct Tracker {
    pub(crate) config: TrackerConfig,
    pub(crate) state: RwLock<TrackerState>,
    pub(crate) sink: Arc<dyn TimeSeriesSink>,
    pub(crate) bus: EventBus,
    alert_seq: AtomicU64,
}

impl Tracker {
    /// Construct and validate. Warnings are logged; errors refuse to
    /// start.
    pub fn new(
        config: TrackerConfig,
        sink: Arc<dyn TimeSeriesSink>,
        bus: EventBus,
    ) -> Result<Arc<Self>> {
        let warnings = config.validate()?;
        for w in &warnings {
            log(LogTag::Tracker, "WARN", &format!("Config warning: {}", w));
        }

        Ok(Arc::new(Self {
            config,
            state: RwLock::new(TrackerState::new()),
            sink,
            bus,
            alert_seq: AtomicU64::new(0),
        }))
    }

    /// Upsert one accepted snapshot: current, health, history ring,
    /// alerts, indices. Silently skipped while the mint is under
    /// cleanup evaluation.
    pub async fn track_token(&self, snapshot: &TokenSnapshot) {
        let now = Utc::now();
        let newly_tracked;
        let triggered;
        {
            let mut st = self.state.write().await;

            if st
                .health
                .get(&snapshot.mint)
                .map_or(false, |h| h.is_being_evaluated)
            {
                return;
            }

            newly_tracked = !st.current.contains_key(&snapshot.mint);
            st.current.insert(snapshot.mint.clone(), snapshot.clone());

            match st.health.get_mut(&snapshot.mint) {
                Some(h) => h.apply_update(snapshot, now, self.config.min_volume_24h),
                None => {
                    let whitelisted = self.config.whitelist.contains(&snapshot.mint);
                    st.health.insert(
                        snapshot.mint.clone(),
                        TokenHealth::first_seen(
                            snapshot,
                            now,
                            whitelisted,
                            self.config.min_volume_24h,
                        ),
                    );
                }
            }

            if snapshot.price > 0.0 {
                let ring = st.history.entry(snapshot.mint.clone()).or_default();
                push_time_sorted(
                    ring,
                    PricePoint {
                        mint: snapshot.mint.clone(),
                        platform: snapshot.platform,
                        price: snapshot.price,
                        volume: snapshot.volume_24h,
                        timestamp: snapshot.timestamp,
                        source: "tracker".to_string(),
                    },
                    self.config.history_cap,
                );
            }

            triggered = alerts::evaluate_for(&mut *st, snapshot, now);

            let TrackerState {
                indices, health, ..
            } = &mut *st;
            if let Some(h) = health.get(&snapshot.mint) {
                indices.recompute(&snapshot.mint, snapshot, h, &self.config, now);
            }
        }

        // Events go out only after the snapshot is installed.
        self.bus.publish(BusEvent::TokenTracked {
            mint: snapshot.mint.clone(),
            price: snapshot.price,
        });
        for alert in triggered {
            log(
                LogTag::Tracker,
                "ALERT",
                &format!("Alert {} fired for {}", alert.id, alert.mint),
            );
            self.bus.publish(BusEvent::AlertTriggered {
                alert,
                snapshot: snapshot.clone(),
            });
        }

        if newly_tracked && is_debug_tracker_enabled() {
            log(
                LogTag::Tracker,
                "TRACK",
                &format!("Now tracking {} ({})", snapshot.mint, snapshot.symbol),
            );
        }
    }

    /// Update last-trade bookkeeping for a validated trade.
    pub async fn record_trade(&self, trade: &Trade) {
        let now = Utc::now();
        let mut st = self.state.write().await;
        let TrackerState {
            current,
            health,
            indices,
            ..
        } = &mut *st;

        let Some(h) = health.get_mut(&trade.mint) else {
            return;
        };
        // Same guard as track_token: the cleanup transaction must not
        // see its inputs move.
        if h.is_being_evaluated {
            return;
        }
        h.last_trade = trade.timestamp.min(now);
        h.total_trades += 1;

        if let Some(snapshot) = current.get(&trade.mint) {
            indices.recompute(&trade.mint, snapshot, h, &self.config, now);
        }
    }

    /// Track a mint again after it was untracked. Refused while the
    /// mint is still tracked; health restarts as first-seen.
    pub async fn retrack_token(&self, snapshot: &TokenSnapshot, reason: Option<&str>) -> Result<()> {
        {
            let st = self.state.read().await;
            if st.current.contains_key(&snapshot.mint) {
                bail!("{} is already tracked", snapshot.mint);
            }
        }
        log(
            LogTag::Tracker,
            "TRACK",
            &format!(
                "Retracking {} ({})",
                snapshot.mint,
                reason.unwrap_or("no reason given")
            ),
        );
        self.track_token(snapshot).await;
        Ok(())
    }

    pub async fn get_snapshot(&self, mint: &str) -> Option<TokenSnapshot> {
        self.state.read().await.current.get(mint).cloned()
    }

    pub async fn get_all(&self) -> Vec<TokenSnapshot> {
        self.state.read().await.current.values().cloned().collect()
    }

    pub async fn get_health(&self, mint: &str) -> Option<TokenHealth> {
        self.state.read().await.health.get(mint).cloned()
    }

    /// Most recent `limit` points of the in-memory ring, oldest first.
    pub async fn get_history(&self, mint: &str, limit: usize) -> Vec<PricePoint> {
        let st = self.state.read().await;
        let Some(ring) = st.history.get(mint) else {
            return Vec::new();
        };
        let skip = ring.len().saturating_sub(limit);
        ring.iter().skip(skip).cloned().collect()
    }

    pub async fn tracked_count(&self) -> usize {
        self.state.read().await.current.len()
    }

    /// Register a one-shot alert; returns its id.
    pub async fn add_alert(&self, spec: AlertSpec) -> String {
        let id = alerts::next_id(&self.alert_seq);
        let alert = Alert {
            id: id.clone(),
            mint: spec.mint,
            symbol: spec.symbol,
            kind: spec.kind,
            condition: spec.condition,
            value: spec.value,
            enabled: true,
            triggered: false,
            created_at: Utc::now(),
            triggered_at: None,
        };
        self.state.write().await.alerts.insert(id.clone(), alert);
        id
    }

    pub async fn remove_alert(&self, id: &str) -> bool {
        self.state.write().await.alerts.remove(id).is_some()
    }

    pub async fn get_alerts(&self) -> Vec<Alert> {
        self.state.read().await.alerts.values().cloned().collect()
    }

    pub async fn get_trend(&self, mint: &str, window: TrendWindow) -> Option<Trend> {
        self.state
            .read()
            .await
            .trends
            .get(&(mint.to_string(), window))
            .cloned()
    }

    pub async fn get_all_trends(&self) -> Vec<Trend> {
        self.state.read().await.trends.values().cloned().collect()
    }

    pub async fn stats(&self) -> TrackerStats {
        let st = self.state.read().await;
        TrackerStats {
            tracked: st.current.len(),
            max_tokens_tracked: self.config.max_tokens_tracked,
            new_tokens: st.indices.new_tokens.len(),
            recently_active: st.indices.recently_active.len(),
            inactive: st.indices.inactive.len(),
            low_volume: st.indices.low_volume.len(),
            rugged_candidates: st.indices.rugged_candidates.len(),
            alerts: st.alerts.len(),
            trends: st.trends.len(),
            cleanup_cycles: st.cleanup_cycles,
            total_untracked: st.total_untracked,
            cleanup_paused: st.emergency.pause_reason.is_some(),
            emergency_stopped: st.emergency.stop_reason.is_some(),
        }
    }
}

/// Insert keeping the ring time-sorted with bounded capacity. Points
/// almost always arrive in order; the scan from the back is for the
/// occasional straggler.
fn push_time_sorted(ring: &mut VecDeque<PricePoint>, point: PricePoint, cap: usize) {
    let pos = ring
        .iter()
        .rposition(|p| p.timestamp <= point.timestamp)
        .map(|i| i + 1)
        .unwrap_or(0);
    if pos == ring.len() {
        ring.push_back(point);
    } else {
        ring.insert(pos, point);
    }
    while ring.len() > cap {
        ring.pop_front();
    }
}
