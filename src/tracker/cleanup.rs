// tracker/cleanup.rs
// The cleanup protocol: one transaction per cycle, three phases.
// Phase 1 evaluates candidates read-only under the write lock and tags
// them with the concurrent-update guard. Phase 2 applies the per-cycle
// cap and the population floor, re-checks each candidate, and untracks.
// Phase 3 writes metrics and clears every guard flag on every exit path.

use chrono::{ DateTime, Utc };

use anyhow::{ bail, Result };

use super::{ Tracker, TrackerConfig };
use crate::arguments::is_debug_cleanup_enabled;
use crate::database::TimeSeriesSink;
use crate::events::BusEvent;
use crate::logger::{ log, LogTag };
use crate::types::{ CleanupEvent, CleanupMetrics, CleanupReason, TokenHealth, TokenSnapshot };

/// One phase-1 verdict.
#[derive(Debug, Clone)]
pub struct CleanupCandidate {
    pub mint: String,
    pub reason: CleanupReason,
    pub details: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CleanupMode {
    Scheduled,
    Forced,
}

/// Operator overrides settable at runtime.
#[derive(Debug, Clone, Copy)]
pub enum OverrideFlag {
    DisableAllCleanup(bool),
    ForceMinimumTokens(bool),
}

struct PhaseOne {
    tagged: Vec<String>,
    selected: Vec<CleanupCandidate>,
    tracked_before: usize,
    effective_min: usize,
}

/// Rug detection. Price collapse outranks the liquidity floor, which
/// outranks volume collapse in the reported reason.
pub(crate) fn detect_rugged(
    snapshot: &TokenSnapshot,
    health: &TokenHealth,
    config: &TrackerConfig,
) -> Option<String> {
    let price_drop = if health.peak_price > 0.0 {
        (health.peak_price - snapshot.price) / health.peak_price
    } else {
        0.0
    };
    if price_drop >= config.rug_price_drop {
        return Some(format!("Price dropped {:.2}% from peak", price_drop * 100.0));
    }

    if health.current_liquidity < config.liquidity_threshold {
        return Some(format!(
            "Liquidity {:.2} below threshold {:.2}",
            health.current_liquidity, config.liquidity_threshold
        ));
    }

    if health.peak_volume_24h > 0.0 {
        let volume_drop = (health.peak_volume_24h - snapshot.volume_24h) / health.peak_volume_24h;
        if volume_drop >= config.rug_volume_drop {
            return Some(format!(
                "Volume dropped {:.2}% from peak",
                volume_drop * 100.0
            ));
        }
    }

    None
}

pub(crate) fn detect_inactive(
    health: &TokenHealth,
    config: &TrackerConfig,
    now: DateTime<Utc>,
) -> Option<String> {
    let since_trade = now - health.last_trade;
    if since_trade > config.inactivity_threshold {
        return Some(format!("No trades for {} minutes", since_trade.num_minutes()));
    }
    None
}

pub(crate) fn detect_low_volume(
    snapshot: &TokenSnapshot,
    health: &TokenHealth,
    config: &TrackerConfig,
) -> Option<String> {
    if snapshot.volume_24h < config.min_volume_24h
        && health.consecutive_zero_volume_periods >= config.consecutive_zero_volume_periods
    {
        return Some(format!(
            "24h volume {:.2} below {:.2} for {} consecutive periods",
            snapshot.volume_24h, config.min_volume_24h, health.consecutive_zero_volume_periods
        ));
    }
    None
}

/// Reason precedence: rugged over inactive over low-volume.
pub(crate) fn derive_reason(
    snapshot: &TokenSnapshot,
    health: &TokenHealth,
    config: &TrackerConfig,
    now: DateTime<Utc>,
) -> Option<(CleanupReason, String)> {
    if let Some(details) = detect_rugged(snapshot, health, config) {
        return Some((CleanupReason::Rugged, details));
    }
    if let Some(details) = detect_inactive(health, config, now) {
        return Some((CleanupReason::Inactive, details));
    }
    if let Some(details) = detect_low_volume(snapshot, health, config) {
        return Some((CleanupReason::LowVolume, details));
    }
    None
}

impl Tracker {
    /// Scheduled cleanup entry point, driven by the cleanup timer.
    pub async fn run_cleanup_cycle(&self) -> Result<CleanupMetrics> {
        if !self.config.cleanup_enabled {
            return Ok(CleanupMetrics::default());
        }
        self.run_cleanup(self.config.max_cleanup_percentage, CleanupMode::Scheduled)
            .await
    }

    /// One immediate transaction with the removal cap raised to
    /// `percentage`. Whitelist, grace period, and the population floor
    /// still hold; the pause/disable switches do not.
    pub async fn force_cleanup(&self, percentage: f64, reason: &str) -> Result<CleanupMetrics> {
        if !(percentage > 0.0 && percentage <= 0.5) {
            bail!(
                "force cleanup percentage must be in (0, 0.5], got {}",
                percentage
            );
        }
        log(
            LogTag::Cleanup,
            "WARN",
            &format!("Forced cleanup at {:.0}%: {}", percentage * 100.0, reason),
        );

        let metrics = self.run_cleanup(percentage, CleanupMode::Forced).await?;
        self.bus.publish(BusEvent::EmergencyCleanupCompleted {
            removed: metrics.actually_removed as usize,
            reason: reason.to_string(),
        });
        Ok(metrics)
    }

    async fn run_cleanup(&self, max_pct: f64, mode: CleanupMode) -> Result<CleanupMetrics> {
        let started = std::time::Instant::now();
        let mut metrics = CleanupMetrics::default();

        // Entry gates and phase 1 run under one write guard with no
        // suspension points.
        let phase_one = {
            let mut st = self.state.write().await;

            if st.cleanup_running {
                if is_debug_cleanup_enabled() {
                    log(LogTag::Cleanup, "DEBUG", "Cleanup already running, skipped");
                }
                return Ok(metrics);
            }
            if let Some(reason) = &st.emergency.stop_reason {
                log(
                    LogTag::Cleanup,
                    "WARN",
                    &format!("Cleanup blocked by emergency stop: {}", reason),
                );
                return Ok(metrics);
            }
            if mode == CleanupMode::Scheduled
                && (st.emergency.pause_reason.is_some() || st.emergency.disable_all_cleanup)
            {
                if is_debug_cleanup_enabled() {
                    log(LogTag::Cleanup, "DEBUG", "Cleanup paused or disabled, skipped");
                }
                return Ok(metrics);
            }

            let effective_min = if st.emergency.force_minimum_tokens {
                self.config.min_tokens_to_keep * 2
            } else {
                self.config.min_tokens_to_keep
            };
            let tracked_before = st.current.len();
            if tracked_before <= effective_min {
                if is_debug_cleanup_enabled() {
                    log(
                        LogTag::Cleanup,
                        "DEBUG",
                        &format!(
                            "Population {} at or below floor {}, skipped",
                            tracked_before, effective_min
                        ),
                    );
                }
                return Ok(metrics);
            }

            st.cleanup_running = true;
            st.cleanup_cycles += 1;

            // Tag every candidate first; the flag is the guard that
            // keeps updates from moving the rule inputs mid-transaction.
            let candidate_mints = st.indices.candidates();
            let mut tagged = Vec::new();
            for mint in &candidate_mints {
                if let Some(h) = st.health.get_mut(mint) {
                    h.is_being_evaluated = true;
                    tagged.push(mint.clone());
                }
            }
            metrics.total_evaluated = tagged.len() as u64;

            let now = Utc::now();
            let mut selected = Vec::new();
            for mint in &tagged {
                let (Some(snapshot), Some(health)) = (st.current.get(mint), st.health.get(mint))
                else {
                    continue;
                };
                if health.is_whitelisted || st.emergency.emergency_whitelist.contains(mint) {
                    metrics.saved_by_whitelist += 1;
                    continue;
                }
                if now - health.first_seen < self.config.grace_period {
                    metrics.saved_by_grace_period += 1;
                    continue;
                }
                let Some((reason, details)) = derive_reason(snapshot, health, &self.config, now)
                else {
                    continue;
                };
                match reason {
                    CleanupReason::Rugged => metrics.rugged_detected += 1,
                    CleanupReason::Inactive => metrics.inactive_detected += 1,
                    CleanupReason::LowVolume => metrics.low_volume_detected += 1,
                }
                selected.push(CleanupCandidate {
                    mint: mint.clone(),
                    reason,
                    details,
                });
            }

            PhaseOne {
                tagged,
                selected,
                tracked_before,
                effective_min,
            }
        };

        let exec_result = self
            .execute_untracks(&phase_one, max_pct, &mut metrics)
            .await;

        // Phase 3 runs regardless of how phase 2 went.
        {
            let mut st = self.state.write().await;
            for mint in &phase_one.tagged {
                if let Some(h) = st.health.get_mut(mint) {
                    h.is_being_evaluated = false;
                }
            }
            st.cleanup_running = false;
            st.total_untracked += metrics.actually_removed;
        }

        metrics.execution_time_ms = started.elapsed().as_millis() as u64;
        metrics.timestamp = Some(Utc::now());

        if metrics.total_evaluated > 0 {
            if let Err(e) = self.sink.write_cleanup_metrics(&metrics).await {
                log(
                    LogTag::Cleanup,
                    "WARN",
                    &format!("Cleanup metrics write failed: {}", e),
                );
            }
            self.bus.publish(BusEvent::CleanupMetrics {
                metrics: metrics.clone(),
            });
            log(
                LogTag::Cleanup,
                "INFO",
                &format!(
                    "Cycle done: {} evaluated, {} removed, {} saved by whitelist, {} by grace, {} by limit ({}ms)",
                    metrics.total_evaluated,
                    metrics.actually_removed,
                    metrics.saved_by_whitelist,
                    metrics.saved_by_grace_period,
                    metrics.saved_by_limit,
                    metrics.execution_time_ms
                ),
            );
        }

        exec_result?;
        Ok(metrics)
    }

    /// Phase 2: apply the cap and the floor, re-check, untrack.
    async fn execute_untracks(
        &self,
        phase_one: &PhaseOne,
        max_pct: f64,
        metrics: &mut CleanupMetrics,
    ) -> Result<()> {
        let removal_cap = ((phase_one.tracked_before as f64) * max_pct).floor() as usize;
        let overflow = phase_one.selected.len().saturating_sub(removal_cap);
        metrics.saved_by_limit += overflow as u64;

        for candidate in phase_one.selected.iter().take(removal_cap) {
            let now = Utc::now();

            let removal = {
                let mut st = self.state.write().await;

                // The floor never lets the population reach the
                // minimum; remaining candidates are counted as saved by
                // the limit rail.
                if st.current.len() <= phase_one.effective_min + 1 {
                    metrics.saved_by_limit += 1;
                    continue;
                }

                let (Some(snapshot), Some(health)) = (
                    st.current.get(&candidate.mint).cloned(),
                    st.health.get(&candidate.mint).cloned(),
                ) else {
                    continue;
                };

                // Conditions may have shifted between phases; re-derive
                // against the current snapshot.
                let Some((reason, details)) =
                    derive_reason(&snapshot, &health, &self.config, now)
                else {
                    if is_debug_cleanup_enabled() {
                        log(
                            LogTag::Cleanup,
                            "DEBUG",
                            &format!("{} no longer satisfies {}, skipped", candidate.mint, candidate.reason),
                        );
                    }
                    continue;
                };

                st.current.remove(&candidate.mint);
                st.history.remove(&candidate.mint);
                st.health.remove(&candidate.mint);
                st.indices.remove(&candidate.mint);
                st.alerts.retain(|_, a| a.mint != candidate.mint);
                st.trends.retain(|(mint, _), _| mint != &candidate.mint);

                (snapshot, health, reason, details)
            };

            let (snapshot, health, reason, details) = removal;
            metrics.actually_removed += 1;

            let event = CleanupEvent {
                mint: snapshot.mint.clone(),
                symbol: snapshot.symbol.clone(),
                platform: snapshot.platform,
                reason,
                details: details.clone(),
                timestamp: now,
                final_price: snapshot.price,
                final_volume_24h: snapshot.volume_24h,
                final_liquidity: snapshot.liquidity,
                final_market_cap: snapshot.market_cap,
                peak_price: health.peak_price,
                peak_volume_24h: health.peak_volume_24h,
                tracked_duration_secs: (now - health.first_seen).num_seconds(),
                total_trades: health.total_trades,
            };

            // Immediate, best-effort: the in-memory removal is
            // authoritative and never waits on the store.
            if let Err(e) = self.sink.write_cleanup_event(&event).await {
                log(
                    LogTag::Cleanup,
                    "ERROR",
                    &format!("Cleanup event write failed for {}: {}", snapshot.mint, e),
                );
            }

            log(
                LogTag::Cleanup,
                "UNTRACK",
                &format!("{} ({}): {}", snapshot.mint, reason, details),
            );
            self.bus.publish(BusEvent::TokenCleanedUp {
                mint: snapshot.mint,
                symbol: snapshot.symbol,
                platform: snapshot.platform,
                reason,
                details,
            });
        }

        Ok(())
    }

    /// Latch the emergency stop. Cleanup refuses to run until
    /// `resume_cleanup`.
    pub async fn emergency_stop(&self, reason: &str) {
        self.state.write().await.emergency.stop_reason = Some(reason.to_string());
        log(
            LogTag::Cleanup,
            "ERROR",
            &format!("EMERGENCY STOP: {}", reason),
        );
        self.bus.publish(BusEvent::EmergencyStop {
            reason: reason.to_string(),
        });
    }

    pub async fn pause_cleanup(&self, reason: &str) {
        self.state.write().await.emergency.pause_reason = Some(reason.to_string());
        log(LogTag::Cleanup, "WARN", &format!("Cleanup paused: {}", reason));
    }

    /// Clears both the pause and the emergency-stop latch.
    pub async fn resume_cleanup(&self, reason: &str) {
        let mut st = self.state.write().await;
        st.emergency.pause_reason = None;
        st.emergency.stop_reason = None;
        log(LogTag::Cleanup, "INFO", &format!("Cleanup resumed: {}", reason));
    }

    pub async fn set_override(&self, flag: OverrideFlag, reason: &str) {
        let mut st = self.state.write().await;
        match flag {
            OverrideFlag::DisableAllCleanup(on) => st.emergency.disable_all_cleanup = on,
            OverrideFlag::ForceMinimumTokens(on) => st.emergency.force_minimum_tokens = on,
        }
        log(
            LogTag::Cleanup,
            "WARN",
            &format!("Override {:?} set: {}", flag, reason),
        );
    }

    pub async fn add_emergency_whitelist(&self, mints: Vec<String>, reason: &str) {
        {
            let mut st = self.state.write().await;
            for mint in &mints {
                st.emergency.emergency_whitelist.insert(mint.clone());
            }
        }
        log(
            LogTag::Cleanup,
            "WARN",
            &format!("Emergency whitelist +{} mints: {}", mints.len(), reason),
        );
        self.bus.publish(BusEvent::EmergencyWhitelistUpdated {
            mints,
            added: true,
            reason: reason.to_string(),
        });
    }

    pub async fn remove_emergency_whitelist(&self, mints: Vec<String>, reason: &str) {
        {
            let mut st = self.state.write().await;
            for mint in &mints {
                st.emergency.emergency_whitelist.remove(mint);
            }
        }
        log(
            LogTag::Cleanup,
            "WARN",
            &format!("Emergency whitelist -{} mints: {}", mints.len(), reason),
        );
        self.bus.publish(BusEvent::EmergencyWhitelistUpdated {
            mints,
            added: false,
            reason: reason.to_string(),
        });
    }
}
