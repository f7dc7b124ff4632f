// tracker/health.rs
// Per-token lifecycle bookkeeping. The zero-volume counter is mutated
// only on this write path; cleanup evaluation reads it without touching
// it.

use chrono::{ DateTime, Utc };

use crate::types::{ TokenHealth, TokenSnapshot };

impl TokenHealth {
    /// Seed health on the first accepted snapshot for a mint. The
    /// creation event counts as the first volume period.
    pub(crate) fn first_seen(
        snapshot: &TokenSnapshot,
        now: DateTime<Utc>,
        whitelisted: bool,
        min_volume_24h: f64,
    ) -> Self {
        Self {
            mint: snapshot.mint.clone(),
            first_seen: now,
            last_trade: now,
            consecutive_zero_volume_periods: if snapshot.volume_24h < min_volume_24h {
                1
            } else {
                0
            },
            peak_price: snapshot.price,
            peak_volume_24h: snapshot.volume_24h,
            current_liquidity: snapshot.liquidity,
            total_trades: 0,
            is_whitelisted: whitelisted,
            is_being_evaluated: false,
        }
    }

    /// Apply an accepted update. Never called while the mint is under
    /// cleanup evaluation.
    pub(crate) fn apply_update(
        &mut self,
        snapshot: &TokenSnapshot,
        now: DateTime<Utc>,
        min_volume_24h: f64,
    ) {
        self.last_trade = now;
        self.peak_price = self.peak_price.max(snapshot.price);
        self.peak_volume_24h = self.peak_volume_24h.max(snapshot.volume_24h);
        self.current_liquidity = snapshot.liquidity;

        // Strict less-than: volume exactly at the threshold is not a
        // low-volume period.
        if snapshot.volume_24h < min_volume_24h {
            self.consecutive_zero_volume_periods += 1;
        } else {
            self.consecutive_zero_volume_periods = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::test_support::snapshot;

    const MIN_VOLUME: f64 = 10.0;

    #[test]
    fn test_first_seen_seeds_peaks() {
        let snap = snapshot("MintA", 2.0, 100.0, 500.0);
        let h = TokenHealth::first_seen(&snap, Utc::now(), false, MIN_VOLUME);
        assert_eq!(h.peak_price, 2.0);
        assert_eq!(h.peak_volume_24h, 100.0);
        assert_eq!(h.consecutive_zero_volume_periods, 0);
        assert_eq!(h.first_seen, h.last_trade);
    }

    #[test]
    fn test_low_volume_counter_increments_and_resets() {
        let now = Utc::now();
        let mut h = TokenHealth::first_seen(&snapshot("M", 1.0, 5.0, 500.0), now, false, MIN_VOLUME);
        assert_eq!(h.consecutive_zero_volume_periods, 1);

        h.apply_update(&snapshot("M", 1.0, 5.0, 500.0), now, MIN_VOLUME);
        h.apply_update(&snapshot("M", 1.0, 0.0, 500.0), now, MIN_VOLUME);
        assert_eq!(h.consecutive_zero_volume_periods, 3);

        h.apply_update(&snapshot("M", 1.0, 15.0, 500.0), now, MIN_VOLUME);
        assert_eq!(h.consecutive_zero_volume_periods, 0);
    }

    #[test]
    fn test_volume_exactly_at_threshold_does_not_increment() {
        let now = Utc::now();
        let mut h =
            TokenHealth::first_seen(&snapshot("M", 1.0, 50.0, 500.0), now, false, MIN_VOLUME);
        h.apply_update(&snapshot("M", 1.0, MIN_VOLUME, 500.0), now, MIN_VOLUME);
        assert_eq!(h.consecutive_zero_volume_periods, 0);
    }

    #[test]
    fn test_peaks_are_monotonic() {
        let now = Utc::now();
        let mut h =
            TokenHealth::first_seen(&snapshot("M", 3.0, 300.0, 500.0), now, false, MIN_VOLUME);
        h.apply_update(&snapshot("M", 1.0, 100.0, 400.0), now, MIN_VOLUME);
        assert_eq!(h.peak_price, 3.0);
        assert_eq!(h.peak_volume_24h, 300.0);
        assert_eq!(h.current_liquidity, 400.0);

        h.apply_update(&snapshot("M", 5.0, 600.0, 700.0), now, MIN_VOLUME);
        assert_eq!(h.peak_price, 5.0);
        assert_eq!(h.peak_volume_24h, 600.0);
    }
}
