// tracker/indices.rs
// The five derived mint sets. Rebuilt per mint on every accepted update:
// drop from all, then insert where current state says it belongs.
// Grace-period membership is exclusive and suppresses the failure sets.

use std::collections::HashSet;

use chrono::{ DateTime, Utc };

use super::TrackerConfig;
use crate::types::{ TokenHealth, TokenSnapshot };

#[derive(Debug, Default)]
pub struct TokenIndices {
    pub new_tokens: HashSet<String>,
    pub recently_active: HashSet<String>,
    pub inactive: HashSet<String>,
    pub low_volume: HashSet<String>,
    pub rugged_candidates: HashSet<String>,
}

impl TokenIndices {
    pub fn remove(&mut self, mint: &str) {
        self.new_tokens.remove(mint);
        self.recently_active.remove(mint);
        self.inactive.remove(mint);
        self.low_volume.remove(mint);
        self.rugged_candidates.remove(mint);
    }

    pub fn recompute(
        &mut self,
        mint: &str,
        snapshot: &TokenSnapshot,
        health: &TokenHealth,
        config: &TrackerConfig,
        now: DateTime<Utc>,
    ) {
        self.remove(mint);

        let age = now - health.first_seen;
        if age < config.grace_period {
            self.new_tokens.insert(mint.to_string());
            return;
        }

        let since_trade = now - health.last_trade;
        if since_trade < config.inactivity_threshold / 2 {
            self.recently_active.insert(mint.to_string());
        }
        if since_trade > config.inactivity_threshold {
            self.inactive.insert(mint.to_string());
        }

        if snapshot.volume_24h < config.min_volume_24h
            && health.consecutive_zero_volume_periods >= config.consecutive_zero_volume_periods
        {
            self.low_volume.insert(mint.to_string());
        }

        let price_drop = if health.peak_price > 0.0 {
            (health.peak_price - snapshot.price) / health.peak_price
        } else {
            0.0
        };
        let volume_drop = if health.peak_volume_24h > 0.0 {
            (health.peak_volume_24h - snapshot.volume_24h) / health.peak_volume_24h
        } else {
            0.0
        };
        if health.current_liquidity < config.liquidity_threshold
            || price_drop >= config.rug_price_drop
            || volume_drop >= config.rug_volume_drop
        {
            self.rugged_candidates.insert(mint.to_string());
        }
    }

    /// Cleanup candidate order: rugged first, then inactive, then
    /// low-volume, each mint once.
    pub fn candidates(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for set in [&self.rugged_candidates, &self.inactive, &self.low_volume] {
            let mut mints: Vec<&String> = set.iter().collect();
            mints.sort();
            for mint in mints {
                if seen.insert(mint.clone()) {
                    out.push(mint.clone());
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::test_support::{ snapshot, test_config };
    use crate::types::TokenHealth;

    fn aged_health(snapshot: &TokenSnapshot, age: chrono::Duration) -> TokenHealth {
        let now = Utc::now();
        let mut h = TokenHealth::first_seen(snapshot, now - age, false, 10.0);
        h.last_trade = now - chrono::Duration::seconds(1);
        h
    }

    #[test]
    fn test_grace_period_is_exclusive() {
        let config = test_config();
        let mut indices = TokenIndices::default();
        let now = Utc::now();

        // Young token with rug-level liquidity: grace wins.
        let snap = snapshot("A", 1.0, 0.0, 0.0);
        let health = TokenHealth::first_seen(&snap, now, false, config.min_volume_24h);
        indices.recompute("A", &snap, &health, &config, now);

        assert!(indices.new_tokens.contains("A"));
        assert!(!indices.rugged_candidates.contains("A"));
        assert!(!indices.low_volume.contains("A"));
        assert!(!indices.inactive.contains("A"));
        assert!(!indices.recently_active.contains("A"));
    }

    #[test]
    fn test_recently_active_and_inactive_are_disjoint() {
        let config = test_config();
        let mut indices = TokenIndices::default();
        let now = Utc::now();
        let snap = snapshot("A", 1.0, 100.0, 500.0);

        let mut health = aged_health(&snap, chrono::Duration::hours(2));
        indices.recompute("A", &snap, &health, &config, now);
        assert!(indices.recently_active.contains("A"));
        assert!(!indices.inactive.contains("A"));

        health.last_trade = now - chrono::Duration::hours(2);
        indices.recompute("A", &snap, &health, &config, now);
        assert!(!indices.recently_active.contains("A"));
        assert!(indices.inactive.contains("A"));
    }

    #[test]
    fn test_rugged_by_price_drop_boundary() {
        let config = test_config();
        let mut indices = TokenIndices::default();
        let now = Utc::now();

        // Exactly the threshold counts as rugged.
        let snap = snapshot("A", 0.05, 100.0, 500.0);
        let mut health = aged_health(&snap, chrono::Duration::hours(2));
        health.peak_price = 1.0;
        indices.recompute("A", &snap, &health, &config, now);
        assert!(indices.rugged_candidates.contains("A"));

        // Just under stays clean.
        let snap = snapshot("A", 0.06, 100.0, 500.0);
        let mut health = aged_health(&snap, chrono::Duration::hours(2));
        health.peak_price = 1.0;
        indices.recompute("A", &snap, &health, &config, now);
        assert!(!indices.rugged_candidates.contains("A"));
    }

    #[test]
    fn test_low_volume_requires_consecutive_periods() {
        let config = test_config();
        let mut indices = TokenIndices::default();
        let now = Utc::now();
        let snap = snapshot("A", 1.0, 5.0, 500.0);

        let mut health = aged_health(&snap, chrono::Duration::hours(2));
        health.consecutive_zero_volume_periods = 2;
        indices.recompute("A", &snap, &health, &config, now);
        assert!(!indices.low_volume.contains("A"));

        health.consecutive_zero_volume_periods = 3;
        indices.recompute("A", &snap, &health, &config, now);
        assert!(indices.low_volume.contains("A"));
    }

    #[test]
    fn test_candidates_order_prefers_rugged() {
        let mut indices = TokenIndices::default();
        indices.low_volume.insert("C".to_string());
        indices.inactive.insert("B".to_string());
        indices.rugged_candidates.insert("A".to_string());
        indices.inactive.insert("A".to_string());

        assert_eq!(indices.candidates(), vec!["A", "B", "C"]);
    }
}
