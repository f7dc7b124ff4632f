// tracker/alerts.rs
// One-shot alert evaluation on the update path. Threshold alerts fire
// against the current price; percentage alerts measure from the oldest
// point still in the in-memory ring.

use std::sync::atomic::{ AtomicU64, Ordering };

use chrono::{ DateTime, Utc };

use super::TrackerState;
use crate::types::{ Alert, AlertCondition, AlertKind, TokenSnapshot };

/// Globally unique alert id: monotonic counter plus a random suffix.
pub(crate) fn next_id(seq: &AtomicU64) -> String {
    let n = seq.fetch_add(1, Ordering::SeqCst) + 1;
    let suffix: u16 = rand::random();
    format!("alert-{}-{:04x}", n, suffix)
}

/// Evaluate every live alert for this mint. Fired alerts stay fired
/// until removed.
pub(crate) fn evaluate_for(
    state: &mut TrackerState,
    snapshot: &TokenSnapshot,
    now: DateTime<Utc>,
) -> Vec<Alert> {
    let baseline = state
        .history
        .get(&snapshot.mint)
        .and_then(|ring| ring.front())
        .map(|p| p.price);

    let mut fired = Vec::new();
    for alert in state.alerts.values_mut() {
        if alert.mint != snapshot.mint || !alert.enabled || alert.triggered {
            continue;
        }

        let hit = match alert.kind {
            AlertKind::Threshold => match alert.condition {
                AlertCondition::Above => snapshot.price > alert.value,
                AlertCondition::Below => snapshot.price < alert.value,
            },
            AlertKind::Percentage => match baseline {
                Some(base) if base > 0.0 => {
                    let pct = 100.0 * (snapshot.price - base) / base;
                    match alert.condition {
                        AlertCondition::Above => pct >= alert.value,
                        AlertCondition::Below => pct <= -alert.value,
                    }
                }
                _ => false,
            },
        };

        if hit {
            alert.triggered = true;
            alert.triggered_at = Some(now);
            fired.push(alert.clone());
        }
    }
    fired
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::test_support::{ make_tracker, snapshot, test_config };
    use crate::types::AlertSpec;

    fn spec(mint: &str, kind: AlertKind, condition: AlertCondition, value: f64) -> AlertSpec {
        AlertSpec {
            mint: mint.to_string(),
            symbol: "SYM".to_string(),
            kind,
            condition,
            value,
        }
    }

    #[test]
    fn test_id_generation_is_unique_and_monotonic() {
        let seq = AtomicU64::new(0);
        let a = next_id(&seq);
        let b = next_id(&seq);
        assert_ne!(a, b);
        assert!(a.starts_with("alert-1-"));
        assert!(b.starts_with("alert-2-"));
    }

    #[tokio::test]
    async fn test_threshold_alert_fires_once() {
        let (tracker, _sink, bus) = make_tracker(test_config());
        let mint = "MintAl111111111111111111111111pump";
        let mut rx = bus.subscribe();

        tracker
            .add_alert(spec(mint, AlertKind::Threshold, AlertCondition::Above, 2.0))
            .await;

        tracker.track_token(&snapshot(mint, 1.0, 50.0, 500.0)).await;
        assert!(!tracker.get_alerts().await[0].triggered);

        tracker.track_token(&snapshot(mint, 3.0, 50.0, 500.0)).await;
        let alert = &tracker.get_alerts().await[0];
        assert!(alert.triggered);
        assert!(alert.triggered_at.is_some());

        // Stays fired; another crossing does not re-trigger.
        tracker.track_token(&snapshot(mint, 5.0, 50.0, 500.0)).await;

        let mut alert_events = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, crate::events::BusEvent::AlertTriggered { .. }) {
                alert_events += 1;
            }
        }
        assert_eq!(alert_events, 1);
    }

    #[tokio::test]
    async fn test_threshold_below() {
        let (tracker, _sink, _bus) = make_tracker(test_config());
        let mint = "MintAm111111111111111111111111pump";

        tracker
            .add_alert(spec(mint, AlertKind::Threshold, AlertCondition::Below, 0.5))
            .await;
        tracker.track_token(&snapshot(mint, 1.0, 50.0, 500.0)).await;
        assert!(!tracker.get_alerts().await[0].triggered);

        tracker.track_token(&snapshot(mint, 0.4, 50.0, 500.0)).await;
        assert!(tracker.get_alerts().await[0].triggered);
    }

    #[tokio::test]
    async fn test_percentage_alert_uses_ring_baseline() {
        let (tracker, _sink, _bus) = make_tracker(test_config());
        let mint = "MintAn111111111111111111111111pump";

        // Baseline is the first tracked price (oldest ring point).
        tracker.track_token(&snapshot(mint, 1.0, 50.0, 500.0)).await;
        tracker
            .add_alert(spec(mint, AlertKind::Percentage, AlertCondition::Above, 50.0))
            .await;

        tracker.track_token(&snapshot(mint, 1.2, 50.0, 500.0)).await;
        assert!(!tracker.get_alerts().await[0].triggered);

        // +60% from the 1.0 baseline.
        tracker.track_token(&snapshot(mint, 1.6, 50.0, 500.0)).await;
        assert!(tracker.get_alerts().await[0].triggered);
    }

    #[tokio::test]
    async fn test_alert_for_other_mint_untouched() {
        let (tracker, _sink, _bus) = make_tracker(test_config());
        tracker
            .add_alert(spec(
                "MintOther",
                AlertKind::Threshold,
                AlertCondition::Above,
                0.1,
            ))
            .await;
        tracker
            .track_token(&snapshot("MintAo111111111111111111111111pump", 5.0, 50.0, 500.0))
            .await;
        assert!(!tracker.get_alerts().await[0].triggered);
    }
}
