// tracker/trends.rs
// Periodic trend analysis over the sink's aggregated price history.
// One computation per (mint, window); a trend is emitted only when it
// says something new.

use chrono::{ DateTime, Utc };

use super::Tracker;
use crate::arguments::is_debug_trends_enabled;
use crate::database::{ Aggregation, PriceBucket, TimeSeriesSink };
use crate::events::BusEvent;
use crate::logger::{ log, LogTag };
use crate::types::{ Platform, Trend, TrendDirection, TrendStrength, TrendWindow };

/// Emission threshold on percent-change movement between runs.
const REEMIT_CHANGE_PERCENT: f64 = 5.0;

impl Tracker {
    /// One analysis pass over every tracked mint and window. Returns
    /// the number of trends emitted.
    pub async fn run_trend_analysis(&self) -> anyhow::Result<usize> {
        let tracked: Vec<(String, String, Platform)> = {
            let st = self.state.read().await;
            st.current
                .values()
                .map(|s| (s.mint.clone(), s.symbol.clone(), s.platform))
                .collect()
        };

        let now = Utc::now();
        let mut emitted = 0;

        for (mint, symbol, platform) in tracked {
            for window in TrendWindow::all() {
                let buckets = match self
                    .sink
                    .query_price_history(
                        &mint,
                        now - window.span(),
                        now,
                        window.bucket(),
                        Aggregation::Mean,
                    )
                    .await
                {
                    Ok(buckets) => buckets,
                    Err(e) => {
                        log(
                            LogTag::Trend,
                            "WARN",
                            &format!("History query failed for {} {}: {}", mint, window.label(), e),
                        );
                        continue;
                    }
                };

                let Some(trend) =
                    compute_trend(&mint, &symbol, platform, window, &buckets, now)
                else {
                    continue;
                };

                let should_emit = {
                    let mut st = self.state.write().await;
                    let key = (mint.clone(), window);
                    let emit = match st.trends.get(&key) {
                        None => true,
                        Some(prev) => {
                            prev.direction != trend.direction
                                || prev.strength != trend.strength
                                || (trend.change_percent - prev.change_percent).abs()
                                    > REEMIT_CHANGE_PERCENT
                        }
                    };
                    if emit {
                        st.trends.insert(key, trend.clone());
                    }
                    emit
                };

                if should_emit {
                    if is_debug_trends_enabled() {
                        log(
                            LogTag::Trend,
                            "TREND",
                            &format!(
                                "{} {} {:?}/{:?} {:+.2}%",
                                mint,
                                window.label(),
                                trend.direction,
                                trend.strength,
                                trend.change_percent
                            ),
                        );
                    }
                    self.bus.publish(BusEvent::TrendDetected { trend });
                    emitted += 1;
                }
            }
        }

        Ok(emitted)
    }
}

/// Pure trend computation over aggregated buckets. Needs at least two
/// buckets and a positive starting price.
pub(crate) fn compute_trend(
    mint: &str,
    symbol: &str,
    platform: Platform,
    window: TrendWindow,
    buckets: &[PriceBucket],
    now: DateTime<Utc>,
) -> Option<Trend> {
    if buckets.len() < 2 {
        return None;
    }
    let start_price = buckets.first()?.price;
    let end_price = buckets.last()?.price;
    if start_price <= 0.0 {
        return None;
    }

    let change = end_price - start_price;
    let change_percent = 100.0 * change / start_price;

    let direction = if change_percent > 2.0 {
        TrendDirection::Up
    } else if change_percent < -2.0 {
        TrendDirection::Down
    } else {
        TrendDirection::Sideways
    };

    let volatility = returns_volatility(buckets);
    let strength = if change_percent.abs() > 20.0 && volatility < 0.1 {
        TrendStrength::Strong
    } else if change_percent.abs() > 10.0 && volatility < 0.2 {
        TrendStrength::Moderate
    } else {
        TrendStrength::Weak
    };

    // Coverage half: a gap-free window yields one bucket per interval.
    let expected_buckets =
        (window.span().num_milliseconds() / window.bucket().num_milliseconds()).max(1) as usize;
    let depth_score = (buckets.len() as f64 / 20.0).min(1.0);
    let coverage_score = if buckets.len() >= expected_buckets {
        1.0
    } else {
        0.5
    };
    let confidence = (depth_score + coverage_score) / 2.0;

    Some(Trend {
        mint: mint.to_string(),
        symbol: symbol.to_string(),
        platform,
        window,
        direction,
        strength,
        change,
        change_percent,
        confidence,
        start_price,
        end_price,
        volume: buckets.iter().map(|b| b.total_volume).sum(),
        timestamp: now,
    })
}

/// Sample standard deviation of per-bucket returns.
fn returns_volatility(buckets: &[PriceBucket]) -> f64 {
    let returns: Vec<f64> = buckets
        .windows(2)
        .filter(|w| w[0].price > 0.0)
        .map(|w| (w[1].price - w[0].price) / w[0].price)
        .collect();
    if returns.len() < 2 {
        return 0.0;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>()
        / (returns.len() - 1) as f64;
    variance.sqrt()
}
