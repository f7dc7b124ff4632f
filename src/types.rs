use chrono::{ DateTime, Utc };
use serde::{ Deserialize, Serialize };

/// Recognized origin venues for a token.
///
/// `Unknown` is a real state during detection but is never stored on a
/// tracked snapshot: ingestion either resolves a concrete platform or
/// rejects the update (unless a fallback platform is configured).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    PumpFun,
    LetsBonk,
    Unknown,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::PumpFun => "pumpfun",
            Platform::LetsBonk => "letsbonk",
            Platform::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Platform {
        match s {
            "pumpfun" => Platform::PumpFun,
            "letsbonk" => Platform::LetsBonk,
            _ => Platform::Unknown,
        }
    }

    /// True for every variant except `Unknown`.
    pub fn is_known(&self) -> bool {
        !matches!(self, Platform::Unknown)
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Canonical record of a token at a timestamp. Overwritten in place on
/// every accepted update; removed only by the cleanup protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSnapshot {
    pub mint: String,
    pub symbol: String,
    pub name: String,
    pub platform: Platform,
    pub platform_confidence: f64,
    pub price: f64,
    pub volume_24h: f64,
    pub market_cap: f64,
    pub liquidity: f64,
    pub price_change_24h: f64,
    pub volume_change_24h: f64,
    pub holders: u64,
    pub uri: Option<String>,
    pub twitter: Option<String>,
    pub telegram: Option<String>,
    pub website: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Single observed price for a mint, produced from every accepted
/// snapshot with `price > 0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePoint {
    pub mint: String,
    pub platform: Platform,
    pub price: f64,
    pub volume: f64,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "buy",
            TradeSide::Sell => "sell",
        }
    }

    pub fn parse(s: &str) -> Option<TradeSide> {
        match s {
            "buy" => Some(TradeSide::Buy),
            "sell" => Some(TradeSide::Sell),
            _ => None,
        }
    }
}

/// A single trade. Write-only from the core's perspective: it bumps the
/// tracker's last-trade time and is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub mint: String,
    pub platform: Platform,
    pub side: TradeSide,
    pub amount: f64,
    pub price: f64,
    pub value: f64,
    pub wallet: String,
    pub signature: String,
    pub timestamp: DateTime<Utc>,
}

/// Per-mint lifecycle bookkeeping owned by the tracker. Never persisted;
/// rebuilt from the live feed after a restart.
#[derive(Debug, Clone)]
pub struct TokenHealth {
    pub mint: String,
    pub first_seen: DateTime<Utc>,
    pub last_trade: DateTime<Utc>,
    pub consecutive_zero_volume_periods: u32,
    pub peak_price: f64,
    pub peak_volume_24h: f64,
    pub current_liquidity: f64,
    pub total_trades: u64,
    pub is_whitelisted: bool,
    pub is_being_evaluated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Threshold,
    Percentage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertCondition {
    Above,
    Below,
}

/// One-shot price alert: once triggered it stays fired until removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub mint: String,
    pub symbol: String,
    pub kind: AlertKind,
    pub condition: AlertCondition,
    pub value: f64,
    pub enabled: bool,
    pub triggered: bool,
    pub created_at: DateTime<Utc>,
    pub triggered_at: Option<DateTime<Utc>>,
}

/// Caller-side description of a new alert; the tracker assigns the id.
#[derive(Debug, Clone)]
pub struct AlertSpec {
    pub mint: String,
    pub symbol: String,
    pub kind: AlertKind,
    pub condition: AlertCondition,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrendWindow {
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "24h")]
    Hour24,
    #[serde(rename = "7d")]
    Day7,
}

impl TrendWindow {
    pub fn all() -> [TrendWindow; 3] {
        [TrendWindow::Hour1, TrendWindow::Hour24, TrendWindow::Day7]
    }

    pub fn label(&self) -> &'static str {
        match self {
            TrendWindow::Hour1 => "1h",
            TrendWindow::Hour24 => "24h",
            TrendWindow::Day7 => "7d",
        }
    }

    /// Lookback span of the window.
    pub fn span(&self) -> chrono::Duration {
        match self {
            TrendWindow::Hour1 => chrono::Duration::hours(1),
            TrendWindow::Hour24 => chrono::Duration::hours(24),
            TrendWindow::Day7 => chrono::Duration::days(7),
        }
    }

    /// Aggregation bucket size used when reading history for this window.
    pub fn bucket(&self) -> chrono::Duration {
        match self {
            TrendWindow::Hour1 => chrono::Duration::minutes(5),
            TrendWindow::Hour24 => chrono::Duration::hours(1),
            TrendWindow::Day7 => chrono::Duration::hours(4),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Sideways,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendStrength {
    Weak,
    Moderate,
    Strong,
}

/// Result of one trend computation, keyed by `(mint, window)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trend {
    pub mint: String,
    pub symbol: String,
    pub platform: Platform,
    pub window: TrendWindow,
    pub direction: TrendDirection,
    pub strength: TrendStrength,
    pub change: f64,
    pub change_percent: f64,
    pub confidence: f64,
    pub start_price: f64,
    pub end_price: f64,
    pub volume: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupReason {
    Rugged,
    Inactive,
    LowVolume,
}

impl CleanupReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CleanupReason::Rugged => "rugged",
            CleanupReason::Inactive => "inactive",
            CleanupReason::LowVolume => "low_volume",
        }
    }

    pub fn from_str(s: &str) -> Option<CleanupReason> {
        match s {
            "rugged" => Some(CleanupReason::Rugged),
            "inactive" => Some(CleanupReason::Inactive),
            "low_volume" => Some(CleanupReason::LowVolume),
            _ => None,
        }
    }
}

impl std::fmt::Display for CleanupReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Audit record written on every successful untrack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupEvent {
    pub mint: String,
    pub symbol: String,
    pub platform: Platform,
    pub reason: CleanupReason,
    pub details: String,
    pub timestamp: DateTime<Utc>,
    pub final_price: f64,
    pub final_volume_24h: f64,
    pub final_liquidity: f64,
    pub final_market_cap: f64,
    pub peak_price: f64,
    pub peak_volume_24h: f64,
    pub tracked_duration_secs: i64,
    pub total_trades: u64,
}

/// Per-cycle cleanup aggregate, written once per cycle when any
/// candidate was evaluated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupMetrics {
    pub total_evaluated: u64,
    pub rugged_detected: u64,
    pub inactive_detected: u64,
    pub low_volume_detected: u64,
    pub actually_removed: u64,
    pub saved_by_whitelist: u64,
    pub saved_by_grace_period: u64,
    pub saved_by_limit: u64,
    pub execution_time_ms: u64,
    pub timestamp: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_round_trip() {
        for p in [Platform::PumpFun, Platform::LetsBonk, Platform::Unknown] {
            assert_eq!(Platform::from_str(p.as_str()), p);
        }
        assert_eq!(Platform::from_str("raydium"), Platform::Unknown);
        assert!(!Platform::Unknown.is_known());
        assert!(Platform::PumpFun.is_known());
    }

    #[test]
    fn test_trade_side_parse() {
        assert_eq!(TradeSide::parse("buy"), Some(TradeSide::Buy));
        assert_eq!(TradeSide::parse("sell"), Some(TradeSide::Sell));
        assert_eq!(TradeSide::parse("swap"), None);
    }

    #[test]
    fn test_trend_window_buckets() {
        assert_eq!(TrendWindow::Hour1.bucket(), chrono::Duration::minutes(5));
        assert_eq!(TrendWindow::Hour24.bucket(), chrono::Duration::hours(1));
        assert_eq!(TrendWindow::Day7.bucket(), chrono::Duration::hours(4));
        assert_eq!(TrendWindow::Hour1.label(), "1h");
    }

    #[test]
    fn test_cleanup_reason_strings() {
        assert_eq!(CleanupReason::LowVolume.as_str(), "low_volume");
        assert_eq!(
            CleanupReason::from_str("rugged"),
            Some(CleanupReason::Rugged)
        );
        assert_eq!(CleanupReason::from_str("nope"), None);
    }
}
