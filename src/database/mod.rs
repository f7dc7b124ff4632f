/// Time-series persistence.
///
/// The core talks to the store through the `TimeSeriesSink` trait; the
/// sqlite implementation lives in `connection.rs` with its per-table
/// method files alongside. Batch writes are atomic per call.
pub mod cleanup;
pub mod connection;
pub mod prices;
pub mod snapshots;
pub mod trades;

pub use connection::Database;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{ DateTime, Utc };

use crate::types::{
    CleanupEvent, CleanupMetrics, CleanupReason, Platform, PricePoint, TokenSnapshot, Trade,
};

/// One batched write: three parallel record vectors persisted in a
/// single all-or-nothing call.
#[derive(Debug, Clone, Default)]
pub struct SinkBatch {
    pub snapshots: Vec<TokenSnapshot>,
    pub price_points: Vec<PricePoint>,
    pub trades: Vec<Trade>,
}

impl SinkBatch {
    pub fn len(&self) -> usize {
        self.snapshots.len() + self.price_points.len() + self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.price_points.clear();
        self.trades.clear();
    }
}

/// Filter for snapshot and volume queries.
#[derive(Debug, Clone, Default)]
pub struct SnapshotFilter {
    pub mint: Option<String>,
    pub platform: Option<Platform>,
    pub min_volume_24h: Option<f64>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Filter for cleanup history queries.
#[derive(Debug, Clone, Default)]
pub struct CleanupFilter {
    pub mint: Option<String>,
    pub reason: Option<CleanupReason>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Bucket aggregation for price history reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Mean,
    Min,
    Max,
}

impl Aggregation {
    pub(crate) fn sql_fn(&self) -> &'static str {
        match self {
            Aggregation::Mean => "AVG",
            Aggregation::Min => "MIN",
            Aggregation::Max => "MAX",
        }
    }
}

/// One aggregated price-history bucket.
#[derive(Debug, Clone)]
pub struct PriceBucket {
    pub bucket_start: DateTime<Utc>,
    pub price: f64,
    pub sample_count: u32,
    pub total_volume: f64,
}

/// One row of the volume analysis projection.
#[derive(Debug, Clone)]
pub struct VolumeRow {
    pub mint: String,
    pub platform: Platform,
    pub total_value: f64,
    pub trade_count: u64,
    pub buy_count: u64,
    pub sell_count: u64,
}

/// Row counts for the summary log and the query facade.
#[derive(Debug, Clone, Default)]
pub struct DatabaseStats {
    pub snapshot_rows: u64,
    pub price_rows: u64,
    pub trade_rows: u64,
    pub cleanup_rows: u64,
    pub metrics_rows: u64,
}

/// The store interface the core consumes. Implementations are free to
/// be durable or in-memory; all operations surface failures to the
/// caller and `write_batch` is atomic per call.
#[async_trait]
pub trait TimeSeriesSink: Send + Sync {
    async fn write_batch(&self, batch: &SinkBatch) -> Result<()>;
    async fn write_cleanup_event(&self, event: &CleanupEvent) -> Result<()>;
    async fn write_cleanup_metrics(&self, metrics: &CleanupMetrics) -> Result<()>;
    async fn query_token_snapshots(&self, filter: &SnapshotFilter) -> Result<Vec<TokenSnapshot>>;
    async fn query_price_history(
        &self,
        mint: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        bucket: chrono::Duration,
        agg: Aggregation,
    ) -> Result<Vec<PriceBucket>>;
    async fn query_volume_analysis(&self, filter: &SnapshotFilter) -> Result<Vec<VolumeRow>>;
    async fn query_cleanup_events(&self, filter: &CleanupFilter) -> Result<Vec<CleanupEvent>>;
    /// Cheap probe used to leave the fail-fast state after write failures.
    async fn health_check(&self) -> Result<()>;
}

pub(crate) fn ts_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn millis_ts(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_default()
}
