/// Read-only projections over tracker state and the sink. This is the
/// surface the query facade consumes; every function is a pure read of
/// (tracker ∪ sink) with no side effects.
use std::sync::Arc;

use anyhow::Result;
use chrono::{ DateTime, Utc };

use crate::database::{
    Aggregation, CleanupFilter, PriceBucket, SnapshotFilter, TimeSeriesSink, VolumeRow,
};
use crate::tracker::{ Tracker, TrackerStats };
use crate::types::{ CleanupEvent, TokenSnapshot, Trend, TrendWindow };

pub struct QueryEngine {
    tracker: Arc<Tracker>,
    sink: Arc<dyn TimeSeriesSink>,
}

impl QueryEngine {
    pub fn new(tracker: Arc<Tracker>, sink: Arc<dyn TimeSeriesSink>) -> Self {
        Self { tracker, sink }
    }

    /// Live snapshots straight from the tracker, optionally filtered
    /// and capped.
    pub async fn current_snapshots(&self, filter: &SnapshotFilter) -> Vec<TokenSnapshot> {
        let mut rows: Vec<TokenSnapshot> = self
            .tracker
            .get_all()
            .await
            .into_iter()
            .filter(|s| {
                filter.mint.as_ref().map_or(true, |m| &s.mint == m)
                    && filter.platform.map_or(true, |p| s.platform == p)
                    && filter.min_volume_24h.map_or(true, |v| s.volume_24h >= v)
            })
            .collect();
        rows.sort_by(|a, b| {
            b.volume_24h
                .partial_cmp(&a.volume_24h)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        if let Some(limit) = filter.limit {
            rows.truncate(limit);
        }
        rows
    }

    /// Stored snapshots (latest per mint) from the sink.
    pub async fn stored_snapshots(&self, filter: &SnapshotFilter) -> Result<Vec<TokenSnapshot>> {
        self.sink.query_token_snapshots(filter).await
    }

    pub async fn price_history(
        &self,
        mint: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        bucket: chrono::Duration,
        agg: Aggregation,
    ) -> Result<Vec<PriceBucket>> {
        self.sink.query_price_history(mint, start, end, bucket, agg).await
    }

    pub async fn trend(&self, mint: &str, window: TrendWindow) -> Option<Trend> {
        self.tracker.get_trend(mint, window).await
    }

    pub async fn all_trends(&self) -> Vec<Trend> {
        self.tracker.get_all_trends().await
    }

    pub async fn volume_analysis(&self, filter: &SnapshotFilter) -> Result<Vec<VolumeRow>> {
        self.sink.query_volume_analysis(filter).await
    }

    pub async fn cleanup_history(&self, filter: &CleanupFilter) -> Result<Vec<CleanupEvent>> {
        self.sink.query_cleanup_events(filter).await
    }

    pub async fn tracker_stats(&self) -> TrackerStats {
        self.tracker.stats().await
    }
}
