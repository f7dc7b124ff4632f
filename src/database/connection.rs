use std::sync::Mutex;

use anyhow::{ Context, Result };
use async_trait::async_trait;
use chrono::{ DateTime, Utc };
use rusqlite::{ params, Connection };

use super::{
    Aggregation, CleanupFilter, DatabaseStats, PriceBucket, SinkBatch, SnapshotFilter,
    TimeSeriesSink, VolumeRow,
};
use crate::types::{ CleanupEvent, CleanupMetrics, TokenSnapshot };

/// Sqlite-backed time-series store.
pub struct Database {
    pub(crate) conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the store at the given path.
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database: {}", db_path))?;

        let db = Self {
            conn: Mutex::new(conn),
        };

        db.initialize_tables()?;
        Ok(db)
    }

    /// In-memory store, used by tests and tools.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.initialize_tables()?;
        Ok(db)
    }

    fn initialize_tables(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        self.create_snapshots_table(&conn)?;
        self.create_price_points_table(&conn)?;
        self.create_trades_table(&conn)?;
        self.create_cleanup_events_table(&conn)?;
        self.create_cleanup_metrics_table(&conn)?;
        self.create_indexes(&conn)?;

        Ok(())
    }

    fn create_snapshots_table(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS token_snapshots (
                mint TEXT NOT NULL,
                symbol TEXT NOT NULL,
                name TEXT NOT NULL,
                platform TEXT NOT NULL,
                platform_confidence REAL NOT NULL,
                price REAL NOT NULL,
                volume_24h REAL NOT NULL,
                market_cap REAL NOT NULL,
                liquidity REAL NOT NULL,
                price_change_24h REAL NOT NULL,
                volume_change_24h REAL NOT NULL,
                holders INTEGER NOT NULL,
                uri TEXT,
                twitter TEXT,
                telegram TEXT,
                website TEXT,
                timestamp INTEGER NOT NULL,
                PRIMARY KEY (mint, timestamp)
            )",
            [],
        )?;
        Ok(())
    }

    fn create_price_points_table(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS price_points (
                mint TEXT NOT NULL,
                platform TEXT NOT NULL,
                price REAL NOT NULL,
                volume REAL NOT NULL,
                source TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                PRIMARY KEY (mint, timestamp)
            )",
            [],
        )?;
        Ok(())
    }

    fn create_trades_table(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS trades (
                signature TEXT PRIMARY KEY,
                mint TEXT NOT NULL,
                platform TEXT NOT NULL,
                side TEXT NOT NULL,
                amount REAL NOT NULL,
                price REAL NOT NULL,
                value REAL NOT NULL,
                wallet TEXT NOT NULL,
                timestamp INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    fn create_cleanup_events_table(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS cleanup_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                mint TEXT NOT NULL,
                symbol TEXT NOT NULL,
                platform TEXT NOT NULL,
                reason TEXT NOT NULL,
                details TEXT NOT NULL,
                final_price REAL NOT NULL,
                final_volume_24h REAL NOT NULL,
                final_liquidity REAL NOT NULL,
                final_market_cap REAL NOT NULL,
                peak_price REAL NOT NULL,
                peak_volume_24h REAL NOT NULL,
                tracked_duration_secs INTEGER NOT NULL,
                total_trades INTEGER NOT NULL,
                timestamp INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    fn create_cleanup_metrics_table(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS cleanup_metrics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                total_evaluated INTEGER NOT NULL,
                rugged_detected INTEGER NOT NULL,
                inactive_detected INTEGER NOT NULL,
                low_volume_detected INTEGER NOT NULL,
                actually_removed INTEGER NOT NULL,
                saved_by_whitelist INTEGER NOT NULL,
                saved_by_grace_period INTEGER NOT NULL,
                saved_by_limit INTEGER NOT NULL,
                execution_time_ms INTEGER NOT NULL,
                timestamp INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    fn create_indexes(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_price_points_timestamp ON price_points(timestamp)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_snapshots_timestamp ON token_snapshots(timestamp)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_trades_mint_timestamp ON trades(mint, timestamp)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_cleanup_events_mint ON cleanup_events(mint)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_cleanup_events_timestamp ON cleanup_events(timestamp)",
            [],
        )?;
        Ok(())
    }

    /// Row counts per table.
    pub async fn get_stats(&self) -> Result<DatabaseStats> {
        let conn = self.conn.lock().unwrap();

        let count = |table: &str| -> Result<u64> {
            let sql = format!("SELECT COUNT(*) FROM {}", table);
            Ok(conn.query_row(&sql, [], |row| row.get(0))?)
        };

        Ok(DatabaseStats {
            snapshot_rows: count("token_snapshots")?,
            price_rows: count("price_points")?,
            trade_rows: count("trades")?,
            cleanup_rows: count("cleanup_events")?,
            metrics_rows: count("cleanup_metrics")?,
        })
    }

    /// Delete snapshots and price points older than the horizon. Cleanup
    /// history is kept; it is the audit trail.
    pub async fn prune_old_rows(&self, max_age_hours: u64) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let cutoff = Utc::now() - chrono::Duration::hours(max_age_hours as i64);
        let cutoff_ms = super::ts_millis(cutoff);

        let mut removed = conn.execute(
            "DELETE FROM price_points WHERE timestamp < ?1",
            params![cutoff_ms],
        )?;
        removed += conn.execute(
            "DELETE FROM token_snapshots WHERE timestamp < ?1",
            params![cutoff_ms],
        )?;
        removed += conn.execute(
            "DELETE FROM trades WHERE timestamp < ?1",
            params![cutoff_ms],
        )?;

        Ok(removed as u64)
    }
}

#[async_trait]
impl TimeSeriesSink for Database {
    async fn write_batch(&self, batch: &SinkBatch) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        for snapshot in &batch.snapshots {
            Self::insert_snapshot(&tx, snapshot)?;
        }
        for point in &batch.price_points {
            Self::insert_price_point(&tx, point)?;
        }
        for trade in &batch.trades {
            Self::insert_trade(&tx, trade)?;
        }

        tx.commit().context("Failed to commit batch")?;
        Ok(())
    }

    async fn write_cleanup_event(&self, event: &CleanupEvent) -> Result<()> {
        self.insert_cleanup_event(event)
    }

    async fn write_cleanup_metrics(&self, metrics: &CleanupMetrics) -> Result<()> {
        self.insert_cleanup_metrics(metrics)
    }

    async fn query_token_snapshots(&self, filter: &SnapshotFilter) -> Result<Vec<TokenSnapshot>> {
        self.select_token_snapshots(filter)
    }

    async fn query_price_history(
        &self,
        mint: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        bucket: chrono::Duration,
        agg: Aggregation,
    ) -> Result<Vec<PriceBucket>> {
        self.select_price_history(mint, start, end, bucket, agg)
    }

    async fn query_volume_analysis(&self, filter: &SnapshotFilter) -> Result<Vec<VolumeRow>> {
        self.select_volume_analysis(filter)
    }

    async fn query_cleanup_events(&self, filter: &CleanupFilter) -> Result<Vec<CleanupEvent>> {
        self.select_cleanup_events(filter)
    }

    async fn health_check(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }
}
