use anyhow::Result;
use chrono::Utc;
use rusqlite::params;

use super::connection::Database;
use super::{ millis_ts, ts_millis, CleanupFilter };
use crate::types::{ CleanupEvent, CleanupMetrics, CleanupReason, Platform };

impl Database {
    pub(crate) fn insert_cleanup_event(&self, e: &CleanupEvent) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO cleanup_events (
                mint, symbol, platform, reason, details,
                final_price, final_volume_24h, final_liquidity, final_market_cap,
                peak_price, peak_volume_24h, tracked_duration_secs, total_trades, timestamp
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                e.mint,
                e.symbol,
                e.platform.as_str(),
                e.reason.as_str(),
                e.details,
                e.final_price,
                e.final_volume_24h,
                e.final_liquidity,
                e.final_market_cap,
                e.peak_price,
                e.peak_volume_24h,
                e.tracked_duration_secs,
                e.total_trades as i64,
                ts_millis(e.timestamp),
            ],
        )?;
        Ok(())
    }

    pub(crate) fn insert_cleanup_metrics(&self, m: &CleanupMetrics) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO cleanup_metrics (
                total_evaluated, rugged_detected, inactive_detected, low_volume_detected,
                actually_removed, saved_by_whitelist, saved_by_grace_period, saved_by_limit,
                execution_time_ms, timestamp
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                m.total_evaluated as i64,
                m.rugged_detected as i64,
                m.inactive_detected as i64,
                m.low_volume_detected as i64,
                m.actually_removed as i64,
                m.saved_by_whitelist as i64,
                m.saved_by_grace_period as i64,
                m.saved_by_limit as i64,
                m.execution_time_ms as i64,
                ts_millis(m.timestamp.unwrap_or_else(Utc::now)),
            ],
        )?;
        Ok(())
    }

    pub(crate) fn select_cleanup_events(&self, filter: &CleanupFilter) -> Result<Vec<CleanupEvent>> {
        let conn = self.conn.lock().unwrap();

        let mut sql = String::from("SELECT * FROM cleanup_events WHERE 1=1");
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(mint) = &filter.mint {
            sql.push_str(" AND mint = ?");
            args.push(Box::new(mint.clone()));
        }
        if let Some(reason) = filter.reason {
            sql.push_str(" AND reason = ?");
            args.push(Box::new(reason.as_str().to_string()));
        }
        if let Some(since) = filter.since {
            sql.push_str(" AND timestamp >= ?");
            args.push(Box::new(ts_millis(since)));
        }
        sql.push_str(" ORDER BY timestamp DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            args.push(Box::new(limit as i64));
        }

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())),
            |row| {
                let platform: String = row.get("platform")?;
                let reason: String = row.get("reason")?;
                let total_trades: i64 = row.get("total_trades")?;
                let ts: i64 = row.get("timestamp")?;
                Ok(CleanupEvent {
                    mint: row.get("mint")?,
                    symbol: row.get("symbol")?,
                    platform: Platform::from_str(&platform),
                    reason: CleanupReason::from_str(&reason).unwrap_or(CleanupReason::Inactive),
                    details: row.get("details")?,
                    final_price: row.get("final_price")?,
                    final_volume_24h: row.get("final_volume_24h")?,
                    final_liquidity: row.get("final_liquidity")?,
                    final_market_cap: row.get("final_market_cap")?,
                    peak_price: row.get("peak_price")?,
                    peak_volume_24h: row.get("peak_volume_24h")?,
                    tracked_duration_secs: row.get("tracked_duration_secs")?,
                    total_trades: total_trades.max(0) as u64,
                    timestamp: millis_ts(ts),
                })
            },
        )?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(mint: &str, reason: CleanupReason) -> CleanupEvent {
        CleanupEvent {
            mint: mint.to_string(),
            symbol: "SYM".to_string(),
            platform: Platform::PumpFun,
            reason,
            details: "details".to_string(),
            timestamp: Utc::now(),
            final_price: 0.01,
            final_volume_24h: 1.0,
            final_liquidity: 50.0,
            final_market_cap: 100.0,
            peak_price: 1.0,
            peak_volume_24h: 500.0,
            tracked_duration_secs: 3600,
            total_trades: 42,
        }
    }

    #[tokio::test]
    async fn test_cleanup_event_round_trip() {
        let db = Database::in_memory().unwrap();
        db.insert_cleanup_event(&event("A", CleanupReason::Rugged))
            .unwrap();
        db.insert_cleanup_event(&event("B", CleanupReason::Inactive))
            .unwrap();

        let all = db.select_cleanup_events(&CleanupFilter::default()).unwrap();
        assert_eq!(all.len(), 2);

        let rugged = db
            .select_cleanup_events(&CleanupFilter {
                reason: Some(CleanupReason::Rugged),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(rugged.len(), 1);
        assert_eq!(rugged[0].mint, "A");
        assert_eq!(rugged[0].total_trades, 42);
    }

    #[tokio::test]
    async fn test_metrics_written_once_per_cycle() {
        let db = Database::in_memory().unwrap();
        let metrics = CleanupMetrics {
            total_evaluated: 5,
            rugged_detected: 2,
            actually_removed: 1,
            saved_by_limit: 1,
            execution_time_ms: 12,
            ..Default::default()
        };
        db.insert_cleanup_metrics(&metrics).unwrap();
        assert_eq!(db.get_stats().await.unwrap().metrics_rows, 1);
    }
}
