use anyhow::{ bail, Result };
use chrono::{ DateTime, Utc };
use rusqlite::{ params, Connection };

use super::connection::Database;
use super::{ millis_ts, ts_millis, Aggregation, PriceBucket };
use crate::types::PricePoint;

impl Database {
    pub(crate) fn insert_price_point(conn: &Connection, p: &PricePoint) -> Result<()> {
        conn.execute(
            "INSERT OR REPLACE INTO price_points (
                mint, platform, price, volume, source, timestamp
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                p.mint,
                p.platform.as_str(),
                p.price,
                p.volume,
                p.source,
                ts_millis(p.timestamp),
            ],
        )?;
        Ok(())
    }

    /// Aggregated price history for one mint, bucketed by wall-clock
    /// intervals. Buckets with no samples are absent from the result.
    pub(crate) fn select_price_history(
        &self,
        mint: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        bucket: chrono::Duration,
        agg: Aggregation,
    ) -> Result<Vec<PriceBucket>> {
        let bucket_ms = bucket.num_milliseconds();
        if bucket_ms <= 0 {
            bail!("bucket size must be positive");
        }

        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT (timestamp / ?1) * ?1 AS bucket_ts,
                    {}(price) AS agg_price,
                    COUNT(*) AS samples,
                    SUM(volume) AS total_volume
             FROM price_points
             WHERE mint = ?2 AND timestamp >= ?3 AND timestamp <= ?4
             GROUP BY bucket_ts
             ORDER BY bucket_ts ASC",
            agg.sql_fn()
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![bucket_ms, mint, ts_millis(start), ts_millis(end)],
            |row| {
                let bucket_ts: i64 = row.get("bucket_ts")?;
                let samples: i64 = row.get("samples")?;
                Ok(PriceBucket {
                    bucket_start: millis_ts(bucket_ts),
                    price: row.get("agg_price")?,
                    sample_count: samples.max(0) as u32,
                    total_volume: row.get::<_, Option<f64>>("total_volume")?.unwrap_or(0.0),
                })
            },
        )?;

        let mut buckets = Vec::new();
        for row in rows {
            buckets.push(row?);
        }
        Ok(buckets)
    }
}
