use anyhow::Result;
use rusqlite::{ params, Connection };

use super::connection::Database;
use super::{ ts_millis, SnapshotFilter, VolumeRow };
use crate::types::{ Platform, Trade };

impl Database {
    pub(crate) fn insert_trade(conn: &Connection, t: &Trade) -> Result<()> {
        // Signatures are unique; a replayed trade is a no-op.
        conn.execute(
            "INSERT OR IGNORE INTO trades (
                signature, mint, platform, side, amount, price, value, wallet, timestamp
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                t.signature,
                t.mint,
                t.platform.as_str(),
                t.side.as_str(),
                t.amount,
                t.price,
                t.value,
                t.wallet,
                ts_millis(t.timestamp),
            ],
        )?;
        Ok(())
    }

    /// Traded value and buy/sell split per mint.
    pub(crate) fn select_volume_analysis(&self, filter: &SnapshotFilter) -> Result<Vec<VolumeRow>> {
        let conn = self.conn.lock().unwrap();

        let mut sql = String::from(
            "SELECT mint, platform,
                    SUM(value) AS total_value,
                    COUNT(*) AS trade_count,
                    SUM(CASE WHEN side = 'buy' THEN 1 ELSE 0 END) AS buy_count,
                    SUM(CASE WHEN side = 'sell' THEN 1 ELSE 0 END) AS sell_count
             FROM trades
             WHERE 1=1",
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(mint) = &filter.mint {
            sql.push_str(" AND mint = ?");
            args.push(Box::new(mint.clone()));
        }
        if let Some(platform) = filter.platform {
            sql.push_str(" AND platform = ?");
            args.push(Box::new(platform.as_str().to_string()));
        }
        if let Some(since) = filter.since {
            sql.push_str(" AND timestamp >= ?");
            args.push(Box::new(ts_millis(since)));
        }
        sql.push_str(" GROUP BY mint, platform ORDER BY total_value DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            args.push(Box::new(limit as i64));
        }

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())),
            |row| {
                let platform: String = row.get("platform")?;
                let trade_count: i64 = row.get("trade_count")?;
                let buy_count: i64 = row.get("buy_count")?;
                let sell_count: i64 = row.get("sell_count")?;
                Ok(VolumeRow {
                    mint: row.get("mint")?,
                    platform: Platform::from_str(&platform),
                    total_value: row.get::<_, Option<f64>>("total_value")?.unwrap_or(0.0),
                    trade_count: trade_count.max(0) as u64,
                    buy_count: buy_count.max(0) as u64,
                    sell_count: sell_count.max(0) as u64,
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
