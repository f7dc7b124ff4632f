use anyhow::Result;
use rusqlite::{ params, Connection, Row };

use super::connection::Database;
use super::{ millis_ts, ts_millis, SnapshotFilter };
use crate::types::{ Platform, TokenSnapshot };

impl Database {
    pub(crate) fn insert_snapshot(conn: &Connection, s: &TokenSnapshot) -> Result<()> {
        conn.execute(
            "INSERT OR REPLACE INTO token_snapshots (
                mint, symbol, name, platform, platform_confidence,
                price, volume_24h, market_cap, liquidity,
                price_change_24h, volume_change_24h, holders,
                uri, twitter, telegram, website, timestamp
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                s.mint,
                s.symbol,
                s.name,
                s.platform.as_str(),
                s.platform_confidence,
                s.price,
                s.volume_24h,
                s.market_cap,
                s.liquidity,
                s.price_change_24h,
                s.volume_change_24h,
                s.holders as i64,
                s.uri,
                s.twitter,
                s.telegram,
                s.website,
                ts_millis(s.timestamp),
            ],
        )?;
        Ok(())
    }

    /// Latest snapshot per matching mint, most liquid history first.
    pub(crate) fn select_token_snapshots(
        &self,
        filter: &SnapshotFilter,
    ) -> Result<Vec<TokenSnapshot>> {
        let conn = self.conn.lock().unwrap();

        let mut sql = String::from(
            "SELECT ts.* FROM token_snapshots ts
             INNER JOIN (
                 SELECT mint, MAX(timestamp) AS latest
                 FROM token_snapshots
                 GROUP BY mint
             ) last ON ts.mint = last.mint AND ts.timestamp = last.latest
             WHERE 1=1",
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(mint) = &filter.mint {
            sql.push_str(" AND ts.mint = ?");
            args.push(Box::new(mint.clone()));
        }
        if let Some(platform) = filter.platform {
            sql.push_str(" AND ts.platform = ?");
            args.push(Box::new(platform.as_str().to_string()));
        }
        if let Some(min_volume) = filter.min_volume_24h {
            sql.push_str(" AND ts.volume_24h >= ?");
            args.push(Box::new(min_volume));
        }
        if let Some(since) = filter.since {
            sql.push_str(" AND ts.timestamp >= ?");
            args.push(Box::new(ts_millis(since)));
        }
        sql.push_str(" ORDER BY ts.volume_24h DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            args.push(Box::new(limit as i64));
        }

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())),
            row_to_snapshot,
        )?;

        let mut snapshots = Vec::new();
        for row in rows {
            snapshots.push(row?);
        }
        Ok(snapshots)
    }
}

fn row_to_snapshot(row: &Row) -> rusqlite::Result<TokenSnapshot> {
    let platform: String = row.get("platform")?;
    let holders: i64 = row.get("holders")?;
    let ts: i64 = row.get("timestamp")?;
    Ok(TokenSnapshot {
        mint: row.get("mint")?,
        symbol: row.get("symbol")?,
        name: row.get("name")?,
        platform: Platform::from_str(&platform),
        platform_confidence: row.get("platform_confidence")?,
        price: row.get("price")?,
        volume_24h: row.get("volume_24h")?,
        market_cap: row.get("market_cap")?,
        liquidity: row.get("liquidity")?,
        price_change_24h: row.get("price_change_24h")?,
        volume_change_24h: row.get("volume_change_24h")?,
        holders: holders.max(0) as u64,
        uri: row.get("uri")?,
        twitter: row.get("twitter")?,
        telegram: row.get("telegram")?,
        website: row.get("website")?,
        timestamp: millis_ts(ts),
    })
}

#[cfg(test)]
mod tests {
    use super::super::{ SinkBatch, TimeSeriesSink };
    use super::*;
    use chrono::Utc;

    fn snapshot(mint: &str, platform: Platform, volume: f64) -> TokenSnapshot {
        TokenSnapshot {
            mint: mint.to_string(),
            symbol: "SYM".to_string(),
            name: "Name".to_string(),
            platform,
            platform_confidence: 0.99,
            price: 1.0,
            volume_24h: volume,
            market_cap: 0.0,
            liquidity: 0.0,
            price_change_24h: 0.0,
            volume_change_24h: 0.0,
            holders: 0,
            uri: None,
            twitter: None,
            telegram: None,
            website: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_filter_by_platform_and_volume() {
        let db = Database::in_memory().unwrap();
        let batch = SinkBatch {
            snapshots: vec![
                snapshot("A", Platform::PumpFun, 100.0),
                snapshot("B", Platform::LetsBonk, 5.0),
                snapshot("C", Platform::PumpFun, 1.0),
            ],
            ..Default::default()
        };
        db.write_batch(&batch).await.unwrap();

        let rows = db
            .select_token_snapshots(&SnapshotFilter {
                platform: Some(Platform::PumpFun),
                min_volume_24h: Some(10.0),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].mint, "A");
    }

    #[tokio::test]
    async fn test_latest_snapshot_wins() {
        let db = Database::in_memory().unwrap();
        let mut old = snapshot("A", Platform::PumpFun, 10.0);
        old.timestamp = Utc::now() - chrono::Duration::minutes(5);
        old.price = 0.5;
        let mut new = snapshot("A", Platform::PumpFun, 20.0);
        new.price = 2.0;

        db.write_batch(&SinkBatch {
            snapshots: vec![old, new],
            ..Default::default()
        })
        .await
        .unwrap();

        let rows = db
            .select_token_snapshots(&SnapshotFilter::default())
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].price, 2.0);
    }
}
