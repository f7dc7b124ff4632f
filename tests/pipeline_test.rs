// End-to-end pipeline tests: events submitted to the processor land in
// the tracker and the sqlite store, duplicates are suppressed, invalid
// events are dropped, and cleanup honors the grace period.

use std::sync::Arc;

use chrono::Utc;
use mintwatch::config::Config;
use mintwatch::database::{ CleanupFilter, Database, SnapshotFilter, TimeSeriesSink };
use mintwatch::events::EventBus;
use mintwatch::feed::{ NewTokenEvent, TradeEvent };
use mintwatch::platform::PlatformDetector;
use mintwatch::processor::{ DataProcessor, IngestEvent };
use mintwatch::tracker::{ Tracker, TrackerConfig };
use mintwatch::types::Platform;

const MINT_A: &str = "TestMintAAAA1111111111111111pump";
const MINT_B: &str = "TestMintBBBB1111111111111111bonk";

struct Harness {
    processor: Arc<DataProcessor>,
    tracker: Arc<Tracker>,
    database: Arc<Database>,
}

fn harness(config: Config) -> Harness {
    let database = Arc::new(Database::in_memory().expect("in-memory store"));
    let sink: Arc<dyn TimeSeriesSink> = database.clone();
    let bus = EventBus::default();
    let tracker =
        Tracker::new(TrackerConfig::from(&config), sink.clone(), bus.clone()).expect("tracker");
    let detector = Arc::new(PlatformDetector::new(None, bus.clone()));
    let (processor, _task) = DataProcessor::spawn(&config, detector, tracker.clone(), sink);
    Harness {
        processor,
        tracker,
        database,
    }
}

fn token_event(mint: &str, price: f64, volume: f64) -> IngestEvent {
    IngestEvent::Token(NewTokenEvent {
        mint: mint.to_string(),
        symbol: "TST".to_string(),
        name: "Test Token".to_string(),
        uri: None,
        price: Some(price),
        market_cap: Some(price * 1_000_000.0),
        liquidity: Some(500.0),
        volume_24h: Some(volume),
        price_change_24h: None,
        volume_change_24h: None,
        holders: Some(3),
        timestamp: Utc::now(),
    })
}

fn trade_event(mint: &str, side: &str, signature: &str) -> IngestEvent {
    IngestEvent::Trade(TradeEvent {
        mint: mint.to_string(),
        side: side.to_string(),
        amount: 100.0,
        price: 0.5,
        wallet: "wallet1111".to_string(),
        signature: signature.to_string(),
        timestamp: Utc::now(),
    })
}

#[tokio::test]
async fn test_token_event_flows_to_tracker_and_store() {
    let h = harness(Config::default());

    h.processor.submit(token_event(MINT_A, 1.5, 50.0)).await.unwrap();
    h.processor.flush().await;

    // Tracker holds the live snapshot with the suffix-detected platform.
    let snapshot = h.tracker.get_snapshot(MINT_A).await.expect("tracked");
    assert_eq!(snapshot.platform, Platform::PumpFun);
    assert!(snapshot.platform_confidence >= 0.99);
    assert_eq!(snapshot.price, 1.5);

    // Store received the snapshot and the derived price point.
    let stats = h.database.get_stats().await.unwrap();
    assert_eq!(stats.snapshot_rows, 1);
    assert_eq!(stats.price_rows, 1);

    let proc_stats = h.processor.stats().await;
    assert_eq!(proc_stats.tokens_accepted, 1);
    assert_eq!(proc_stats.batches_written, 1);
}

#[tokio::test]
async fn test_duplicate_within_window_is_noop() {
    let h = harness(Config::default());

    h.processor.submit(token_event(MINT_A, 1.0, 50.0)).await.unwrap();
    h.processor.submit(token_event(MINT_A, 2.0, 50.0)).await.unwrap();
    h.processor.flush().await;

    // Second update arrived within the dedup window: tracker keeps the
    // first price, store holds one snapshot, one duplicate counted.
    assert_eq!(h.tracker.get_snapshot(MINT_A).await.unwrap().price, 1.0);
    assert_eq!(h.database.get_stats().await.unwrap().snapshot_rows, 1);
    assert_eq!(h.processor.stats().await.duplicates_dropped, 1);
}

#[tokio::test]
async fn test_distinct_mints_not_deduped() {
    let h = harness(Config::default());

    h.processor.submit(token_event(MINT_A, 1.0, 50.0)).await.unwrap();
    h.processor.submit(token_event(MINT_B, 1.0, 50.0)).await.unwrap();
    h.processor.flush().await;

    assert_eq!(h.tracker.tracked_count().await, 2);
    assert_eq!(
        h.tracker.get_snapshot(MINT_B).await.unwrap().platform,
        Platform::LetsBonk
    );
}

#[tokio::test]
async fn test_invalid_events_counted_and_dropped() {
    let h = harness(Config::default());

    // Empty symbol, negative price, malformed mint, short signature.
    let mut bad_symbol = token_event(MINT_A, 1.0, 50.0);
    if let IngestEvent::Token(t) = &mut bad_symbol {
        t.symbol = String::new();
    }
    h.processor.submit(bad_symbol).await.unwrap();

    let mut bad_price = token_event(MINT_A, 1.0, 50.0);
    if let IngestEvent::Token(t) = &mut bad_price {
        t.price = Some(-1.0);
    }
    h.processor.submit(bad_price).await.unwrap();

    h.processor
        .submit(trade_event("bad mint!", "buy", "sig-1234567890"))
        .await
        .unwrap();
    h.processor
        .submit(trade_event(MINT_A, "buy", "short"))
        .await
        .unwrap();
    h.processor
        .submit(trade_event(MINT_A, "hold", "sig-1234567890"))
        .await
        .unwrap();
    h.processor.flush().await;

    let stats = h.processor.stats().await;
    assert_eq!(stats.validation_errors, 5);
    assert_eq!(h.tracker.tracked_count().await, 0);
    assert_eq!(h.database.get_stats().await.unwrap().trade_rows, 0);
}

#[tokio::test]
async fn test_trade_updates_health_and_store() {
    let h = harness(Config::default());

    h.processor.submit(token_event(MINT_A, 1.0, 50.0)).await.unwrap();
    h.processor
        .submit(trade_event(MINT_A, "buy", "sig-aaaaaaaaaa"))
        .await
        .unwrap();
    h.processor
        .submit(trade_event(MINT_A, "sell", "sig-bbbbbbbbbb"))
        .await
        .unwrap();
    h.processor.flush().await;

    let health = h.tracker.get_health(MINT_A).await.expect("health");
    assert_eq!(health.total_trades, 2);
    assert_eq!(h.database.get_stats().await.unwrap().trade_rows, 2);

    let volume = h
        .database
        .query_volume_analysis(&SnapshotFilter::default())
        .await
        .unwrap();
    assert_eq!(volume.len(), 1);
    assert_eq!(volume[0].buy_count, 1);
    assert_eq!(volume[0].sell_count, 1);
}

#[tokio::test]
async fn test_grace_period_protects_fresh_rug() {
    // Rug-grade numbers on a freshly created token: the grace period
    // keeps it tracked and no cleanup event is written.
    let mut config = Config::default();
    config.min_tokens_to_keep = 0;
    let h = harness(config);

    h.processor.submit(token_event(MINT_A, 1.0, 0.0)).await.unwrap();
    h.processor.flush().await;

    let metrics = h.tracker.run_cleanup_cycle().await.unwrap();
    assert_eq!(metrics.actually_removed, 0);
    assert!(h.tracker.get_snapshot(MINT_A).await.is_some());

    let events = h
        .database
        .query_cleanup_events(&CleanupFilter::default())
        .await
        .unwrap();
    assert!(events.is_empty());
}

#[tokio::test]
async fn test_stop_refuses_further_submissions() {
    let h = harness(Config::default());

    h.processor.submit(token_event(MINT_A, 1.0, 50.0)).await.unwrap();
    h.processor.stop().await;

    // The pending event was drained and persisted on stop.
    assert_eq!(h.database.get_stats().await.unwrap().snapshot_rows, 1);
    assert!(h
        .processor
        .submit(token_event(MINT_B, 1.0, 50.0))
        .await
        .is_err());
}

#[tokio::test]
async fn test_unknown_platform_uses_configured_fallback() {
    // A mint with no suffix marker and no lookup resolves through the
    // configured fallback platform.
    let h = harness(Config::default());
    let plain = "PlainMint11111111111111111111111";

    h.processor.submit(token_event(plain, 1.0, 50.0)).await.unwrap();
    h.processor.flush().await;

    let snapshot = h.tracker.get_snapshot(plain).await.expect("tracked");
    assert_eq!(snapshot.platform, Platform::PumpFun);
    assert_eq!(snapshot.platform_confidence, 0.0);
}

#[tokio::test]
async fn test_unknown_platform_rejected_without_fallback() {
    let mut config = Config::default();
    config.fallback_platform = None;
    let h = harness(config);
    let plain = "PlainMint11111111111111111111111";

    h.processor.submit(token_event(plain, 1.0, 50.0)).await.unwrap();
    h.processor.flush().await;

    assert!(h.tracker.get_snapshot(plain).await.is_none());
    assert_eq!(h.processor.stats().await.platform_rejected, 1);
    assert_eq!(h.database.get_stats().await.unwrap().snapshot_rows, 0);
}

#[tokio::test]
async fn test_price_history_round_trip_through_store() {
    let mut config = Config::default();
    config.dedup_window_ms = 1;
    let h = harness(config);

    for i in 1..=3 {
        h.processor
            .submit(token_event(MINT_A, i as f64, 50.0))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    h.processor.flush().await;

    let buckets = h
        .database
        .query_price_history(
            MINT_A,
            Utc::now() - chrono::Duration::minutes(5),
            Utc::now(),
            chrono::Duration::minutes(5),
            mintwatch::database::Aggregation::Mean,
        )
        .await
        .unwrap();
    assert!(!buckets.is_empty());
    let total_samples: u32 = buckets.iter().map(|b| b.sample_count).sum();
    assert_eq!(total_samples, 3);
}
