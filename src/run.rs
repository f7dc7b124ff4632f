// Composition root. Every component is wired here: the feed drives the
// processor, the processor feeds tracker and sink, and bus events are
// routed back into the feed's subscription set. No component holds a
// direct reference to another's handle.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{ Context, Result };
use tokio::sync::{ broadcast, mpsc, Notify };

use crate::config::get_config;
use crate::database::{ Database, TimeSeriesSink };
use crate::events::{ BusEvent, EventBus };
use crate::feed::{ spawn_feed_client, FeedConfig, FeedHandle, FeedMessage };
use crate::logger::{ log, LogTag };
use crate::platform::{ retry::spawn_retry_worker, PlatformDetector };
use crate::processor::{ DataProcessor, IngestEvent, SubmitError };
use crate::tracker::{ Tracker, TrackerConfig };

/// Cadence of the maintenance pass (retention pruning, store stats).
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60 * 60);
/// Cadence of the one-line status summary.
const SUMMARY_INTERVAL: Duration = Duration::from_secs(60);

/// Run the screener until Ctrl-C.
pub async fn run_service() -> Result<()> {
    let config = get_config();

    let database = Arc::new(
        Database::new(&config.db_path)
            .with_context(|| format!("Failed to open store at {}", config.db_path))?,
    );
    let sink: Arc<dyn TimeSeriesSink> = database.clone();

    let bus = EventBus::default();
    let shutdown = Arc::new(Notify::new());

    let tracker = Tracker::new(TrackerConfig::from(&config), sink.clone(), bus.clone())?;

    // No authoritative program lookup is wired by default; the suffix
    // rule and the configured fallback carry detection.
    let detector = Arc::new(PlatformDetector::new(None, bus.clone()));
    let _retry_worker = spawn_retry_worker(detector.clone(), shutdown.clone());

    let (processor, _processor_task) = DataProcessor::spawn(
        &config,
        detector.clone(),
        tracker.clone(),
        sink.clone(),
    );

    let (feed_tx, feed_rx) = mpsc::channel::<FeedMessage>(1024);
    let (feed, _feed_task) = spawn_feed_client(
        FeedConfig::from(&config),
        feed_tx,
        bus.clone(),
        shutdown.clone(),
    );

    spawn_ingest_bridge(feed_rx, processor.clone());
    spawn_event_router(bus.clone(), feed.clone(), shutdown.clone());
    spawn_timers(
        &config,
        tracker.clone(),
        database.clone(),
        processor.clone(),
        feed.clone(),
        shutdown.clone(),
    );

    log(
        LogTag::System,
        "SUCCESS",
        &format!(
            "mintwatch running: feed={}, store={}, cleanup={}",
            config.feed_url,
            config.db_path,
            if config.cleanup_enabled { "on" } else { "off" }
        ),
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    log(LogTag::System, "INFO", "Shutting down...");
    shutdown.notify_waiters();
    processor.stop().await;
    feed.disconnect().await;
    detector.shutdown();

    let stats = processor.stats().await;
    log(
        LogTag::System,
        "SUCCESS",
        &format!(
            "Stopped. {} events submitted, {} batches written, {} validation drops",
            stats.submitted, stats.batches_written, stats.validation_errors
        ),
    );
    Ok(())
}

/// Forward parsed feed frames into the processor. Backpressure drops
/// are logged and counted on the processor side.
fn spawn_ingest_bridge(
    mut feed_rx: mpsc::Receiver<FeedMessage>,
    processor: Arc<DataProcessor>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = feed_rx.recv().await {
            let event = match message {
                FeedMessage::NewToken(token) => IngestEvent::Token(token),
                FeedMessage::Trade(trade) => IngestEvent::Trade(trade),
                _ => continue,
            };
            match processor.submit(event).await {
                Ok(()) => {}
                Err(SubmitError::Backpressure) => {
                    log(LogTag::Processor, "WARN", "Backpressure: feed event dropped");
                }
                Err(SubmitError::Stopped) => break,
            }
        }
    })
}

/// Route bus events back into the feed: tracked mints get trade
/// subscriptions, untracked mints lose them.
fn spawn_event_router(
    bus: EventBus,
    feed: FeedHandle,
    shutdown: Arc<Notify>,
) -> tokio::task::JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.notified() => break,
                event = rx.recv() => match event {
                    Ok(BusEvent::TokenTracked { mint, .. }) => {
                        feed.subscribe(vec![mint]).await;
                    }
                    Ok(BusEvent::TokenCleanedUp { mint, .. }) => {
                        feed.unsubscribe(vec![mint]).await;
                    }
                    Ok(BusEvent::FeedExhausted { attempts }) => {
                        log(
                            LogTag::System,
                            "ERROR",
                            &format!(
                                "Feed gave up after {} attempts; reads and cleanup continue",
                                attempts
                            ),
                        );
                    }
                    Ok(BusEvent::ComponentError { component, message }) => {
                        log(
                            LogTag::System,
                            "ERROR",
                            &format!("{}: {}", component, message),
                        );
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        log(
                            LogTag::System,
                            "WARN",
                            &format!("Event router lagged, {} events skipped", n),
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    })
}

/// Cleanup, trend analysis, maintenance, and summary timers. Each one
/// dispatches work and honors shutdown.
fn spawn_timers(
    config: &crate::config::Config,
    tracker: Arc<Tracker>,
    database: Arc<Database>,
    processor: Arc<DataProcessor>,
    feed: FeedHandle,
    shutdown: Arc<Notify>,
) {
    if config.cleanup_enabled {
        let tracker = tracker.clone();
        let shutdown = shutdown.clone();
        let interval = Duration::from_millis(config.cleanup_interval_ms);
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.notified() => break,
                    _ = timer.tick() => {
                        if let Err(e) = tracker.run_cleanup_cycle().await {
                            log(LogTag::Cleanup, "ERROR", &format!("Cleanup cycle failed: {}", e));
                        }
                    }
                }
            }
        });
    }

    {
        let tracker = tracker.clone();
        let shutdown = shutdown.clone();
        let interval = Duration::from_millis(config.analysis_interval_ms);
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.notified() => break,
                    _ = timer.tick() => {
                        if let Err(e) = tracker.run_trend_analysis().await {
                            log(LogTag::Trend, "ERROR", &format!("Trend analysis failed: {}", e));
                        }
                    }
                }
            }
        });
    }

    {
        let database = database.clone();
        let shutdown = shutdown.clone();
        let max_age_hours = config.retention_max_age_hours;
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(MAINTENANCE_INTERVAL);
            timer.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.notified() => break,
                    _ = timer.tick() => {
                        match database.prune_old_rows(max_age_hours).await {
                            Ok(removed) if removed > 0 => {
                                log(
                                    LogTag::Database,
                                    "MAINT",
                                    &format!("Pruned {} aged rows", removed),
                                );
                            }
                            Ok(_) => {}
                            Err(e) => {
                                log(LogTag::Database, "WARN", &format!("Retention prune failed: {}", e));
                            }
                        }
                    }
                }
            }
        });
    }

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(SUMMARY_INTERVAL);
            timer.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.notified() => break,
                    _ = timer.tick() => {
                        let tracker_stats = tracker.stats().await;
                        let processor_stats = processor.stats().await;
                        log(
                            LogTag::System,
                            "STATS",
                            &format!(
                                "tracked {}/{} | queue {} | feed {} | subs {} | rugged {} inactive {} low-vol {} | untracked {}",
                                tracker_stats.tracked,
                                tracker_stats.max_tokens_tracked,
                                processor_stats.queue_depth,
                                if feed.is_connected() { "up" } else { "down" },
                                feed.subscribed_mints().len(),
                                tracker_stats.rugged_candidates,
                                tracker_stats.inactive,
                                tracker_stats.low_volume,
                                tracker_stats.total_untracked,
                            ),
                        );
                    }
                }
            }
        });
    }
}
