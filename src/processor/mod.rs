/// Ingestion pipeline.
///
/// Single entry point from the feed into the core: a bounded FIFO with
/// one consumer, per-event validation, per-mint dedup, and batched
/// persistence. Same-mint ordering is arrival order end-to-end because
/// there is exactly one consumer.
use std::collections::HashMap;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::Arc;
use std::time::{ Duration, Instant };

use tokio::sync::{ mpsc, oneshot, RwLock };

use crate::arguments::is_debug_processor_enabled;
use crate::config::Config;
use crate::database::{ SinkBatch, TimeSeriesSink };
use crate::feed::{ NewTokenEvent, TradeEvent };
use crate::logger::{ log, LogTag };
use crate::platform::PlatformDetector;
use crate::tracker::Tracker;
use crate::types::{ Platform, PricePoint, TokenSnapshot, Trade, TradeSide };

/// Events accepted by `submit`.
#[derive(Debug, Clone)]
pub enum IngestEvent {
    Token(NewTokenEvent),
    Trade(TradeEvent),
}

/// `submit` failure modes. Validation failures are not errors; they are
/// counted and dropped inside the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    /// Queue at capacity and no slot freed within the deadline.
    Backpressure,
    /// Processor already stopped.
    Stopped,
}

impl std::fmt::Display for SubmitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmitError::Backpressure => write!(f, "ingestion queue is at capacity"),
            SubmitError::Stopped => write!(f, "processor is stopped"),
        }
    }
}

impl std::error::Error for SubmitError {}

/// Counters surfaced in the stats projection; nothing here is thrown to
/// the caller of `submit`.
#[derive(Debug, Clone, Default)]
pub struct ProcessorStats {
    pub submitted: u64,
    pub tokens_accepted: u64,
    pub trades_accepted: u64,
    pub duplicates_dropped: u64,
    pub validation_errors: u64,
    pub platform_rejected: u64,
    pub database_errors: u64,
    pub batches_written: u64,
    pub batch_failures: u64,
    pub records_dropped: u64,
    pub queue_depth: usize,
    pub sink_available: bool,
}

enum QueueItem {
    Event(IngestEvent),
    Flush(oneshot::Sender<()>),
    Stop(oneshot::Sender<()>),
}

/// The ingestion queue owner.
pub struct DataProcessor {
    tx: mpsc::Sender<QueueItem>,
    stats: Arc<RwLock<ProcessorStats>>,
    stopped: AtomicBool,
    queue_capacity: usize,
    submit_deadline: Duration,
}

impl DataProcessor {
    /// Spawn the processor and its consumer task.
    pub fn spawn(
        config: &Config,
        detector: Arc<PlatformDetector>,
        tracker: Arc<Tracker>,
        sink: Arc<dyn TimeSeriesSink>,
    ) -> (Arc<Self>, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let stats = Arc::new(RwLock::new(ProcessorStats {
            sink_available: true,
            ..Default::default()
        }));

        let processor = Arc::new(Self {
            tx,
            stats: stats.clone(),
            stopped: AtomicBool::new(false),
            queue_capacity: config.queue_capacity,
            submit_deadline: Duration::from_millis(config.submit_deadline_ms),
        });

        let worker = Worker {
            batch_size: config.batch_size,
            dedup_window: config.dedup_window(),
            flush_interval: config.flush_interval(),
            fallback_platform: config.fallback_platform,
            max_pending_records: config.batch_size.saturating_mul(50).max(1_000),
            detector,
            tracker,
            sink,
            stats,
            batch: SinkBatch::default(),
            dedup: HashMap::new(),
            consecutive_failures: 0,
            sink_available: true,
        };
        let join = tokio::spawn(worker.run(rx));

        (processor, join)
    }

    /// Enqueue one event. Non-blocking in the common case; waits at most
    /// the configured deadline for a queue slot under load.
    pub async fn submit(&self, event: IngestEvent) -> Result<(), SubmitError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(SubmitError::Stopped);
        }
        self.stats.write().await.submitted += 1;

        match self.tx.try_send(QueueItem::Event(event)) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SubmitError::Stopped),
            Err(mpsc::error::TrySendError::Full(item)) => {
                match self.tx.send_timeout(item, self.submit_deadline).await {
                    Ok(()) => Ok(()),
                    Err(mpsc::error::SendTimeoutError::Timeout(_)) => {
                        Err(SubmitError::Backpressure)
                    }
                    Err(mpsc::error::SendTimeoutError::Closed(_)) => Err(SubmitError::Stopped),
                }
            }
        }
    }

    /// Drain the queue and force the current batch to the sink.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(QueueItem::Flush(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Drain, flush, and refuse further submissions.
    pub async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(QueueItem::Stop(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }

    pub async fn stats(&self) -> ProcessorStats {
        let mut stats = self.stats.read().await.clone();
        stats.queue_depth = self.queue_capacity - self.tx.capacity();
        stats
    }
}

/// Consumer state. Owned by the single consumer task; nothing else
/// touches the batch buffer or the dedup map.
struct Worker {
    batch_size: usize,
    dedup_window: Duration,
    flush_interval: Duration,
    fallback_platform: Option<Platform>,
    max_pending_records: usize,
    detector: Arc<PlatformDetector>,
    tracker: Arc<Tracker>,
    sink: Arc<dyn TimeSeriesSink>,
    stats: Arc<RwLock<ProcessorStats>>,
    batch: SinkBatch,
    dedup: HashMap<String, Instant>,
    consecutive_failures: u32,
    sink_available: bool,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::Receiver<QueueItem>) {
        let mut flush_timer = tokio::time::interval(self.flush_interval);
        flush_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        flush_timer.tick().await;

        loop {
            tokio::select! {
                item = rx.recv() => match item {
                    Some(QueueItem::Event(event)) => {
                        self.process_event(event).await;
                        if self.batch.len() >= self.batch_size {
                            self.flush_batch().await;
                        }
                    }
                    Some(QueueItem::Flush(ack)) => {
                        self.drain_pending(&mut rx).await;
                        self.flush_batch().await;
                        let _ = ack.send(());
                    }
                    Some(QueueItem::Stop(ack)) => {
                        self.drain_pending(&mut rx).await;
                        self.flush_batch().await;
                        let _ = ack.send(());
                        break;
                    }
                    None => {
                        self.flush_batch().await;
                        break;
                    }
                },
                _ = flush_timer.tick() => {
                    self.flush_batch().await;
                    self.sweep_dedup();
                }
            }
        }
    }

    /// Consume everything already sitting in the queue.
    async fn drain_pending(&mut self, rx: &mut mpsc::Receiver<QueueItem>) {
        while let Ok(item) = rx.try_recv() {
            match item {
                QueueItem::Event(event) => self.process_event(event).await,
                QueueItem::Flush(ack) | QueueItem::Stop(ack) => {
                    let _ = ack.send(());
                }
            }
        }
    }

    async fn process_event(&mut self, event: IngestEvent) {
        match event {
            IngestEvent::Token(token) => self.process_token(token).await,
            IngestEvent::Trade(trade) => self.process_trade(trade).await,
        }
    }

    async fn process_token(&mut self, event: NewTokenEvent) {
        if !is_valid_mint(&event.mint)
            || event.symbol.trim().is_empty()
            || event.price.map_or(false, |p| p < 0.0)
            || event.volume_24h.map_or(false, |v| v < 0.0)
        {
            self.count_validation_error("token", event.mint.as_str()).await;
            return;
        }

        // Per-mint dedup on arrival order. Late duplicates are dropped
        // regardless of their embedded event time.
        let now = Instant::now();
        if let Some(last) = self.dedup.get(&event.mint) {
            if now.duration_since(*last) < self.dedup_window {
                self.stats.write().await.duplicates_dropped += 1;
                return;
            }
        }

        let detection = self.detector.detect(&event.mint).await;
        let (platform, confidence) = if detection.platform.is_known() {
            (detection.platform, detection.confidence)
        } else if let Some(fallback) = self.fallback_platform {
            (fallback, 0.0)
        } else {
            self.stats.write().await.platform_rejected += 1;
            if is_debug_processor_enabled() {
                log(
                    LogTag::Processor,
                    "DEBUG",
                    &format!("No platform for {}, update rejected", event.mint),
                );
            }
            return;
        };

        self.dedup.insert(event.mint.clone(), now);

        let snapshot = TokenSnapshot {
            mint: event.mint,
            symbol: event.symbol,
            name: event.name,
            platform,
            platform_confidence: confidence,
            price: event.price.unwrap_or(0.0),
            volume_24h: event.volume_24h.unwrap_or(0.0),
            market_cap: event.market_cap.unwrap_or(0.0),
            liquidity: event.liquidity.unwrap_or(0.0),
            price_change_24h: event.price_change_24h.unwrap_or(0.0),
            volume_change_24h: event.volume_change_24h.unwrap_or(0.0),
            holders: event.holders.unwrap_or(0),
            uri: event.uri,
            twitter: None,
            telegram: None,
            website: None,
            timestamp: event.timestamp,
        };

        self.tracker.track_token(&snapshot).await;

        if snapshot.price > 0.0 {
            self.batch.price_points.push(PricePoint {
                mint: snapshot.mint.clone(),
                platform: snapshot.platform,
                price: snapshot.price,
                volume: snapshot.volume_24h,
                timestamp: snapshot.timestamp,
                source: "feed".to_string(),
            });
        }
        self.batch.snapshots.push(snapshot);
        self.stats.write().await.tokens_accepted += 1;
    }

    async fn process_trade(&mut self, event: TradeEvent) {
        let side = TradeSide::parse(&event.side);
        if !is_valid_mint(&event.mint)
            || side.is_none()
            || event.amount < 0.0
            || event.price < 0.0
            || event.signature.len() < 10
        {
            self.count_validation_error("trade", event.mint.as_str()).await;
            return;
        }
        let side = side.unwrap();

        let platform = match self.tracker.get_snapshot(&event.mint).await {
            Some(snapshot) => snapshot.platform,
            None => {
                let detection = self.detector.detect(&event.mint).await;
                if detection.platform.is_known() {
                    detection.platform
                } else {
                    self.fallback_platform.unwrap_or(Platform::Unknown)
                }
            }
        };

        let trade = Trade {
            value: event.amount * event.price,
            mint: event.mint,
            platform,
            side,
            amount: event.amount,
            price: event.price,
            wallet: event.wallet,
            signature: event.signature,
            timestamp: event.timestamp,
        };

        self.tracker.record_trade(&trade).await;
        self.batch.trades.push(trade);
        self.stats.write().await.trades_accepted += 1;
    }

    async fn count_validation_error(&self, kind: &str, mint: &str) {
        self.stats.write().await.validation_errors += 1;
        if is_debug_processor_enabled() {
            log(
                LogTag::Processor,
                "DEBUG",
                &format!("Dropped invalid {} event for '{}'", kind, mint),
            );
        }
    }

    /// Write the pending batch. On failure the batch stays at the head
    /// of the buffer and is retried next cycle; a second consecutive
    /// failure fails fast until a health probe recovers.
    async fn flush_batch(&mut self) {
        if !self.sink_available {
            if self.sink.health_check().await.is_ok() {
                self.sink_available = true;
                self.consecutive_failures = 0;
                log(LogTag::Processor, "SUCCESS", "Sink recovered, resuming writes");
            } else {
                self.enforce_buffer_cap().await;
                self.stats.write().await.sink_available = false;
                return;
            }
        }

        if self.batch.is_empty() {
            return;
        }

        match self.sink.write_batch(&self.batch).await {
            Ok(()) => {
                let mut stats = self.stats.write().await;
                stats.batches_written += 1;
                stats.sink_available = true;
                self.batch.clear();
                self.consecutive_failures = 0;
            }
            Err(e) => {
                self.consecutive_failures += 1;
                let mut stats = self.stats.write().await;
                stats.database_errors += 1;
                stats.batch_failures += 1;
                if self.consecutive_failures >= 2 {
                    self.sink_available = false;
                    stats.sink_available = false;
                    log(
                        LogTag::Processor,
                        "ERROR",
                        &format!("Sink unavailable after repeated failures: {}", e),
                    );
                } else {
                    log(
                        LogTag::Processor,
                        "WARN",
                        &format!("Batch write failed, re-queued: {}", e),
                    );
                }
            }
        }
    }

    /// Keep the retained batch bounded while the sink is down. Oldest
    /// records go first.
    async fn enforce_buffer_cap(&mut self) {
        let over = self.batch.len().saturating_sub(self.max_pending_records);
        if over == 0 {
            return;
        }
        let mut to_drop = over;
        let drop_snapshots = to_drop.min(self.batch.snapshots.len());
        self.batch.snapshots.drain(..drop_snapshots);
        to_drop -= drop_snapshots;
        let drop_points = to_drop.min(self.batch.price_points.len());
        self.batch.price_points.drain(..drop_points);
        to_drop -= drop_points;
        let drop_trades = to_drop.min(self.batch.trades.len());
        self.batch.trades.drain(..drop_trades);

        self.stats.write().await.records_dropped += over as u64;
    }

    /// Drop dedup entries older than twice the window.
    fn sweep_dedup(&mut self) {
        let horizon = self.dedup_window * 2;
        let now = Instant::now();
        self.dedup
            .retain(|_, last| now.duration_since(*last) <= horizon);
    }
}

/// Mint identifiers are opaque but bounded: base58-style alphanumeric.
fn is_valid_mint(mint: &str) -> bool {
    !mint.is_empty()
        && mint.len() <= 64
        && mint.chars().all(|c| c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_mint() {
        assert!(is_valid_mint("MintAAA111111111111111111111pump"));
        assert!(is_valid_mint("A"));
        assert!(!is_valid_mint(""));
        assert!(!is_valid_mint("has space"));
        assert!(!is_valid_mint(&"x".repeat(65)));
    }

    #[test]
    fn test_submit_error_display() {
        assert_eq!(
            SubmitError::Backpressure.to_string(),
            "ingestion queue is at capacity"
        );
        assert_eq!(SubmitError::Stopped.to_string(), "processor is stopped");
    }
}
