// feed/client.rs
// Websocket client for the upstream event feed. Reconnects with capped
// exponential backoff and re-asserts the full subscription set before
// reporting ready.

use std::collections::HashSet;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::{ Arc, Mutex };
use std::time::Duration;

use futures_util::{ SinkExt, StreamExt };
use tokio::sync::{ mpsc, Notify };
use tokio_tungstenite::{ connect_async, tungstenite::Message };

use super::messages::{
    parse_frame, subscribe_new_tokens_frame, subscribe_trades_frame, unsubscribe_trades_frame,
    FeedMessage,
};
use crate::arguments::is_debug_feed_enabled;
use crate::config::Config;
use crate::events::{ BusEvent, EventBus };
use crate::logger::{ log, LogTag };

/// Backoff ceiling between reconnect attempts.
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub url: String,
    pub reconnect_delay: Duration,
    pub max_reconnect_attempts: u32,
    pub heartbeat: Duration,
    pub connect_timeout: Duration,
}

impl From<&Config> for FeedConfig {
    fn from(config: &Config) -> Self {
        Self {
            url: config.feed_url.clone(),
            reconnect_delay: Duration::from_millis(config.reconnect_delay_ms),
            max_reconnect_attempts: config.max_reconnect_attempts,
            heartbeat: Duration::from_millis(config.heartbeat_ms),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
        }
    }
}

#[derive(Debug)]
enum FeedCommand {
    Subscribe(Vec<String>),
    Unsubscribe(Vec<String>),
    Disconnect,
}

/// Handle other components use to talk to the feed task. The trade
/// subscription set lives here and nowhere else.
#[derive(Clone)]
pub struct FeedHandle {
    cmd_tx: mpsc::Sender<FeedCommand>,
    connected: Arc<AtomicBool>,
    subscribed: Arc<Mutex<HashSet<String>>>,
}

impl FeedHandle {
    /// Subscribe to trades for mints not already subscribed. Repeat
    /// calls for a known mint send nothing.
    pub async fn subscribe(&self, mints: Vec<String>) {
        let fresh: Vec<String> = match self.subscribed.lock() {
            Ok(mut set) => mints
                .into_iter()
                .filter(|mint| set.insert(mint.clone()))
                .collect(),
            Err(_) => return,
        };
        if !fresh.is_empty() {
            let _ = self.cmd_tx.send(FeedCommand::Subscribe(fresh)).await;
        }
    }

    pub async fn unsubscribe(&self, mints: Vec<String>) {
        let removed: Vec<String> = match self.subscribed.lock() {
            Ok(mut set) => mints.into_iter().filter(|mint| set.remove(mint)).collect(),
            Err(_) => return,
        };
        if !removed.is_empty() {
            let _ = self.cmd_tx.send(FeedCommand::Unsubscribe(removed)).await;
        }
    }

    pub async fn disconnect(&self) {
        let _ = self.cmd_tx.send(FeedCommand::Disconnect).await;
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn subscribed_mints(&self) -> Vec<String> {
        self.subscribed
            .lock()
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Backoff before reconnect attempt `attempt` (1-based):
/// `min(base * 2^(attempt-1), 60s)`.
pub fn reconnect_delay(attempt: u32, base: Duration) -> Duration {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1).min(16));
    let delay = base.saturating_mul(factor.min(u32::MAX as u64) as u32);
    delay.min(MAX_RECONNECT_DELAY)
}

/// Spawn the feed client task. Parsed `NewToken`/`Trade` frames go to
/// `out`; lifecycle signals go to the bus.
pub fn spawn_feed_client(
    config: FeedConfig,
    out: mpsc::Sender<FeedMessage>,
    bus: EventBus,
    shutdown: Arc<Notify>,
) -> (FeedHandle, tokio::task::JoinHandle<()>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let handle = FeedHandle {
        cmd_tx,
        connected: Arc::new(AtomicBool::new(false)),
        subscribed: Arc::new(Mutex::new(HashSet::new())),
    };

    let task_handle = handle.clone();
    let join = tokio::spawn(async move {
        run_client(config, task_handle, cmd_rx, out, bus, shutdown).await;
    });

    (handle, join)
}

async fn run_client(
    config: FeedConfig,
    handle: FeedHandle,
    mut cmd_rx: mpsc::Receiver<FeedCommand>,
    out: mpsc::Sender<FeedMessage>,
    bus: EventBus,
    shutdown: Arc<Notify>,
) {
    let mut attempt: u32 = 0;

    'reconnect: loop {
        let connect = tokio::time::timeout(config.connect_timeout, connect_async(config.url.as_str()));
        let ws_stream = tokio::select! {
            _ = shutdown.notified() => break 'reconnect,
            result = connect => match result {
                Ok(Ok((stream, _))) => stream,
                Ok(Err(e)) => {
                    log(LogTag::Feed, "ERROR", &format!("Feed connect failed: {}", e));
                    if !backoff_or_give_up(&config, &mut attempt, &bus, &shutdown).await {
                        break 'reconnect;
                    }
                    continue 'reconnect;
                }
                Err(_) => {
                    log(LogTag::Feed, "ERROR", "Feed connect timed out");
                    if !backoff_or_give_up(&config, &mut attempt, &bus, &shutdown).await {
                        break 'reconnect;
                    }
                    continue 'reconnect;
                }
            },
        };

        attempt = 0;
        let (mut sender, mut receiver) = ws_stream.split();

        // Re-assert every subscription before reporting ready.
        if sender
            .send(Message::Text(subscribe_new_tokens_frame()))
            .await
            .is_err()
        {
            handle.connected.store(false, Ordering::SeqCst);
            if !backoff_or_give_up(&config, &mut attempt, &bus, &shutdown).await {
                break 'reconnect;
            }
            continue 'reconnect;
        }
        let mints = handle.subscribed_mints();
        if !mints.is_empty() {
            let _ = sender
                .send(Message::Text(subscribe_trades_frame(&mints)))
                .await;
        }
        handle.connected.store(true, Ordering::SeqCst);
        log(
            LogTag::Feed,
            "SUCCESS",
            &format!("Feed connected, {} trade subscriptions re-asserted", mints.len()),
        );

        let mut heartbeat = tokio::time::interval(config.heartbeat);
        heartbeat.tick().await; // first tick fires immediately

        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    let _ = sender.send(Message::Close(None)).await;
                    break 'reconnect;
                }
                _ = heartbeat.tick() => {
                    if sender.send(Message::Ping(Vec::new())).await.is_err() {
                        log(LogTag::Feed, "WARN", "Heartbeat ping failed, reconnecting");
                        break;
                    }
                }
                cmd = cmd_rx.recv() => match cmd {
                    Some(FeedCommand::Subscribe(mints)) => {
                        let _ = sender.send(Message::Text(subscribe_trades_frame(&mints))).await;
                    }
                    Some(FeedCommand::Unsubscribe(mints)) => {
                        let _ = sender.send(Message::Text(unsubscribe_trades_frame(&mints))).await;
                    }
                    Some(FeedCommand::Disconnect) | None => {
                        let _ = sender.send(Message::Close(None)).await;
                        break 'reconnect;
                    }
                },
                msg = receiver.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_frame(&text, &out);
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        log(LogTag::Feed, "WARN", "Feed connection closed by server");
                        break;
                    }
                    Some(Err(e)) => {
                        log(LogTag::Feed, "ERROR", &format!("Feed read error: {}", e));
                        break;
                    }
                    Some(Ok(_)) => {}
                },
            }
        }

        handle.connected.store(false, Ordering::SeqCst);
        if !backoff_or_give_up(&config, &mut attempt, &bus, &shutdown).await {
            break 'reconnect;
        }
    }

    handle.connected.store(false, Ordering::SeqCst);
    if is_debug_feed_enabled() {
        log(LogTag::Feed, "DEBUG", "Feed client task exiting");
    }
}

fn handle_frame(text: &str, out: &mpsc::Sender<FeedMessage>) {
    let message = parse_frame(text);
    match &message {
        FeedMessage::NewToken(_) | FeedMessage::Trade(_) => {
            // A full bridge means the processor is saturated; dropping
            // here is the not-drowning-the-processor policy.
            if out.try_send(message).is_err() && is_debug_feed_enabled() {
                log(LogTag::Feed, "DEBUG", "Ingest bridge full, frame dropped");
            }
        }
        FeedMessage::SubscriptionAck { message } => {
            if is_debug_feed_enabled() {
                log(LogTag::Feed, "DEBUG", &format!("Subscription ack: {}", message));
            }
        }
        FeedMessage::Unknown(raw) => {
            if is_debug_feed_enabled() {
                log(LogTag::Feed, "DEBUG", &format!("Unknown frame: {}", raw));
            }
        }
    }
}

/// Sleep out the backoff for the next attempt. Returns false when the
/// attempt budget is exhausted or shutdown fired.
async fn backoff_or_give_up(
    config: &FeedConfig,
    attempt: &mut u32,
    bus: &EventBus,
    shutdown: &Arc<Notify>,
) -> bool {
    *attempt += 1;
    if *attempt > config.max_reconnect_attempts {
        log(
            LogTag::Feed,
            "ERROR",
            &format!(
                "Feed gave up after {} reconnect attempts",
                config.max_reconnect_attempts
            ),
        );
        bus.publish(BusEvent::FeedExhausted {
            attempts: *attempt - 1,
        });
        return false;
    }

    let delay = reconnect_delay(*attempt, config.reconnect_delay);
    log(
        LogTag::Feed,
        "WARN",
        &format!(
            "Reconnecting in {:.1}s (attempt {}/{})",
            delay.as_secs_f64(),
            attempt,
            config.max_reconnect_attempts
        ),
    );

    tokio::select! {
        _ = shutdown.notified() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_delay_doubles_and_caps() {
        let base = Duration::from_secs(5);
        assert_eq!(reconnect_delay(1, base), Duration::from_secs(5));
        assert_eq!(reconnect_delay(2, base), Duration::from_secs(10));
        assert_eq!(reconnect_delay(3, base), Duration::from_secs(20));
        assert_eq!(reconnect_delay(4, base), Duration::from_secs(40));
        // Capped at 60s from here on.
        assert_eq!(reconnect_delay(5, base), Duration::from_secs(60));
        assert_eq!(reconnect_delay(12, base), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_handle_tracks_subscription_set() {
        let (cmd_tx, _cmd_rx) = mpsc::channel(8);
        let handle = FeedHandle {
            cmd_tx,
            connected: Arc::new(AtomicBool::new(false)),
            subscribed: Arc::new(Mutex::new(HashSet::new())),
        };

        handle
            .subscribe(vec!["A".to_string(), "B".to_string()])
            .await;
        let mut mints = handle.subscribed_mints();
        mints.sort();
        assert_eq!(mints, vec!["A".to_string(), "B".to_string()]);

        handle.unsubscribe(vec!["A".to_string()]).await;
        assert_eq!(handle.subscribed_mints(), vec!["B".to_string()]);
        assert!(!handle.is_connected());
    }
}
