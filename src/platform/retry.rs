// platform/retry.rs
// Retry buffer for mints the authoritative lookup could not resolve on
// first contact. Bounded attempts, bounded age, single worker.

use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::{ Arc, Mutex };
use std::time::{ Duration, Instant };

use tokio::sync::Notify;

use crate::arguments::is_debug_platform_enabled;
use crate::logger::{ log, LogTag };

/// Delay before each attempt, indexed by attempts already made.
const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(10),
    Duration::from_secs(30),
    Duration::from_secs(60),
];
/// Attempts before giving up.
const MAX_ATTEMPTS: u32 = 3;
/// Entries older than this are dropped regardless of attempts left.
const MAX_AGE: Duration = Duration::from_secs(300);
/// Worker poll cadence.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub(crate) struct PendingLookup {
    pub mint: String,
    pub attempts: u32,
    pub enqueued_at: Instant,
    pub next_due: Instant,
}

/// Parked mints awaiting another authoritative lookup attempt.
pub struct RetryBuffer {
    pending: Mutex<Vec<PendingLookup>>,
    accepting: AtomicBool,
}

impl RetryBuffer {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            accepting: AtomicBool::new(true),
        }
    }

    /// Park a mint for retry. Duplicate enqueues are ignored.
    pub fn enqueue(&self, mint: &str) {
        if !self.accepting.load(Ordering::SeqCst) {
            return;
        }
        let Ok(mut pending) = self.pending.lock() else {
            return;
        };
        if pending.iter().any(|p| p.mint == mint) {
            return;
        }
        let now = Instant::now();
        pending.push(PendingLookup {
            mint: mint.to_string(),
            attempts: 0,
            enqueued_at: now,
            next_due: now + RETRY_DELAYS[0],
        });
    }

    pub fn len(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting new entries and drop everything parked.
    pub fn shutdown(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        if let Ok(mut pending) = self.pending.lock() {
            pending.clear();
        }
    }

    /// Remove and return every entry whose retry time has come.
    pub(crate) fn take_due(&self, now: Instant) -> Vec<PendingLookup> {
        let Ok(mut pending) = self.pending.lock() else {
            return Vec::new();
        };
        let mut due = Vec::new();
        pending.retain(|p| {
            if p.next_due <= now {
                due.push(p.clone());
                false
            } else {
                true
            }
        });
        due
    }

    /// Put an entry back after a failed attempt.
    pub(crate) fn requeue(&self, mut entry: PendingLookup) {
        if !self.accepting.load(Ordering::SeqCst) {
            return;
        }
        let delay = RETRY_DELAYS[(entry.attempts as usize).min(RETRY_DELAYS.len() - 1)];
        entry.next_due = Instant::now() + delay;
        if let Ok(mut pending) = self.pending.lock() {
            pending.push(entry);
        }
    }
}

impl Default for RetryBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Background worker draining the detector's retry buffer.
pub fn spawn_retry_worker(
    detector: Arc<super::PlatformDetector>,
    shutdown: Arc<Notify>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.notified() => break,
                _ = tokio::time::sleep(POLL_INTERVAL) => {
                    process_due(&detector).await;
                }
            }
        }
    })
}

async fn process_due(detector: &super::PlatformDetector) {
    let now = Instant::now();
    for mut entry in detector.retry_buffer().take_due(now) {
        entry.attempts += 1;

        match detector.try_authoritative(&entry.mint).await {
            Some(detection) => {
                if is_debug_platform_enabled() {
                    log(
                        LogTag::Platform,
                        "DEBUG",
                        &format!(
                            "Retry resolved {} to {} after {} attempt(s)",
                            entry.mint, detection.platform, entry.attempts
                        ),
                    );
                }
                detector.resolve_parked(&entry.mint, detection);
            }
            None => {
                let too_old = entry.enqueued_at.elapsed() > MAX_AGE;
                if entry.attempts >= MAX_ATTEMPTS || too_old {
                    if is_debug_platform_enabled() {
                        log(
                            LogTag::Platform,
                            "DEBUG",
                            &format!(
                                "Giving up on {} after {} attempt(s)",
                                entry.mint, entry.attempts
                            ),
                        );
                    }
                } else {
                    detector.retry_buffer().requeue(entry);
                }
            }
        }
    }
}
