use tokio::sync::broadcast;

use crate::platform::Detection;
use crate::types::{ Alert, CleanupMetrics, CleanupReason, Platform, TokenSnapshot, Trend };

/// Events emitted by the core. The composition root routes them; nothing
/// inside the core holds a reference to another component's handle.
#[derive(Debug, Clone)]
pub enum BusEvent {
    TokenTracked {
        mint: String,
        price: f64,
    },
    AlertTriggered {
        alert: Alert,
        snapshot: TokenSnapshot,
    },
    TrendDetected {
        trend: Trend,
    },
    TokenCleanedUp {
        mint: String,
        symbol: String,
        platform: Platform,
        reason: CleanupReason,
        details: String,
    },
    CleanupMetrics {
        metrics: CleanupMetrics,
    },
    /// The platform detector's retry buffer resolved a provisional
    /// `unknown` after the snapshot was already accepted.
    PlatformResolved {
        mint: String,
        detection: Detection,
    },
    EmergencyStop {
        reason: String,
    },
    EmergencyCleanupCompleted {
        removed: usize,
        reason: String,
    },
    EmergencyWhitelistUpdated {
        mints: Vec<String>,
        added: bool,
        reason: String,
    },
    /// The feed crossed its reconnect attempt limit; reads and cleanup
    /// keep running, ingestion stops until a manual restart.
    FeedExhausted {
        attempts: u32,
    },
    /// Well-typed error channel for user-visible failures.
    ComponentError {
        component: String,
        message: String,
    },
}

/// Broadcast fan-out for `BusEvent`. Cheap to clone; subscribers that lag
/// behind drop the oldest events rather than blocking publishers.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BusEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event. Succeeds even with zero subscribers.
    pub fn publish(&self, event: BusEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = EventBus::new(8);
        bus.publish(BusEvent::TokenTracked {
            mint: "MINT".to_string(),
            price: 1.0,
        });
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        bus.publish(BusEvent::FeedExhausted { attempts: 10 });

        match rx.recv().await.expect("event") {
            BusEvent::FeedExhausted { attempts } => assert_eq!(attempts, 10),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.publish(BusEvent::EmergencyStop {
            reason: "test".to_string(),
        });

        assert!(matches!(a.recv().await, Ok(BusEvent::EmergencyStop { .. })));
        assert!(matches!(b.recv().await, Ok(BusEvent::EmergencyStop { .. })));
    }
}
