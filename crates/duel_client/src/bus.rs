//! Typed event bus owned by the application root.
//!
//! Features publish [`AppEvent`]s; front ends subscribe. Dropping a
//! [`Subscription`] unsubscribes it.

use crate::view::MatchView;
use chrono::{DateTime, Utc};
use duel_core::{MatchResult, Role};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Something front ends may want to react to.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// The match view changed.
    StateChanged(Box<MatchView>),
    /// The match has a (possibly provisional) result.
    MatchEnded(MatchResult),
    /// The peer's connection status changed.
    PeerPresence {
        /// Whether the peer is connected.
        connected: bool,
        /// When the peer dropped.
        disconnected_at: Option<DateTime<Utc>>,
    },
    /// The relay placed this client in a match.
    MatchFound {
        /// Match id.
        match_id: String,
        /// Seat.
        role: Role,
    },
    /// The relay connection is gone.
    ConnectionLost,
}

/// Broadcast bus for [`AppEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AppEvent>,
}

impl EventBus {
    /// Creates a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publishes an event. Returns how many subscribers will see it.
    pub fn publish(&self, event: AppEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Subscribes to events published from now on.
    pub fn subscribe(&self) -> Subscription {
        debug!(subscribers = self.tx.receiver_count() + 1, "Subscribed");
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// A live subscription. Unsubscribes on drop.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<AppEvent>,
}

impl Subscription {
    /// Waits for the next event. `None` once every publisher is gone.
    pub async fn next(&mut self) -> Option<AppEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Subscriber lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Takes the next event if one is already queued.
    pub fn try_next(&mut self) -> Option<AppEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Subscriber lagged, events dropped");
                }
                Err(_) => return None,
            }
        }
    }

    /// Drains every queued event.
    pub fn drain(&mut self) -> Vec<AppEvent> {
        std::iter::from_fn(|| self.try_next()).collect()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        debug!("Unsubscribed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dropping_subscription_unsubscribes() {
        let bus = EventBus::default();
        let first = bus.subscribe();
        let mut second = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
        drop(first);
        assert_eq!(bus.subscriber_count(), 1);

        assert_eq!(bus.publish(AppEvent::ConnectionLost), 1);
        assert!(matches!(second.next().await, Some(AppEvent::ConnectionLost)));
    }

    #[test]
    fn test_publish_without_subscribers_is_harmless() {
        let bus = EventBus::default();
        assert_eq!(bus.publish(AppEvent::ConnectionLost), 0);
    }
}
