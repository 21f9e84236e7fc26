use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio::sync::broadcast;

use super::DomainEvent;

/// Default broadcast buffer. A subscriber that falls further behind than this
/// loses the oldest messages (surfaced as a lag error), which is the loss mode
/// consumers are required to tolerate.
const DEFAULT_CAPACITY: usize = 256;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    #[error("message bus is not connected")]
    Disconnected,
}

/// A subscription to the event stream. Each subscription receives a copy of
/// every event published while it exists; it never observes events from
/// before it was created.
pub struct Subscription {
    receiver: broadcast::Receiver<DomainEvent>,
}

impl Subscription {
    pub fn new(receiver: broadcast::Receiver<DomainEvent>) -> Self {
        Self { receiver }
    }

    /// Wait for the next event. `RecvError::Lagged` reports dropped messages
    /// for a slow subscriber; `RecvError::Closed` means the bus shut down and
    /// all buffered events have been drained.
    pub async fn recv(&mut self) -> Result<DomainEvent, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Receive without waiting, for callers that poll between other work.
    pub fn try_recv(&mut self) -> Result<DomainEvent, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }
}

/// Message bus handed completed events for asynchronous consumers.
///
/// Delivery is at-least-once from the publisher's point of view; subscribers
/// must treat duplicates and gaps as safe to re-process or discard. `publish`
/// is synchronous and must not block: transient unavailability is reported as
/// an error so the caller can apply its own retry policy.
pub trait EventBus: Send + Sync {
    fn publish(&self, event: DomainEvent) -> Result<(), BusError>;

    fn subscribe(&self) -> Subscription;
}

/// In-process broker backed by a broadcast channel.
///
/// The connect/disconnect lifecycle is owned by process startup and shutdown;
/// publishing while disconnected fails instead of silently buffering, which
/// stands in for a broker that is unreachable.
pub struct InMemoryBus {
    sender: broadcast::Sender<DomainEvent>,
    connected: AtomicBool,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            connected: AtomicBool::new(false),
        }
    }

    pub fn connect(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus for InMemoryBus {
    fn publish(&self, event: DomainEvent) -> Result<(), BusError> {
        if !self.is_connected() {
            return Err(BusError::Disconnected);
        }

        // A send with no live subscribers is not a failure; the bus accepted
        // the message and nobody was listening.
        let _ = self.sender.send(event);
        Ok(())
    }

    fn subscribe(&self) -> Subscription {
        Subscription::new(self.sender.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::AccountFunded;
    use chrono::Utc;
    use uuid::Uuid;

    fn funded_event(amount: i64) -> DomainEvent {
        DomainEvent::AccountFunded(AccountFunded {
            account_number: "1234567890".into(),
            user_id: Uuid::new_v4(),
            amount,
            balance: amount,
            timestamp: Utc::now(),
        })
    }

    #[test]
    fn test_publish_requires_connection() {
        let bus = InMemoryBus::new();
        assert_eq!(bus.publish(funded_event(100)), Err(BusError::Disconnected));

        bus.connect();
        assert!(bus.publish(funded_event(100)).is_ok());

        bus.disconnect();
        assert_eq!(bus.publish(funded_event(100)), Err(BusError::Disconnected));
    }

    #[tokio::test]
    async fn test_each_subscriber_sees_every_event() {
        let bus = InMemoryBus::new();
        bus.connect();

        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.publish(funded_event(100)).unwrap();
        bus.publish(funded_event(200)).unwrap();

        for sub in [&mut first, &mut second] {
            let DomainEvent::AccountFunded(event) = sub.recv().await.unwrap() else {
                panic!("expected AccountFunded");
            };
            assert_eq!(event.amount, 100);
            let DomainEvent::AccountFunded(event) = sub.recv().await.unwrap() else {
                panic!("expected AccountFunded");
            };
            assert_eq!(event.amount, 200);
        }
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags_instead_of_blocking_publishers() {
        let bus = InMemoryBus::with_capacity(2);
        bus.connect();

        let mut sub = bus.subscribe();
        for amount in 1..=4 {
            bus.publish(funded_event(amount)).unwrap();
        }

        // The two oldest events are gone; the subscriber is told how many.
        match sub.try_recv() {
            Err(tokio::sync::broadcast::error::TryRecvError::Lagged(missed)) => {
                assert_eq!(missed, 2)
            }
            other => panic!("expected lag, got {:?}", other.map(|e| e.topic())),
        }
    }
}
