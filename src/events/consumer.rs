use tokio::sync::broadcast::error::RecvError;

use super::{DomainEvent, EventBus, Subscription};

/// Log-only notification worker.
///
/// Each message is an independently-actionable fact: the handler keeps no
/// state across events, so redelivery is harmless and lost messages (a lagged
/// subscription) only cost their own notifications. No ordering is assumed
/// between topics or against the ledger at consumption time.
pub struct NotificationConsumer {
    subscription: Subscription,
}

impl NotificationConsumer {
    pub fn new(subscription: Subscription) -> Self {
        Self { subscription }
    }

    pub fn attach(bus: &dyn EventBus) -> Self {
        Self::new(bus.subscribe())
    }

    /// Consume events until the bus closes, draining anything still buffered.
    pub async fn run(mut self) {
        loop {
            match self.subscription.recv().await {
                Ok(event) => self.handle(&event),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(target: "notification", missed, "consumer lagged behind the bus");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    fn handle(&self, event: &DomainEvent) {
        match event {
            DomainEvent::TransactionCompleted(e) => {
                tracing::info!(
                    target: "notification",
                    user = %e.user_id,
                    kind = %e.tx_type,
                    amount = e.amount,
                    "transaction completed"
                );
            }
            DomainEvent::TransactionFailed(e) => {
                tracing::info!(
                    target: "notification",
                    user = %e.user_id,
                    kind = %e.tx_type,
                    amount = e.amount,
                    reason = %e.reason,
                    "transaction failed"
                );
            }
            DomainEvent::AccountFunded(e) => {
                tracing::info!(
                    target: "notification",
                    account = %e.account_number,
                    user = %e.user_id,
                    amount = e.amount,
                    balance = e.balance,
                    "account funded"
                );
            }
        }
    }
}
