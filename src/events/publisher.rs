use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use super::{BusError, DomainEvent, EventBus};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Error, Debug)]
#[error("event delivery failed after {attempts} attempts: {source}")]
pub struct PublishError {
    pub attempts: u32,
    #[source]
    pub source: BusError,
}

/// Hands domain events to the message bus, retrying transient failures with
/// linear backoff up to a bounded attempt budget. Once the budget is spent the
/// failure is returned to the caller; an already-committed ledger write is
/// never unwound because its event could not be delivered.
pub struct EventPublisher {
    bus: Arc<dyn EventBus>,
    max_attempts: u32,
    base_backoff: Duration,
}

impl EventPublisher {
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self {
            bus,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_backoff: DEFAULT_BASE_BACKOFF,
        }
    }

    pub fn with_retry(mut self, max_attempts: u32, base_backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.base_backoff = base_backoff;
        self
    }

    pub async fn publish(&self, event: DomainEvent) -> Result<(), PublishError> {
        let topic = event.topic();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.bus.publish(event.clone()) {
                Ok(()) => {
                    tracing::debug!(topic, attempt, "event published");
                    return Ok(());
                }
                Err(source) if attempt >= self.max_attempts => {
                    return Err(PublishError { attempts: attempt, source });
                }
                Err(err) => {
                    tracing::warn!(topic, attempt, error = %err, "publish attempt failed, retrying");
                    tokio::time::sleep(self.base_backoff * attempt).await;
                }
            }
        }
    }
}
