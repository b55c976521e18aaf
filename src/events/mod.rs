use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::entities::stock_movement::MovementReason;

/// Domain events emitted after a database transaction commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    BusinessCreated(Uuid),
    ProductCreated(Uuid),
    ProductUpdated(Uuid),
    StockAdjusted {
        product_id: Uuid,
        location_id: Uuid,
        old_quantity: i32,
        new_quantity: i32,
        reason: MovementReason,
    },
    TransactionCompleted {
        transaction_id: Uuid,
        business_id: Uuid,
        total: Decimal,
    },
    TransactionVoided(Uuid),
    LowStockAlertRaised {
        alert_id: Uuid,
        product_id: Uuid,
        quantity: i32,
        reorder_level: i32,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::BusinessCreated(_) => "business_created",
            Event::ProductCreated(_) => "product_created",
            Event::ProductUpdated(_) => "product_updated",
            Event::StockAdjusted { .. } => "stock_adjusted",
            Event::TransactionCompleted { .. } => "transaction_completed",
            Event::TransactionVoided(_) => "transaction_voided",
            Event::LowStockAlertRaised { .. } => "low_stock_alert_raised",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends and logs a failure instead of returning it. Used once the change
    /// the event describes is already committed.
    pub async fn send_or_log(&self, event: Event) {
        let name = event.name();
        if let Err(e) = self.send(event).await {
            warn!(event = name, error = %e, "Dropping domain event");
        }
    }
}

/// Subscribers that react to committed domain events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: &Event) -> Result<(), String>;
}

/// Logs each event and fans it out to the registered handlers until the
/// channel closes.
pub async fn process_events(
    mut rx: mpsc::Receiver<Event>,
    handlers: Vec<Arc<dyn EventHandler>>,
) {
    info!("Starting event processing loop");
    while let Some(event) = rx.recv().await {
        metrics::counter!("retail_pos_events_total", 1, "event" => event.name());
        log_event(&event);

        for handler in &handlers {
            if let Err(e) = handler.handle_event(&event).await {
                error!(event = event.name(), error = %e, "Event handler failed");
            }
        }
    }
    info!("Event channel closed; processing loop finished");
}

fn log_event(event: &Event) {
    match event {
        Event::StockAdjusted {
            product_id,
            location_id,
            old_quantity,
            new_quantity,
            reason,
        } => {
            debug!(
                %product_id,
                %location_id,
                old_quantity,
                new_quantity,
                ?reason,
                "Stock adjusted"
            );
        }
        Event::TransactionCompleted {
            transaction_id,
            business_id,
            total,
        } => {
            info!(%transaction_id, %business_id, %total, "Sale completed");
        }
        Event::TransactionVoided(id) => info!(transaction_id = %id, "Sale voided"),
        Event::LowStockAlertRaised {
            alert_id,
            product_id,
            quantity,
            reorder_level,
        } => {
            warn!(
                %alert_id,
                %product_id,
                quantity,
                reorder_level,
                "Low stock alert raised"
            );
        }
        other => debug!(event = other.name(), "Received event: {:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Event>>,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle_event(&self, event: &Event) -> Result<(), String> {
            self.seen.lock().await.push(event.clone());
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl EventHandler for Failing {
        async fn handle_event(&self, _event: &Event) -> Result<(), String> {
            Err("boom".into())
        }
    }

    #[tokio::test]
    async fn events_reach_every_handler_in_order() {
        let (tx, rx) = mpsc::channel(8);
        let sender = EventSender::new(tx);
        let recorder = Arc::new(Recorder::default());
        let handlers: Vec<Arc<dyn EventHandler>> = vec![Arc::new(Failing), recorder.clone()];
        let worker = tokio::spawn(process_events(rx, handlers));

        let product_id = Uuid::new_v4();
        sender.send(Event::ProductCreated(product_id)).await.unwrap();
        sender
            .send(Event::TransactionVoided(Uuid::nil()))
            .await
            .unwrap();
        drop(sender);
        worker.await.unwrap();

        let seen = recorder.seen.lock().await;
        assert_eq!(
            *seen,
            vec![
                Event::ProductCreated(product_id),
                Event::TransactionVoided(Uuid::nil())
            ]
        );
    }

    #[tokio::test]
    async fn send_fails_once_receiver_is_gone() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        assert!(sender.send(Event::ProductUpdated(Uuid::nil())).await.is_err());
        // must not panic
        sender.send_or_log(Event::ProductUpdated(Uuid::nil())).await;
    }
}
