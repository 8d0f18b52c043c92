use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{info, warn};
use uuid::Uuid;

/// Domain events emitted by the checkout flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    PaymentIntentCreated {
        intent_id: String,
        product_id: Uuid,
        user_id: Uuid,
        amount_minor: i64,
    },
    OrderCompleted {
        order_id: Uuid,
        product_id: Uuid,
        payment_id: String,
        new_stock: i32,
    },
    ProductSoldOut(Uuid),
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::PaymentIntentCreated { .. } => "payment_intent_created",
            Event::OrderCompleted { .. } => "order_completed",
            Event::ProductSoldOut(_) => "product_sold_out",
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

    /// Queues an event without waiting; fails when the channel is full or closed.
    pub fn send(&self, event: Event) -> Result<(), String> {
        self.sender.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => "event channel is full".to_string(),
            TrySendError::Closed(_) => "event channel is closed".to_string(),
        })
    }

    /// Event delivery never fails or delays the request that produced the event.
    pub fn send_or_log(&self, event: Event) {
        let name = event.name();
        if let Err(e) = self.send(event) {
            counter!("storefront_events.dropped", 1, "event" => name);
            warn!(event = name, error = %e, "Dropping domain event");
        }
    }
}

/// Drains the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        counter!("storefront_events.processed", 1, "event" => event.name());

        match event {
            Event::PaymentIntentCreated {
                intent_id,
                product_id,
                user_id,
                amount_minor,
            } => {
                info!(%intent_id, %product_id, %user_id, amount_minor, "Payment intent created");
            }
            Event::OrderCompleted {
                order_id,
                product_id,
                payment_id,
                new_stock,
            } => {
                info!(%order_id, %product_id, %payment_id, new_stock, "Order completed");
            }
            Event::ProductSoldOut(product_id) => {
                warn!(%product_id, "Product sold out");
            }
        }
    }

    info!("Event processing loop stopped");
}
