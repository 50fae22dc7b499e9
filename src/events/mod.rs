use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{
    BatchSummary, BatchUsage, BoxLabel, MissingItemDelta, OrderStatus, ProductSummaryReport,
};

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a sender together with the receiving end of a bounded channel
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Notifications consumed by collaborators outside the picking core
/// (invoicing, export, reporting dashboards).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    OrderCompleted {
        order_id: Uuid,
        order_number: String,
        product_summaries: ProductSummaryReport,
        batch_summaries: Vec<BatchSummary>,
        completed_at: DateTime<Utc>,
    },
    BoxSaved {
        order_id: Uuid,
        box_number: i32,
    },
    BoxLabelPrinted(BoxLabel),
    BatchUsageUpdated(BatchUsage),
    MissingItemChanged(MissingItemDelta),
}

// Handlers implementing this trait process events asynchronously.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: Event) -> Result<(), String>;
}

/// Drains the channel, logging every event.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(%order_id, %old_status, %new_status, "Order status changed");
            }
            Event::OrderCompleted {
                order_id,
                batch_summaries,
                product_summaries,
                ..
            } => {
                info!(
                    %order_id,
                    products = product_summaries.rows.len(),
                    batches = batch_summaries.len(),
                    total_weight_kg = %product_summaries.total_weight.kilograms(),
                    "Order completed"
                );
            }
            Event::BoxSaved {
                order_id,
                box_number,
            } => {
                info!(%order_id, box_number, "Box saved");
            }
            Event::BoxLabelPrinted(label) => {
                info!(
                    order_id = %label.order_id,
                    box_number = label.box_number,
                    items = label.items.len(),
                    "Box label printed"
                );
            }
            Event::BatchUsageUpdated(usage) => {
                info!(
                    batch_number = %usage.batch_number,
                    product_id = %usage.product_id,
                    used_weight = %usage.used_weight,
                    orders_count = usage.orders_count,
                    "Batch usage updated"
                );
            }
            Event::MissingItemChanged(delta) => {
                info!(?delta, "Missing item changed");
            }
        }
    }

    warn!("Event processing loop has ended");
}

/// Forwards every event to a handler, logging handler failures.
pub async fn dispatch_events<H: EventHandler>(mut rx: mpsc::Receiver<Event>, handler: H) {
    while let Some(event) = rx.recv().await {
        if let Err(e) = handler.handle_event(event).await {
            warn!("Event handler failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default, Clone)]
    struct Recorder {
        seen: Arc<Mutex<Vec<Uuid>>>,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle_event(&self, event: Event) -> Result<(), String> {
            match event {
                Event::BoxSaved { order_id, .. } => {
                    self.seen.lock().unwrap().push(order_id);
                    Ok(())
                }
                _ => Err("unexpected event".to_string()),
            }
        }
    }

    #[tokio::test]
    async fn dispatch_forwards_until_senders_drop() {
        let (sender, rx) = EventSender::channel(8);
        let recorder = Recorder::default();
        let order_id = Uuid::new_v4();

        sender
            .send(Event::BoxSaved {
                order_id,
                box_number: 1,
            })
            .await
            .unwrap();
        sender
            .send(Event::OrderStatusChanged {
                order_id,
                old_status: OrderStatus::Pending,
                new_status: OrderStatus::Picking,
            })
            .await
            .unwrap();
        drop(sender);

        dispatch_events(rx, recorder.clone()).await;
        assert_eq!(*recorder.seen.lock().unwrap(), vec![order_id]);
    }

    #[tokio::test]
    async fn send_fails_once_receiver_is_gone() {
        let (sender, rx) = EventSender::channel(1);
        drop(rx);
        let result = sender
            .send(Event::BoxSaved {
                order_id: Uuid::new_v4(),
                box_number: 1,
            })
            .await;
        assert!(result.is_err());
    }
}
