use chrono::Utc;
use metrics::counter;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::PickingConfig,
    errors::ServiceError,
    events::{Event, EventSender},
    models::{
        BatchSummary, BatchUsage, BoxLabel, MissingItem, OrderSnapshot, OrderStatus,
        ProductSummaryReport,
    },
    repositories::OrderStore,
    services::{
        aggregator,
        batch_ledger::BatchUsageLedger,
        keyed_lock::{KeyedLockGuard, KeyedLocks},
        missing_items::total_missing,
        picking::{derive_order_status, BoxSaveOutcome},
        session::PickingSession,
    },
};

/// Everything invoicing and reporting need once an order is done.
#[derive(Debug, Clone, Serialize)]
pub struct CompletedOrderReport {
    pub order_id: Uuid,
    pub order_number: String,
    pub status: OrderStatus,
    pub product_summary: ProductSummaryReport,
    pub batch_summary: Vec<BatchSummary>,
    pub missing_items: Vec<MissingItem>,
    pub total_missing: i32,
}

/// Service coordinating picking sessions with storage, the batch ledger and
/// downstream notifications.
///
/// Operations on the same order are serialized; different orders proceed in
/// parallel.
pub struct PickingService {
    orders: Arc<dyn OrderStore>,
    ledger: Arc<BatchUsageLedger>,
    event_sender: Option<Arc<EventSender>>,
    settings: PickingConfig,
    order_locks: KeyedLocks<Uuid>,
}

impl PickingService {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        ledger: Arc<BatchUsageLedger>,
        settings: PickingConfig,
    ) -> Self {
        Self {
            orders,
            ledger,
            event_sender: None,
            settings,
            order_locks: KeyedLocks::new(),
        }
    }

    pub fn with_event_sender(mut self, event_sender: Arc<EventSender>) -> Self {
        self.event_sender = Some(event_sender);
        self
    }

    pub fn settings(&self) -> &PickingConfig {
        &self.settings
    }

    pub fn ledger(&self) -> &BatchUsageLedger {
        &self.ledger
    }

    async fn lock_order(&self, order_id: Uuid) -> KeyedLockGuard<'_, Uuid> {
        self.order_locks.lock(order_id).await
    }

    /// Orders with an operation in flight or queued.
    pub fn locked_orders(&self) -> usize {
        self.order_locks.len()
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!("Failed to send event: {}", e);
            }
        }
    }

    pub async fn load_order(&self, order_id: Uuid) -> Result<OrderSnapshot, ServiceError> {
        self.orders.load_order(order_id).await
    }

    /// Loads an order into a new working copy, moving it out of Pending.
    #[instrument(skip(self))]
    pub async fn open_session(&self, order_id: Uuid) -> Result<PickingSession, ServiceError> {
        let _guard = self.lock_order(order_id).await;
        let order = self.orders.load_order(order_id).await?;
        order.lines.iter().try_for_each(Validate::validate)?;
        let mut session = PickingSession::new(order, self.settings.clone());

        if session.begin_picking() {
            let mut staged = session.order().clone();
            staged.revision = self
                .orders
                .save_order(&staged, session.revision())
                .await?;
            session.replace_order(staged);
            self.emit(Event::OrderStatusChanged {
                order_id,
                old_status: OrderStatus::Pending,
                new_status: OrderStatus::Picking,
            })
            .await;
            info!(%order_id, "Picking started");
        }
        Ok(session)
    }

    /// Persists the working copy with a freshly derived status.
    ///
    /// On completion the batch summary is cached and every batch used is
    /// recorded in the ledger. Nothing in the session changes unless the write
    /// succeeds.
    #[instrument(skip(self, session), fields(order_id = %session.order_id()))]
    pub async fn save_order(&self, session: &mut PickingSession) -> Result<OrderStatus, ServiceError> {
        let order_id = session.order_id();
        let _guard = self.lock_order(order_id).await;
        session.ensure_editable()?;
        session.validate_shortages()?;

        let mut staged = session.order().clone();
        let old_status = staged.status;
        let new_status = derive_order_status(&staged.lines, &staged.missing_items);
        let completed = new_status == OrderStatus::Completed;
        staged.status = new_status;
        staged.is_picked = completed;
        staged.picking_in_progress = !completed;
        if completed {
            staged.batch_summary = Some(aggregator::compute_batch_summary(
                &staged,
                &self.settings.unknown_batch_label,
            ));
        }

        staged.revision = match self.orders.save_order(&staged, session.revision()).await {
            Ok(revision) => revision,
            Err(e) => {
                error!(%order_id, error = %e, "Failed to persist order");
                counter!("picking.orders.save_failed", 1);
                return Err(e);
            }
        };
        staged.updated_at = Some(Utc::now());
        session.replace_order(staged);
        counter!("picking.orders.saved", 1);

        for delta in session.take_missing_deltas() {
            self.emit(Event::MissingItemChanged(delta)).await;
        }
        if old_status != new_status {
            self.emit(Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            })
            .await;
        }

        if completed {
            let records = aggregator::order_usage_records(session.order());
            self.ledger.record_all(&records).await?;

            let order = session.order();
            self.emit(Event::OrderCompleted {
                order_id,
                order_number: order.order_number.clone(),
                product_summaries: aggregator::product_summary(order),
                batch_summaries: order.batch_summary.clone().unwrap_or_default(),
                completed_at: Utc::now(),
            })
            .await;
            counter!("picking.orders.completed", 1);
            info!(%order_id, batches = records.len(), "Order completed");
        }
        Ok(new_status)
    }

    /// Saves the progress of one box. Saving an unchanged box is a no-op.
    #[instrument(skip(self, session), fields(order_id = %session.order_id()))]
    pub async fn save_box(
        &self,
        session: &mut PickingSession,
        box_number: i32,
    ) -> Result<BoxSaveOutcome, ServiceError> {
        let order_id = session.order_id();
        let _guard = self.lock_order(order_id).await;
        session.ensure_editable()?;
        if session.check_box_save(box_number)? == BoxSaveOutcome::Unchanged {
            return Ok(BoxSaveOutcome::Unchanged);
        }

        let mut stored = session
            .order()
            .shipping_box(box_number)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("Box {} not found", box_number)))?;
        stored.saved = true;
        self.orders
            .save_box(order_id, &stored, session.order().next_box_number)
            .await?;
        session.commit_box_saved(box_number);
        counter!("picking.boxes.saved", 1);

        self.emit(Event::BoxSaved {
            order_id,
            box_number,
        })
        .await;
        Ok(BoxSaveOutcome::Saved)
    }

    /// Prints the label of a saved, complete box and folds its contents into
    /// the batch ledger.
    #[instrument(skip(self, session), fields(order_id = %session.order_id()))]
    pub async fn print_box_label(
        &self,
        session: &mut PickingSession,
        box_number: i32,
    ) -> Result<BoxLabel, ServiceError> {
        let order_id = session.order_id();
        let _guard = self.lock_order(order_id).await;
        session.ensure_editable()?;
        session.check_box_print(box_number)?;

        let mut label = session.box_label(box_number)?;
        let mut stored = session
            .order()
            .shipping_box(box_number)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("Box {} not found", box_number)))?;
        stored.completed = true;
        self.orders
            .save_box(order_id, &stored, session.order().next_box_number)
            .await?;
        session.commit_box_printed(box_number);
        label.next_box = session.next_focus_box();
        counter!("picking.labels.printed", 1);

        // Idempotent recording takes running totals; otherwise only this box is added
        let records = if self.settings.idempotent_batch_usage {
            aggregator::printed_box_usage_records(session.order(), box_number)
        } else {
            aggregator::usage_records(session.order(), |b| b.box_number == box_number)
        };
        self.ledger.record_all(&records).await?;

        self.emit(Event::BoxLabelPrinted(label.clone())).await;
        Ok(label)
    }

    /// Records every batch used by a stored order. Safe to repeat when
    /// idempotent recording is enabled.
    #[instrument(skip(self))]
    pub async fn record_batch_usage_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<BatchUsage>, ServiceError> {
        let _guard = self.lock_order(order_id).await;
        let order = self.orders.load_order(order_id).await?;
        let records = aggregator::order_usage_records(&order);
        self.ledger.record_all(&records).await
    }

    pub async fn completed_order_report(
        &self,
        order_id: Uuid,
    ) -> Result<CompletedOrderReport, ServiceError> {
        let order = self.orders.load_order(order_id).await?;
        Ok(CompletedOrderReport {
            order_id,
            order_number: order.order_number.clone(),
            status: order.status,
            product_summary: aggregator::product_summary(&order),
            batch_summary: aggregator::batch_summary(&order, &self.settings.unknown_batch_label),
            total_missing: total_missing(&order.missing_items),
            missing_items: order.missing_items,
        })
    }

    pub async fn missing_items_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<MissingItem>, ServiceError> {
        Ok(self.orders.load_order(order_id).await?.missing_items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{Grams, InventoryLine},
        repositories::{InMemoryBatchUsageStore, InMemoryOrderStore},
    };
    use assert_matches::assert_matches;

    struct Harness {
        store: Arc<InMemoryOrderStore>,
        service: PickingService,
        order_id: Uuid,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryOrderStore::new());
        let order_id = Uuid::new_v4();
        let line = InventoryLine::new(order_id, Uuid::new_v4(), "Parmesan", 3)
            .with_unit_weight(Grams::new(250));
        store.insert(OrderSnapshot::new(order_id, "SO-300", vec![line]));
        let ledger = Arc::new(BatchUsageLedger::new(
            Arc::new(InMemoryBatchUsageStore::new()),
            true,
        ));
        let service = PickingService::new(store.clone(), ledger, PickingConfig::default());
        Harness {
            store,
            service,
            order_id,
        }
    }

    #[tokio::test]
    async fn opening_a_pending_order_starts_picking() {
        let h = harness();
        let session = h.service.open_session(h.order_id).await.unwrap();
        assert_eq!(session.status(), OrderStatus::Picking);
        assert_eq!(session.revision(), 1);
        assert!(h.store.get(h.order_id).unwrap().picking_in_progress);
    }

    #[tokio::test]
    async fn completing_records_batch_usage_and_freezes_order() {
        let h = harness();
        let mut session = h.service.open_session(h.order_id).await.unwrap();
        let line = session.lines()[0].clone();
        session
            .check_line(line.line_id, 3, Some("P-1".into()), None)
            .unwrap();

        let status = h.service.save_order(&mut session).await.unwrap();
        assert_eq!(status, OrderStatus::Completed);
        assert!(session.order().is_picked);
        assert!(session.order().batch_summary.is_some());

        let usage = h
            .service
            .ledger()
            .usage("P-1", line.product_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(usage.used_weight, Grams::new(750));

        assert_matches!(
            h.service.save_order(&mut session).await,
            Err(ServiceError::InvalidOperation(_))
        );
    }

    #[tokio::test]
    async fn stale_session_is_rejected_without_changes() {
        let h = harness();
        let mut first = h.service.open_session(h.order_id).await.unwrap();
        let mut second = h.service.open_session(h.order_id).await.unwrap();
        let line_id = first.lines()[0].line_id;

        first.check_line(line_id, 2, None, None).unwrap();
        h.service.save_order(&mut first).await.unwrap();

        second.check_line(line_id, 3, None, None).unwrap();
        let before = second.order().clone();
        assert_matches!(
            h.service.save_order(&mut second).await,
            Err(ServiceError::ConcurrentModification(_))
        );
        assert_eq!(second.order(), &before);
    }

    #[tokio::test]
    async fn report_lists_missing_items() {
        let h = harness();
        let mut session = h.service.open_session(h.order_id).await.unwrap();
        let line_id = session.lines()[0].line_id;
        session.check_line(line_id, 1, None, None).unwrap();
        assert_eq!(
            h.service.save_order(&mut session).await.unwrap(),
            OrderStatus::MissingItems
        );

        let report = h.service.completed_order_report(h.order_id).await.unwrap();
        assert_eq!(report.total_missing, 2);
        assert_eq!(report.product_summary.total_quantity, 1);
    }
}
