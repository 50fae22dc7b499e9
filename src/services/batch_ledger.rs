use chrono::Utc;
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    events::{Event, EventSender},
    models::{BatchUsage, BatchUsageContribution, BatchUsageRecord},
    repositories::BatchUsageStore,
    services::keyed_lock::KeyedLocks,
};

/// Cross-order record of how much of each batch has been shipped.
///
/// Updates for the same (batch, product) are serialized with a keyed lock so
/// concurrent orders never lose an increment. With idempotent recording on,
/// each order contributes at most once per key: a repeat replaces the earlier
/// contribution instead of adding to it.
pub struct BatchUsageLedger {
    store: Arc<dyn BatchUsageStore>,
    locks: KeyedLocks<(String, Uuid)>,
    idempotent: bool,
    event_sender: Option<Arc<EventSender>>,
}

impl BatchUsageLedger {
    pub fn new(store: Arc<dyn BatchUsageStore>, idempotent: bool) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
            idempotent,
            event_sender: None,
        }
    }

    pub fn with_event_sender(mut self, event_sender: Arc<EventSender>) -> Self {
        self.event_sender = Some(event_sender);
        self
    }

    /// Applies one order's usage of a batch.
    #[instrument(skip(self, record), fields(batch_number = %record.batch_number, product_id = %record.product_id))]
    pub async fn record_batch_usage(
        &self,
        record: &BatchUsageRecord,
    ) -> Result<BatchUsage, ServiceError> {
        if record.batch_number.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Batch number is required".to_string(),
            ));
        }
        if record.weight.value() < 0 || record.quantity < 0 {
            return Err(ServiceError::ValidationError(
                "Batch usage cannot be negative".to_string(),
            ));
        }

        let _guard = self
            .locks
            .lock((record.batch_number.clone(), record.product_id))
            .await;

        let now = Utc::now();
        let existing = self
            .store
            .find_usage(&record.batch_number, record.product_id)
            .await?;
        let previous = if self.idempotent {
            self.store
                .find_contribution(record.order_id, &record.batch_number, record.product_id)
                .await?
        } else {
            None
        };

        let usage = match (existing, previous) {
            (Some(usage), Some(prev))
                if prev.weight == record.weight && prev.quantity == record.quantity =>
            {
                debug!("Contribution unchanged; ledger left as is");
                return Ok(usage);
            }
            (Some(mut usage), Some(prev)) => {
                usage.used_weight = usage.used_weight - prev.weight + record.weight;
                usage.last_used = now;
                usage
            }
            (Some(mut usage), None) => {
                usage.used_weight += record.weight;
                usage.orders_count += 1;
                usage.last_used = now;
                usage
            }
            (None, _) => BatchUsage {
                batch_number: record.batch_number.clone(),
                product_id: record.product_id,
                total_weight: record.nominal_weight,
                used_weight: record.weight,
                orders_count: 1,
                first_used: now,
                last_used: now,
            },
        };
        let contribution = BatchUsageContribution {
            order_id: record.order_id,
            batch_number: record.batch_number.clone(),
            product_id: record.product_id,
            quantity: record.quantity,
            weight: record.weight,
            recorded_at: now,
        };

        self.store.apply_usage(&usage, &contribution).await?;
        counter!("picking.batch_usage.updates", 1);
        info!(
            used_weight = %usage.used_weight,
            orders_count = usage.orders_count,
            "Batch usage recorded"
        );

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(Event::BatchUsageUpdated(usage.clone())).await {
                warn!("Failed to send batch usage event: {}", e);
            }
        }
        Ok(usage)
    }

    /// Applies several records in order, stopping at the first failure.
    pub async fn record_all(
        &self,
        records: &[BatchUsageRecord],
    ) -> Result<Vec<BatchUsage>, ServiceError> {
        let mut usages = Vec::with_capacity(records.len());
        for record in records {
            usages.push(self.record_batch_usage(record).await?);
        }
        Ok(usages)
    }

    pub async fn usage(
        &self,
        batch_number: &str,
        product_id: Uuid,
    ) -> Result<Option<BatchUsage>, ServiceError> {
        self.store.find_usage(batch_number, product_id).await
    }

    pub async fn usages_for_batch(&self, batch_number: &str) -> Result<Vec<BatchUsage>, ServiceError> {
        self.store.usages_for_batch(batch_number).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::Grams, repositories::InMemoryBatchUsageStore};
    use assert_matches::assert_matches;

    fn record(order_id: Uuid, product_id: Uuid, weight: i64) -> BatchUsageRecord {
        BatchUsageRecord {
            order_id,
            batch_number: "B-100".to_string(),
            product_id,
            quantity: 2,
            weight: Grams::new(weight),
            nominal_weight: Grams::new(1_000),
        }
    }

    fn ledger(idempotent: bool) -> BatchUsageLedger {
        BatchUsageLedger::new(Arc::new(InMemoryBatchUsageStore::new()), idempotent)
    }

    #[tokio::test]
    async fn separate_orders_accumulate() {
        let ledger = ledger(true);
        let product = Uuid::new_v4();
        ledger
            .record_batch_usage(&record(Uuid::new_v4(), product, 400))
            .await
            .unwrap();
        let usage = ledger
            .record_batch_usage(&record(Uuid::new_v4(), product, 600))
            .await
            .unwrap();

        assert_eq!(usage.used_weight, Grams::new(1_000));
        assert_eq!(usage.orders_count, 2);
        assert_eq!(usage.total_weight, Grams::new(1_000));
        assert!(usage.first_used <= usage.last_used);
    }

    #[tokio::test]
    async fn repeat_from_same_order_replaces_contribution() {
        let ledger = ledger(true);
        let (order, product) = (Uuid::new_v4(), Uuid::new_v4());
        ledger.record_batch_usage(&record(order, product, 400)).await.unwrap();
        ledger.record_batch_usage(&record(order, product, 400)).await.unwrap();
        let usage = ledger
            .record_batch_usage(&record(order, product, 450))
            .await
            .unwrap();

        assert_eq!(usage.used_weight, Grams::new(450));
        assert_eq!(usage.orders_count, 1);
    }

    #[tokio::test]
    async fn non_idempotent_mode_adds_every_call() {
        let ledger = ledger(false);
        let (order, product) = (Uuid::new_v4(), Uuid::new_v4());
        ledger.record_batch_usage(&record(order, product, 400)).await.unwrap();
        let usage = ledger
            .record_batch_usage(&record(order, product, 400))
            .await
            .unwrap();
        assert_eq!(usage.used_weight, Grams::new(800));
        assert_eq!(usage.orders_count, 2);
    }

    #[tokio::test]
    async fn concurrent_updates_are_not_lost() {
        let ledger = Arc::new(ledger(true));
        let product = Uuid::new_v4();
        let mut handles = Vec::new();
        for _ in 0..16 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger
                    .record_batch_usage(&record(Uuid::new_v4(), product, 100))
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        let usage = ledger.usage("B-100", product).await.unwrap().unwrap();
        assert_eq!(usage.used_weight, Grams::new(1_600));
        assert_eq!(usage.orders_count, 16);
        assert!(ledger.locks.is_empty());
    }

    #[tokio::test]
    async fn blank_batch_is_rejected() {
        let ledger = ledger(true);
        let mut r = record(Uuid::new_v4(), Uuid::new_v4(), 1);
        r.batch_number = " ".into();
        assert_matches!(
            ledger.record_batch_usage(&r).await,
            Err(ServiceError::ValidationError(_))
        );
    }
}
