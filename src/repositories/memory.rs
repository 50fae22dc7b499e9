//! DashMap-backed stores for tests and single-process deployments.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::{mapref::entry::Entry, DashMap};
use uuid::Uuid;

use super::{BatchUsageStore, OrderStore};
use crate::{
    errors::ServiceError,
    models::{BatchUsage, BatchUsageContribution, OrderSnapshot, ShippingBox},
};

#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    orders: DashMap<Uuid, OrderSnapshot>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an order as-is, e.g. when it arrives from order intake.
    pub fn insert(&self, order: OrderSnapshot) {
        self.orders.insert(order.order_id, order);
    }

    pub fn get(&self, order_id: Uuid) -> Option<OrderSnapshot> {
        self.orders.get(&order_id).map(|o| o.clone())
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn load_order(&self, order_id: Uuid) -> Result<OrderSnapshot, ServiceError> {
        self.get(order_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    async fn save_order(
        &self,
        order: &OrderSnapshot,
        expected_revision: i32,
    ) -> Result<i32, ServiceError> {
        match self.orders.entry(order.order_id) {
            Entry::Occupied(mut entry) => {
                if entry.get().revision != expected_revision {
                    return Err(ServiceError::ConcurrentModification(order.order_id));
                }
                let mut stored = order.clone();
                stored.revision = expected_revision + 1;
                stored.updated_at = Some(Utc::now());
                entry.insert(stored);
            }
            Entry::Vacant(entry) => {
                if expected_revision != 0 {
                    return Err(ServiceError::NotFound(format!(
                        "Order {} not found",
                        order.order_id
                    )));
                }
                let mut stored = order.clone();
                stored.revision = 1;
                stored.updated_at = Some(Utc::now());
                entry.insert(stored);
            }
        }
        Ok(expected_revision + 1)
    }

    async fn save_box(
        &self,
        order_id: Uuid,
        shipping_box: &ShippingBox,
        next_box_number: i32,
    ) -> Result<(), ServiceError> {
        let mut order = self
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        match order
            .boxes
            .iter_mut()
            .find(|b| b.box_number == shipping_box.box_number)
        {
            Some(existing) => *existing = shipping_box.clone(),
            None => {
                order.boxes.push(shipping_box.clone());
                order.boxes.sort_by_key(|b| b.box_number);
            }
        }
        order.next_box_number = order.next_box_number.max(next_box_number);
        Ok(())
    }
}

type UsageKey = (String, Uuid);
type ContributionKey = (Uuid, String, Uuid);

#[derive(Debug, Default)]
pub struct InMemoryBatchUsageStore {
    usages: DashMap<UsageKey, BatchUsage>,
    contributions: DashMap<ContributionKey, BatchUsageContribution>,
}

impl InMemoryBatchUsageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BatchUsageStore for InMemoryBatchUsageStore {
    async fn find_usage(
        &self,
        batch_number: &str,
        product_id: Uuid,
    ) -> Result<Option<BatchUsage>, ServiceError> {
        Ok(self
            .usages
            .get(&(batch_number.to_string(), product_id))
            .map(|u| u.clone()))
    }

    async fn find_contribution(
        &self,
        order_id: Uuid,
        batch_number: &str,
        product_id: Uuid,
    ) -> Result<Option<BatchUsageContribution>, ServiceError> {
        Ok(self
            .contributions
            .get(&(order_id, batch_number.to_string(), product_id))
            .map(|c| c.clone()))
    }

    async fn apply_usage(
        &self,
        usage: &BatchUsage,
        contribution: &BatchUsageContribution,
    ) -> Result<(), ServiceError> {
        self.usages.insert(
            (usage.batch_number.clone(), usage.product_id),
            usage.clone(),
        );
        self.contributions.insert(
            (
                contribution.order_id,
                contribution.batch_number.clone(),
                contribution.product_id,
            ),
            contribution.clone(),
        );
        Ok(())
    }

    async fn usages_for_batch(&self, batch_number: &str) -> Result<Vec<BatchUsage>, ServiceError> {
        let mut usages: Vec<BatchUsage> = self
            .usages
            .iter()
            .filter(|u| u.batch_number == batch_number)
            .map(|u| u.value().clone())
            .collect();
        usages.sort_by_key(|u| u.product_id);
        Ok(usages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InventoryLine;
    use assert_matches::assert_matches;

    fn order() -> OrderSnapshot {
        let order_id = Uuid::new_v4();
        OrderSnapshot::new(
            order_id,
            "SO-1",
            vec![InventoryLine::new(order_id, Uuid::new_v4(), "Feta", 1)],
        )
    }

    #[tokio::test]
    async fn save_bumps_revision_and_rejects_stale_writes() {
        let store = InMemoryOrderStore::new();
        let order = order();
        store.insert(order.clone());

        assert_eq!(store.save_order(&order, 0).await.unwrap(), 1);
        assert_matches!(
            store.save_order(&order, 0).await,
            Err(ServiceError::ConcurrentModification(id)) if id == order.order_id
        );
        assert_eq!(store.load_order(order.order_id).await.unwrap().revision, 1);
    }

    #[tokio::test]
    async fn save_box_replaces_existing_box() {
        let store = InMemoryOrderStore::new();
        let order = order();
        store.insert(order.clone());

        let mut b = ShippingBox::new(1);
        store.save_box(order.order_id, &b, 2).await.unwrap();
        b.saved = true;
        store.save_box(order.order_id, &b, 2).await.unwrap();

        let stored = store.load_order(order.order_id).await.unwrap();
        assert_eq!(stored.boxes.len(), 1);
        assert!(stored.boxes[0].saved);
        assert_eq!(stored.next_box_number, 2);
    }

    #[tokio::test]
    async fn missing_order_is_not_found() {
        let store = InMemoryOrderStore::new();
        assert_matches!(
            store.load_order(Uuid::new_v4()).await,
            Err(ServiceError::NotFound(_))
        );
    }
}
