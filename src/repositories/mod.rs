use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    models::{BatchUsage, BatchUsageContribution, OrderSnapshot, ShippingBox},
};

pub mod memory;
pub mod order_repository;

pub use memory::{InMemoryBatchUsageStore, InMemoryOrderStore};
pub use order_repository::{BatchUsageRepository, OrderRepository};

/// Repository trait for common database operations
pub trait Repository {
    fn get_db(&self) -> &DatabaseConnection;
}

#[derive(Debug, Clone)]
pub struct BaseRepository {
    db: Arc<DatabaseConnection>,
}

impl BaseRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl Repository for BaseRepository {
    fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }
}

/// Durable storage for orders and everything hanging off them.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn load_order(&self, order_id: Uuid) -> Result<OrderSnapshot, ServiceError>;

    /// Writes the whole order atomically.
    ///
    /// Fails with [`ServiceError::ConcurrentModification`] when the stored
    /// revision differs from `expected_revision`. Returns the new revision.
    async fn save_order(
        &self,
        order: &OrderSnapshot,
        expected_revision: i32,
    ) -> Result<i32, ServiceError>;

    /// Writes a single box and its items without touching the rest of the order.
    async fn save_box(
        &self,
        order_id: Uuid,
        shipping_box: &ShippingBox,
        next_box_number: i32,
    ) -> Result<(), ServiceError>;
}

/// Durable storage for the cross-order batch ledger.
#[async_trait]
pub trait BatchUsageStore: Send + Sync {
    async fn find_usage(
        &self,
        batch_number: &str,
        product_id: Uuid,
    ) -> Result<Option<BatchUsage>, ServiceError>;

    async fn find_contribution(
        &self,
        order_id: Uuid,
        batch_number: &str,
        product_id: Uuid,
    ) -> Result<Option<BatchUsageContribution>, ServiceError>;

    /// Upserts the usage row and the order's contribution together.
    async fn apply_usage(
        &self,
        usage: &BatchUsage,
        contribution: &BatchUsageContribution,
    ) -> Result<(), ServiceError>;

    async fn usages_for_batch(&self, batch_number: &str) -> Result<Vec<BatchUsage>, ServiceError>;
}
