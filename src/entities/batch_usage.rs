use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Running consumption of one batch of one product across all orders.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "batch_usages")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub batch_number: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub product_id: Uuid,
    /// Grams
    pub total_weight: i64,
    /// Grams
    pub used_weight: i64,
    pub orders_count: i32,
    pub first_used: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
