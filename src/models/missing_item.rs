use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
pub enum MissingItemStatus {
    Pending,
    Processed,
}

/// A shortage found while picking. At most one per (order, product).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MissingItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub date: DateTime<Utc>,
    pub status: MissingItemStatus,
}

impl MissingItem {
    pub fn new(order_id: Uuid, product_id: Uuid, quantity: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            product_id,
            quantity,
            date: Utc::now(),
            status: MissingItemStatus::Pending,
        }
    }
}

/// Change published to the cross-order missing-items dashboard.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MissingItemDelta {
    Reported(MissingItem),
    Processed(MissingItem),
    Resolved {
        id: Uuid,
        order_id: Uuid,
        product_id: Uuid,
    },
}
