use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Grams;

/// Cross-order consumption of one batch of one product.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchUsage {
    pub batch_number: String,
    pub product_id: Uuid,
    /// Nominal weight captured when the batch was first used.
    pub total_weight: Grams,
    /// Running sum of recorded weight across all orders.
    pub used_weight: Grams,
    pub orders_count: i32,
    pub first_used: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

/// What one order contributed to a [`BatchUsage`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchUsageContribution {
    pub order_id: Uuid,
    pub batch_number: String,
    pub product_id: Uuid,
    pub quantity: i32,
    pub weight: Grams,
    pub recorded_at: DateTime<Utc>,
}

/// Input for one ledger update.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchUsageRecord {
    pub order_id: Uuid,
    pub batch_number: String,
    pub product_id: Uuid,
    pub quantity: i32,
    pub weight: Grams,
    pub nominal_weight: Grams,
}

/// Total weight per batch for one order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch_number: String,
    pub total_weight: Grams,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub weight: Grams,
}

/// One row per product plus totals.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSummaryReport {
    pub rows: Vec<ProductSummary>,
    pub total_quantity: i32,
    pub total_weight: Grams,
}

/// Contents of a printed box label.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoxLabel {
    pub order_id: Uuid,
    pub order_number: String,
    pub box_number: i32,
    pub items: Vec<BoxLabelItem>,
    pub total_weight: Grams,
    /// Box the picker should work next.
    pub next_box: Option<i32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoxLabelItem {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub weight: Grams,
    pub batch_number: String,
}
