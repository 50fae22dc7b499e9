use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{BatchSummary, InventoryLine, MissingItem, ShippingBox};

/// Order-level picking progress.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
pub enum OrderStatus {
    #[strum(serialize = "Pending")]
    Pending,
    #[strum(serialize = "Picking")]
    Picking,
    #[strum(serialize = "Partially Picked")]
    PartiallyPicked,
    #[strum(serialize = "Missing Items")]
    MissingItems,
    #[strum(serialize = "Completed")]
    Completed,
}

impl OrderStatus {
    /// Completed orders are handed to invoicing and never change here again.
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed)
    }
}

/// Quantity of a product not yet placed in any box. Derived, never stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnassignedItem {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
}

/// Everything a picking session needs about one order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub order_id: Uuid,
    pub order_number: String,
    pub status: OrderStatus,
    pub picking_in_progress: bool,
    pub is_picked: bool,
    /// Order-level batch used when lines carry none.
    pub batch_number: Option<String>,
    pub batch_numbers: Vec<String>,
    /// Cached on completion so later views do not recompute.
    pub batch_summary: Option<Vec<BatchSummary>>,
    pub lines: Vec<InventoryLine>,
    pub boxes: Vec<ShippingBox>,
    pub missing_items: Vec<MissingItem>,
    /// Monotonic box counter; numbers are never reused.
    pub next_box_number: i32,
    pub revision: i32,
    pub updated_at: Option<DateTime<Utc>>,
}

impl OrderSnapshot {
    pub fn new(order_id: Uuid, order_number: impl Into<String>, lines: Vec<InventoryLine>) -> Self {
        Self {
            order_id,
            order_number: order_number.into(),
            status: OrderStatus::Pending,
            picking_in_progress: false,
            is_picked: false,
            batch_number: None,
            batch_numbers: Vec::new(),
            batch_summary: None,
            lines,
            boxes: Vec::new(),
            missing_items: Vec::new(),
            next_box_number: 1,
            revision: 0,
            updated_at: None,
        }
    }

    pub fn line_for_product(&self, product_id: Uuid) -> Option<&InventoryLine> {
        self.lines.iter().find(|l| l.product_id == product_id)
    }

    pub fn shipping_box(&self, box_number: i32) -> Option<&ShippingBox> {
        self.boxes.iter().find(|b| b.box_number == box_number)
    }

    pub fn shipping_box_mut(&mut self, box_number: i32) -> Option<&mut ShippingBox> {
        self.boxes.iter_mut().find(|b| b.box_number == box_number)
    }

    /// Whether any box holds at least one item.
    pub fn has_box_data(&self) -> bool {
        self.boxes.iter().any(|b| !b.is_empty())
    }

    /// Box numbers whose progress was saved.
    pub fn saved_boxes(&self) -> Vec<i32> {
        self.boxes
            .iter()
            .filter(|b| b.saved)
            .map(|b| b.box_number)
            .collect()
    }

    /// Box numbers whose label was printed.
    pub fn completed_boxes(&self) -> Vec<i32> {
        self.boxes
            .iter()
            .filter(|b| b.completed)
            .map(|b| b.box_number)
            .collect()
    }

    pub fn mark_box_saved(&mut self, box_number: i32) {
        if let Some(b) = self.shipping_box_mut(box_number) {
            b.saved = true;
        }
    }

    pub fn mark_box_printed(&mut self, box_number: i32) {
        if let Some(b) = self.shipping_box_mut(box_number) {
            b.completed = true;
        }
    }

    /// Drops the saved flag of every unprinted box holding `product_id`.
    pub fn reopen_boxes_holding(&mut self, product_id: Uuid) {
        for b in self
            .boxes
            .iter_mut()
            .filter(|b| !b.completed && b.quantity_of(product_id) > 0)
        {
            b.saved = false;
        }
    }
}
