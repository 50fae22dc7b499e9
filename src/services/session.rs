//! The in-memory working copy of one order.
//!
//! A `PickingSession` is owned by exactly one caller. The allocator, the state
//! machine and the missing-item ledger all operate on it through `&mut self`;
//! nothing is persisted until [`crate::PickingService`] saves it.

use tracing::{debug, instrument};
use uuid::Uuid;

use crate::{
    config::PickingConfig,
    errors::ServiceError,
    models::{
        Grams, InventoryLine, MissingItem, MissingItemDelta, OrderSnapshot, OrderStatus,
        ShippingBox, UnassignedItem,
    },
    services::{allocator::derive_unassigned, missing_items::MissingItemLedger},
};

#[derive(Debug, Clone)]
pub struct PickingSession {
    pub(super) order: OrderSnapshot,
    pub(super) settings: PickingConfig,
    pub(super) missing_deltas: Vec<MissingItemDelta>,
}

impl PickingSession {
    pub fn new(order: OrderSnapshot, settings: PickingConfig) -> Self {
        Self {
            order,
            settings,
            missing_deltas: Vec::new(),
        }
    }

    pub fn order(&self) -> &OrderSnapshot {
        &self.order
    }

    pub fn into_order(self) -> OrderSnapshot {
        self.order
    }

    pub fn order_id(&self) -> Uuid {
        self.order.order_id
    }

    pub fn status(&self) -> OrderStatus {
        self.order.status
    }

    /// Revision the working copy was loaded from.
    pub fn revision(&self) -> i32 {
        self.order.revision
    }

    pub fn settings(&self) -> &PickingConfig {
        &self.settings
    }

    pub fn lines(&self) -> &[InventoryLine] {
        &self.order.lines
    }

    pub fn boxes(&self) -> &[ShippingBox] {
        &self.order.boxes
    }

    pub fn missing_items(&self) -> &[MissingItem] {
        &self.order.missing_items
    }

    /// Quantities not yet placed in any box, recomputed on every call.
    pub fn unassigned(&self) -> Vec<UnassignedItem> {
        derive_unassigned(&self.order.lines, &self.order.boxes)
    }

    /// Completed orders are frozen.
    pub fn ensure_editable(&self) -> Result<(), ServiceError> {
        if self.order.status.is_terminal() {
            return Err(ServiceError::InvalidOperation(format!(
                "Order {} is completed and can no longer be changed",
                self.order.order_number
            )));
        }
        Ok(())
    }

    pub(super) fn line_index(&self, line_id: Uuid) -> Result<usize, ServiceError> {
        self.order
            .lines
            .iter()
            .position(|l| l.line_id == line_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Order line {} not found", line_id)))
    }

    pub(super) fn line_index_for_product(&self, product_id: Uuid) -> Result<usize, ServiceError> {
        self.order
            .lines
            .iter()
            .position(|l| l.product_id == product_id)
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Product {} is not part of order {}",
                    product_id, self.order.order_number
                ))
            })
    }

    /// Units of a product currently packed across all boxes.
    pub(super) fn packed_quantity(&self, product_id: Uuid) -> i32 {
        self.order
            .boxes
            .iter()
            .map(|b| b.quantity_of(product_id))
            .sum()
    }

    /// Edits the ordered quantity, remembering the original the first time.
    #[instrument(skip(self), fields(order_id = %self.order.order_id))]
    pub fn set_ordered_quantity(&mut self, line_id: Uuid, quantity: i32) -> Result<(), ServiceError> {
        self.ensure_editable()?;
        if quantity < 0 {
            return Err(ServiceError::ValidationError(
                "Ordered quantity cannot be negative".to_string(),
            ));
        }
        let idx = self.line_index(line_id)?;
        let product_id = self.order.lines[idx].product_id;
        let packed = self.packed_quantity(product_id);
        if quantity < packed {
            return Err(ServiceError::ValidationError(format!(
                "{} units are already packed in boxes; remove them before lowering the quantity to {}",
                packed, quantity
            )));
        }

        let line = &mut self.order.lines[idx];
        if line.ordered_quantity == quantity {
            return Ok(());
        }
        if line.original_quantity.is_none() {
            line.original_quantity = Some(line.ordered_quantity);
        }
        line.ordered_quantity = quantity;
        // A changed line has to be confirmed again
        line.checked = false;
        line.picked_quantity = line.picked_quantity.min(quantity);
        self.order.reopen_boxes_holding(product_id);

        let shortage = self
            .order
            .missing_items
            .iter()
            .find(|m| m.product_id == product_id)
            .map(|m| m.quantity);
        if let Some(shortage) = shortage {
            self.missing_ledger()?.report(product_id, shortage)?;
        }
        self.refresh_line_boxes();
        Ok(())
    }

    /// Confirms a line as picked.
    ///
    /// A picked quantity below the ordered quantity records the shortfall in
    /// the missing-item ledger; a full pick clears any earlier shortage.
    #[instrument(skip(self, batch_number), fields(order_id = %self.order.order_id))]
    pub fn check_line(
        &mut self,
        line_id: Uuid,
        picked_quantity: i32,
        batch_number: Option<String>,
        weight: Option<Grams>,
    ) -> Result<(), ServiceError> {
        self.ensure_editable()?;
        let idx = self.line_index(line_id)?;
        let line = &self.order.lines[idx];
        if picked_quantity < 0 || picked_quantity > line.ordered_quantity {
            return Err(ServiceError::ValidationError(format!(
                "Picked quantity {} must be between 0 and {}",
                picked_quantity, line.ordered_quantity
            )));
        }
        if weight.map(|w| w.value() < 0).unwrap_or(false) {
            return Err(ServiceError::ValidationError(
                "Weight cannot be negative".to_string(),
            ));
        }
        let weighed_in_boxes = self.packed_quantity(line.product_id) > 0;
        let has_weight = Grams::positive(weight)
            .or_else(|| Grams::positive(line.picked_weight))
            .is_some();
        if line.requires_weight_input && !weighed_in_boxes && picked_quantity > 0 && !has_weight {
            return Err(ServiceError::ValidationError(format!(
                "{} requires a recorded weight",
                line.product_name
            )));
        }

        let product_id = line.product_id;
        let shortfall = line.ordered_quantity - picked_quantity;

        let line = &mut self.order.lines[idx];
        line.picked_quantity = picked_quantity;
        line.checked = true;
        if let Some(batch) = batch_number {
            line.batch_number = Some(batch);
        }
        if weight.is_some() {
            line.picked_weight = weight;
        }

        self.missing_ledger()?.report(product_id, shortfall)?;
        debug!(%line_id, picked_quantity, shortfall, "Line checked");
        Ok(())
    }

    pub fn uncheck_line(&mut self, line_id: Uuid) -> Result<(), ServiceError> {
        self.ensure_editable()?;
        let idx = self.line_index(line_id)?;
        let line = &mut self.order.lines[idx];
        if !line.checked {
            return Ok(());
        }
        line.checked = false;
        let product_id = line.product_id;
        self.order.reopen_boxes_holding(product_id);
        Ok(())
    }

    pub fn set_manual_weight(&mut self, line_id: Uuid, weight: Option<Grams>) -> Result<(), ServiceError> {
        self.ensure_editable()?;
        if weight.map(|w| w.value() < 0).unwrap_or(false) {
            return Err(ServiceError::ValidationError(
                "Weight cannot be negative".to_string(),
            ));
        }
        let idx = self.line_index(line_id)?;
        self.order.lines[idx].manual_weight = weight;
        Ok(())
    }

    /// Shortage records for this order.
    ///
    /// Fails once the order is completed.
    pub fn missing_ledger(&mut self) -> Result<MissingItemLedger<'_>, ServiceError> {
        self.ensure_editable()?;
        Ok(MissingItemLedger::new(
            self.order.order_id,
            &self.order.lines,
            &mut self.order.missing_items,
            &mut self.missing_deltas,
        ))
    }

    /// Deltas recorded since the last successful save.
    pub fn pending_missing_deltas(&self) -> &[MissingItemDelta] {
        &self.missing_deltas
    }

    pub(crate) fn take_missing_deltas(&mut self) -> Vec<MissingItemDelta> {
        std::mem::take(&mut self.missing_deltas)
    }

    /// Installs the persisted copy after a successful save.
    pub(crate) fn replace_order(&mut self, order: OrderSnapshot) {
        self.order = order;
    }

    /// Keeps `line.box_number` in step with the allocation.
    pub(super) fn refresh_line_boxes(&mut self) {
        let boxes = &self.order.boxes;
        for line in &mut self.order.lines {
            let holding: Vec<i32> = boxes
                .iter()
                .filter(|b| b.quantity_of(line.product_id) > 0)
                .map(|b| b.box_number)
                .collect();
            let packed: i32 = boxes.iter().map(|b| b.quantity_of(line.product_id)).sum();
            line.box_number = match holding.as_slice() {
                [single] if packed == line.ordered_quantity => Some(*single),
                _ => None,
            };
        }
    }
}
