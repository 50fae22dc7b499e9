//! Box and order progress: what may be saved, printed, and what the order
//! status is.

use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::{
    errors::{BoxRejection, ServiceError},
    models::{
        BoxLabel, BoxLabelItem, BoxState, Grams, InventoryLine, MissingItem, OrderSnapshot,
        OrderStatus, ShippingBox,
    },
    services::{aggregator, missing_items, session::PickingSession},
};

/// Result of a box save request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxSaveOutcome {
    Saved,
    /// Nothing changed since the last save.
    Unchanged,
}

/// Order status from line confirmation and outstanding shortages.
pub fn derive_order_status(lines: &[InventoryLine], missing: &[MissingItem]) -> OrderStatus {
    let checked = lines.iter().filter(|l| l.checked).count();
    if lines.is_empty() || checked == 0 {
        OrderStatus::Picking
    } else if checked < lines.len() {
        OrderStatus::PartiallyPicked
    } else if missing.is_empty() {
        OrderStatus::Completed
    } else {
        OrderStatus::MissingItems
    }
}

/// Reasons a box is not yet complete. Empty when it is.
pub fn box_completeness(order: &OrderSnapshot, shipping_box: &ShippingBox) -> Vec<BoxRejection> {
    if shipping_box.is_empty() {
        return vec![BoxRejection::Empty];
    }
    let mut reasons = Vec::new();
    let mut push = |r: BoxRejection| {
        if !reasons.contains(&r) {
            reasons.push(r);
        }
    };
    for item in &shipping_box.items {
        let line = order.line_for_product(item.product_id);
        if !line.map(|l| l.checked).unwrap_or(false) {
            push(BoxRejection::UncheckedItems);
        }
        if shipping_box.effective_batch(item).is_none() {
            push(BoxRejection::MissingBatchNumbers);
        }
        if line.map(|l| l.requires_weight_input).unwrap_or(false) && !item.weight.is_positive() {
            push(BoxRejection::MissingWeights);
        }
    }
    reasons
}

/// The box that must be printed before `box_number` may be saved or printed.
///
/// Box 0 is exempt. For any other box the predecessor is the highest existing
/// box number below it; if that box has no printed label it blocks.
pub fn blocking_box(order: &OrderSnapshot, box_number: i32) -> Option<i32> {
    if box_number <= 0 {
        return None;
    }
    order
        .boxes
        .iter()
        .filter(|b| b.box_number > 0 && b.box_number < box_number)
        .max_by_key(|b| b.box_number)
        .filter(|b| !b.completed)
        .map(|b| b.box_number)
}

pub fn box_state(order: &OrderSnapshot, shipping_box: &ShippingBox) -> BoxState {
    if shipping_box.completed {
        BoxState::LabelPrinted
    } else if shipping_box.is_empty() {
        BoxState::Empty
    } else if shipping_box.saved {
        BoxState::Saved
    } else if box_completeness(order, shipping_box).is_empty() {
        BoxState::Complete
    } else {
        BoxState::InProgress
    }
}

impl PickingSession {
    /// Pending orders move to Picking the first time a session opens them.
    pub fn begin_picking(&mut self) -> bool {
        if self.order.status == OrderStatus::Pending {
            self.order.status = OrderStatus::Picking;
            self.order.picking_in_progress = true;
            return true;
        }
        false
    }

    pub fn derived_status(&self) -> OrderStatus {
        derive_order_status(&self.order.lines, &self.order.missing_items)
    }

    pub fn validate_shortages(&self) -> Result<(), ServiceError> {
        missing_items::validate_shortages(&self.order.lines, &self.order.missing_items)
    }

    pub fn box_state(&self, box_number: i32) -> Result<BoxState, ServiceError> {
        let idx = self.box_index(box_number)?;
        Ok(box_state(&self.order, &self.order.boxes[idx]))
    }

    fn lock_reason(&self, box_number: i32) -> Option<BoxRejection> {
        if !self.settings.enforce_box_sequence {
            return None;
        }
        blocking_box(&self.order, box_number).map(|waiting_on| BoxRejection::Locked { waiting_on })
    }

    /// Whether a box may be saved now.
    pub fn check_box_save(&self, box_number: i32) -> Result<BoxSaveOutcome, ServiceError> {
        let idx = self.box_index(box_number)?;
        let shipping_box = &self.order.boxes[idx];
        let incomplete = box_completeness(&self.order, shipping_box);
        if shipping_box.completed || (shipping_box.saved && incomplete.is_empty()) {
            return Ok(BoxSaveOutcome::Unchanged);
        }
        let mut reasons: Vec<BoxRejection> = self.lock_reason(box_number).into_iter().collect();
        reasons.extend(incomplete);
        if reasons.is_empty() {
            Ok(BoxSaveOutcome::Saved)
        } else {
            Err(ServiceError::BoxNotReady {
                box_number,
                reasons,
            })
        }
    }

    /// Whether a label may be printed for a box now.
    pub fn check_box_print(&self, box_number: i32) -> Result<(), ServiceError> {
        let idx = self.box_index(box_number)?;
        let shipping_box = &self.order.boxes[idx];
        if shipping_box.completed {
            return Err(ServiceError::BoxNotReady {
                box_number,
                reasons: vec![BoxRejection::AlreadyPrinted],
            });
        }
        let mut reasons: Vec<BoxRejection> = self.lock_reason(box_number).into_iter().collect();
        reasons.extend(box_completeness(&self.order, shipping_box));
        if !shipping_box.saved {
            reasons.push(BoxRejection::NotSaved);
        }
        if reasons.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::BoxNotReady {
                box_number,
                reasons,
            })
        }
    }

    pub(crate) fn commit_box_saved(&mut self, box_number: i32) {
        self.order.mark_box_saved(box_number);
        debug!(box_number, "Box saved");
    }

    pub(crate) fn commit_box_printed(&mut self, box_number: i32) {
        self.order.mark_box_printed(box_number);
        info!(box_number, "Box label printed");
    }

    /// Lowest box that still needs work and is not locked.
    pub fn next_focus_box(&self) -> Option<i32> {
        let mut open: Vec<&ShippingBox> =
            self.order.boxes.iter().filter(|b| !b.completed).collect();
        open.sort_by_key(|b| b.box_number);
        open.into_iter()
            .find(|b| self.lock_reason(b.box_number).is_none())
            .map(|b| b.box_number)
    }

    /// Label contents for a box, as they would be printed now.
    pub fn box_label(&self, box_number: i32) -> Result<BoxLabel, ServiceError> {
        let idx = self.box_index(box_number)?;
        let shipping_box = &self.order.boxes[idx];
        let unknown = self.settings.unknown_batch_label.as_str();
        let items: Vec<BoxLabelItem> = shipping_box
            .items
            .iter()
            .map(|item| BoxLabelItem {
                product_id: item.product_id,
                product_name: self
                    .order
                    .line_for_product(item.product_id)
                    .map(|l| l.product_name.clone())
                    .unwrap_or_default(),
                quantity: item.quantity,
                weight: aggregator::box_item_weight(&self.order, item),
                batch_number: shipping_box
                    .effective_batch(item)
                    .unwrap_or(unknown)
                    .to_string(),
            })
            .collect();
        let total_weight = items.iter().map(|i| i.weight).sum();
        Ok(BoxLabel {
            order_id: self.order.order_id,
            order_number: self.order.order_number.clone(),
            box_number,
            items,
            total_weight,
            next_box: None,
        })
    }

    /// Sets the default batch of a box.
    #[instrument(skip(self, batch_number), fields(order_id = %self.order.order_id))]
    pub fn set_box_batch(
        &mut self,
        box_number: i32,
        batch_number: Option<String>,
    ) -> Result<(), ServiceError> {
        let shipping_box = self.editable_box(box_number)?;
        shipping_box.batch_number = batch_number;
        shipping_box.saved = false;
        Ok(())
    }

    /// Sets the batch of one product inside a box.
    pub fn set_item_batch(
        &mut self,
        box_number: i32,
        product_id: Uuid,
        batch_number: Option<String>,
    ) -> Result<(), ServiceError> {
        let shipping_box = self.editable_box(box_number)?;
        let item = shipping_box.item_mut(product_id).ok_or_else(|| {
            ServiceError::NotFound(format!("Product {} is not in box {}", product_id, box_number))
        })?;
        item.batch_number = batch_number;
        shipping_box.saved = false;
        Ok(())
    }

    /// Records the scale weight of one product inside a box.
    pub fn set_item_weight(
        &mut self,
        box_number: i32,
        product_id: Uuid,
        weight: Grams,
    ) -> Result<(), ServiceError> {
        if weight.value() < 0 {
            return Err(ServiceError::ValidationError(
                "Weight cannot be negative".to_string(),
            ));
        }
        let shipping_box = self.editable_box(box_number)?;
        let item = shipping_box.item_mut(product_id).ok_or_else(|| {
            ServiceError::NotFound(format!("Product {} is not in box {}", product_id, box_number))
        })?;
        item.weight = weight;
        shipping_box.saved = false;
        Ok(())
    }

    /// A box whose batch and weight details may be edited: unprinted and not
    /// waiting on an unprinted predecessor.
    fn editable_box(&mut self, box_number: i32) -> Result<&mut ShippingBox, ServiceError> {
        self.ensure_editable()?;
        let idx = self.box_index(box_number)?;
        if self.order.boxes[idx].completed {
            return Err(ServiceError::BoxNotReady {
                box_number,
                reasons: vec![BoxRejection::AlreadyPrinted],
            });
        }
        if let Some(reason) = self.lock_reason(box_number) {
            return Err(ServiceError::BoxNotReady {
                box_number,
                reasons: vec![reason],
            });
        }
        Ok(&mut self.order.boxes[idx])
    }
}
