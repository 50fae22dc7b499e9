use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    models::{InventoryLine, MissingItem, MissingItemDelta, MissingItemStatus},
};

/// Shortage records of one order, borrowed from a [`super::PickingSession`].
///
/// Every change is also appended to the session's delta list so the service
/// can publish it once the order has been persisted.
pub struct MissingItemLedger<'a> {
    order_id: Uuid,
    lines: &'a [InventoryLine],
    items: &'a mut Vec<MissingItem>,
    deltas: &'a mut Vec<MissingItemDelta>,
}

impl<'a> MissingItemLedger<'a> {
    pub(crate) fn new(
        order_id: Uuid,
        lines: &'a [InventoryLine],
        items: &'a mut Vec<MissingItem>,
        deltas: &'a mut Vec<MissingItemDelta>,
    ) -> Self {
        Self {
            order_id,
            lines,
            items,
            deltas,
        }
    }

    /// Records `quantity` units of `product_id` as missing.
    ///
    /// The quantity is capped at the ordered quantity. A quantity of zero
    /// removes the record; otherwise the existing record for the product is
    /// updated in place. Returns the record that now exists, if any.
    pub fn report(
        &mut self,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<Option<MissingItem>, ServiceError> {
        if quantity < 0 {
            return Err(ServiceError::ValidationError(
                "Missing quantity cannot be negative".to_string(),
            ));
        }
        let line = self
            .lines
            .iter()
            .find(|l| l.product_id == product_id)
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} is not part of this order", product_id))
            })?;
        let quantity = quantity.min(line.ordered_quantity);

        let existing = self.items.iter().position(|m| m.product_id == product_id);
        match (existing, quantity) {
            (None, 0) => Ok(None),
            (Some(idx), 0) => {
                let removed = self.items.remove(idx);
                debug!(product_id = %product_id, "Missing item cleared");
                self.deltas.push(MissingItemDelta::Resolved {
                    id: removed.id,
                    order_id: removed.order_id,
                    product_id,
                });
                Ok(None)
            }
            (Some(idx), quantity) => {
                let item = &mut self.items[idx];
                if item.quantity == quantity && item.status == MissingItemStatus::Pending {
                    return Ok(Some(item.clone()));
                }
                item.quantity = quantity;
                item.date = Utc::now();
                item.status = MissingItemStatus::Pending;
                let item = item.clone();
                self.deltas.push(MissingItemDelta::Reported(item.clone()));
                Ok(Some(item))
            }
            (None, quantity) => {
                let item = MissingItem::new(self.order_id, product_id, quantity);
                debug!(product_id = %product_id, quantity, "Missing item reported");
                self.items.push(item.clone());
                self.deltas.push(MissingItemDelta::Reported(item.clone()));
                Ok(Some(item))
            }
        }
    }

    /// Deletes a record, e.g. after the goods turned up.
    pub fn resolve(&mut self, item_id: Uuid) -> Result<MissingItem, ServiceError> {
        let idx = self.position(item_id)?;
        let removed = self.items.remove(idx);
        self.deltas.push(MissingItemDelta::Resolved {
            id: removed.id,
            order_id: removed.order_id,
            product_id: removed.product_id,
        });
        Ok(removed)
    }

    /// Marks a shortage as handled by purchasing.
    pub fn mark_processed(&mut self, item_id: Uuid) -> Result<MissingItem, ServiceError> {
        let idx = self.position(item_id)?;
        let item = &mut self.items[idx];
        if item.status != MissingItemStatus::Processed {
            item.status = MissingItemStatus::Processed;
            self.deltas.push(MissingItemDelta::Processed(item.clone()));
        }
        Ok(item.clone())
    }

    pub fn entries(&self) -> &[MissingItem] {
        self.items
    }

    pub fn for_product(&self, product_id: Uuid) -> Option<&MissingItem> {
        self.items.iter().find(|m| m.product_id == product_id)
    }

    pub fn total_missing(&self) -> i32 {
        total_missing(self.items)
    }

    fn position(&self, item_id: Uuid) -> Result<usize, ServiceError> {
        self.items
            .iter()
            .position(|m| m.id == item_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Missing item {} not found", item_id)))
    }
}

pub fn total_missing(items: &[MissingItem]) -> i32 {
    items.iter().map(|m| m.quantity).sum()
}

/// Every checked line with a shortfall must have a matching record.
pub fn validate_shortages(
    lines: &[InventoryLine],
    items: &[MissingItem],
) -> Result<(), ServiceError> {
    for line in lines.iter().filter(|l| l.checked) {
        let shortfall = line.shortfall();
        let recorded = items
            .iter()
            .find(|m| m.product_id == line.product_id)
            .map(|m| m.quantity)
            .unwrap_or(0);
        if shortfall > 0 && recorded != shortfall {
            return Err(ServiceError::ValidationError(format!(
                "{} is short by {} but {} are recorded as missing",
                line.product_name, shortfall, recorded
            )));
        }
    }
    Ok(())
}
