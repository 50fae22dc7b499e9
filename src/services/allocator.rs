//! Splitting order lines across numbered shipping boxes.

use std::collections::HashMap;

use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::{
    errors::{BoxRejection, ServiceError},
    models::{InventoryLine, ShippingBox, UnassignedItem},
    services::session::PickingSession,
};

/// Per-product quantity that no box holds yet.
///
/// Lines whose products are fully packed are omitted. Over-packed products
/// never show a negative quantity.
pub fn derive_unassigned(lines: &[InventoryLine], boxes: &[ShippingBox]) -> Vec<UnassignedItem> {
    let mut packed: HashMap<Uuid, i32> = HashMap::new();
    for item in boxes.iter().flat_map(|b| b.items.iter()) {
        *packed.entry(item.product_id).or_default() += item.quantity;
    }
    lines
        .iter()
        .filter_map(|line| {
            let remaining =
                line.ordered_quantity - packed.get(&line.product_id).copied().unwrap_or(0);
            (remaining > 0).then(|| UnassignedItem {
                product_id: line.product_id,
                product_name: line.product_name.clone(),
                quantity: remaining,
            })
        })
        .collect()
}

/// Quantity allotted to one box by an automatic split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitShare {
    pub box_number: i32,
    pub quantity: i32,
}

impl PickingSession {
    pub fn unassigned_quantity(&self, product_id: Uuid) -> i32 {
        self.order
            .lines
            .iter()
            .filter(|l| l.product_id == product_id)
            .map(|l| l.ordered_quantity)
            .sum::<i32>()
            .saturating_sub(self.packed_quantity(product_id))
            .max(0)
    }

    /// Creates the next box. Numbers are never reused, even after removal.
    #[instrument(skip(self), fields(order_id = %self.order.order_id))]
    pub fn add_box(&mut self) -> Result<i32, ServiceError> {
        self.ensure_editable()?;
        let highest = self
            .order
            .boxes
            .iter()
            .map(|b| b.box_number)
            .max()
            .unwrap_or(0);
        let number = self.order.next_box_number.max(highest + 1);
        self.order.boxes.push(ShippingBox::new(number));
        self.order.next_box_number = number + 1;
        debug!(box_number = number, "Box added");
        Ok(number)
    }

    /// Deletes a box whose label has not been printed; its contents return to
    /// the unassigned pool.
    #[instrument(skip(self), fields(order_id = %self.order.order_id))]
    pub fn remove_box(&mut self, box_number: i32) -> Result<ShippingBox, ServiceError> {
        self.ensure_editable()?;
        let idx = self.box_index(box_number)?;
        if self.order.boxes[idx].completed {
            return Err(printed(box_number));
        }
        let removed = self.order.boxes.remove(idx);
        self.refresh_line_boxes();
        info!(box_number, items = removed.items.len(), "Box removed");
        Ok(removed)
    }

    /// Places `quantity` units of a product into a box.
    ///
    /// Fails when the quantity exceeds what is still unassigned.
    #[instrument(skip(self), fields(order_id = %self.order.order_id))]
    pub fn assign_whole(
        &mut self,
        product_id: Uuid,
        box_number: i32,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        self.ensure_editable()?;
        self.line_index_for_product(product_id)?;
        let idx = self.box_index(box_number)?;
        if self.order.boxes[idx].completed {
            return Err(printed(box_number));
        }
        let available = self.unassigned_quantity(product_id);
        if quantity < 1 || quantity > available {
            return Err(ServiceError::ValidationError(format!(
                "Quantity {} must be between 1 and the {} unassigned units",
                quantity, available
            )));
        }
        self.order.boxes[idx].add(product_id, quantity);
        self.refresh_line_boxes();
        debug!(%product_id, box_number, quantity, "Assigned to box");
        Ok(())
    }

    /// Operator-chosen split; same contract as [`Self::assign_whole`].
    pub fn manual_split(
        &mut self,
        product_id: Uuid,
        box_number: i32,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        self.assign_whole(product_id, box_number, quantity)
    }

    /// Distributes the whole unassigned quantity of a product over the first
    /// `box_count` open boxes, creating boxes as needed.
    ///
    /// Each box gets `q / n` units; the first `q % n` boxes get one more.
    /// Boxes whose share is zero are left untouched.
    #[instrument(skip(self), fields(order_id = %self.order.order_id))]
    pub fn auto_split(
        &mut self,
        product_id: Uuid,
        box_count: i32,
    ) -> Result<Vec<SplitShare>, ServiceError> {
        self.ensure_editable()?;
        self.line_index_for_product(product_id)?;
        if box_count < 1 {
            return Err(ServiceError::ValidationError(
                "Box count must be at least 1".to_string(),
            ));
        }
        if box_count > self.settings.max_split_boxes {
            return Err(ServiceError::ValidationError(format!(
                "Box count {} exceeds the limit of {}",
                box_count, self.settings.max_split_boxes
            )));
        }
        let total = self.unassigned_quantity(product_id);
        if total == 0 {
            return Err(ServiceError::ValidationError(format!(
                "Product {} has nothing left to split",
                product_id
            )));
        }

        let open = |order: &crate::models::OrderSnapshot| {
            order.boxes.iter().filter(|b| !b.completed).count() as i32
        };
        while open(&self.order) < box_count {
            self.add_box()?;
        }
        let mut targets: Vec<i32> = self
            .order
            .boxes
            .iter()
            .filter(|b| !b.completed)
            .map(|b| b.box_number)
            .collect();
        targets.sort_unstable();
        targets.truncate(box_count as usize);

        let base = total / box_count;
        let remainder = total % box_count;
        let mut shares = Vec::with_capacity(targets.len());
        for (i, box_number) in targets.into_iter().enumerate() {
            let quantity = base + i32::from((i as i32) < remainder);
            if quantity == 0 {
                continue;
            }
            let idx = self.box_index(box_number)?;
            self.order.boxes[idx].add(product_id, quantity);
            shares.push(SplitShare {
                box_number,
                quantity,
            });
        }

        let left = self.unassigned_quantity(product_id);
        if left != 0 {
            return Err(ServiceError::InternalError(format!(
                "Automatic split left {} units of {} unassigned",
                left, product_id
            )));
        }
        self.refresh_line_boxes();
        info!(%product_id, total, box_count, "Automatic split applied");
        Ok(shares)
    }

    /// Takes units of a product back out of a box. `None` removes them all.
    #[instrument(skip(self), fields(order_id = %self.order.order_id))]
    pub fn remove_from_box(
        &mut self,
        box_number: i32,
        product_id: Uuid,
        quantity: Option<i32>,
    ) -> Result<i32, ServiceError> {
        self.ensure_editable()?;
        let idx = self.box_index(box_number)?;
        let shipping_box = &mut self.order.boxes[idx];
        if shipping_box.completed {
            return Err(printed(box_number));
        }
        let pos = shipping_box
            .items
            .iter()
            .position(|i| i.product_id == product_id)
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Product {} is not in box {}",
                    product_id, box_number
                ))
            })?;
        let held = shipping_box.items[pos].quantity;
        let take = quantity.unwrap_or(held);
        if take < 1 || take > held {
            return Err(ServiceError::ValidationError(format!(
                "Quantity {} must be between 1 and the {} units in box {}",
                take, held, box_number
            )));
        }
        if take == held {
            shipping_box.items.remove(pos);
        } else {
            let item = &mut shipping_box.items[pos];
            let weight = item.weight;
            item.weight = weight.share(held - take, held);
            item.quantity = held - take;
        }
        shipping_box.saved = false;
        self.refresh_line_boxes();
        Ok(take)
    }

    pub(super) fn box_index(&self, box_number: i32) -> Result<usize, ServiceError> {
        self.order
            .boxes
            .iter()
            .position(|b| b.box_number == box_number)
            .ok_or_else(|| ServiceError::NotFound(format!("Box {} not found", box_number)))
    }
}

fn printed(box_number: i32) -> ServiceError {
    ServiceError::BoxNotReady {
        box_number,
        reasons: vec![BoxRejection::AlreadyPrinted],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::PickingConfig, models::OrderSnapshot};
    use assert_matches::assert_matches;

    fn session(qty: i32) -> (PickingSession, Uuid) {
        let order_id = Uuid::new_v4();
        let line = InventoryLine::new(order_id, Uuid::new_v4(), "Emmental", qty);
        let product = line.product_id;
        (
            PickingSession::new(
                OrderSnapshot::new(order_id, "SO-42", vec![line]),
                PickingConfig::default(),
            ),
            product,
        )
    }

    fn quantities(s: &PickingSession, product: Uuid) -> Vec<(i32, i32)> {
        s.boxes()
            .iter()
            .map(|b| (b.box_number, b.quantity_of(product)))
            .collect()
    }

    #[test]
    fn auto_split_gives_remainder_to_lowest_boxes() {
        let (mut s, product) = session(10);
        let shares = s.auto_split(product, 3).unwrap();
        assert_eq!(quantities(&s, product), vec![(1, 4), (2, 3), (3, 3)]);
        assert_eq!(shares.len(), 3);
        assert!(s.unassigned().is_empty());
    }

    #[test]
    fn auto_split_with_more_boxes_than_units_skips_zero_shares() {
        let (mut s, product) = session(2);
        s.auto_split(product, 5).unwrap();
        let q = quantities(&s, product);
        assert_eq!(q.len(), 5);
        assert_eq!(q[0], (1, 1));
        assert_eq!(q[1], (2, 1));
        assert!(q[2..].iter().all(|(_, qty)| *qty == 0));
        assert!(s.boxes()[2].is_empty());
    }

    #[test]
    fn auto_split_box_count_is_capped() {
        let (mut s, product) = session(4);
        s.settings.max_split_boxes = 3;
        assert_matches!(
            s.auto_split(product, i32::MAX),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            s.auto_split(product, 4),
            Err(ServiceError::ValidationError(_))
        );
        assert!(s.boxes().is_empty());
        assert_eq!(s.unassigned_quantity(product), 4);

        s.auto_split(product, 3).unwrap();
        assert_eq!(quantities(&s, product), vec![(1, 2), (2, 1), (3, 1)]);
    }

    #[test]
    fn auto_split_reuses_existing_boxes() {
        let (mut s, product) = session(6);
        s.add_box().unwrap();
        s.add_box().unwrap();
        s.auto_split(product, 2).unwrap();
        assert_eq!(quantities(&s, product), vec![(1, 3), (2, 3)]);
    }

    #[test]
    fn manual_split_cannot_exceed_unassigned() {
        let (mut s, product) = session(5);
        let b = s.add_box().unwrap();
        s.manual_split(product, b, 4).unwrap();
        assert_matches!(
            s.manual_split(product, b, 2),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            s.manual_split(product, b, 0),
            Err(ServiceError::ValidationError(_))
        );
        assert_eq!(s.unassigned_quantity(product), 1);
    }

    #[test]
    fn removed_box_returns_items_and_number_is_not_reused() {
        let (mut s, product) = session(4);
        let first = s.add_box().unwrap();
        let second = s.add_box().unwrap();
        s.assign_whole(product, second, 4).unwrap();
        s.remove_box(second).unwrap();
        assert_eq!(s.unassigned_quantity(product), 4);

        let third = s.add_box().unwrap();
        assert_eq!((first, second, third), (1, 2, 3));
    }

    #[test]
    fn printed_box_cannot_be_removed_or_filled() {
        let (mut s, product) = session(4);
        let b = s.add_box().unwrap();
        s.order.boxes[0].completed = true;
        assert_matches!(s.remove_box(b), Err(ServiceError::BoxNotReady { .. }));
        assert_matches!(
            s.assign_whole(product, b, 1),
            Err(ServiceError::BoxNotReady { .. })
        );
    }

    #[test]
    fn single_box_allocation_sets_line_box_number() {
        let (mut s, product) = session(3);
        let b = s.add_box().unwrap();
        s.assign_whole(product, b, 2).unwrap();
        assert_eq!(s.lines()[0].box_number, None);
        s.assign_whole(product, b, 1).unwrap();
        assert_eq!(s.lines()[0].box_number, Some(b));

        s.remove_from_box(b, product, Some(1)).unwrap();
        assert_eq!(s.lines()[0].box_number, None);
        assert_eq!(s.unassigned_quantity(product), 1);
    }

    #[test]
    fn derive_unassigned_never_goes_negative() {
        let order_id = Uuid::new_v4();
        let line = InventoryLine::new(order_id, Uuid::new_v4(), "Brie", 2);
        let mut b = ShippingBox::new(1);
        b.add(line.product_id, 3);
        assert!(derive_unassigned(&[line], &[b]).is_empty());
    }
}
