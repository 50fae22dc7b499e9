use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::line::non_blank;
use super::Grams;

/// Quantity of one product placed in one box.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoxItem {
    pub product_id: Uuid,
    pub quantity: i32,
    pub weight: Grams,
    /// Overrides the box-level default for this product.
    pub batch_number: Option<String>,
}

impl BoxItem {
    pub fn new(product_id: Uuid, quantity: i32) -> Self {
        Self {
            product_id,
            quantity,
            weight: Grams::ZERO,
            batch_number: None,
        }
    }
}

/// Progress of a single box, derived from its flags and contents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum BoxState {
    #[strum(serialize = "empty")]
    Empty,
    #[strum(serialize = "in-progress")]
    InProgress,
    #[strum(serialize = "complete")]
    Complete,
    #[strum(serialize = "saved")]
    Saved,
    #[strum(serialize = "label-printed")]
    LabelPrinted,
}

/// A numbered shipping container for one order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShippingBox {
    pub box_number: i32,
    pub items: Vec<BoxItem>,
    /// Label printed. Irreversible.
    pub completed: bool,
    /// Progress persisted since the last change.
    pub saved: bool,
    /// Default batch for items without their own.
    pub batch_number: Option<String>,
}

impl ShippingBox {
    pub fn new(box_number: i32) -> Self {
        Self {
            box_number,
            items: Vec::new(),
            completed: false,
            saved: false,
            batch_number: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item(&self, product_id: Uuid) -> Option<&BoxItem> {
        self.items.iter().find(|i| i.product_id == product_id)
    }

    pub fn item_mut(&mut self, product_id: Uuid) -> Option<&mut BoxItem> {
        self.items.iter_mut().find(|i| i.product_id == product_id)
    }

    pub fn quantity_of(&self, product_id: Uuid) -> i32 {
        self.items
            .iter()
            .filter(|i| i.product_id == product_id)
            .map(|i| i.quantity)
            .sum()
    }

    /// Adds units of a product, merging into an existing item.
    pub fn add(&mut self, product_id: Uuid, quantity: i32) {
        match self.item_mut(product_id) {
            Some(item) => item.quantity += quantity,
            None => self.items.push(BoxItem::new(product_id, quantity)),
        }
        self.saved = false;
    }

    /// Item batch, then the box default.
    pub fn effective_batch<'a>(&'a self, item: &'a BoxItem) -> Option<&'a str> {
        non_blank(item.batch_number.as_deref()).or_else(|| non_blank(self.batch_number.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_merges_quantities_and_clears_saved() {
        let product = Uuid::new_v4();
        let mut b = ShippingBox::new(1);
        b.saved = true;
        b.add(product, 3);
        b.add(product, 2);
        assert_eq!(b.items.len(), 1);
        assert_eq!(b.quantity_of(product), 5);
        assert!(!b.saved);
    }

    #[test]
    fn item_batch_overrides_box_default() {
        let product = Uuid::new_v4();
        let mut b = ShippingBox::new(1);
        b.batch_number = Some("BOX-1".into());
        b.add(product, 1);
        assert_eq!(b.effective_batch(&b.items[0]), Some("BOX-1"));
        b.items[0].batch_number = Some("ITEM-9".into());
        assert_eq!(b.effective_batch(&b.items[0]), Some("ITEM-9"));
    }
}
