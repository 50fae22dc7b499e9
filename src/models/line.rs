use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::Grams;

/// One product within one order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
pub struct InventoryLine {
    pub line_id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    #[validate(length(min = 1))]
    pub product_name: String,
    #[validate(range(min = 0))]
    pub ordered_quantity: i32,
    #[validate(range(min = 0))]
    pub picked_quantity: i32,
    /// Quantity before the first post-creation edit; flags changed lines to the picker.
    pub original_quantity: Option<i32>,
    pub checked: bool,
    pub batch_number: Option<String>,
    pub picked_weight: Option<Grams>,
    /// Weight typed in by the operator, preferred over the scale reading.
    pub manual_weight: Option<Grams>,
    /// Set when the whole line sits in a single box.
    pub box_number: Option<i32>,
    pub requires_weight_input: bool,
    /// Nominal weight of one unit.
    pub unit_weight: Option<Grams>,
}

impl InventoryLine {
    pub fn new(
        order_id: Uuid,
        product_id: Uuid,
        product_name: impl Into<String>,
        ordered_quantity: i32,
    ) -> Self {
        Self {
            line_id: Uuid::new_v4(),
            order_id,
            product_id,
            product_name: product_name.into(),
            ordered_quantity,
            picked_quantity: 0,
            original_quantity: None,
            checked: false,
            batch_number: None,
            picked_weight: None,
            manual_weight: None,
            box_number: None,
            requires_weight_input: false,
            unit_weight: None,
        }
    }

    pub fn weighed(mut self) -> Self {
        self.requires_weight_input = true;
        self
    }

    pub fn with_unit_weight(mut self, unit_weight: Grams) -> Self {
        self.unit_weight = Some(unit_weight);
        self
    }

    /// Whether the ordered quantity was edited after the order was placed.
    pub fn has_changed(&self) -> bool {
        self.original_quantity
            .map(|original| original != self.ordered_quantity)
            .unwrap_or(false)
    }

    /// Picked quantity once confirmed, ordered quantity before that.
    pub fn effective_quantity(&self) -> i32 {
        if self.checked {
            self.picked_quantity
        } else {
            self.ordered_quantity
        }
    }

    /// Units the picker could not supply.
    pub fn shortfall(&self) -> i32 {
        (self.ordered_quantity - self.picked_quantity).max(0)
    }

    /// Batch number, ignoring blank values.
    pub fn batch(&self) -> Option<&str> {
        non_blank(self.batch_number.as_deref())
    }

    /// Manual weight, then picked weight, then nominal weight; zero when none apply.
    pub fn resolved_weight(&self) -> Grams {
        Grams::positive(self.manual_weight)
            .or_else(|| Grams::positive(self.picked_weight))
            .or_else(|| {
                Grams::positive(self.unit_weight).map(|unit| unit.times(self.effective_quantity()))
            })
            .unwrap_or(Grams::ZERO)
    }
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line() -> InventoryLine {
        InventoryLine::new(Uuid::new_v4(), Uuid::new_v4(), "Smoked Ham", 4)
    }

    #[test]
    fn weight_resolution_prefers_manual_then_picked_then_nominal() {
        let mut l = line().with_unit_weight(Grams::new(500));
        assert_eq!(l.resolved_weight(), Grams::new(2_000));

        l.picked_weight = Some(Grams::new(2_100));
        assert_eq!(l.resolved_weight(), Grams::new(2_100));

        l.manual_weight = Some(Grams::new(1_950));
        assert_eq!(l.resolved_weight(), Grams::new(1_950));

        l.manual_weight = Some(Grams::ZERO);
        assert_eq!(l.resolved_weight(), Grams::new(2_100));
    }

    #[test]
    fn blank_batch_is_treated_as_missing() {
        let mut l = line();
        l.batch_number = Some("   ".into());
        assert_eq!(l.batch(), None);
        l.batch_number = Some(" B-12 ".into());
        assert_eq!(l.batch(), Some("B-12"));
    }

    #[test]
    fn change_flag_follows_original_quantity() {
        let mut l = line();
        assert!(!l.has_changed());
        l.original_quantity = Some(4);
        l.ordered_quantity = 6;
        assert!(l.has_changed());
    }
}
