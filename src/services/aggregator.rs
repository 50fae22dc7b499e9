//! Weight and batch roll-ups over one order.
//!
//! Everything here is a pure function of an [`OrderSnapshot`]; the batch
//! ledger and the completion report are fed from these results.

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::models::{
    line::non_blank, BatchSummary, BatchUsageRecord, BoxItem, Grams, OrderSnapshot,
    ProductSummary, ProductSummaryReport, ShippingBox,
};

/// Weight of one box item.
///
/// Uses the scale weight recorded on the item when there is one. Otherwise
/// the line's manual or picked weight is prorated by the item's share of the
/// line quantity, then the nominal unit weight, then zero.
pub fn box_item_weight(order: &OrderSnapshot, item: &BoxItem) -> Grams {
    if item.weight.is_positive() {
        return item.weight;
    }
    let line = match order.line_for_product(item.product_id) {
        Some(line) => line,
        None => return Grams::ZERO,
    };
    let line_quantity = line.effective_quantity();
    if let Some(weight) =
        Grams::positive(line.manual_weight).or_else(|| Grams::positive(line.picked_weight))
    {
        return if item.quantity >= line_quantity {
            weight
        } else {
            weight.share(item.quantity, line_quantity)
        };
    }
    Grams::positive(line.unit_weight)
        .map(|unit| unit.times(item.quantity))
        .unwrap_or(Grams::ZERO)
}

/// Batch to weight mapping for an order.
///
/// A summary cached at completion is returned unchanged.
pub fn batch_summary(order: &OrderSnapshot, unknown_label: &str) -> Vec<BatchSummary> {
    match &order.batch_summary {
        Some(cached) => cached.clone(),
        None => compute_batch_summary(order, unknown_label),
    }
}

/// Batch summary from live data, ignoring any cached copy.
///
/// Box contents take precedence when any box holds items. Without boxes the
/// lines are used, and an order with neither lists its batch numbers with no
/// weight. Entries are sorted by batch number.
pub fn compute_batch_summary(order: &OrderSnapshot, unknown_label: &str) -> Vec<BatchSummary> {
    let mut totals: BTreeMap<String, Grams> = BTreeMap::new();

    if order.has_box_data() {
        for shipping_box in &order.boxes {
            for item in &shipping_box.items {
                let batch = shipping_box.effective_batch(item).unwrap_or(unknown_label);
                *totals.entry(batch.to_string()).or_default() += item.weight;
            }
        }
    } else if !order.lines.is_empty() {
        let fallback = order_batch(order).unwrap_or(unknown_label);
        for line in &order.lines {
            let batch = line.batch().unwrap_or(fallback);
            *totals.entry(batch.to_string()).or_default() += line.resolved_weight();
        }
    } else {
        for batch in order.batch_numbers.iter().filter_map(|b| non_blank(Some(b.as_str()))) {
            totals.entry(batch.to_string()).or_default();
        }
    }

    totals
        .into_iter()
        .map(|(batch_number, total_weight)| BatchSummary {
            batch_number,
            total_weight,
        })
        .collect()
}

/// Order-level batch: the explicit batch number, then the first listed one.
fn order_batch(order: &OrderSnapshot) -> Option<&str> {
    non_blank(order.batch_number.as_deref()).or_else(|| {
        order
            .batch_numbers
            .iter()
            .find_map(|b| non_blank(Some(b.as_str())))
    })
}

/// Quantity and weight per product, with totals.
pub fn product_summary(order: &OrderSnapshot) -> ProductSummaryReport {
    let mut report = ProductSummaryReport::default();
    let mut index: BTreeMap<Uuid, usize> = BTreeMap::new();

    for line in &order.lines {
        let packed: Vec<&BoxItem> = order
            .boxes
            .iter()
            .flat_map(|b| b.items.iter())
            .filter(|i| i.product_id == line.product_id)
            .collect();
        let weight = if packed.is_empty() {
            line.resolved_weight()
        } else {
            packed.iter().map(|i| box_item_weight(order, i)).sum()
        };
        let quantity = line.effective_quantity();

        match index.get(&line.product_id) {
            Some(&row) => {
                // Duplicate lines for a product share the box weight already counted
                report.rows[row].quantity += quantity;
                if packed.is_empty() {
                    report.rows[row].weight += weight;
                }
            }
            None => {
                index.insert(line.product_id, report.rows.len());
                report.rows.push(ProductSummary {
                    product_id: line.product_id,
                    product_name: line.product_name.clone(),
                    quantity,
                    weight,
                });
            }
        }
    }

    report.total_quantity = report.rows.iter().map(|r| r.quantity).sum();
    report.total_weight = report.rows.iter().map(|r| r.weight).sum();
    report
}

/// Ledger records per (batch, product) over the boxes accepted by `include`.
///
/// Box items without any batch are skipped. Orders without box data fall
/// back to checked lines that carry a batch.
pub fn usage_records<F>(order: &OrderSnapshot, include: F) -> Vec<BatchUsageRecord>
where
    F: Fn(&ShippingBox) -> bool,
{
    let mut grouped: BTreeMap<(String, Uuid), (i32, Grams)> = BTreeMap::new();

    if order.has_box_data() {
        for shipping_box in order.boxes.iter().filter(|b| include(b)) {
            for item in &shipping_box.items {
                let batch = match shipping_box.effective_batch(item) {
                    Some(batch) => batch,
                    None => continue,
                };
                let entry = grouped
                    .entry((batch.to_string(), item.product_id))
                    .or_insert((0, Grams::ZERO));
                entry.0 += item.quantity;
                entry.1 += box_item_weight(order, item);
            }
        }
    } else {
        let fallback = order_batch(order);
        for line in order.lines.iter().filter(|l| l.checked) {
            let batch = match line.batch().or(fallback) {
                Some(batch) => batch,
                None => continue,
            };
            let entry = grouped
                .entry((batch.to_string(), line.product_id))
                .or_insert((0, Grams::ZERO));
            entry.0 += line.effective_quantity();
            entry.1 += line.resolved_weight();
        }
    }

    grouped
        .into_iter()
        .map(|((batch_number, product_id), (quantity, weight))| {
            let nominal_weight = order
                .line_for_product(product_id)
                .and_then(|l| Grams::positive(l.unit_weight))
                .map(|unit| unit.times(quantity))
                .unwrap_or(weight);
            BatchUsageRecord {
                order_id: order.order_id,
                batch_number,
                product_id,
                quantity,
                weight,
                nominal_weight,
            }
        })
        .collect()
}

/// Records for every box of the order.
pub fn order_usage_records(order: &OrderSnapshot) -> Vec<BatchUsageRecord> {
    usage_records(order, |_| true)
}

/// Cumulative records over all printed boxes, limited to the keys present in
/// `box_number`.
pub fn printed_box_usage_records(order: &OrderSnapshot, box_number: i32) -> Vec<BatchUsageRecord> {
    let keys: Vec<(String, Uuid)> = match order.shipping_box(box_number) {
        Some(b) => b
            .items
            .iter()
            .filter_map(|i| b.effective_batch(i).map(|batch| (batch.to_string(), i.product_id)))
            .collect(),
        None => return Vec::new(),
    };
    usage_records(order, |b| b.completed)
        .into_iter()
        .filter(|r| keys.contains(&(r.batch_number.clone(), r.product_id)))
        .collect()
}
