// Picking workflow tables
pub mod missing_item;
pub mod order_batch_summary;
pub mod picking_order;
pub mod picking_order_line;
pub mod shipping_box;
pub mod shipping_box_item;

// Cross-order batch ledger
pub mod batch_usage;
pub mod batch_usage_contribution;
