// Domain types shared by the allocator, state machine and aggregator
pub mod batch;
pub mod line;
pub mod missing_item;
pub mod order;
pub mod shipping_box;
pub mod weight;

pub use batch::{
    BatchSummary, BatchUsage, BatchUsageContribution, BatchUsageRecord, BoxLabel, BoxLabelItem,
    ProductSummary, ProductSummaryReport,
};
pub use line::InventoryLine;
pub use missing_item::{MissingItem, MissingItemDelta, MissingItemStatus};
pub use order::{OrderSnapshot, OrderStatus, UnassignedItem};
pub use shipping_box::{BoxItem, BoxState, ShippingBox};
pub use weight::Grams;
