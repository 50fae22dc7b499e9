// Working copy of one order and the rules applied to it
pub mod allocator;
pub mod missing_items;
pub mod picking;
pub mod session;

// Pure roll-ups over an order
pub mod aggregator;

// Cross-order batch consumption
pub mod batch_ledger;

// Orchestration: locking, persistence and events
pub mod keyed_lock;
pub mod picking_service;

pub use allocator::{derive_unassigned, SplitShare};
pub use batch_ledger::BatchUsageLedger;
pub use missing_items::MissingItemLedger;
pub use picking::{derive_order_status, BoxSaveOutcome};
pub use picking_service::{CompletedOrderReport, PickingService};
pub use session::PickingSession;
