//! Order Picking Library
//!
//! Fulfillment core for a distribution business: the picking workflow state
//! machine, the box-distribution allocator, batch/weight aggregation and the
//! missing-item ledger.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod migrator;
pub mod models;
pub mod repositories;
pub mod services;

pub use errors::ServiceError;
pub use models::{
    BatchSummary, BatchUsage, BoxItem, BoxState, Grams, InventoryLine, MissingItem,
    MissingItemStatus, OrderSnapshot, OrderStatus, ShippingBox, UnassignedItem,
};
pub use services::{
    batch_ledger::BatchUsageLedger,
    picking_service::PickingService,
    session::PickingSession,
};
