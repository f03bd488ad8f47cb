//! Two-stage shipment grouping.
//!
//! Items are first bundled by cross-section similarity under a weight cap,
//! then whole bundles are consolidated into batches by cumulative weight.

pub mod api;
pub mod config;
pub mod geometry;
pub mod model;
pub mod optimizer;
pub mod types;
