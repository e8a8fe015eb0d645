//! Aggregation of run records into summary tables.

pub mod aggregator;

pub use aggregator::*;
