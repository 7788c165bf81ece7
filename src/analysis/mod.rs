//! Library-level statistics over stored reports.

pub mod aggregator;

pub use aggregator::*;
