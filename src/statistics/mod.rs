//! Aggregation of masked raster cells into region statistics
//!
//! # Organization
//!
//! - [`operations`]: the stable accumulator and the [`RegionStats`] record
//! - [`parallel`]: deterministic parallel reduction over a grid and a mask

pub mod operations;
pub mod parallel;

pub use operations::{RegionStats, StatField, StatsAccumulator};
pub use parallel::{aggregate_masked, parallel_masked_accumulate};
