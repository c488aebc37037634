//! Carbon calculators and the land allocator that drives them.
//!
//! - [`carbon`]: the [`carbon::CarbonCalc`] trait and its implementations
//! - [`parameters`]: flow rules and initial densities of the box model
//! - [`allocator`]: a region's land tree and leaves
//! - [`report`]: per-period results and their aggregation by conceptual root
//! - [`config`]: loading a scenario from TOML

pub mod allocator;
pub mod carbon;
pub mod config;
pub mod parameters;
pub mod report;
