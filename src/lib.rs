//! Land carbon box-flow accounting.
//!
//! The accounting types live in [`landcarbon_core`], the calculators and the land
//! allocator in [`landcarbon_components`]. This crate runs whole scenarios.

pub mod runner;

pub use landcarbon_components::{allocator, carbon, config, parameters, report};
pub use landcarbon_core::{
    carbon_types, errors, interpolate, land_tree, land_use_history, settings, timeseries,
};
