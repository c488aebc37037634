//! Core types for land carbon box-flow accounting.
//!
//! - [`timeseries`]: model time, period series and annual series
//! - [`interpolate`]: evaluating either kind of series at a calendar year
//! - [`land_use_history`]: historical land use and the land area used for accounting
//! - [`carbon_types`]: carbon pool and flow classification
//! - [`land_tree`]: the land allocation tree and conceptual roots
//! - [`settings`]: settings shared by every carbon calculator

pub mod carbon_types;
pub mod errors;
pub mod interpolate;
pub mod land_tree;
pub mod land_use_history;
pub mod settings;
pub mod timeseries;
