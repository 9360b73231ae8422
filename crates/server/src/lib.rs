//! HTTP surface for the sitesweep search engine.

pub mod api;
pub mod metrics;
pub mod state;
