//! HTTP surface of the enrichment engine.

pub mod api;
pub mod metrics;
pub mod state;
