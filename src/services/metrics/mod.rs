//! Metrics Sink
//!
//! Token and query metric records stored beside the memory entries, with
//! windowed aggregates for dashboards.

mod service;

pub use service::*;
