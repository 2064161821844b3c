//! Data Models
//!
//! Configuration and metric records shared across services.

pub mod metrics;
pub mod settings;

pub use metrics::*;
pub use settings::*;
