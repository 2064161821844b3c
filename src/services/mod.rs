//! Services
//!
//! Business logic layered over storage.

pub mod embedding;
pub mod memory;
pub mod metrics;
