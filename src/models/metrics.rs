//! Metrics Models
//!
//! Records written by the metrics sink and the aggregates read back from it.

use serde::{Deserialize, Serialize};

/// Token usage reported for one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenMetric {
    /// RFC 3339 time of the record
    pub timestamp: String,
    pub operation: String,
    /// Tokens used
    pub magnitude: f64,
    pub result_count: i64,
}

impl TokenMetric {
    pub fn new(operation: impl Into<String>, tokens: usize, result_count: usize) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            operation: operation.into(),
            magnitude: tokens as f64,
            result_count: result_count as i64,
        }
    }
}

/// Latency reported for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMetric {
    /// RFC 3339 time of the record
    pub timestamp: String,
    pub operation: String,
    /// Elapsed milliseconds
    pub magnitude: f64,
    pub result_count: i64,
}

impl QueryMetric {
    pub fn new(operation: impl Into<String>, elapsed_ms: f64, result_count: usize) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            operation: operation.into(),
            magnitude: elapsed_ms,
            result_count: result_count as i64,
        }
    }
}

/// Aggregate over the most recent records of one kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricStats {
    pub samples: usize,
    pub avg_magnitude: f64,
    pub max_magnitude: f64,
    pub avg_result_count: f64,
}
