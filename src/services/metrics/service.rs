//! Metrics Service
//!
//! Appends metric records through the store's write queue and aggregates the
//! most recent N records per kind.

use rusqlite::params;

use crate::models::metrics::{MetricStats, QueryMetric, TokenMetric};
use crate::services::memory::store::EntryStore;
use crate::utils::error::AppResult;

#[derive(Debug, Clone, Copy)]
enum MetricTable {
    Token,
    Query,
}

impl MetricTable {
    fn name(self) -> &'static str {
        match self {
            MetricTable::Token => "token_metrics",
            MetricTable::Query => "query_metrics",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsService {
    store: EntryStore,
}

impl MetricsService {
    pub fn new(store: EntryStore) -> Self {
        Self { store }
    }

    // ========================================================================
    // Recording
    // ========================================================================

    pub async fn record_token_metric(&self, metric: TokenMetric) -> AppResult<i64> {
        self.insert(
            MetricTable::Token,
            metric.timestamp,
            metric.operation,
            metric.magnitude,
            metric.result_count,
        )
        .await
    }

    pub async fn record_query_metric(&self, metric: QueryMetric) -> AppResult<i64> {
        self.insert(
            MetricTable::Query,
            metric.timestamp,
            metric.operation,
            metric.magnitude,
            metric.result_count,
        )
        .await
    }

    async fn insert(
        &self,
        table: MetricTable,
        timestamp: String,
        operation: String,
        magnitude: f64,
        result_count: i64,
    ) -> AppResult<i64> {
        self.store
            .run_write(move |db| {
                let conn = db.get_connection()?;
                let sql = format!(
                    "INSERT INTO {} (timestamp, operation, magnitude, result_count)
                     VALUES (?1, ?2, ?3, ?4)",
                    table.name()
                );
                conn.execute(&sql, params![timestamp, operation, magnitude, result_count])?;
                Ok(conn.last_insert_rowid())
            })
            .await
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    /// Aggregate over the last `window` token records.
    pub async fn token_stats(&self, window: usize) -> AppResult<MetricStats> {
        self.stats(MetricTable::Token, window).await
    }

    /// Aggregate over the last `window` query records.
    pub async fn query_stats(&self, window: usize) -> AppResult<MetricStats> {
        self.stats(MetricTable::Query, window).await
    }

    async fn stats(&self, table: MetricTable, window: usize) -> AppResult<MetricStats> {
        self.store
            .run_read(move |db| {
                let conn = db.get_connection()?;
                let sql = format!(
                    "SELECT COUNT(*), AVG(magnitude), MAX(magnitude), AVG(result_count)
                     FROM (SELECT magnitude, result_count FROM {} ORDER BY id DESC LIMIT ?1)",
                    table.name()
                );
                let stats = conn.query_row(&sql, params![window as i64], |row| {
                    let samples: i64 = row.get(0)?;
                    Ok(MetricStats {
                        samples: samples as usize,
                        avg_magnitude: row.get::<_, Option<f64>>(1)?.unwrap_or(0.0),
                        max_magnitude: row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
                        avg_result_count: row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
                    })
                })?;
                Ok(stats)
            })
            .await
    }
}
