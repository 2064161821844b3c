//! Integration Tests Module
//!
//! End-to-end tests for the memory bank: entry persistence, schema
//! migration, embedding properties and budgeted context selection.

// Entry store round-trips, validation and revisions
mod store_test;

// Migration ledger, idempotence and failure reporting
mod migration_test;

// Quantization and similarity properties
mod embedding_test;

// Scoring, greedy selection and the composition root
mod selection_test;
