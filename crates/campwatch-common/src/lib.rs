//! Shared data model for the campwatch alerting pipeline.
//!
//! Metric snapshots, rule and exclusion definitions, candidate alerts and the
//! persisted alert log all live here so that the alert engine, the storage
//! layer and the runner agree on one set of types.

pub mod types;
