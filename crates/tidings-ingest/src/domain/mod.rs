//! Domain layer: ingestion commands and the aggregation rules.

pub mod aggregation;
pub mod commands;
