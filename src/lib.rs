//! Client library for the synthetic-transaction analysis backend: chart
//! aggregation, envelope fetching, cursor pagination, simulation progress
//! and dataset export.

pub mod catalog;
pub mod chart;
pub mod config;
pub mod envelope;
pub mod error;
pub mod export;
pub mod fetch;
pub mod filters;
pub mod generate;
pub mod kpi;
pub mod logging;
pub mod pagination;
pub mod progress;
pub mod query;
pub mod record;
pub mod render;
pub mod storage;
pub mod transport;
