//! # Maestro Analytics Engine
//!
//! This crate turns reshaped backtests into performance statistics. It is the
//! batch stage of the pipeline: portfolio frames go in, one metric map per
//! strategy comes out.
//!
//! ## Architectural Principles
//!
//! - **Pure Logic:** No I/O. It depends only on `core-types` for its inputs and
//!   on `configuration` for the metric settings.
//! - **Best Effort:** A failing metric is recorded as `null` and a failing
//!   strategy is left out, so one bad series never sinks a batch.
//! - **Static Catalog:** The available metrics are a declared table, filtered
//!   once by the configured denylist.
//!
//! ## Public API
//!
//! - `MetricsEngine`: runs the catalog over full and out-of-sample windows.
//! - `MetricCatalog`: the metrics a batch computes.
//! - `MetricResult` / `MetricsTable`: per-strategy results and their tabulation.
//! - `AnalyticsError`: the specific error types that can be returned from this crate.

pub mod catalog;
pub mod engine;
pub mod error;
pub mod report;
pub mod series;
pub mod stats;

pub use catalog::{MetricArity, MetricCatalog, MetricDefinition};
pub use engine::MetricsEngine;
pub use error::AnalyticsError;
pub use report::{BatchSummary, MetricResult, MetricValue, MetricsRow, MetricsTable, merge_results};
pub use series::{ValueSeries, portfolio_values};
pub use stats::MetricParams;
