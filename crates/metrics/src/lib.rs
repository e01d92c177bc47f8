//! Metrics collection and export for courier.
//!
//! Metric names live in [`definitions`]; recording goes through the `metrics`
//! crate facade so that crates compiled without a recorder pay nothing.
//!
//! ```rust,ignore
//! use courier_metrics::{counter, ingest, labels};
//!
//! counter!(ingest::EVENTS_TOTAL, labels::PROVIDER => "slack", labels::STATUS => "accepted")
//!     .increment(1);
//! ```
//!
//! # Features
//!
//! - `prometheus`: install a Prometheus recorder and render the text format

mod definitions;
pub mod error;
mod recorder;

pub use {
    definitions::*,
    error::{Error, Result},
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};
