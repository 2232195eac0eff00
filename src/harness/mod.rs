//! Accuracy/latency evaluation of the semantic cache.
//!
//! - [`dataset`]: labelled question sets from CSV
//! - [`sweep`]: the embedder × threshold matrix, two passes per point
//! - [`report`]: per-configuration results, JSON and console output

pub mod dataset;
pub mod report;
pub mod sweep;

pub use dataset::{Dataset, Row};
pub use report::{ConfigurationReport, ConfigurationStatus, Mode, RowOutcome, SweepReport};
pub use sweep::{
    CancelToken, DEFAULT_SWEEP_SYSTEM_PROMPT, DEFAULT_TASK, Sweep, SweepConfig, SweepPoint,
    matches_label,
};
