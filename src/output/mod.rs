//! Output module for engine events, metrics and reports
//!
//! This module handles:
//! - Transition and log events, and the bounded event log
//! - Throughput and success-rate aggregation
//! - JSON snapshots of the job table
//! - Job statistics for the CLI

pub mod events;
pub mod metrics;
pub mod snapshot;
pub mod stats;

pub use events::{EngineEvent, EventSink, LogEvent, Severity, TransitionEvent, WorkerTag};
pub use metrics::{MetricsAggregator, MetricsSnapshot};
pub use snapshot::Snapshot;
pub use stats::{compute_statistics, print_statistics, JobStatistics};
