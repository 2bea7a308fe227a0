//! State module for jobs and their lifecycle
//!
//! # Components
//!
//! - `JobStatus`: The job state machine (queued, fetching, processing, succeeded, failed)
//! - `ExtractionMode`: What a job asks the extractor for
//! - `Job`: The unit of work, its result or error, and its timestamps

mod job;
mod job_state;
mod mode;

// Re-export main types
pub use job::{ErrorKind, ExtractedFields, Field, Job, JobError, JobId, Outcome};
pub use job_state::JobStatus;
pub use mode::ExtractionMode;
