//! The job record and its lifecycle

use crate::state::{ExtractionMode, JobStatus};
use crate::ScrapeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Opaque unique job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Generates a fresh random identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Classification of a per-job failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed URL or missing selector
    InvalidInput,
    /// The fetch or the job exceeded its deadline
    Timeout,
    /// Connection or transport failure, or an error status
    NetworkError,
    /// The content could not be parsed or nothing matched
    ExtractionFailed,
    /// Shutdown or explicit cancellation
    Cancelled,
}

impl ErrorKind {
    /// Returns true if re-submitting the same URL and mode may succeed
    ///
    /// Extraction failures need a different mode or selector, and cancellations
    /// are never retried automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::NetworkError)
    }

    /// Returns the stable string form used in logs and snapshots
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::Timeout => "timeout",
            Self::NetworkError => "network_error",
            Self::ExtractionFailed => "extraction_failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error detail recorded on a failed job
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
}

impl JobError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "job cancelled")
    }
}

/// A single extracted field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: String,
}

/// Ordered field name to value mapping produced by an extractor
///
/// Insertion order is significant and preserved through serialization. Names
/// are unique: inserting an existing name replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtractedFields(Vec<Field>);

impl ExtractedFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a field, keeping the original position if the name already exists
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|f| f.name == name) {
            Some(existing) => existing.value = value,
            None => self.0.push(Field { name, value }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|f| (f.name.as_str(), f.value.as_str()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|f| f.name.as_str()).collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ExtractedFields {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut fields = Self::new();
        for (name, value) in iter {
            fields.insert(name, value);
        }
        fields
    }
}

/// Terminal result of running a job
#[derive(Debug, Clone)]
pub enum Outcome {
    Succeeded(ExtractedFields),
    Failed(JobError),
}

/// The unit of work
///
/// Jobs are created `Queued` and owned by the scheduler; only the executor that
/// holds the job's slot drives it forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub url: String,
    pub mode: ExtractionMode,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ExtractedFields>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    pub submitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_of: Option<JobId>,
}

impl Job {
    /// Creates a fresh `Queued` job for an already-normalized URL
    pub fn new(url: impl Into<String>, mode: ExtractionMode, now: DateTime<Utc>) -> Self {
        Self {
            id: JobId::new(),
            url: url.into(),
            mode,
            status: JobStatus::Queued,
            result: None,
            error: None,
            submitted_at: now,
            started_at: None,
            completed_at: None,
            attempt: 1,
            retry_of: None,
        }
    }

    /// Creates a new job that re-runs this one's URL and mode
    ///
    /// The original is left untouched.
    pub fn retry(&self, now: DateTime<Utc>) -> Self {
        let mut job = Self::new(self.url.clone(), self.mode.clone(), now);
        job.attempt = self.attempt + 1;
        job.retry_of = Some(self.id);
        job
    }

    /// Moves the job to a non-terminal active status
    ///
    /// # Errors
    ///
    /// `ScrapeError::InvalidTransition` if the edge is not legal or `to` is terminal.
    pub fn advance(&mut self, to: JobStatus, now: DateTime<Utc>) -> Result<(), ScrapeError> {
        if to.is_terminal() || !self.status.can_transition_to(to) {
            return Err(ScrapeError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        if to == JobStatus::Fetching {
            self.started_at = Some(now);
        }
        self.status = to;
        Ok(())
    }

    /// Moves the job to its terminal status, recording exactly one of result or error
    ///
    /// # Errors
    ///
    /// `ScrapeError::InvalidTransition` if the job cannot finish from its current status.
    pub fn finish(&mut self, outcome: Outcome, now: DateTime<Utc>) -> Result<(), ScrapeError> {
        let to = match outcome {
            Outcome::Succeeded(_) => JobStatus::Succeeded,
            Outcome::Failed(_) => JobStatus::Failed,
        };
        if !self.status.can_transition_to(to) {
            return Err(ScrapeError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        match outcome {
            Outcome::Succeeded(fields) => self.result = Some(fields),
            Outcome::Failed(error) => self.error = Some(error),
        }
        self.status = to;
        self.completed_at = Some(now);
        Ok(())
    }

    /// Time spent between admission and completion, if both happened
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.completed_at? - self.started_at?)
    }
}
