/// Job status definitions for tracking scrape progress
///
/// This module defines every status a job can be in and the legal edges between them.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the current status of a job in the scrape pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    // ===== Waiting =====
    /// Job is in the pending queue waiting for a worker slot
    Queued,

    // ===== Active States =====
    /// Job holds a slot and is retrieving its content
    Fetching,

    /// Content was retrieved and is being extracted
    Processing,

    // ===== Terminal States =====
    /// Extraction produced a result
    Succeeded,

    /// Fetch or extraction failed, or the job was cancelled
    Failed,
}

impl JobStatus {
    /// Returns true if this is a terminal status (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Returns true if the job currently occupies a worker slot
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Fetching | Self::Processing)
    }

    /// Returns true if this represents a successful completion
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Returns true if moving from `self` to `next` is a legal edge
    ///
    /// The machine is strictly linear: `Queued -> Fetching -> Processing ->
    /// Succeeded | Failed`, with `Fetching -> Failed` allowed because a fetch can
    /// fail before processing starts. Nothing leaves a terminal status.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Fetching)
                | (Self::Fetching, Self::Processing)
                | (Self::Fetching, Self::Failed)
                | (Self::Processing, Self::Succeeded)
                | (Self::Processing, Self::Failed)
        )
    }

    /// Returns the stable string form used in logs and snapshots
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Fetching => "fetching",
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// Parses a status from its string form
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "fetching" => Some(Self::Fetching),
            "processing" => Some(Self::Processing),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all possible statuses in lifecycle order
    pub fn all() -> [Self; 5] {
        [
            Self::Queued,
            Self::Fetching,
            Self::Processing,
            Self::Succeeded,
            Self::Failed,
        ]
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
