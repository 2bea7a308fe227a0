//! Event records and the bounded event log
//!
//! Two kinds of events leave the scheduler:
//! - `TransitionEvent`: one per job status change, consumed by metrics
//! - `LogEvent`: human-readable lines tagged with a worker slot or "system"
//!
//! Both are fanned out to subscribers as an `EngineEvent`.

use crate::state::{JobError, JobId, JobStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Immutable record of one job status change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub job_id: JobId,
    /// Worker slot that held the job, if it had been admitted
    pub slot: Option<usize>,
    pub from: JobStatus,
    pub to: JobStatus,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

/// Source of a log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerTag {
    System,
    Slot(usize),
}

impl fmt::Display for WorkerTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::Slot(slot) => write!(f, "worker-{:02}", slot),
        }
    }
}

/// Severity of a log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Error,
    Success,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Info => "info",
            Self::Error => "error",
            Self::Success => "success",
        };
        write!(f, "{}", s)
    }
}

/// A human-readable log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Monotonic sequence number, never reused even after eviction or flush
    pub seq: u64,
    pub tag: WorkerTag,
    pub severity: Severity,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {:>7}: {}",
            self.at.format("%H:%M:%S"),
            self.tag,
            self.severity,
            self.message
        )
    }
}

/// Anything a subscriber can receive from the scheduler
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Transition(TransitionEvent),
    Log(LogEvent),
}

/// Append-only bounded log; the oldest entries are evicted on overflow
#[derive(Debug)]
pub struct EventSink {
    capacity: usize,
    entries: VecDeque<LogEvent>,
    next_seq: u64,
    evicted: u64,
}

impl EventSink {
    /// Creates a sink that retains at most `capacity` entries (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
            next_seq: 0,
            evicted: 0,
        }
    }

    /// Appends an entry, evicting the oldest if the sink is full
    pub fn push(
        &mut self,
        tag: WorkerTag,
        severity: Severity,
        message: impl Into<String>,
        at: DateTime<Utc>,
    ) -> LogEvent {
        let event = LogEvent {
            seq: self.next_seq,
            tag,
            severity,
            message: message.into(),
            at,
        };
        self.next_seq += 1;

        if self.entries.len() == self.capacity {
            self.entries.pop_front();
            self.evicted += 1;
        }
        self.entries.push_back(event.clone());
        event
    }

    /// Returns the retained entries, oldest first
    pub fn entries(&self) -> Vec<LogEvent> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of entries dropped by overflow since creation
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Drops every retained entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
