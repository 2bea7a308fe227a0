//! Statistics over a set of jobs
//!
//! Used by the CLI both at the end of a run and when inspecting an exported
//! snapshot with `--stats`.

use crate::output::metrics::success_rate;
use crate::state::{ErrorKind, Job, JobStatus};
use std::collections::HashMap;

/// Job statistics summary
#[derive(Debug, Clone, Default)]
pub struct JobStatistics {
    /// Total number of jobs
    pub total_jobs: u64,

    /// Count of jobs by status
    pub jobs_by_status: HashMap<JobStatus, u64>,

    /// Failed jobs by error kind
    pub error_summary: HashMap<ErrorKind, u64>,

    /// Jobs by extraction mode name
    pub jobs_by_mode: HashMap<&'static str, u64>,

    /// Jobs that were retries of earlier ones
    pub retries: u64,

    /// Total extracted fields across succeeded jobs
    pub total_fields: u64,

    /// Mean admission-to-completion time of finished jobs
    pub mean_duration_ms: Option<u64>,
}

impl JobStatistics {
    pub fn count(&self, status: JobStatus) -> u64 {
        self.jobs_by_status.get(&status).copied().unwrap_or(0)
    }

    /// Rounded percentage of finished jobs that succeeded
    pub fn success_rate(&self) -> u8 {
        success_rate(self.count(JobStatus::Succeeded), self.count(JobStatus::Failed))
    }
}

/// Computes statistics for the given jobs
pub fn compute_statistics<'a, I>(jobs: I) -> JobStatistics
where
    I: IntoIterator<Item = &'a Job>,
{
    let mut stats = JobStatistics::default();
    let mut durations = Vec::new();

    for job in jobs {
        stats.total_jobs += 1;
        *stats.jobs_by_status.entry(job.status).or_insert(0) += 1;
        *stats.jobs_by_mode.entry(job.mode.name()).or_insert(0) += 1;

        if job.retry_of.is_some() {
            stats.retries += 1;
        }
        if let Some(error) = &job.error {
            *stats.error_summary.entry(error.kind).or_insert(0) += 1;
        }
        if let Some(result) = &job.result {
            stats.total_fields += result.len() as u64;
        }
        if let Some(duration) = job.duration() {
            durations.push(duration.num_milliseconds().max(0) as u64);
        }
    }

    if !durations.is_empty() {
        stats.mean_duration_ms = Some(durations.iter().sum::<u64>() / durations.len() as u64);
    }

    stats
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &JobStatistics) {
    println!("=== Job Statistics ===\n");

    println!("Overview:");
    println!("  Total jobs: {}", stats.total_jobs);
    println!("  Retries: {}", stats.retries);
    println!("  Fields extracted: {}", stats.total_fields);
    if let Some(ms) = stats.mean_duration_ms {
        println!("  Mean job duration: {}ms", ms);
    }
    println!();

    println!("Jobs by Status:");
    for status in JobStatus::all() {
        let count = stats.count(status);
        if count == 0 {
            continue;
        }
        let percentage = if stats.total_jobs > 0 {
            (count as f64 / stats.total_jobs as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", status, count, percentage);
    }
    println!();

    if !stats.jobs_by_mode.is_empty() {
        println!("Jobs by Mode:");
        let mut modes: Vec<_> = stats.jobs_by_mode.iter().collect();
        modes.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        for (mode, count) in modes {
            println!("  {}: {}", mode, count);
        }
        println!();
    }

    if !stats.error_summary.is_empty() {
        println!("Error Summary:");
        let mut error_counts: Vec<_> = stats.error_summary.iter().collect();
        error_counts.sort_by(|a, b| b.1.cmp(a.1).then(a.0.as_str().cmp(b.0.as_str())));

        for (kind, count) in error_counts {
            println!("  {}: {}", kind, count);
        }
        println!();
    }

    println!(
        "Success Rate: {}% ({} / {} finished jobs succeeded)",
        stats.success_rate(),
        stats.count(JobStatus::Succeeded),
        stats.count(JobStatus::Succeeded) + stats.count(JobStatus::Failed)
    );
}
