//! Executor lifecycle for a single admitted job
//!
//! Every admitted job runs in its own task:
//! 1. Honour cancellation before touching the network
//! 2. Fetch, bounded by the per-fetch timeout and raced against cancellation
//! 3. Honour cancellation again, then move to `Processing`
//! 4. Extract on the blocking pool
//!
//! A supervising task bounds the whole job by the per-job timeout and turns a
//! panicking executor into a failed job. A timed-out or cancelled job is
//! recorded as failed at once, but keeps its slot until the executor has
//! stopped: blocking extraction cannot be interrupted, and it still counts
//! against the concurrency cap while it runs.

use crate::crawler::scheduler::{Assignment, Inner};
use crate::output::events::{Severity, WorkerTag};
use crate::state::{ErrorKind, JobError, JobStatus, Outcome};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Runs one job to a terminal state and hands its slot back to the pool
pub(crate) async fn supervise(inner: Arc<Inner>, assignment: Assignment) {
    let Assignment { job_id, slot, .. } = assignment;
    let job_timeout = inner.config.pool.job_timeout();
    let span = tracing::info_span!("job", id = %job_id, slot, url = %assignment.url);

    // Cancelled by shutdown or by the job timeout
    let cancel = inner.cancel.child_token();
    let mut handle = tokio::spawn(
        execute(Arc::clone(&inner), assignment, cancel.clone()).instrument(span),
    );

    let deadline = tokio::time::sleep(job_timeout);
    tokio::pin!(deadline);

    let (outcome, stopped) = tokio::select! {
        biased;
        joined = &mut handle => {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(join_error) => {
                    tracing::error!(job = %job_id, slot, "executor failed: {}", join_error);
                    let kind = match inner.status_of(job_id) {
                        Some(JobStatus::Processing) => ErrorKind::ExtractionFailed,
                        _ => ErrorKind::NetworkError,
                    };
                    Outcome::Failed(JobError::new(kind, format!("executor failed: {}", join_error)))
                }
            };
            (outcome, true)
        }
        _ = cancel.cancelled() => (Outcome::Failed(JobError::cancelled()), false),
        _ = &mut deadline => {
            cancel.cancel();
            tracing::warn!(job = %job_id, slot, "job exceeded {}ms", job_timeout.as_millis());
            let outcome = Outcome::Failed(JobError::new(
                ErrorKind::Timeout,
                format!("job exceeded {}ms", job_timeout.as_millis()),
            ));
            (outcome, false)
        }
    };

    inner.record(job_id, slot, outcome);

    if !stopped {
        // The executor observes the token and returns once any blocking work ends
        if let Err(join_error) = handle.await {
            tracing::error!(job = %job_id, slot, "executor failed after stop: {}", join_error);
        }
    }

    inner.release(job_id, slot);
}

/// Drives fetch and extraction, returning the job's outcome
async fn execute(inner: Arc<Inner>, assignment: Assignment, cancel: CancellationToken) -> Outcome {
    let Assignment {
        job_id,
        slot,
        url,
        mode,
    } = assignment;
    let tag = WorkerTag::Slot(slot);

    if cancel.is_cancelled() {
        return Outcome::Failed(JobError::cancelled());
    }

    inner.log(tag, Severity::Info, format!("Establishing connection to {}", url));
    tracing::debug!("Fetching");

    let fetch_timeout = inner.config.pool.fetch_timeout();
    let page = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Outcome::Failed(JobError::cancelled()),
        result = tokio::time::timeout(fetch_timeout, inner.fetcher.fetch(&url)) => match result {
            Ok(Ok(page)) => page,
            Ok(Err(e)) => {
                tracing::debug!("Fetch failed: {}", e);
                return Outcome::Failed(e.into());
            }
            Err(_) => {
                return Outcome::Failed(JobError::new(
                    ErrorKind::Timeout,
                    format!("fetch of {} exceeded {}ms", url, fetch_timeout.as_millis()),
                ));
            }
        },
    };

    if cancel.is_cancelled() {
        return Outcome::Failed(JobError::cancelled());
    }

    if let Err(e) = inner.advance(job_id, slot, JobStatus::Processing) {
        // The supervisor may have recorded a timeout in between
        if !cancel.is_cancelled() {
            tracing::error!("Cannot start extraction: {}", e);
        }
        return Outcome::Failed(JobError::new(ErrorKind::ExtractionFailed, e.to_string()));
    }
    inner.log(tag, Severity::Info, format!("Querying schema: [{}]", mode));

    let extractor = Arc::clone(&inner.extractor);
    let mut task = tokio::task::spawn_blocking(move || extractor.extract(&page, &mode));

    let extracted = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            // Blocking work cannot be aborted; hold the slot until it returns
            let _ = (&mut task).await;
            return Outcome::Failed(JobError::cancelled());
        }
        joined = &mut task => joined,
    };

    match extracted {
        Ok(Ok(fields)) => {
            tracing::debug!(fields = fields.len(), "Extraction complete");
            Outcome::Succeeded(fields)
        }
        Ok(Err(e)) => Outcome::Failed(e.into()),
        Err(join_error) => Outcome::Failed(JobError::new(
            ErrorKind::ExtractionFailed,
            format!("extractor failed: {}", join_error),
        )),
    }
}
