//! Scheduler for admitting jobs onto the bounded worker pool
//!
//! This module handles:
//! - Job submission and URL validation
//! - The FIFO pending queue and the worker slot table
//! - Enforcing the concurrency cap, including runtime changes
//! - Recording transitions and fanning them out to metrics, the event log and subscribers
//! - Retry, clear and shutdown
//!
//! A single mutex-guarded `PoolState` is the only assignment authority. It is
//! never held across an `.await`, and every event is emitted while it is held,
//! so the emission order is a valid linearization of all state changes.

use crate::config::{validate, validate_concurrency, Config};
use crate::crawler::coordinator::supervise;
use crate::crawler::fetcher::Fetcher;
use crate::crawler::parser::Extractor;
use crate::output::events::{EngineEvent, EventSink, LogEvent, Severity, TransitionEvent, WorkerTag};
use crate::output::metrics::{MetricsAggregator, MetricsSnapshot};
use crate::output::snapshot::Snapshot;
use crate::state::{ExtractionMode, Job, JobId, JobStatus, Outcome};
use crate::url::{normalize_target, parse_batch};
use crate::{Result, ScrapeError};
use chrono::Utc;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

/// One of the pool's concurrency units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkerSlot {
    pub index: usize,
    pub job_id: Option<JobId>,
}

/// Admission lifecycle of the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Running,
    /// Shut down, in-flight jobs run to completion
    Draining,
    /// Shut down, in-flight jobs are being cancelled
    Cancelling,
}

/// Pool occupancy published to waiters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Occupancy {
    in_flight: usize,
    pending: usize,
    admitting: bool,
}

/// A job handed to an executor
#[derive(Debug, Clone)]
pub(crate) struct Assignment {
    pub job_id: JobId,
    pub slot: usize,
    pub url: String,
    pub mode: ExtractionMode,
}

/// Everything guarded by the assignment lock
struct PoolState {
    jobs: HashMap<JobId, Job>,
    /// Submission order, for listing and snapshots
    order: Vec<JobId>,
    pending: VecDeque<JobId>,
    slots: Vec<Option<JobId>>,
    max_concurrency: usize,
    in_flight: usize,
    lifecycle: Lifecycle,
    transitions: Vec<TransitionEvent>,
    metrics: MetricsAggregator,
    log: EventSink,
}

impl PoolState {
    /// Lowest free slot index below the current cap
    fn free_slot(&self) -> Option<usize> {
        (0..self.max_concurrency).find(|&i| self.slots.get(i).map_or(true, Option::is_none))
    }

    fn occupy(&mut self, index: usize, job_id: JobId) {
        if self.slots.len() <= index {
            self.slots.resize(index + 1, None);
        }
        self.slots[index] = Some(job_id);
    }

    fn occupancy(&self) -> Occupancy {
        Occupancy {
            in_flight: self.in_flight,
            pending: self.pending.len(),
            admitting: self.lifecycle == Lifecycle::Running,
        }
    }
}

/// Shared engine state, reached by every executor through an `Arc`
pub(crate) struct Inner {
    pub(crate) config: Config,
    pub(crate) fetcher: Arc<dyn Fetcher>,
    pub(crate) extractor: Arc<dyn Extractor>,
    pub(crate) cancel: CancellationToken,
    runtime: Handle,
    pool: Mutex<PoolState>,
    events: broadcast::Sender<EngineEvent>,
    occupancy: watch::Sender<Occupancy>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // Executors never panic while holding the lock; recover the data if one did
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_occupancy(&self, pool: &PoolState) {
        self.occupancy.send_replace(pool.occupancy());
    }

    fn emit_log(
        &self,
        pool: &mut PoolState,
        tag: WorkerTag,
        severity: Severity,
        message: impl Into<String>,
    ) -> LogEvent {
        let event = pool.log.push(tag, severity, message, Utc::now());
        // No subscribers is fine
        let _ = self.events.send(EngineEvent::Log(event.clone()));
        event
    }

    fn emit_transition(&self, pool: &mut PoolState, event: TransitionEvent) {
        tracing::debug!(
            job = %event.job_id,
            slot = ?event.slot,
            "{} -> {}",
            event.from,
            event.to
        );
        pool.metrics.apply(&event);
        pool.transitions.push(event.clone());
        let _ = self.events.send(EngineEvent::Transition(event));
    }

    /// Appends a log line on behalf of an executor
    pub(crate) fn log(&self, tag: WorkerTag, severity: Severity, message: impl Into<String>) {
        let mut pool = self.lock();
        self.emit_log(&mut pool, tag, severity, message);
    }

    /// Moves an admitted job to a later non-terminal status
    pub(crate) fn advance(&self, job_id: JobId, slot: usize, to: JobStatus) -> Result<()> {
        let now = Utc::now();
        let mut pool = self.lock();
        let job = pool
            .jobs
            .get_mut(&job_id)
            .ok_or(ScrapeError::UnknownJob(job_id))?;
        let from = job.status;
        job.advance(to, now)?;
        self.emit_transition(
            &mut pool,
            TransitionEvent {
                job_id,
                slot: Some(slot),
                from,
                to,
                at: now,
                error: None,
            },
        );
        Ok(())
    }

    /// Status of a job as currently recorded
    pub(crate) fn status_of(&self, job_id: JobId) -> Option<JobStatus> {
        self.lock().jobs.get(&job_id).map(|job| job.status)
    }

    /// Records a job's terminal outcome
    ///
    /// The job keeps its slot until `release`; an executor that was timed out or
    /// cancelled may still be unwinding blocking work at this point.
    pub(crate) fn record(&self, job_id: JobId, slot: usize, outcome: Outcome) {
        let now = Utc::now();
        let mut pool = self.lock();

        let (severity, message) = match &outcome {
            Outcome::Succeeded(fields) => (
                Severity::Success,
                format!("Success: extracted {} field(s)", fields.len()),
            ),
            Outcome::Failed(error) => (Severity::Error, format!("Error: {}", error)),
        };
        let error = match &outcome {
            Outcome::Failed(error) => Some(error.clone()),
            Outcome::Succeeded(_) => None,
        };

        let finished = match pool.jobs.get_mut(&job_id) {
            Some(job) => {
                let from = job.status;
                job.finish(outcome, now).map(|()| (from, job.status))
            }
            None => Err(ScrapeError::UnknownJob(job_id)),
        };

        match finished {
            Ok((from, to)) => {
                self.emit_transition(
                    &mut pool,
                    TransitionEvent {
                        job_id,
                        slot: Some(slot),
                        from,
                        to,
                        at: now,
                        error,
                    },
                );
                self.emit_log(&mut pool, WorkerTag::Slot(slot), severity, message);
            }
            Err(e) => {
                tracing::error!(job = %job_id, slot, "failed to record completion: {}", e);
            }
        }
    }

    /// Hands a job's slot back to the pool and admits the next pending job
    ///
    /// Called only once the executor has fully stopped, so the slot count is a
    /// ceiling on running work and not just on job statuses.
    pub(crate) fn release(self: &Arc<Self>, job_id: JobId, slot: usize) {
        {
            let mut pool = self.lock();
            if pool.slots.get(slot).copied().flatten() == Some(job_id) {
                pool.slots[slot] = None;
            }
            pool.in_flight = pool.in_flight.saturating_sub(1);
            self.publish_occupancy(&pool);
        }
        self.pump();
    }

    /// Admits pending jobs while slots are free
    ///
    /// Jobs leave the queue strictly in submission order. Each admitted job is
    /// moved to `Fetching` under the lock before its executor is spawned.
    fn pump(self: &Arc<Self>) {
        let mut admitted = Vec::new();
        {
            let mut pool = self.lock();
            while pool.lifecycle == Lifecycle::Running && pool.in_flight < pool.max_concurrency {
                let Some(slot) = pool.free_slot() else {
                    break;
                };
                let Some(job_id) = pool.pending.pop_front() else {
                    break;
                };
                let now = Utc::now();
                let Some(job) = pool.jobs.get_mut(&job_id) else {
                    continue;
                };
                let from = job.status;
                if let Err(e) = job.advance(JobStatus::Fetching, now) {
                    tracing::error!(job = %job_id, "cannot admit job: {}", e);
                    continue;
                }
                let assignment = Assignment {
                    job_id,
                    slot,
                    url: job.url.clone(),
                    mode: job.mode.clone(),
                };

                pool.occupy(slot, job_id);
                pool.in_flight += 1;
                self.emit_transition(
                    &mut pool,
                    TransitionEvent {
                        job_id,
                        slot: Some(slot),
                        from,
                        to: JobStatus::Fetching,
                        at: now,
                        error: None,
                    },
                );
                admitted.push(assignment);
            }
            self.publish_occupancy(&pool);
        }

        for assignment in admitted {
            self.runtime.spawn(supervise(Arc::clone(self), assignment));
        }
    }
}

/// Handle to a running worker pool
///
/// Cloning the handle is cheap; every clone drives the same pool.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// Creates a new scheduler
    ///
    /// Must be called from within a Tokio runtime: executors are spawned on the
    /// runtime that was current at construction, so the handle itself may then be
    /// used from any thread.
    ///
    /// # Errors
    ///
    /// * `ScrapeError::Config` - The configuration is invalid
    /// * `ScrapeError::Runtime` - No Tokio runtime is available
    pub fn new(
        config: Config,
        fetcher: Arc<dyn Fetcher>,
        extractor: Arc<dyn Extractor>,
    ) -> Result<Self> {
        validate(&config)?;
        let runtime = Handle::try_current().map_err(|e| {
            ScrapeError::Runtime(format!("scheduler requires a Tokio runtime: {}", e))
        })?;

        let (events, _) = broadcast::channel(config.events.broadcast_capacity);
        let max_concurrency = config.pool.max_concurrency;

        let pool = PoolState {
            jobs: HashMap::new(),
            order: Vec::new(),
            pending: VecDeque::new(),
            slots: vec![None; max_concurrency],
            max_concurrency,
            in_flight: 0,
            lifecycle: Lifecycle::Running,
            transitions: Vec::new(),
            metrics: MetricsAggregator::new(config.metrics.window()),
            log: EventSink::new(config.events.log_capacity),
        };
        let (occupancy, _) = watch::channel(pool.occupancy());

        tracing::info!(max_concurrency, "Worker pool started");

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                fetcher,
                extractor,
                cancel: CancellationToken::new(),
                runtime,
                pool: Mutex::new(pool),
                events,
                occupancy,
            }),
        })
    }

    /// Submits a single URL
    ///
    /// Returns immediately with the new job's id; the job starts `Queued`.
    ///
    /// # Errors
    ///
    /// * `ScrapeError::InvalidInput` - Empty or invalid URL, or a custom selector is missing
    /// * `ScrapeError::ShuttingDown` - The pool no longer accepts work
    pub fn submit(&self, url: &str, mode: ExtractionMode) -> Result<JobId> {
        mode.validate()?;
        let url = normalize_target(url).map_err(|e| ScrapeError::InvalidInput(e.to_string()))?;
        let ids = self.enqueue(vec![url], mode)?;
        ids.into_iter()
            .next()
            .ok_or_else(|| ScrapeError::Runtime("submission produced no job".to_string()))
    }

    /// Submits a newline and/or comma separated batch of URLs
    ///
    /// The batch is all-or-nothing: if any target is invalid no job is created.
    ///
    /// # Returns
    ///
    /// The created job ids, in input order
    pub fn submit_batch(&self, raw: &str, mode: ExtractionMode) -> Result<Vec<JobId>> {
        mode.validate()?;
        let urls = parse_batch(raw).map_err(|e| ScrapeError::InvalidInput(e.to_string()))?;
        self.enqueue(urls, mode)
    }

    fn enqueue(&self, urls: Vec<String>, mode: ExtractionMode) -> Result<Vec<JobId>> {
        let now = Utc::now();
        let ids = {
            let mut pool = self.inner.lock();
            if pool.lifecycle != Lifecycle::Running {
                return Err(ScrapeError::ShuttingDown);
            }

            let mut ids = Vec::with_capacity(urls.len());
            for url in urls {
                let job = Job::new(url, mode.clone(), now);
                ids.push(job.id);
                pool.order.push(job.id);
                pool.pending.push_back(job.id);
                pool.jobs.insert(job.id, job);
            }

            let message = format!("Queued {} job(s) [{}]", ids.len(), mode);
            self.inner
                .emit_log(&mut pool, WorkerTag::System, Severity::Info, message);
            self.inner.publish_occupancy(&pool);
            ids
        };

        tracing::info!(count = ids.len(), %mode, "Jobs submitted");
        self.inner.pump();
        Ok(ids)
    }

    /// Re-submits every job currently `Failed` as a new job
    ///
    /// The originals are left untouched. New jobs carry `attempt + 1` and point
    /// back at the job they retry.
    ///
    /// # Returns
    ///
    /// The ids of the new jobs, in the originals' submission order
    pub fn retry_failed(&self) -> Result<Vec<JobId>> {
        self.retry_where(|_| true)
    }

    /// Re-submits the `Failed` jobs for which `filter` returns true
    pub fn retry_where<F>(&self, filter: F) -> Result<Vec<JobId>>
    where
        F: Fn(&Job) -> bool,
    {
        let now = Utc::now();
        let ids = {
            let mut pool = self.inner.lock();
            if pool.lifecycle != Lifecycle::Running {
                return Err(ScrapeError::ShuttingDown);
            }

            let retries: Vec<Job> = pool
                .order
                .iter()
                .filter_map(|id| pool.jobs.get(id))
                .filter(|job| job.status == JobStatus::Failed && filter(job))
                .map(|job| job.retry(now))
                .collect();

            let ids: Vec<JobId> = retries.iter().map(|job| job.id).collect();
            for job in retries {
                pool.order.push(job.id);
                pool.pending.push_back(job.id);
                pool.jobs.insert(job.id, job);
            }

            if !ids.is_empty() {
                let message = format!("Retrying {} failed job(s)", ids.len());
                self.inner
                    .emit_log(&mut pool, WorkerTag::System, Severity::Info, message);
            }
            self.inner.publish_occupancy(&pool);
            ids
        };

        self.inner.pump();
        Ok(ids)
    }

    /// Changes the concurrency cap
    ///
    /// Takes effect for future admissions only; running jobs are never preempted.
    pub fn set_max_concurrency(&self, max_concurrency: usize) -> Result<()> {
        validate_concurrency(max_concurrency)
            .map_err(|e| ScrapeError::InvalidInput(e.to_string()))?;
        {
            let mut pool = self.inner.lock();
            pool.max_concurrency = max_concurrency;
            if pool.slots.len() < max_concurrency {
                pool.slots.resize(max_concurrency, None);
            }
            // Trailing free slots above the cap no longer exist
            while pool.slots.len() > max_concurrency && pool.slots.last() == Some(&None) {
                pool.slots.pop();
            }
            let message = format!("Max concurrency set to {}", max_concurrency);
            self.inner
                .emit_log(&mut pool, WorkerTag::System, Severity::Info, message);
        }
        tracing::info!(max_concurrency, "Concurrency cap changed");
        self.inner.pump();
        Ok(())
    }

    /// Current concurrency cap
    pub fn max_concurrency(&self) -> usize {
        self.inner.lock().max_concurrency
    }

    /// Removes every job that is not in flight and resets the metrics
    ///
    /// Queued jobs are dropped from the pending queue. Jobs currently holding a
    /// slot stay until they finish. Calling this twice has the same effect as once.
    pub fn clear(&self) {
        let mut pool = self.inner.lock();
        let before = pool.jobs.len();

        pool.jobs.retain(|_, job| job.status.is_active());
        let PoolState { jobs, order, .. } = &mut *pool;
        order.retain(|id| jobs.contains_key(id));
        pool.pending.clear();
        pool.transitions.clear();
        pool.metrics.clear();

        let removed = before - pool.jobs.len();
        if removed > 0 {
            let message = format!("Cleared {} job(s)", removed);
            self.inner
                .emit_log(&mut pool, WorkerTag::System, Severity::Info, message);
        }
        self.inner.publish_occupancy(&pool);
    }

    /// Drops every retained log line
    pub fn clear_logs(&self) {
        self.inner.lock().log.clear();
    }

    /// Stops the pool
    ///
    /// Both modes stop admitting queued jobs and reject new submissions. With
    /// `drain` the in-flight jobs finish normally; without it they are cancelled
    /// at their next suspension point and end `Failed` with `Cancelled`. Jobs
    /// still queued stay `Queued`. Resolves once nothing is in flight, which
    /// includes extractions still running on the blocking pool. Calling it
    /// again is harmless; a non-draining call upgrades an earlier draining one.
    pub async fn shutdown(&self, drain: bool) {
        {
            let mut pool = self.inner.lock();
            let next = match (pool.lifecycle, drain) {
                (Lifecycle::Running, true) => Some(Lifecycle::Draining),
                (Lifecycle::Running, false) | (Lifecycle::Draining, false) => {
                    Some(Lifecycle::Cancelling)
                }
                _ => None,
            };
            if let Some(next) = next {
                pool.lifecycle = next;
                let message = if drain {
                    format!("Shutdown requested, draining {} in-flight job(s)", pool.in_flight)
                } else {
                    format!("Shutdown requested, cancelling {} in-flight job(s)", pool.in_flight)
                };
                self.inner
                    .emit_log(&mut pool, WorkerTag::System, Severity::Info, message);
                tracing::info!(drain, in_flight = pool.in_flight, "Shutdown requested");
            }
            self.inner.publish_occupancy(&pool);
        }

        if !drain {
            self.inner.cancel.cancel();
        }

        let mut rx = self.inner.occupancy.subscribe();
        let _ = rx.wait_for(|o| o.in_flight == 0).await;
    }

    /// Returns true once shutdown has been requested
    pub fn is_shutdown(&self) -> bool {
        self.inner.lock().lifecycle != Lifecycle::Running
    }

    /// Resolves when there is nothing left to run
    ///
    /// While running that means the queue is empty and no job is in flight;
    /// after shutdown it only waits for in-flight jobs.
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.occupancy.subscribe();
        let _ = rx
            .wait_for(|o| o.in_flight == 0 && (o.pending == 0 || !o.admitting))
            .await;
    }

    /// Returns a copy of a job
    pub fn job(&self, id: JobId) -> Option<Job> {
        self.inner.lock().jobs.get(&id).cloned()
    }

    /// Returns copies of all known jobs, in submission order
    pub fn jobs(&self) -> Vec<Job> {
        let pool = self.inner.lock();
        pool.order
            .iter()
            .filter_map(|id| pool.jobs.get(id))
            .cloned()
            .collect()
    }

    /// Returns the slot table: every slot below the cap, plus any occupied above it
    pub fn slots(&self) -> Vec<WorkerSlot> {
        let pool = self.inner.lock();
        let len = pool.slots.len().max(pool.max_concurrency);
        (0..len)
            .map(|index| WorkerSlot {
                index,
                job_id: pool.slots.get(index).copied().flatten(),
            })
            .collect()
    }

    /// Returns the transition log since creation or the last `clear`
    pub fn transitions(&self) -> Vec<TransitionEvent> {
        self.inner.lock().transitions.clone()
    }

    /// Returns current metrics
    pub fn metrics(&self) -> MetricsSnapshot {
        let pool = self.inner.lock();
        pool.metrics.snapshot_at(
            Utc::now(),
            pool.in_flight,
            pool.max_concurrency,
            pool.pending.len(),
        )
    }

    /// Returns the retained log lines, oldest first
    pub fn logs(&self) -> Vec<LogEvent> {
        self.inner.lock().log.entries()
    }

    /// Captures every known job for export
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.jobs())
    }

    /// Subscribes to transitions and log lines
    ///
    /// A subscriber that falls more than `broadcast-capacity` events behind
    /// loses the oldest ones; producers never wait for subscribers.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.events.subscribe()
    }

    /// Configuration the pool was started with
    pub fn config(&self) -> &Config {
        &self.inner.config
    }
}
