//! Scheduler behaviour against the mock fetcher and extractor

use crate::{scheduler, settle, test_config};
use std::sync::Arc;
use std::time::Duration;
use swarm_scraper::crawler::mock::{MockExtractor, MockFetcher};
use swarm_scraper::crawler::HtmlExtractor;
use swarm_scraper::output::{EngineEvent, MetricsAggregator, TransitionEvent, WorkerTag};
use swarm_scraper::state::ErrorKind;
use swarm_scraper::{ExtractionMode, JobStatus, ScrapeError};
use tokio::sync::broadcast;

/// Drains everything already sent on a subscription
fn drain(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn transitions(events: &[EngineEvent]) -> Vec<TransitionEvent> {
    events
        .iter()
        .filter_map(|event| match event {
            EngineEvent::Transition(t) => Some(t.clone()),
            EngineEvent::Log(_) => None,
        })
        .collect()
}

/// Highest number of simultaneously active jobs implied by a transition log
fn peak_active(events: &[TransitionEvent]) -> usize {
    let mut active = 0usize;
    let mut peak = 0usize;
    for event in events {
        if event.from == JobStatus::Queued && event.to == JobStatus::Fetching {
            active += 1;
            peak = peak.max(active);
        } else if event.to.is_terminal() {
            active -= 1;
        }
    }
    peak
}

#[tokio::test]
async fn test_batch_creates_one_queued_job_per_url() {
    let fetcher = MockFetcher::new().with_latency(Duration::from_millis(100));
    let scheduler = scheduler(test_config(2), Arc::new(fetcher), Arc::new(MockExtractor::new()));

    let ids = scheduler
        .submit_batch("a.com\nb.com, c.com\n\n d.com ,e.com", ExtractionMode::Title)
        .unwrap();
    assert_eq!(ids.len(), 5);
    assert_eq!(scheduler.jobs().len(), 5);

    // Two were admitted straight away, the rest wait in order
    let statuses: Vec<JobStatus> = scheduler.jobs().iter().map(|j| j.status).collect();
    assert_eq!(&statuses[2..], &[JobStatus::Queued; 3]);
    assert_eq!(scheduler.metrics().queued, 3);

    settle(&scheduler).await;

    // Every job's first transition leaves Queued
    let log = scheduler.transitions();
    for id in &ids {
        let first = log.iter().find(|e| e.job_id == *id).unwrap();
        assert_eq!(first.from, JobStatus::Queued);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_cap_holds_under_burst() {
    let fetcher = Arc::new(MockFetcher::new().with_latency(Duration::from_millis(15)));
    let extractor = MockExtractor::new().with_latency(Duration::from_millis(5));
    let scheduler = scheduler(test_config(3), fetcher.clone(), Arc::new(extractor));
    let mut rx = scheduler.subscribe();

    for burst in 0..4 {
        let batch: Vec<String> = (0..10).map(|i| format!("site{}-{}.com", burst, i)).collect();
        scheduler
            .submit_batch(&batch.join(","), ExtractionMode::Links)
            .unwrap();
    }
    settle(&scheduler).await;

    let streamed = transitions(&drain(&mut rx));
    assert_eq!(streamed.len(), 40 * 3);
    assert!(peak_active(&streamed) <= 3);
    assert_eq!(peak_active(&streamed), 3);
    assert!(fetcher.peak_concurrency() <= 3);

    // The stream and the recorded log agree
    assert_eq!(streamed, scheduler.transitions());
    assert!(scheduler
        .jobs()
        .iter()
        .all(|job| job.status == JobStatus::Succeeded));
}

#[tokio::test]
async fn test_single_slot_runs_one_job_at_a_time() {
    let fetcher = MockFetcher::new().with_latency(Duration::from_millis(60));
    let scheduler = scheduler(test_config(1), Arc::new(fetcher), Arc::new(MockExtractor::new()));

    let ids = scheduler
        .submit_batch("one.com\ntwo.com\nthree.com", ExtractionMode::Title)
        .unwrap();

    let sampler = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            let mut peak = 0;
            for _ in 0..60 {
                let active = scheduler
                    .jobs()
                    .iter()
                    .filter(|job| job.status.is_active())
                    .count();
                peak = peak.max(active);
                assert!(scheduler.metrics().active <= 1);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            peak
        })
    };

    settle(&scheduler).await;
    let peak = sampler.await.unwrap();
    assert_eq!(peak, 1);

    for id in ids {
        assert_eq!(scheduler.job(id).unwrap().status, JobStatus::Succeeded);
    }
    assert!(scheduler.slots().iter().all(|slot| slot.job_id.is_none()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_every_job_terminates_with_failures_injected() {
    let fetcher = MockFetcher::new()
        .with_latency(Duration::from_millis(5))
        .fail_every(3);
    let extractor = MockExtractor::new().fail_on("site7");
    let scheduler = scheduler(test_config(4), Arc::new(fetcher), Arc::new(extractor));

    let batch: Vec<String> = (0..30).map(|i| format!("site{}.com", i)).collect();
    scheduler
        .submit_batch(&batch.join("\n"), ExtractionMode::Title)
        .unwrap();
    settle(&scheduler).await;

    let jobs = scheduler.jobs();
    assert_eq!(jobs.len(), 30);
    for job in &jobs {
        assert!(job.status.is_terminal());
        // Exactly one of result or error once terminal
        assert_ne!(job.result.is_some(), job.error.is_some());
    }

    let metrics = scheduler.metrics();
    assert_eq!(metrics.succeeded + metrics.failed, 30);
    // Every third fetch fails; site7 fails extraction unless its fetch already did
    assert!((10..=11).contains(&metrics.failed));
    assert_eq!(metrics.active, 0);
    assert_eq!(metrics.queued, 0);
}

#[tokio::test]
async fn test_retry_failed_creates_new_jobs() {
    let fetcher = MockFetcher::new().fail_on("bad");
    let scheduler = scheduler(test_config(2), Arc::new(fetcher), Arc::new(MockExtractor::new()));

    let ids = scheduler
        .submit_batch("good.com,bad.com", ExtractionMode::Title)
        .unwrap();
    settle(&scheduler).await;
    let original = scheduler.job(ids[1]).unwrap();
    assert_eq!(original.status, JobStatus::Failed);

    let retries = scheduler.retry_failed().unwrap();
    assert_eq!(retries.len(), 1);
    settle(&scheduler).await;

    let retry = scheduler.job(retries[0]).unwrap();
    assert_ne!(retry.id, original.id);
    assert_eq!(retry.url, original.url);
    assert_eq!(retry.mode, original.mode);
    assert_eq!(retry.attempt, 2);
    assert_eq!(retry.retry_of, Some(original.id));

    // The original is untouched
    assert_eq!(scheduler.job(ids[1]).unwrap(), original);
    assert_eq!(scheduler.jobs().len(), 3);
}

#[tokio::test]
async fn test_replayed_metrics_match_live_metrics() {
    let fetcher = MockFetcher::new()
        .with_latency(Duration::from_millis(2))
        .fail_every(4);
    let config = test_config(5);
    let window = config.metrics.window();
    let scheduler = scheduler(config, Arc::new(fetcher), Arc::new(MockExtractor::new()));
    let mut rx = scheduler.subscribe();

    let batch: Vec<String> = (0..23).map(|i| format!("host{}.org", i)).collect();
    scheduler
        .submit_batch(&batch.join(","), ExtractionMode::MetaDescription)
        .unwrap();
    settle(&scheduler).await;

    let live = scheduler.metrics();
    let streamed = transitions(&drain(&mut rx));
    let replayed = MetricsAggregator::replay(&streamed, window);

    assert_eq!(replayed.success_rate(), live.success_rate);
    assert_eq!(replayed.succeeded(), live.succeeded);
    assert_eq!(replayed.failed(), live.failed);
    // 18 of 23 succeeded
    assert_eq!(live.success_rate, 78);
}

#[tokio::test]
async fn test_clear_is_idempotent() {
    let fetcher = MockFetcher::new().fail_on("b.com");
    let scheduler = scheduler(test_config(4), Arc::new(fetcher), Arc::new(MockExtractor::new()));

    scheduler
        .submit_batch("a.com,b.com,c.com", ExtractionMode::Title)
        .unwrap();
    settle(&scheduler).await;
    assert_eq!(scheduler.metrics().succeeded, 2);

    scheduler.clear();
    let once = (scheduler.jobs(), scheduler.metrics(), scheduler.transitions());
    scheduler.clear();
    let twice = (scheduler.jobs(), scheduler.metrics(), scheduler.transitions());

    assert!(once.0.is_empty());
    assert_eq!(once.1.succeeded, 0);
    assert_eq!(once.1.failed, 0);
    assert_eq!(once.1.success_rate, 0);
    assert!(once.2.is_empty());
    assert_eq!(once.0, twice.0);
    assert_eq!(once.1.succeeded, twice.1.succeeded);
    assert_eq!(once.1.failed, twice.1.failed);
    assert_eq!(once.2, twice.2);
}

#[tokio::test]
async fn test_clear_keeps_in_flight_jobs() {
    let fetcher = MockFetcher::new().with_latency(Duration::from_millis(100));
    let scheduler = scheduler(test_config(1), Arc::new(fetcher), Arc::new(MockExtractor::new()));

    let ids = scheduler
        .submit_batch("a.com,b.com,c.com", ExtractionMode::Title)
        .unwrap();
    scheduler.clear();

    let remaining = scheduler.jobs();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, ids[0]);

    settle(&scheduler).await;
    assert_eq!(scheduler.job(ids[0]).unwrap().status, JobStatus::Succeeded);
    assert!(scheduler.job(ids[1]).is_none());
    assert_eq!(scheduler.metrics().succeeded, 1);
}

#[tokio::test]
async fn test_links_example() {
    let scheduler = scheduler(
        test_config(4),
        Arc::new(MockFetcher::new()),
        Arc::new(HtmlExtractor::new()),
    );

    let ids = scheduler
        .submit_batch("example.com\nhttps://foo.org", ExtractionMode::Links)
        .unwrap();
    assert_eq!(ids.len(), 2);
    settle(&scheduler).await;

    let jobs = scheduler.jobs();
    assert_eq!(jobs[0].url, "https://example.com");
    assert_eq!(jobs[1].url, "https://foo.org");
    for job in &jobs {
        assert_eq!(job.status, JobStatus::Succeeded);
        let result = job.result.as_ref().unwrap();
        assert!(!result.is_empty());
        assert_eq!(result.get("link.0"), Some(format!("{}/about", job.url).as_str()));
    }
}

#[tokio::test]
async fn test_invalid_submissions_create_no_jobs() {
    let scheduler = scheduler(
        test_config(2),
        Arc::new(MockFetcher::new()),
        Arc::new(MockExtractor::new()),
    );

    let empty_selector = scheduler.submit("example.com", ExtractionMode::CustomSelector(String::new()));
    assert!(matches!(empty_selector, Err(ScrapeError::InvalidInput(_))));

    let bad_batch = scheduler.submit_batch("ok.com, ftp://files.example.com", ExtractionMode::Title);
    assert!(matches!(bad_batch, Err(ScrapeError::InvalidInput(_))));

    let blank = scheduler.submit_batch(" \n , ", ExtractionMode::Title);
    assert!(matches!(blank, Err(ScrapeError::InvalidInput(_))));

    assert!(scheduler.jobs().is_empty());
    assert!(scheduler.transitions().is_empty());
}

#[tokio::test]
async fn test_shutdown_without_drain_cancels_in_flight() {
    let fetcher = MockFetcher::new().with_latency(Duration::from_secs(3));
    let scheduler = scheduler(test_config(2), Arc::new(fetcher), Arc::new(MockExtractor::new()));

    let ids = scheduler
        .submit_batch("a.com,b.com,c.com,d.com", ExtractionMode::Title)
        .unwrap();

    tokio::time::timeout(Duration::from_secs(2), scheduler.shutdown(false))
        .await
        .expect("shutdown should not wait for the slow fetches");

    for id in &ids[..2] {
        let job = scheduler.job(*id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.unwrap().kind, ErrorKind::Cancelled);
    }
    for id in &ids[2..] {
        assert_eq!(scheduler.job(*id).unwrap().status, JobStatus::Queued);
    }

    assert!(matches!(
        scheduler.submit("e.com", ExtractionMode::Title),
        Err(ScrapeError::ShuttingDown)
    ));
    assert!(scheduler.is_shutdown());

    // Idempotent
    scheduler.shutdown(false).await;
}

#[tokio::test]
async fn test_shutdown_with_drain_finishes_in_flight() {
    let fetcher = MockFetcher::new().with_latency(Duration::from_millis(50));
    let scheduler = scheduler(test_config(1), Arc::new(fetcher), Arc::new(MockExtractor::new()));

    let ids = scheduler
        .submit_batch("a.com,b.com", ExtractionMode::Title)
        .unwrap();
    scheduler.shutdown(true).await;

    assert_eq!(scheduler.job(ids[0]).unwrap().status, JobStatus::Succeeded);
    assert_eq!(scheduler.job(ids[1]).unwrap().status, JobStatus::Queued);

    // wait_idle does not hang on jobs that will never be admitted
    settle(&scheduler).await;
}

#[tokio::test]
async fn test_raising_cap_admits_waiting_jobs() {
    let fetcher = MockFetcher::new().with_latency(Duration::from_millis(100));
    let scheduler = scheduler(test_config(1), Arc::new(fetcher), Arc::new(MockExtractor::new()));

    scheduler
        .submit_batch("a.com,b.com,c.com,d.com", ExtractionMode::Title)
        .unwrap();
    assert_eq!(scheduler.metrics().active, 1);

    scheduler.set_max_concurrency(4).unwrap();
    let metrics = scheduler.metrics();
    assert_eq!(metrics.active, 4);
    assert_eq!(metrics.queued, 0);

    settle(&scheduler).await;
    assert_eq!(scheduler.metrics().succeeded, 4);
}

#[tokio::test]
async fn test_lowering_cap_never_preempts() {
    let fetcher = MockFetcher::new().with_latency(Duration::from_millis(80));
    let scheduler = scheduler(test_config(4), Arc::new(fetcher), Arc::new(MockExtractor::new()));
    let mut rx = scheduler.subscribe();

    let batch: Vec<String> = (0..8).map(|i| format!("n{}.com", i)).collect();
    scheduler
        .submit_batch(&batch.join(","), ExtractionMode::Title)
        .unwrap();
    scheduler.set_max_concurrency(1).unwrap();
    assert_eq!(scheduler.metrics().active, 4);

    settle(&scheduler).await;
    assert_eq!(scheduler.metrics().succeeded, 8);

    // Once the original four drained, admissions ran one at a time
    let streamed = transitions(&drain(&mut rx));
    let fifth_admission = streamed
        .iter()
        .filter(|e| e.to == JobStatus::Fetching)
        .nth(4)
        .unwrap()
        .clone();
    let position = streamed.iter().position(|e| *e == fifth_admission).unwrap();
    assert_eq!(peak_active(&streamed[position..]), 1);
}

#[tokio::test]
async fn test_event_log_is_bounded_and_tagged() {
    let mut config = test_config(2);
    config.events.log_capacity = 5;
    let scheduler = scheduler(config, Arc::new(MockFetcher::new()), Arc::new(MockExtractor::new()));
    let mut rx = scheduler.subscribe();

    scheduler
        .submit_batch("a.com,b.com,c.com,d.com", ExtractionMode::Title)
        .unwrap();
    settle(&scheduler).await;

    let logs = scheduler.logs();
    assert_eq!(logs.len(), 5);
    assert!(logs.windows(2).all(|w| w[0].seq < w[1].seq));

    let streamed_logs: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter_map(|event| match event {
            EngineEvent::Log(line) => Some(line),
            EngineEvent::Transition(_) => None,
        })
        .collect();
    // Every line reaches subscribers, even the evicted ones
    assert!(streamed_logs.len() > 5);
    assert_eq!(streamed_logs[0].tag, WorkerTag::System);
    assert!(streamed_logs
        .iter()
        .any(|line| matches!(line.tag, WorkerTag::Slot(_))));

    scheduler.clear_logs();
    assert!(scheduler.logs().is_empty());
}
