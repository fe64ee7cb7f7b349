#![allow(clippy::disallowed_methods)]

mod common;

use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use actors::{DriverFuture, DriverHandle, JobDriver, QueueArgs, start_scheduler};
use attendant_core::{
    ExecutionMode, Job, JobEvent, JobId, JobRequest, JobStatus, SchedulerError, Worker,
};
use chrono::Utc;

use common::{
    FakeFactory, MemorySessions, config, start, start_with, wait_for_saves, wait_for_status,
};

fn meeting(name: &str) -> JobRequest {
    JobRequest::new(format!("https://meet.example/{name}"))
}

/// Joins and goes active, except for targets containing `panic` or `quiet`.
struct ScriptedDriver;

impl JobDriver for ScriptedDriver {
    fn drive(&self, job: Job, worker: Arc<dyn Worker>, handle: DriverHandle) -> DriverFuture {
        Box::pin(async move {
            if job.target.contains("panic") {
                panic!("driver blew up");
            }
            if job.target.contains("quiet") {
                return Ok(());
            }
            worker.join(&job.target).await?;
            handle.mark_active(false);
            Ok(())
        })
    }
}

#[tokio::test]
async fn third_job_waits_for_a_free_slot() -> Result<(), Box<dyn Error>> {
    let (queue, factory) = start(2).await?;

    let a = queue.submit(meeting("a")).await?;
    let b = queue.submit(meeting("b")).await?;
    let c = queue.submit(meeting("c")).await?;
    assert_eq!(a.status, JobStatus::Queued);

    wait_for_status(&queue, a.id, JobStatus::Active).await?;
    wait_for_status(&queue, b.id, JobStatus::Active).await?;
    assert_eq!(queue.status(c.id).await?.status, JobStatus::Queued);

    let capacity = queue.capacity().await?;
    assert_eq!((capacity.active, capacity.max), (2, 2));

    let left = queue.leave(a.id).await?;
    assert_eq!(left.status, JobStatus::Completed);
    assert!(left.completed_at.is_some());

    wait_for_status(&queue, c.id, JobStatus::Active).await?;
    assert_eq!(factory.probe.created(), 3);
    assert_eq!(factory.probe.live(), 2);

    queue.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn ready_jobs_start_in_submission_order() -> Result<(), Box<dyn Error>> {
    let (queue, _factory) = start(1).await?;
    let mut events = queue.subscribe().await?;

    let mut ids = Vec::new();
    for name in ["first", "second", "third"] {
        ids.push(queue.submit(meeting(name)).await?.id);
    }
    for &id in &ids {
        wait_for_status(&queue, id, JobStatus::Active).await?;
        queue.leave(id).await?;
    }

    let mut started = Vec::new();
    while started.len() < ids.len() {
        let event = tokio::time::timeout(Duration::from_secs(1), events.recv()).await??;
        if let JobEvent::JobStarted { job_id, .. } = event {
            started.push(job_id);
        }
    }
    assert_eq!(started, ids);

    queue.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn scheduled_job_is_deferred_until_its_time() -> Result<(), Box<dyn Error>> {
    let (queue, factory) = start(2).await?;
    let at = Utc::now() + chrono::Duration::milliseconds(300);

    let job = queue.submit(meeting("later").scheduled_at(at)).await?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(queue.status(job.id).await?.status, JobStatus::Queued);
    assert_eq!(factory.probe.created(), 0);

    let active = wait_for_status(&queue, job.id, JobStatus::Active).await?;
    assert!(active.started_at.ok_or("not started")? >= at);

    queue.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn scheduled_job_does_not_block_ready_ones() -> Result<(), Box<dyn Error>> {
    let (queue, _factory) = start(1).await?;
    let later = queue
        .submit(meeting("later").scheduled_at(Utc::now() + chrono::Duration::seconds(30)))
        .await?;
    let now = queue.submit(meeting("now")).await?;

    wait_for_status(&queue, now.id, JobStatus::Active).await?;
    assert_eq!(queue.status(later.id).await?.status, JobStatus::Queued);

    queue.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn failed_join_fails_the_job_and_frees_the_slot() -> Result<(), Box<dyn Error>> {
    let (queue, factory) = start(1).await?;

    let bad = queue.submit(meeting("fail-join")).await?;
    let next = queue.submit(meeting("next")).await?;

    let failed = wait_for_status(&queue, bad.id, JobStatus::Failed).await?;
    assert_eq!(failed.error.as_deref(), Some("Join failed: meeting not found"));
    assert!(failed.completed_at.is_some());

    wait_for_status(&queue, next.id, JobStatus::Active).await?;
    assert_eq!(factory.probe.disposed(), 1);

    queue.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn create_failure_fails_the_queued_job() -> Result<(), Box<dyn Error>> {
    let (queue, factory) = start(1).await?;
    let first = queue.submit(meeting("first")).await?;
    wait_for_status(&queue, first.id, JobStatus::Active).await?;

    let doomed = queue.submit(meeting("doomed")).await?;
    let next = queue.submit(meeting("next")).await?;
    factory.fail_next_creates(1);

    // Freeing the slot runs one pass: `doomed` fails to get a worker, `next` gets it.
    queue.leave(first.id).await?;

    let failed = wait_for_status(&queue, doomed.id, JobStatus::Failed).await?;
    assert_eq!(
        failed.error.as_deref(),
        Some("Failed to create worker: Worker setup failed: context refused")
    );
    assert!(failed.started_at.is_none());
    assert!(failed.completed_at.is_some());

    wait_for_status(&queue, next.id, JobStatus::Active).await?;
    assert_eq!(queue.capacity().await?.active, 1);
    assert_eq!(factory.probe.created(), 2);

    queue.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn deferred_job_keeps_its_place_when_ready_at_capacity() -> Result<(), Box<dyn Error>> {
    let (queue, _factory) = start(1).await?;
    let hog = queue.submit(meeting("hog")).await?;
    wait_for_status(&queue, hog.id, JobStatus::Active).await?;

    let at = Utc::now() + chrono::Duration::milliseconds(150);
    let scheduled = queue.submit(meeting("scheduled").scheduled_at(at)).await?;
    let ready = queue.submit(meeting("ready")).await?;

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(queue.status(scheduled.id).await?.status, JobStatus::Queued);
    assert_eq!(queue.status(ready.id).await?.status, JobStatus::Queued);

    queue.leave(hog.id).await?;

    let started = wait_for_status(&queue, scheduled.id, JobStatus::Active).await?;
    assert!(started.started_at.ok_or("not started")? >= at);
    assert_eq!(queue.status(ready.id).await?.status, JobStatus::Queued);

    queue.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn recording_failure_still_goes_active() -> Result<(), Box<dyn Error>> {
    let (queue, _factory) = start(2).await?;

    let broken = queue.submit(meeting("no-record").with_recording(true)).await?;
    let fine = queue.submit(meeting("rec").with_recording(true)).await?;

    let broken = wait_for_status(&queue, broken.id, JobStatus::Active).await?;
    assert!(!broken.recording);
    assert!(broken.error.is_none());

    let fine = wait_for_status(&queue, fine.id, JobStatus::Active).await?;
    assert!(fine.recording);

    let stopped = queue.stop_recording(fine.id).await?;
    assert!(!stopped.recording);
    assert_eq!(stopped.status, JobStatus::Active);

    queue.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn stop_recording_requires_an_active_job() -> Result<(), Box<dyn Error>> {
    let (queue, _factory) = start(1).await?;
    let first = queue.submit(meeting("first")).await?;
    let waiting = queue.submit(meeting("waiting")).await?;
    wait_for_status(&queue, first.id, JobStatus::Active).await?;

    assert!(matches!(
        queue.stop_recording(waiting.id).await,
        Err(SchedulerError::InvalidRequest(_))
    ));
    let unknown = JobId::new();
    assert_eq!(
        queue.stop_recording(unknown).await,
        Err(SchedulerError::NotFound(unknown))
    );

    queue.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn vanished_drivers_release_their_slots() -> Result<(), Box<dyn Error>> {
    let factory = Arc::new(FakeFactory::new());
    let args = QueueArgs::new(config(1), factory.clone(), Arc::new(MemorySessions::default()))
        .with_driver(Arc::new(ScriptedDriver));
    let (queue, _handle) = start_scheduler(args).await?;

    let panicked = queue.submit(meeting("panic")).await?;
    let quiet = queue.submit(meeting("quiet")).await?;
    let last = queue.submit(meeting("last")).await?;

    let failed = wait_for_status(&queue, panicked.id, JobStatus::Failed).await?;
    assert_eq!(failed.error.as_deref(), Some("job driver panicked"));

    let failed = wait_for_status(&queue, quiet.id, JobStatus::Failed).await?;
    assert_eq!(
        failed.error.as_deref(),
        Some("job driver exited before the job became active")
    );

    wait_for_status(&queue, last.id, JobStatus::Active).await?;
    assert_eq!(factory.probe.live(), 1);

    queue.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn live_workers_never_exceed_the_limit() -> Result<(), Box<dyn Error>> {
    let factory = Arc::new(FakeFactory::new().with_join_delay(Duration::from_millis(20)));
    let (queue, _sessions) = start_with(2, factory.clone()).await?;

    let mut ids = Vec::new();
    for i in 0..6 {
        ids.push(queue.submit(meeting(&format!("m{i}"))).await?.id);
    }
    for &id in &ids {
        wait_for_status(&queue, id, JobStatus::Active).await?;
        let capacity = queue.capacity().await?;
        assert!(capacity.active <= capacity.max);
        queue.leave(id).await?;
    }

    assert_eq!(factory.probe.created(), 6);
    assert!(factory.probe.max_live() <= 2);

    let snapshot = queue.snapshot().await?;
    assert_eq!(snapshot.stats.completed, 6);
    assert_eq!(snapshot.stats.success_rate(), Some(100.0));
    assert!(snapshot.active.is_empty());

    queue.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn joined_session_is_persisted() -> Result<(), Box<dyn Error>> {
    let factory = Arc::new(FakeFactory::new());
    let (queue, sessions) = start_with(1, factory).await?;

    let job = queue.submit(meeting("login")).await?;
    wait_for_status(&queue, job.id, JobStatus::Active).await?;
    wait_for_saves(&sessions, 1).await?;

    queue.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn external_completion_releases_the_worker() -> Result<(), Box<dyn Error>> {
    let (queue, factory) = start(1).await?;
    let first = queue.submit(meeting("first")).await?;
    let second = queue.submit(meeting("second")).await?;
    wait_for_status(&queue, first.id, JobStatus::Active).await?;

    queue.complete(first.id, Some("meeting ended by host".to_string()))?;

    let failed = wait_for_status(&queue, first.id, JobStatus::Failed).await?;
    assert_eq!(failed.error.as_deref(), Some("meeting ended by host"));
    wait_for_status(&queue, second.id, JobStatus::Active).await?;
    assert_eq!(factory.probe.disposed(), 1);

    queue.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn reinitialize_fails_bound_jobs_and_resumes() -> Result<(), Box<dyn Error>> {
    let (queue, factory) = start(1).await?;
    let bound = queue.submit(meeting("bound")).await?;
    let waiting = queue.submit(meeting("waiting")).await?;
    wait_for_status(&queue, bound.id, JobStatus::Active).await?;

    let orphaned = queue.reinitialize(ExecutionMode::Headed).await?;
    assert_eq!(orphaned, vec![bound.id]);

    let failed = queue.status(bound.id).await?;
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some("worker pool reinitialized"));

    wait_for_status(&queue, waiting.id, JobStatus::Active).await?;
    assert_eq!(
        factory.probe.launches(),
        vec![ExecutionMode::Headless, ExecutionMode::Headed]
    );

    queue.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn leave_rejects_jobs_without_a_worker() -> Result<(), Box<dyn Error>> {
    let (queue, _factory) = start(1).await?;
    let first = queue.submit(meeting("first")).await?;
    let waiting = queue.submit(meeting("waiting")).await?;
    wait_for_status(&queue, first.id, JobStatus::Active).await?;

    assert_eq!(
        queue.leave(waiting.id).await,
        Err(SchedulerError::WorkerNotBound(waiting.id))
    );
    let unknown = JobId::new();
    assert_eq!(queue.leave(unknown).await, Err(SchedulerError::NotFound(unknown)));

    queue.leave(first.id).await?;
    assert_eq!(
        queue.leave(first.id).await,
        Err(SchedulerError::WorkerNotBound(first.id))
    );

    queue.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn invalid_requests_are_rejected() -> Result<(), Box<dyn Error>> {
    let (queue, _factory) = start(1).await?;

    assert!(matches!(
        queue.submit(JobRequest::new("   ")).await,
        Err(SchedulerError::InvalidRequest(_))
    ));
    let stale = Utc::now() - chrono::Duration::hours(1);
    assert!(matches!(
        queue.submit(meeting("stale").scheduled_at(stale)).await,
        Err(SchedulerError::InvalidRequest(_))
    ));

    let unknown = JobId::new();
    assert_eq!(queue.status(unknown).await, Err(SchedulerError::NotFound(unknown)));
    assert!(queue.jobs().await?.is_empty());

    queue.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn shutdown_cancels_deferred_dispatch() -> Result<(), Box<dyn Error>> {
    let (queue, factory) = start(1).await?;
    let at = Utc::now() + chrono::Duration::milliseconds(200);
    let job = queue.submit(meeting("never").scheduled_at(at)).await?;

    let jobs = queue.jobs().await?;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].id, job.id);
    assert_eq!(jobs[0].status, JobStatus::Queued);

    queue.shutdown().await?;
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(factory.probe.created(), 0);
    assert_eq!(factory.probe.shutdowns.load(Ordering::SeqCst), 1);
    assert!(queue.submit(meeting("after")).await.is_err());
    Ok(())
}
