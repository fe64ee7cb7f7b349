//! attendant: queue meeting attendance jobs and run them on a bounded pool
//! of simulated browser workers.

use std::sync::Arc;
use std::time::Duration;

use actors::{JobQueueHandle, QueueArgs, start_scheduler};
use anyhow::{Context, Result};
use attendant_core::{ExecutionMode, JobId, JobRequest, JobStatus, SchedulerConfig};
use clap::Parser;
use storage::ObjectSessionStore;
use tokio::task::JoinSet;

mod sim;

/// Attend meetings with a capacity-limited worker pool
#[derive(Parser)]
#[command(name = "attendant")]
#[command(about = "Schedule and attend meetings with a bounded pool of workers", long_about = None)]
#[command(version)]
struct Cli {
    /// Meeting links to attend
    #[arg(required = true)]
    targets: Vec<String>,

    /// Record each meeting after joining
    #[arg(long)]
    record: bool,

    /// Schedule every job this many seconds in the future
    #[arg(long)]
    delay_secs: Option<u64>,

    /// How long to stay in each meeting before leaving
    #[arg(long, default_value = "5")]
    hold_secs: u64,

    /// Simulated join latency in milliseconds
    #[arg(long, default_value = "250")]
    join_ms: u64,

    /// Override MAX_CONCURRENT_WORKERS
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Run the browser with a visible window
    #[arg(long)]
    headed: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    let mut config = SchedulerConfig::from_env().context("invalid scheduler configuration")?;
    if let Some(max) = cli.max_concurrent {
        config = config.with_max_concurrent(max);
    }
    if cli.headed {
        config = config.with_mode(ExecutionMode::Headed);
    }

    let sessions = ObjectSessionStore::from_env()
        .await
        .context("failed to open session store")?;
    let factory = sim::SimFactory::new(Duration::from_millis(cli.join_ms));

    let (queue, actor_handle) =
        start_scheduler(QueueArgs::new(config, Arc::new(factory), Arc::new(sessions))).await?;

    let mut events = queue.subscribe().await?;
    let logger = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            tracing::info!("{}", event.description());
        }
    });

    let scheduled_at = cli
        .delay_secs
        .map(|secs| chrono::Utc::now() + chrono::Duration::seconds(secs as i64));

    let hold = Duration::from_secs(cli.hold_secs);
    let mut attendances = JoinSet::new();
    for target in cli.targets {
        let mut request = JobRequest::new(target).with_recording(cli.record);
        if let Some(at) = scheduled_at {
            request = request.scheduled_at(at);
        }
        let job = queue.submit(request).await?;
        attendances.spawn(attend(queue.clone(), job.id, hold));
    }

    while let Some(result) = attendances.join_next().await {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Attendance ended with error: {:#}", e),
            Err(e) => tracing::error!("Attendance task failed: {}", e),
        }
    }

    let snapshot = queue.snapshot().await?;
    tracing::info!(
        "Done: {} completed, {} failed",
        snapshot.stats.completed,
        snapshot.stats.failed
    );

    queue.shutdown().await?;
    let _ = actor_handle.await;
    logger.abort();
    Ok(())
}

/// Wait for the job to become active, stay for `hold`, then leave.
async fn attend(queue: JobQueueHandle, job_id: JobId, hold: Duration) -> Result<()> {
    loop {
        let job = queue.status(job_id).await?;
        match job.status {
            JobStatus::Active => break,
            JobStatus::Completed | JobStatus::Failed => return Ok(()),
            JobStatus::Queued | JobStatus::Processing => {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        }
    }

    tokio::time::sleep(hold).await;
    queue
        .leave(job_id)
        .await
        .with_context(|| format!("leaving job {job_id}"))?;
    Ok(())
}
