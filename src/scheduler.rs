//! Recurring scheduler — runs the scrape job on a fixed interval.
//!
//! - The first cycle fires immediately on `start()`.
//! - At most one cycle runs at a time. A tick that lands while a cycle is
//!   still running is skipped, not queued.
//! - A cycle that panics is caught at the job boundary and logged; the
//!   schedule keeps going.
//! - `stop()` waits for the in-flight cycle before returning.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::pipeline::{CycleResult, ScrapePipeline};

/// A unit of recurring work.
#[async_trait]
pub trait ScrapeJob: Send + Sync {
    async fn run(&self) -> CycleResult;
}

#[async_trait]
impl ScrapeJob for ScrapePipeline {
    async fn run(&self) -> CycleResult {
        self.run_cycle().await
    }
}

/// Counters shared with the scheduler loop.
#[derive(Debug, Default)]
struct SchedulerStats {
    cycles_started: AtomicU64,
    cycles_skipped: AtomicU64,
}

/// Handle to the running loop.
struct Running {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Drives one `ScrapeJob` at a fixed interval.
///
/// Construct once per process and share behind an `Arc`.
pub struct ScrapeScheduler {
    job: Arc<dyn ScrapeJob>,
    interval: Duration,
    stats: Arc<SchedulerStats>,
    running: Mutex<Option<Running>>,
}

impl ScrapeScheduler {
    pub fn new(job: Arc<dyn ScrapeJob>, interval: Duration) -> Self {
        Self {
            job,
            interval,
            stats: Arc::new(SchedulerStats::default()),
            running: Mutex::new(None),
        }
    }

    /// Start the schedule. Returns `false` if it was already running.
    pub async fn start(&self) -> bool {
        let mut running = self.running.lock().await;
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            info!("Scheduler already running");
            return false;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(
            Arc::clone(&self.job),
            self.interval,
            Arc::clone(&self.stats),
            shutdown_rx,
        ));
        *running = Some(Running { shutdown, handle });

        info!(interval_secs = self.interval.as_secs(), "Scheduler started");
        true
    }

    /// Stop the schedule, waiting for any in-flight cycle to finish.
    pub async fn stop(&self) {
        let Some(Running { shutdown, handle }) = self.running.lock().await.take() else {
            return;
        };

        let _ = shutdown.send(true);
        if let Err(e) = handle.await {
            error!(error = %e, "Scheduler loop ended abnormally");
        }
        info!("Scheduler stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Cycles launched since construction.
    pub fn cycles_started(&self) -> u64 {
        self.stats.cycles_started.load(Ordering::Relaxed)
    }

    /// Ticks dropped because a cycle was still running.
    pub fn cycles_skipped(&self) -> u64 {
        self.stats.cycles_skipped.load(Ordering::Relaxed)
    }
}

async fn run_loop(
    job: Arc<dyn ScrapeJob>,
    interval: Duration,
    stats: Arc<SchedulerStats>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut in_flight: Option<JoinHandle<()>> = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if in_flight.as_ref().is_some_and(|h| !h.is_finished()) {
                    stats.cycles_skipped.fetch_add(1, Ordering::Relaxed);
                    warn!("Previous scrape cycle still running, skipping tick");
                    continue;
                }
                if let Some(finished) = in_flight.take() {
                    reap(finished).await;
                }

                stats.cycles_started.fetch_add(1, Ordering::Relaxed);
                in_flight = Some(tokio::spawn(run_guarded(Arc::clone(&job))));
            }
            _ = shutdown.changed() => break,
        }
    }

    if let Some(handle) = in_flight {
        info!("Waiting for in-flight scrape cycle");
        reap(handle).await;
    }
}

async fn reap(handle: JoinHandle<()>) {
    if let Err(e) = handle.await {
        error!(error = %e, "Scrape cycle task failed");
    }
}

/// Run one cycle, catching panics at the job boundary.
async fn run_guarded(job: Arc<dyn ScrapeJob>) {
    match AssertUnwindSafe(job.run()).catch_unwind().await {
        Ok(result) if result.errors.is_empty() => {
            info!(
                fetched = result.fetched,
                parsed = result.parsed,
                saved = result.saved,
                "Scheduled scrape cycle complete"
            );
        }
        Ok(result) => {
            warn!(
                stage = %result.stage,
                fetched = result.fetched,
                parsed = result.parsed,
                saved = result.saved,
                errors = result.errors.len(),
                "Scheduled scrape cycle completed with errors"
            );
        }
        Err(panic) => {
            error!(panic = panic_message(&*panic), "Scheduled scrape cycle panicked");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
