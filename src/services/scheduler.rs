//! Periodic and on-demand pipeline runs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tracing::{info, warn};

use super::pipeline::{RunSummary, TenderPipeline};

/// Default pause between scheduled runs.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(7200);

/// What a scheduled run does and how often.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub interval: Duration,
    pub days_back: u32,
    pub max_pages: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            days_back: 7,
            max_pages: 10_000,
        }
    }
}

/// Drives a pipeline on an interval, plus manual triggers.
///
/// Runs never overlap: a trigger that arrives during a run starts another
/// run right after it, and several triggers during one run collapse into one.
pub struct Scheduler {
    pipeline: Arc<TenderPipeline>,
    config: ScheduleConfig,
    trigger: Arc<Notify>,
    shutdown: Arc<watch::Sender<bool>>,
    running: tokio::sync::Mutex<()>,
    last_summary: Mutex<Option<RunSummary>>,
    runs_completed: AtomicU64,
}

/// Cloneable remote control for a running scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    trigger: Arc<Notify>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl SchedulerHandle {
    /// Request an immediate run.
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    /// Stop the loop. A run in progress is abandoned.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}

impl Scheduler {
    pub fn new(pipeline: Arc<TenderPipeline>, config: ScheduleConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            pipeline,
            config,
            trigger: Arc::new(Notify::new()),
            shutdown: Arc::new(shutdown),
            running: tokio::sync::Mutex::new(()),
            last_summary: Mutex::new(None),
            runs_completed: AtomicU64::new(0),
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            trigger: self.trigger.clone(),
            shutdown: self.shutdown.clone(),
        }
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    /// Run the pipeline once with the scheduled parameters.
    pub async fn run_once(&self) -> RunSummary {
        let _running = self.running.lock().await;
        let summary = self
            .pipeline
            .run(self.config.days_back, self.config.max_pages)
            .await;

        match self.last_summary.lock() {
            Ok(mut last) => *last = Some(summary.clone()),
            Err(e) => warn!("Could not record run summary: {}", e),
        }
        self.runs_completed.fetch_add(1, Ordering::SeqCst);
        summary
    }

    /// Summary of the most recent finished run.
    pub fn last_summary(&self) -> Option<RunSummary> {
        self.last_summary.lock().ok().and_then(|last| last.clone())
    }

    pub fn runs_completed(&self) -> u64 {
        self.runs_completed.load(Ordering::SeqCst)
    }

    /// Run immediately, then on every interval tick or manual trigger until
    /// shut down.
    pub async fn run(&self) {
        let mut shutdown_rx = self.shutdown.subscribe();
        info!(
            "Scheduler started (every {}s)",
            self.config.interval.as_secs()
        );

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            tokio::select! {
                biased;
                _ = shutdown_rx.wait_for(|stop| *stop) => break,
                _ = self.run_once() => {}
            }

            info!(
                "Next run in {}s (or on trigger)",
                self.config.interval.as_secs()
            );

            tokio::select! {
                biased;
                _ = shutdown_rx.wait_for(|stop| *stop) => break,
                _ = self.trigger.notified() => info!("Manual run triggered"),
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }

        info!("Scheduler stopped");
    }
}
