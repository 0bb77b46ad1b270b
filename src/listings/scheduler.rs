use std::str::FromStr;
use std::sync::Arc;

use cron::Schedule;
use tokio::sync::RwLock;
use tokio::time::{sleep, Duration, Instant};
use tracing::{error, info, warn};

use super::refresh_cycle::{CycleOutcome, RefreshEngine};

/// Fires refresh cycles on a fixed cadence. Overlap protection lives in the
/// engine itself; a trigger landing mid-cycle is simply dropped there.
pub struct RefreshScheduler {
    engine: Arc<RefreshEngine>,
    cycle_interval: Duration,
    is_running: Arc<RwLock<bool>>,
    last_run: Arc<RwLock<Option<Instant>>>,
}

impl RefreshScheduler {
    pub fn new(engine: Arc<RefreshEngine>, cycle_interval: Duration) -> Self {
        Self {
            engine,
            cycle_interval,
            is_running: Arc::new(RwLock::new(false)),
            last_run: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn start(&self) {
        let mut is_running = self.is_running.write().await;
        if *is_running {
            warn!("refresh scheduler is already running");
            return;
        }
        *is_running = true;
        drop(is_running);

        info!(
            interval_secs = self.cycle_interval.as_secs(),
            "starting refresh scheduler"
        );

        let engine = Arc::clone(&self.engine);
        let is_running = Arc::clone(&self.is_running);
        let last_run = Arc::clone(&self.last_run);
        let interval = self.cycle_interval;

        tokio::spawn(async move {
            loop {
                {
                    let running = is_running.read().await;
                    if !*running {
                        info!("refresh scheduler stopped");
                        break;
                    }
                }

                match engine.run_cycle().await {
                    CycleOutcome::Completed(report) => {
                        info!(
                            new = report.new,
                            updated = report.updated,
                            "scheduled refresh cycle finished"
                        );
                    }
                    CycleOutcome::Skipped => {}
                    CycleOutcome::NoUsableFeeds => {
                        warn!("scheduled refresh cycle had no usable feeds");
                    }
                }
                *last_run.write().await = Some(Instant::now());

                sleep(interval).await;
            }
        });
    }

    pub async fn stop(&self) {
        let mut is_running = self.is_running.write().await;
        *is_running = false;
        info!("refresh scheduler stop requested");
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub async fn last_run_time(&self) -> Option<Instant> {
        *self.last_run.read().await
    }

    /// Trigger a cycle outside the cadence, e.g. at startup.
    pub async fn trigger_immediate_run(&self) -> CycleOutcome {
        info!("triggering immediate refresh cycle");
        let outcome = self.engine.run_cycle().await;
        *self.last_run.write().await = Some(Instant::now());
        outcome
    }
}

/// Cron-driven full-wipe rotation: clears the store on schedule and
/// immediately runs a repopulating cycle.
pub struct WipeScheduler {
    engine: Arc<RefreshEngine>,
    schedule: Schedule,
    is_running: Arc<RwLock<bool>>,
}

impl WipeScheduler {
    pub fn new(engine: Arc<RefreshEngine>, cron_expression: &str) -> anyhow::Result<Self> {
        let schedule = Schedule::from_str(cron_expression)?;
        Ok(Self {
            engine,
            schedule,
            is_running: Arc::new(RwLock::new(false)),
        })
    }

    pub async fn start(&self) {
        let mut is_running = self.is_running.write().await;
        if *is_running {
            warn!("wipe scheduler is already running");
            return;
        }
        *is_running = true;
        drop(is_running);

        info!("starting wipe-rotation scheduler");

        let engine = Arc::clone(&self.engine);
        let is_running = Arc::clone(&self.is_running);
        let schedule = self.schedule.clone();

        tokio::spawn(async move {
            loop {
                {
                    let running = is_running.read().await;
                    if !*running {
                        info!("wipe scheduler stopped");
                        break;
                    }
                }

                let now = chrono::Utc::now();
                let Some(next) = schedule.upcoming(chrono::Utc).next() else {
                    error!("no upcoming wipe rotation in schedule");
                    break;
                };
                let wait = (next - now).to_std().unwrap_or(Duration::from_secs(60));
                info!(at = %next, "next wipe rotation scheduled");
                sleep(wait).await;

                match engine.wipe_and_refresh().await {
                    CycleOutcome::Completed(report) => {
                        info!(new = report.new, "wipe rotation repopulated the store");
                    }
                    CycleOutcome::Skipped => {
                        warn!("wipe rotation repopulation skipped: cycle already running");
                    }
                    CycleOutcome::NoUsableFeeds => {
                        warn!("wipe rotation repopulation found no usable feeds");
                    }
                }
            }
        });
    }

    pub async fn stop(&self) {
        let mut is_running = self.is_running.write().await;
        *is_running = false;
        info!("wipe scheduler stop requested");
    }
}
