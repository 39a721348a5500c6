//! Renewal Scheduler
//!
//! Background task that re-runs the acquisition pipeline on a fixed
//! interval and installs whatever it finds.
//!
//! State machine: `Idle` until [`RenewalScheduler::start`], `Running` while
//! the task ticks, `Stopped` after [`RenewalScheduler::stop`]. A renewal
//! that is already running when stop is requested finishes first, so a
//! half-written staged file never gets installed.

use crate::application::{AcquisitionPipeline, LiveDatabase};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

pub struct RenewalScheduler {
    pipeline: Arc<AcquisitionPipeline>,
    live: Arc<LiveDatabase>,
    interval: Duration,
    state: SchedulerState,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl RenewalScheduler {
    pub fn new(
        pipeline: Arc<AcquisitionPipeline>,
        live: Arc<LiveDatabase>,
        interval: Duration,
    ) -> Self {
        Self {
            pipeline,
            live,
            interval,
            state: SchedulerState::Idle,
            stop_tx: None,
            task: None,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Start ticking. The first renewal runs one interval from now.
    ///
    /// Only valid from `Idle`; a zero interval leaves the scheduler idle.
    pub fn start(&mut self) {
        if self.state != SchedulerState::Idle {
            tracing::warn!("renewal scheduler already {:?}", self.state);
            return;
        }
        if self.interval.is_zero() {
            tracing::info!("database renewal disabled");
            return;
        }

        let (stop_tx, mut stop_rx) = oneshot::channel();
        let pipeline = self.pipeline.clone();
        let live = self.live.clone();
        let interval = self.interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        // Runs to completion even if stop is requested meanwhile
                        match pipeline.renew(&live).await {
                            Ok(true) => tracing::info!("database renewed"),
                            Ok(false) => tracing::debug!("database is up to date"),
                            Err(e) => tracing::error!("database renewal failed: {}", e),
                        }
                    }
                }
            }
            tracing::info!("renewal scheduler stopped");
        });

        tracing::info!("renewing database every {:?}", interval);
        self.stop_tx = Some(stop_tx);
        self.task = Some(task);
        self.state = SchedulerState::Running;
    }

    /// Stop the timer and wait for the background task to exit.
    pub async fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!("renewal task failed: {}", e);
            }
        }
        self.state = SchedulerState::Stopped;
    }
}
