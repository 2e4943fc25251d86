//! ReconcileScheduler - Periodic background drain of the counter buffer
//!
//! A single tokio task owned by the application: started at init, stopped
//! at shutdown. Passes run inline in the loop, so one never starts while
//! the previous one is still draining. Missed ticks are delayed rather
//! than bunched, giving fixed-delay behavior.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{info, warn};
use viewbuf_domain::{BufferStore, DurableCounterStore};
use viewbuf_usecase::{PassOutcome, Reconciler};

/// Default delay between passes
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(180);

pub struct ReconcileScheduler<B, D> {
    reconciler: Arc<Reconciler<B, D>>,
    period: Duration,
    drain_on_shutdown: bool,
}

impl<B, D> ReconcileScheduler<B, D>
where
    B: BufferStore + 'static,
    D: DurableCounterStore + 'static,
{
    pub fn new(reconciler: Arc<Reconciler<B, D>>, period: Duration) -> Self {
        Self {
            reconciler,
            period,
            drain_on_shutdown: true,
        }
    }

    /// Whether `shutdown` runs one last pass (default: yes)
    pub fn with_drain_on_shutdown(mut self, drain: bool) -> Self {
        self.drain_on_shutdown = drain;
        self
    }

    /// Spawn the loop on the current tokio runtime
    pub fn start(self) -> SchedulerHandle<B, D> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let reconciler = Arc::clone(&self.reconciler);
        let task = tokio::spawn(self.run(shutdown_rx));

        SchedulerHandle {
            reconciler,
            shutdown_tx,
            task,
        }
    }

    async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(period_ms = millis(self.period), "reconcile scheduler started");

        let mut ticker = time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    log_outcome(&self.reconciler.run_pass().await);
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        if self.drain_on_shutdown {
            info!("running final reconciliation pass before shutdown");
            log_outcome(&self.reconciler.run_pass().await);
        }

        info!("reconcile scheduler stopped");
    }
}

fn millis(period: Duration) -> u64 {
    u64::try_from(period.as_millis()).unwrap_or(u64::MAX)
}

fn log_outcome(outcome: &PassOutcome) {
    match outcome {
        PassOutcome::Completed(report) if !report.is_clean() => {
            warn!(
                failed = report.failed,
                malformed = report.malformed,
                "reconciliation pass finished with problems"
            );
        }
        PassOutcome::Completed(_) => {}
        PassOutcome::SkippedBufferUnavailable { reason } => {
            warn!(%reason, "reconciliation pass skipped, will retry next period");
        }
        PassOutcome::SkippedBusy => {
            info!("reconciliation pass skipped, previous pass still running");
        }
    }
}

/// Handle to a running scheduler
pub struct SchedulerHandle<B, D> {
    reconciler: Arc<Reconciler<B, D>>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl<B, D> SchedulerHandle<B, D>
where
    B: BufferStore,
    D: DurableCounterStore,
{
    /// Run a pass now, outside the timer
    ///
    /// Returns `SkippedBusy` if the scheduled pass is mid-drain.
    pub async fn drain_now(&self) -> PassOutcome {
        self.reconciler.run_pass().await
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the loop and wait for it (and the final drain) to finish
    pub async fn shutdown(self) -> Result<(), JoinError> {
        // The receiver only goes away once the task has already exited.
        let _ = self.shutdown_tx.send(true);
        self.task.await
    }
}
