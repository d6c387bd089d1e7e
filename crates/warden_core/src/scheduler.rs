#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::lease::{LeaseRegistry, LeaseSweepReport};
use crate::sticky::{StickyRegistry, StickySweepReport};

pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
	pub interval: Duration,
}

impl Default for SchedulerConfig {
	fn default() -> Self {
		Self {
			interval: DEFAULT_RECONCILE_INTERVAL,
		}
	}
}

/// Outcome of one reconciliation tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
	pub leases: LeaseSweepReport,
	pub stickies: StickySweepReport,
}

/// Fixed-interval driver for both registry sweeps.
#[derive(Debug, Clone)]
pub struct ReconcileScheduler {
	leases: Arc<LeaseRegistry>,
	stickies: Arc<StickyRegistry>,
}

impl ReconcileScheduler {
	pub fn new(leases: Arc<LeaseRegistry>, stickies: Arc<StickyRegistry>) -> Self {
		Self { leases, stickies }
	}

	/// Run one tick: leases first, then stickies.
	pub async fn run_once(&self) -> TickReport {
		let leases = self.leases.sweep().await;
		let stickies = self.stickies.sweep().await;

		metrics::counter!("warden_sweep_ticks_total").increment(1);
		let report = TickReport { leases, stickies };
		if leases.failed + stickies.failed > 0 {
			warn!(?report, "reconciliation tick finished with failures");
		} else {
			debug!(?report, "reconciliation tick finished");
		}
		report
	}

	/// Start ticking in the background. The first tick runs immediately.
	pub fn spawn(self, cfg: SchedulerConfig) -> SchedulerHandle {
		let interval = cfg.interval.max(Duration::from_millis(1));
		let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

		let task = tokio::spawn(async move {
			let mut ticker = tokio::time::interval(interval);
			ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
			info!(interval_secs = interval.as_secs_f64(), "reconcile scheduler started");

			loop {
				tokio::select! {
					_ = &mut shutdown_rx => break,
					_ = ticker.tick() => {
						self.run_once().await;
					}
				}
			}

			info!("reconcile scheduler stopped");
		});

		SchedulerHandle {
			shutdown_tx: Some(shutdown_tx),
			task,
		}
	}
}

/// Handle to a running scheduler.
#[derive(Debug)]
pub struct SchedulerHandle {
	shutdown_tx: Option<oneshot::Sender<()>>,
	task: JoinHandle<()>,
}

impl SchedulerHandle {
	/// Stop ticking. An in-flight tick is allowed to finish.
	pub async fn shutdown(mut self) {
		if let Some(tx) = self.shutdown_tx.take() {
			let _ = tx.send(());
		}
		if let Err(e) = self.task.await {
			warn!(error = %e, "reconcile scheduler task failed");
		}
	}

	pub fn is_running(&self) -> bool {
		!self.task.is_finished()
	}
}
