// Periodic scheduler — runs each manager's maintenance job on its own fixed
// interval, independent of and concurrent with the ingestion pipeline.
//
// The task body awaits periodic_task() inline inside the interval loop, so
// two firings of the same algorithm's job can never overlap: a slow run
// delays the next tick instead of racing it.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::algos::AlgoRegistry;

/// Spawn one background loop per registered manager. Returns the task
/// handles so the caller can abort them on shutdown.
pub fn spawn_periodic_tasks(registry: &Arc<AlgoRegistry>) -> Vec<JoinHandle<()>> {
    registry
        .managers()
        .iter()
        .map(|manager| {
            let manager = manager.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(manager.interval());
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // The first tick fires immediately; skip it so the daemon
                // ingests for one interval before the first maintenance run.
                interval.tick().await;

                info!(
                    algo = manager.name(),
                    interval_secs = manager.interval().as_secs(),
                    "Periodic task scheduled"
                );

                loop {
                    interval.tick().await;
                    if let Err(e) = manager.periodic_task().await {
                        // Failed runs are retried at the next interval.
                        error!(algo = manager.name(), error = %e, "Periodic task failed");
                    }
                }
            })
        })
        .collect()
}
