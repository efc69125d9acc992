//! Rotation Scheduler
//!
//! Background task that runs key maintenance on a fixed tick, independent of
//! request traffic.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::key_lifecycle::{KeyLifecycleManager, MaintenanceOutcome};
use crate::domain::KeyRepository;

pub struct RotationScheduler;

impl RotationScheduler {
    /// Run `manager.maintain()` every `interval` until `shutdown` turns true
    /// or its sender is dropped.
    ///
    /// Failed passes are logged and retried on the next tick.
    pub fn spawn<R>(
        manager: Arc<KeyLifecycleManager<R>>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()>
    where
        R: KeyRepository + 'static,
    {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_secs = interval.as_secs(), "Rotation scheduler started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match manager.maintain().await {
                            Ok(MaintenanceOutcome::Idle) => debug!("No key maintenance due"),
                            Ok(outcome) => info!(outcome = outcome.as_label(), "Key maintenance pass"),
                            Err(e) => warn!(error = %e, "Key maintenance failed, retrying next tick"),
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Rotation scheduler stopped");
        })
    }
}
