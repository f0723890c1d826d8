//! Periodic publish of every artifact.
//!
//! On each tick the scheduler fans out write tasks to all Prometheus
//! queues so hosts converge on the stored state even when no change event
//! reached them.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::publish::PublishService;

pub struct PublishScheduler {
    publish: Arc<PublishService>,
    interval: Duration,
}

impl PublishScheduler {
    pub fn new(publish: Arc<PublishService>, interval: Duration) -> Self {
        Self { publish, interval }
    }

    pub fn is_enabled(&self) -> bool {
        !self.interval.is_zero()
    }

    /// Spawn the tick loop. Returns `None` when the interval is zero.
    pub fn start(self: Arc<Self>, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        if !self.is_enabled() {
            info!("Periodic publish disabled");
            return None;
        }

        Some(tokio::spawn(async move {
            info!(interval_secs = self.interval.as_secs(), "Publish scheduler started");
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick is immediate; startup already scheduled a publish.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Publish scheduler shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.publish.schedule(None).await {
                            warn!(error = %e, "Periodic publish failed");
                        }
                    }
                }
            }
        }))
    }
}
