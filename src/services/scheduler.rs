use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::store::Store;

/// Periodic background sync: drains the pending-completion queue against
/// the backend and runs cache housekeeping. An error leaves the queue
/// intact and the loop running.
pub struct SyncScheduler {
    store: Arc<Store>,
    interval: Duration,
}

impl SyncScheduler {
    pub fn new(store: Arc<Store>, interval_secs: u64) -> Self {
        Self {
            store,
            interval: Duration::from_secs(interval_secs),
        }
    }

    pub async fn start(self) {
        info!("starting background sync (interval: {:?})", self.interval);

        loop {
            tokio::time::sleep(self.interval).await;

            match self.store.sync_pending().await {
                Ok(0) => {}
                Ok(confirmed) => info!("background sync confirmed {} lesson(s)", confirmed),
                Err(e) => warn!("background sync failed, queue preserved: {}", e),
            }

            let swept = self.store.sweep_expired();
            if swept > 0 {
                debug!("swept {} expired cache entries", swept);
            }
        }
    }
}
