//! Background task removing expired drafts.

use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::drafts::DraftLifecycleManager;

/// Sweep once right away, then every `every`. Abort the handle to stop.
pub fn spawn(drafts: DraftLifecycleManager, clock: Arc<dyn Clock>, every: Duration) -> JoinHandle<()> {
    info!("Draft sweeper running every {}s", every.as_secs());
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let removed = drafts.sweep(clock.now());
            debug!("Sweep pass removed {} drafts", removed);
        }
    })
}
