use crate::manager::{LifecycleError, LifecycleManager};
use anyhow::ensure;
use chrono::Utc;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    pub poll_interval: Duration,
    pub max_concurrent: usize,
    pub stalled_after: Duration,
    pub archive_after: Duration,
}

/// Polls the store for claimable requests and processes them in the background.
pub struct Dispatcher {
    manager: Arc<LifecycleManager>,
    semaphore: Arc<Semaphore>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(
        manager: Arc<LifecycleManager>,
        config: DispatcherConfig,
    ) -> Result<Self, anyhow::Error> {
        ensure!(
            !config.poll_interval.is_zero(),
            "poll interval must be greater than zero"
        );
        ensure!(
            config.max_concurrent > 0,
            "at least one concurrent worker is required"
        );
        Ok(Dispatcher {
            manager,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent)),
            config,
        })
    }

    /// Runs until the task is aborted.
    pub async fn run(self) {
        info!(
            "dispatching feedback requests every {:?} with {} workers",
            self.config.poll_interval, self.config.max_concurrent
        );
        let mut interval = tokio::time::interval(self.config.poll_interval);
        loop {
            interval.tick().await;
            if let Err(err) = self.housekeeping().await {
                error!("housekeeping failed: {err}");
            }
            if let Err(err) = self.dispatch().await {
                error!("failed to dispatch pending feedback requests: {err}");
            }
        }
    }

    async fn housekeeping(&self) -> Result<(), LifecycleError> {
        self.manager
            .reclaim_stalled(self.config.stalled_after)
            .await?;
        if let Ok(age) = chrono::Duration::from_std(self.config.archive_after) {
            if let Some(cutoff) = Utc::now().checked_sub_signed(age) {
                self.manager.archive_completed_before(cutoff).await?;
            }
        }
        Ok(())
    }

    /// Spawns one task per claimable request, up to the number of free workers.
    pub async fn dispatch(&self) -> Result<Vec<JoinHandle<()>>, LifecycleError> {
        let free = self.semaphore.available_permits();
        if free == 0 {
            return Ok(vec![]);
        }

        let work = self.manager.pending_work(free as u64).await?;
        let mut handles = Vec::with_capacity(work.len());
        for request in work {
            let Ok(permit) = self.semaphore.clone().acquire_owned().await else {
                break;
            };
            let manager = self.manager.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                match manager.process(request.id).await {
                    Ok(done) => debug!(
                        "feedback request {} finished attempt {} as {:?}",
                        done.id, done.processing_attempts, done.status
                    ),
                    Err(LifecycleError::InvalidState { id, status, .. }) => {
                        debug!("feedback request {id} was claimed elsewhere, now {status:?}")
                    }
                    Err(err) => warn!("failed to process feedback request {}: {err}", request.id),
                }
            }));
        }
        Ok(handles)
    }
}
