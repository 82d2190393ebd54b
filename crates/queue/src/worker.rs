use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::HandlerError;
use crate::store::{JobDisposition, JobQueue};

const REAPER_INTERVAL: Duration = Duration::from_secs(30);

/// Executes one job. Implemented by the orchestrator.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Run the job. An `Err` is an infra-level failure and consumes the
    /// job's retry budget; domain-level failures must be absorbed and
    /// recorded by the handler itself.
    async fn handle(&self, run_id: Uuid) -> Result<(), HandlerError>;

    /// Called once a job for this run is dead-lettered (retry or stall
    /// budget exhausted) so the run can be failed with a durable reason.
    async fn on_exhausted(&self, run_id: Uuid, reason: &str);
}

/// Pool of workers pulling jobs from a queue, plus a stall reaper.
pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn start(queue: JobQueue, handler: Arc<dyn JobHandler>, workers: usize) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut handles = Vec::with_capacity(workers + 1);

        for i in 0..workers {
            let queue = queue.clone();
            let handler = Arc::clone(&handler);
            let shutdown = shutdown_rx.clone();
            handles.push(tokio::spawn(async move {
                worker_loop(format!("worker-{i}"), queue, handler, shutdown).await;
            }));
        }

        let reaper_queue = queue.clone();
        let reaper_handler = Arc::clone(&handler);
        let reaper_shutdown = shutdown_rx;
        handles.push(tokio::spawn(async move {
            reaper_loop(reaper_queue, reaper_handler, reaper_shutdown).await;
        }));

        Self {
            shutdown_tx,
            handles,
        }
    }

    /// Signal all workers to stop and wait for in-flight jobs to settle.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

async fn worker_loop(
    name: String,
    queue: JobQueue,
    handler: Arc<dyn JobHandler>,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::debug!(worker = %name, "Worker started");
    loop {
        if *shutdown.borrow() {
            break;
        }

        match queue.lease(&name).await {
            Ok(Some(job)) => {
                tracing::info!(
                    worker = %name,
                    run_id = %job.run_id,
                    attempt = job.attempt,
                    "Job leased"
                );
                match handler.handle(job.run_id).await {
                    Ok(()) => {
                        if let Err(e) = queue.ack(job.id).await {
                            tracing::error!(worker = %name, error = %e, "Failed to ack job");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            worker = %name,
                            run_id = %job.run_id,
                            error = %e,
                            "Job execution failed"
                        );
                        match queue.nack(job.id, &e.to_string()).await {
                            Ok(JobDisposition::Dead) => {
                                handler.on_exhausted(job.run_id, &e.to_string()).await;
                            }
                            Ok(JobDisposition::Retry { delay }) => {
                                tracing::info!(
                                    run_id = %job.run_id,
                                    delay_secs = delay.as_secs(),
                                    "Job re-queued with backoff"
                                );
                            }
                            Err(e) => {
                                tracing::error!(worker = %name, error = %e, "Failed to nack job");
                            }
                        }
                    }
                }
            }
            Ok(None) => {
                tokio::select! {
                    _ = tokio::time::sleep(queue.config().poll_interval) => {}
                    _ = shutdown.changed() => {}
                }
            }
            Err(e) => {
                tracing::error!(worker = %name, error = %e, "Lease query failed");
                tokio::select! {
                    _ = tokio::time::sleep(queue.config().poll_interval) => {}
                    _ = shutdown.changed() => {}
                }
            }
        }
    }
    tracing::debug!(worker = %name, "Worker stopped");
}

async fn reaper_loop(
    queue: JobQueue,
    handler: Arc<dyn JobHandler>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(REAPER_INTERVAL) => {}
            _ = shutdown.changed() => {}
        }
        if *shutdown.borrow() {
            break;
        }

        match queue.reap_stalled().await {
            Ok(reaped) => {
                for job in reaped.iter().filter(|j| j.dead) {
                    handler
                        .on_exhausted(job.run_id, "stalled job exceeded redelivery limit")
                        .await;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Stall reaper failed");
            }
        }
    }
}
