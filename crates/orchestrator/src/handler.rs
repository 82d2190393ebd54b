use std::sync::Arc;

use async_trait::async_trait;
use queue::{HandlerError, JobHandler};
use uuid::Uuid;

use crate::orchestrator::ScanOrchestrator;

/// Bridges the job queue to the orchestrator.
///
/// `handle` surfaces only infra-level errors (store/queue unavailability);
/// agent failures are absorbed and recorded inside `execute`, so a flaky
/// agent cannot burn the job's retry budget.
pub struct ScanJobHandler {
    orchestrator: Arc<ScanOrchestrator>,
}

impl ScanJobHandler {
    pub fn new(orchestrator: Arc<ScanOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl JobHandler for ScanJobHandler {
    async fn handle(&self, run_id: Uuid) -> Result<(), HandlerError> {
        self.orchestrator
            .execute(run_id)
            .await
            .map_err(|e| HandlerError(e.to_string()))
    }

    async fn on_exhausted(&self, run_id: Uuid, reason: &str) {
        let reason = format!("job retries exhausted: {reason}");
        if let Err(e) = self.orchestrator.fail_run(run_id, &reason).await {
            tracing::error!(run_id = %run_id, error = %e, "Failed to mark exhausted run as failed");
        }
    }
}
