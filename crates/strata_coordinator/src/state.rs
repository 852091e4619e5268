//! Shared request state: handles on the external stores, nothing mutable.

use std::sync::Arc;
use tracing::error;

use strata_bus::MessageBus;
use strata_protocol::{CoreResult, JobMessage, JobStatus, SystemConfig};
use strata_state_store::JobStore;
use strata_store::ObjectStoreGateway;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<SystemConfig>,
    pub gateway: ObjectStoreGateway,
    pub jobs: JobStore,
    pub bus: Arc<MessageBus>,
}

impl AppState {
    /// Enqueue the work message for an already-created job. When the
    /// publish fails the job is marked `failed` first, so no accepted
    /// submission is left dangling in `queued`.
    pub async fn enqueue(&self, message: &JobMessage) -> CoreResult<()> {
        let payload = serde_json::to_vec(message)
            .map_err(|e| strata_protocol::CoreError::bus_with("encode message", Box::new(e)))?;
        if let Err(err) = self.bus.publish(&payload).await {
            let id = message.id();
            error!("enqueue failed for job {}: {}", id, err);
            if let Err(mark) = self
                .jobs
                .update(id, JobStatus::Failed, "bus_error", None)
                .await
            {
                error!("could not mark job {} failed after enqueue error: {}", id, mark);
            }
            return Err(err);
        }
        Ok(())
    }
}

/// Poll location returned with every 202.
pub fn check_status_at(id: &str) -> String {
    format!("/api/v1/jobs/{}", id)
}
