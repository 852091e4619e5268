//! Job status reads and the internal status-update surface.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use strata_protocol::{CoreError, JobRecord, JobStatus};

use crate::error::ApiResult;
use crate::state::AppState;

/// Serves all three job kinds; clients need not know the kind in advance.
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobRecord>> {
    let record = state
        .jobs
        .get(&id)
        .await?
        .ok_or_else(|| CoreError::not_found(format!("job '{}'", id)))?;
    Ok(Json(record))
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Internal writer surface for non-worker collaborators. Idempotent: an
/// unknown id is logged and still answered with 200.
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<StatusUpdateRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let status = parse_updatable_status(&request.status)?;
    let message = request.message.unwrap_or_else(|| status.to_string());

    if state.jobs.get(&id).await?.is_none() {
        warn!("status update for unknown job {}", id);
    } else {
        state.jobs.update(&id, status, message, None).await?;
    }
    Ok(Json(json!({ "id": id, "status": status.to_string() })))
}

/// Only worker-side transitions are accepted here; `queued` belongs to the
/// coordinator alone.
fn parse_updatable_status(raw: &str) -> Result<JobStatus, CoreError> {
    match raw.parse::<JobStatus>() {
        Ok(JobStatus::Queued) | Err(_) => Err(CoreError::invalid_input(format!(
            "status must be one of processing, completed, failed (got '{}')",
            raw
        ))),
        Ok(status) => Ok(status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_worker_statuses_only() {
        assert_eq!(
            parse_updatable_status("processing").unwrap(),
            JobStatus::Processing
        );
        assert_eq!(
            parse_updatable_status("COMPLETED").unwrap(),
            JobStatus::Completed
        );
        assert_eq!(parse_updatable_status("failed").unwrap(), JobStatus::Failed);

        assert!(parse_updatable_status("queued").is_err());
        assert!(parse_updatable_status("running").is_err());
        assert!(parse_updatable_status("").is_err());
    }
}
