//! Schema discovery submission.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;
use tracing::info;

use strata_protocol::types::{new_job_id, JobPayload};
use strata_protocol::{JobKind, JobMessage, JobRecord, SchemaPayload};

use crate::error::ApiResult;
use crate::state::{check_status_at, AppState};

pub async fn request_schema(
    State(state): State<AppState>,
    Path((project, table)): Path<(String, String)>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let id = new_job_id();
    let payload = SchemaPayload { project, table };
    let record = JobRecord::queued(JobKind::Schema, &id, JobPayload::Schema(payload.clone()));
    state.jobs.create(&record).await?;
    state
        .enqueue(&JobMessage::Schema {
            id: id.clone(),
            payload,
        })
        .await?;

    info!("schema request accepted: job {}", id);
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "id": id,
            "status": "queued",
            "check_status_at": check_status_at(&id),
        })),
    ))
}
