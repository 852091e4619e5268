//! Query submission and query-status reads.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use strata_protocol::defaults::TIMESTAMP_FORMAT;
use strata_protocol::paths::table_name_for_upload;
use strata_protocol::types::{new_job_id, JobPayload};
use strata_protocol::{
    CoreError, JobKind, JobMessage, JobRecord, QueryPayload, QuerySpec,
};

use crate::error::ApiResult;
use crate::state::{check_status_at, AppState};

pub async fn submit_query(
    State(state): State<AppState>,
    Json(raw): Json<serde_json::Value>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let mut spec: QuerySpec = serde_json::from_value(raw)
        .map_err(|e| CoreError::invalid_input(format!("malformed query spec: {}", e)))?;
    spec.validate()?;

    // A source that is not `project.table` is an upload job id; rewrite it
    // so the worker never needs the submitting job's record.
    if QuerySpec::split_source(&spec.source).is_none() {
        let record = state
            .jobs
            .get(&spec.source)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("source job '{}'", spec.source)))?;
        let upload = record.payload.as_upload().ok_or_else(|| {
            CoreError::invalid_input(format!("source job '{}' is not an upload", spec.source))
        })?;
        let table = table_name_for_upload(upload.table.as_deref(), &upload.file_name);
        spec.source = format!("{}.{}", upload.project, table);
    }

    let id = new_job_id();
    let payload = QueryPayload {
        source: spec.source.clone(),
        query_spec_json: serde_json::to_string(&spec)
            .map_err(|e| CoreError::invalid_input(format!("serialize query spec: {}", e)))?,
    };
    let record = JobRecord::queued(JobKind::Query, &id, JobPayload::Query(payload.clone()));
    state.jobs.create(&record).await?;
    state
        .enqueue(&JobMessage::Query {
            id: id.clone(),
            payload,
        })
        .await?;

    info!("query accepted: job {} on {}", id, spec.source);
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "id": id,
            "status": "queued",
            "check_status_at": check_status_at(&id),
        })),
    ))
}

/// Query job record with the result fields flattened, the shape the
/// dashboard polls for.
#[derive(Debug, Serialize)]
pub struct QueryStatusResponse {
    pub id: String,
    pub status: String,
    pub message: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_data: Option<serde_json::Value>,
}

impl From<JobRecord> for QueryStatusResponse {
    fn from(record: JobRecord) -> Self {
        let result = record.result.unwrap_or_default();
        Self {
            id: record.id,
            status: record.status.to_string(),
            message: record.message,
            created_at: format_ts(record.created_at),
            updated_at: format_ts(record.updated_at),
            result_path: result.result_path,
            row_count: result.row_count,
            file_size_bytes: result.file_size_bytes,
            result_data: result.preview,
        }
    }
}

fn format_ts(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub async fn get_query(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<QueryStatusResponse>> {
    let record = state
        .jobs
        .get(&id)
        .await?
        .ok_or_else(|| CoreError::not_found(format!("job '{}'", id)))?;
    Ok(Json(record.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_protocol::{JobResult, JobStatus};

    #[test]
    fn response_flattens_result_fields() {
        let mut record = JobRecord::queued(
            JobKind::Query,
            "q1",
            JobPayload::Query(QueryPayload {
                source: "p1.t1".into(),
                query_spec_json: "{}".into(),
            }),
        );
        record.status = JobStatus::Completed;
        record.result = Some(JobResult {
            result_path: Some("warehouse/wh/p1/queries/query_x/result.parquet".into()),
            row_count: Some(5),
            file_size_bytes: Some(1234),
            preview: Some(serde_json::json!([{"a": 1}])),
            ..Default::default()
        });

        let response = QueryStatusResponse::from(record);
        assert_eq!(response.status, "completed");
        assert_eq!(response.row_count, Some(5));
        assert!(response.result_path.unwrap().ends_with("result.parquet"));
        assert_eq!(response.result_data.unwrap()[0]["a"], 1);
        assert_eq!(response.created_at.len(), 19);
    }
}
