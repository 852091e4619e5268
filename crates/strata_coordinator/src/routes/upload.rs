//! Upload submission: multipart file → staging blob → job → queue message.

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tracing::info;

use strata_protocol::paths::staging_path;
use strata_protocol::types::{new_job_id, JobPayload};
use strata_protocol::{CoreError, JobKind, JobMessage, JobRecord, UploadPayload};

use crate::error::ApiResult;
use crate::state::AppState;

pub async fn submit_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let scratch = tempfile::TempDir::new()
        .map_err(|e| CoreError::storage_with("create scratch dir", Box::new(e)))?;
    let spooled = scratch.path().join("upload.part");

    let mut file: Option<(u64, String)> = None;
    let mut user: Option<String> = None;
    let mut project: Option<String> = None;
    let mut table: Option<String> = None;
    let mut file_name_field: Option<String> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| CoreError::invalid_input(format!("malformed multipart body: {}", e)))?
    {
        match field.name() {
            Some("file") => {
                let original = field
                    .file_name()
                    .filter(|name| !name.is_empty())
                    .unwrap_or("upload.csv")
                    .to_string();
                let size = spool_field(&state, &mut field, &spooled).await?;
                file = Some((size, original));
            }
            Some("user") => user = Some(read_text(field).await?),
            Some("project") => project = Some(read_text(field).await?),
            Some("table") => table = Some(read_text(field).await?),
            Some("file_name") => file_name_field = Some(read_text(field).await?),
            _ => {}
        }
    }

    let (file_size, original_name) =
        file.ok_or_else(|| CoreError::invalid_input("multipart field 'file' is required"))?;
    let project = project
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| CoreError::invalid_input("field 'project' is required"))?;
    let file_name = file_name_field
        .filter(|n| !n.trim().is_empty())
        .unwrap_or(original_name);

    let id = new_job_id();
    let blob_path = staging_path(&id, &file_name);

    // Order matters: blob, then job record, then message. A consumer can
    // only ever see a message whose job and blob already exist.
    state
        .gateway
        .put_file(&state.config.uploads_bucket, &blob_path, &spooled, "text/csv")
        .await?;

    let payload = UploadPayload {
        user,
        project,
        table,
        file_name,
        blob_path,
        file_size,
    };
    let record = JobRecord::queued(JobKind::Upload, &id, JobPayload::Upload(payload.clone()));
    state.jobs.create(&record).await?;
    state
        .enqueue(&JobMessage::Upload {
            id: id.clone(),
            payload,
        })
        .await?;

    info!("upload accepted: job {} ({} bytes)", id, file_size);
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "id": id, "status": "queued" })),
    ))
}

/// Stream the file part to disk, rejecting it as soon as the configured
/// size cap is crossed.
async fn spool_field(
    state: &AppState,
    field: &mut axum::extract::multipart::Field<'_>,
    dest: &std::path::Path,
) -> Result<u64, CoreError> {
    let mut out = tokio::fs::File::create(dest)
        .await
        .map_err(|e| CoreError::storage_with("spool upload", Box::new(e)))?;
    let mut size: u64 = 0;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| CoreError::invalid_input(format!("read multipart file: {}", e)))?
    {
        size += chunk.len() as u64;
        if size > state.config.file_max_size {
            return Err(CoreError::invalid_input(format!(
                "file exceeds maximum size of {} bytes",
                state.config.file_max_size
            )));
        }
        out.write_all(&chunk)
            .await
            .map_err(|e| CoreError::storage_with("spool upload", Box::new(e)))?;
    }
    out.flush()
        .await
        .map_err(|e| CoreError::storage_with("spool upload", Box::new(e)))?;
    Ok(size)
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, CoreError> {
    field
        .text()
        .await
        .map_err(|e| CoreError::invalid_input(format!("read multipart field: {}", e)))
}
