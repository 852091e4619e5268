//! Ingest executor: staged blob → typed Arrow batch → warehouse table.

use std::path::Path;
use tracing::info;

use strata_protocol::paths::table_name_for_upload;
use strata_protocol::{CoreError, CoreResult, JobStatus, UploadPayload};

use crate::context::WorkerContext;
use crate::infer;

/// Spreadsheet formats the reader never accepts.
const REJECTED_EXTENSIONS: [&str; 2] = ["xlsx", "xls"];

pub async fn run(ctx: &WorkerContext, job_id: &str, payload: &UploadPayload) -> CoreResult<()> {
    ctx.jobs
        .update(
            job_id,
            JobStatus::Processing,
            "Started processing upload",
            None,
        )
        .await?;

    reject_unsupported(&payload.file_name)?;

    // Per-job scratch space, removed on every exit path when the guard
    // drops.
    let scratch = tempfile::TempDir::new()
        .map_err(|e| CoreError::storage_with("create scratch dir", Box::new(e)))?;
    let local = scratch.path().join("upload.csv");
    ctx.gateway
        .get_to_file(&ctx.config.uploads_bucket, &payload.blob_path, &local)
        .await?;

    let table = table_name_for_upload(payload.table.as_deref(), &payload.file_name);
    let row_count = ingest_file(ctx, &local, &payload.project, &table).await?;

    ctx.jobs
        .update(
            job_id,
            JobStatus::Completed,
            format!(
                "Successfully processed {} rows into table {}.{}",
                row_count, payload.project, table
            ),
            None,
        )
        .await?;
    info!(
        "job {}: ingested {} rows into {}.{}",
        job_id, row_count, payload.project, table
    );
    Ok(())
}

async fn ingest_file(
    ctx: &WorkerContext,
    local: &Path,
    project: &str,
    table: &str,
) -> CoreResult<u64> {
    let parsed = infer::read_csv(local)?;
    let batch = infer::build_batch(&parsed)?;

    ctx.catalog.create_namespace_if_absent(project).await?;
    ctx.catalog.append(project, table, &[batch]).await
}

fn reject_unsupported(file_name: &str) -> CoreResult<()> {
    let extension = file_name
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    if REJECTED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(CoreError::invalid_input(format!(
            "unsupported file format '.{}'; upload CSV instead",
            extension
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spreadsheets_are_rejected_explicitly() {
        assert!(reject_unsupported("report.xlsx").is_err());
        assert!(reject_unsupported("REPORT.XLS").is_err());
        assert!(reject_unsupported("data.csv").is_ok());
        assert!(reject_unsupported("noextension").is_ok());
    }
}
