//! Schema executor: table metadata → column list preview. No data scan.

use tracing::{info, warn};

use strata_protocol::{CoreError, CoreResult, JobResult, JobStatus, SchemaPayload};

use crate::context::WorkerContext;

pub async fn run(ctx: &WorkerContext, job_id: &str, payload: &SchemaPayload) -> CoreResult<()> {
    ctx.jobs
        .update(
            job_id,
            JobStatus::Processing,
            "Started schema retrieval",
            None,
        )
        .await?;

    let columns = match ctx.catalog.schema(&payload.project, &payload.table).await {
        Ok(columns) => columns,
        Err(CoreError::NotFound(cause)) => {
            // Terminal and deterministic; the executor owns the exact
            // wording, so the job is failed here and the delivery acked.
            let message = failure_message(&cause);
            warn!("job {}: {}", job_id, message);
            ctx.jobs
                .update(job_id, JobStatus::Failed, message, None)
                .await?;
            return Ok(());
        }
        Err(other) => return Err(other),
    };

    let count = columns.len();
    let preview = serde_json::to_value(&columns)
        .map_err(|e| CoreError::execution(format!("encode schema preview: {}", e)))?;
    let result = JobResult {
        result_path: None,
        row_count: None,
        file_size_bytes: Some(0),
        preview: Some(preview),
        columns: Some(columns),
        count: Some(count),
    };

    ctx.jobs
        .update(
            job_id,
            JobStatus::Completed,
            format!(
                "Schema retrieved: {} columns from table {}.{}",
                count, payload.project, payload.table
            ),
            Some(result),
        )
        .await?;
    info!(
        "job {}: schema of {}.{} has {} columns",
        job_id, payload.project, payload.table, count
    );
    Ok(())
}

fn failure_message(cause: &str) -> String {
    format!("Failed to retrieve schema: {}", cause)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_table_message_matches_the_contract_wording() {
        // The catalog reports a missing table as "table <project>.<table>";
        // the persisted job message must carry the exact prefix with no
        // error-variant decoration in front of it.
        let message = failure_message("table p1.missing");
        assert_eq!(message, "Failed to retrieve schema: table p1.missing");
        assert!(message.starts_with("Failed to retrieve schema: "));
    }
}
