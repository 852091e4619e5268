//! Query executor: persisted spec → DataFusion plan → Parquet result blob
//! plus an inline JSON preview.
//!
//! The plan is built in a fixed order (filters, projection/aggregation,
//! ordering, pagination); every stage is a pure function over the prior
//! frame, and the relation is evaluated exactly once at the end.

use arrow::array::RecordBatch;
use arrow::datatypes::Schema;
use chrono::Utc;
use datafusion::error::DataFusionError;
use datafusion::functions_aggregate::expr_fn::{avg, count, max, min, sum};
use datafusion::functions_aggregate::first_last::{first_value_udaf, last_value_udaf};
use datafusion::logical_expr::SortExpr;
use datafusion::prelude::{col, lit, DataFrame, Expr};
use datafusion::scalar::ScalarValue;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use strata_protocol::paths::{query_result_path, table_name_for_upload};
use strata_protocol::{
    Aggregation, CoreError, CoreResult, Filter, FilterOp, JobResult, JobStatus, QueryPayload,
    QuerySpec,
};

use crate::context::WorkerContext;

pub async fn run(ctx: &WorkerContext, job_id: &str, payload: &QueryPayload) -> CoreResult<()> {
    ctx.jobs
        .update(job_id, JobStatus::Processing, "Started query execution", None)
        .await?;

    let spec: QuerySpec = serde_json::from_str(&payload.query_spec_json)
        .map_err(|e| CoreError::invalid_input(format!("malformed query spec: {}", e)))?;

    let (project, table) = resolve_source(ctx, &spec.source).await?;
    let frame = ctx.catalog.scan(&project, &table).await?;
    let frame = build_plan(frame, &spec)?;

    // Evaluate once; everything below works on the materialized batches.
    let schema = Arc::new(Schema::from(frame.schema()));
    let timeout = Duration::from_secs(ctx.config.query_timeout_seconds);
    let batches = tokio::time::timeout(timeout, frame.collect())
        .await
        .map_err(|_| {
            CoreError::timeout(format!(
                "query exceeded {}s deadline",
                ctx.config.query_timeout_seconds
            ))
        })?
        .map_err(df_err)?;
    let row_count: u64 = batches.iter().map(|b| b.num_rows() as u64).sum();

    let scratch = tempfile::TempDir::new()
        .map_err(|e| CoreError::storage_with("create scratch dir", Box::new(e)))?;
    let local = scratch.path().join("result.parquet");
    write_result_file(&local, schema, &batches)?;
    let file_size_bytes = std::fs::metadata(&local)
        .map_err(|e| CoreError::storage_with("stat result file", Box::new(e)))?
        .len();

    let result_key = query_result_path(
        &ctx.config.warehouse_path,
        &project,
        Utc::now().naive_utc(),
    );
    ctx.gateway
        .put_file(
            &ctx.config.warehouse_bucket,
            &result_key,
            &local,
            "application/octet-stream",
        )
        .await?;
    let result_path = format!("{}/{}", ctx.config.warehouse_bucket, result_key);

    let preview = preview_json(&batches, ctx.config.preview_max_rows)?;
    let result = JobResult {
        result_path: Some(result_path.clone()),
        row_count: Some(row_count),
        file_size_bytes: Some(file_size_bytes),
        preview: Some(preview),
        ..Default::default()
    };
    ctx.jobs
        .update(
            job_id,
            JobStatus::Completed,
            format!(
                "Query completed: {} rows, result stored at {}",
                row_count, result_path
            ),
            Some(result),
        )
        .await?;
    info!("job {}: query returned {} rows", job_id, row_count);
    Ok(())
}

/// Resolve a query source to `(project, table)`. A source that is not a
/// fully-qualified name is treated as an upload job id.
async fn resolve_source(ctx: &WorkerContext, source: &str) -> CoreResult<(String, String)> {
    if let Some((project, table)) = QuerySpec::split_source(source) {
        return Ok((project.to_string(), table.to_string()));
    }
    let record = ctx
        .jobs
        .get(source)
        .await?
        .ok_or_else(|| CoreError::not_found(format!("query source '{}'", source)))?;
    let upload = record.payload.as_upload().ok_or_else(|| {
        CoreError::invalid_input(format!("source job '{}' is not an upload", source))
    })?;
    let table = table_name_for_upload(upload.table.as_deref(), &upload.file_name);
    Ok((upload.project.clone(), table))
}

// ============================================================================
// Plan construction
// ============================================================================

/// Apply all stages in the fixed order.
pub fn build_plan(frame: DataFrame, spec: &QuerySpec) -> CoreResult<DataFrame> {
    let frame = apply_filters(frame, &spec.filters)?;
    let frame = apply_projection(frame, spec)?;
    let frame = apply_ordering(frame, spec)?;
    apply_pagination(frame, spec)
}

/// Conjunction of all recognizable filters. Unknown operators (and filters
/// missing their operand) are dropped with a warning, never an error.
pub fn apply_filters(frame: DataFrame, filters: &[Filter]) -> CoreResult<DataFrame> {
    let mut predicate: Option<Expr> = None;
    for filter in filters {
        match filter_expr(filter) {
            Some(expr) => {
                predicate = Some(match predicate {
                    Some(acc) => acc.and(expr),
                    None => expr,
                });
            }
            None => warn!(
                "dropping filter on '{}': unsupported operator '{}'",
                filter.column, filter.operator
            ),
        }
    }
    match predicate {
        Some(expr) => frame.filter(expr).map_err(df_err),
        None => Ok(frame),
    }
}

fn filter_expr(filter: &Filter) -> Option<Expr> {
    let op = filter.parsed_op().ok()?;
    let column = col(filter.column.as_str());
    let expr = match op {
        FilterOp::IsNull => column.is_null(),
        FilterOp::IsNotNull => column.is_not_null(),
        FilterOp::Between => {
            let low = value_expr(filter.value.as_ref()?);
            let high = value_expr(filter.value2.as_ref()?);
            column.between(low, high)
        }
        FilterOp::In => {
            let values = match filter.value.as_ref()? {
                serde_json::Value::Array(items) => items.iter().map(value_expr).collect(),
                single => vec![value_expr(single)],
            };
            column.in_list(values, false)
        }
        _ => {
            let operand = value_expr(filter.value.as_ref()?);
            match op {
                FilterOp::Eq => column.eq(operand),
                FilterOp::NotEq => column.not_eq(operand),
                FilterOp::Lt => column.lt(operand),
                FilterOp::LtEq => column.lt_eq(operand),
                FilterOp::Gt => column.gt(operand),
                FilterOp::GtEq => column.gt_eq(operand),
                FilterOp::Like => column.like(operand),
                _ => unreachable!("handled above"),
            }
        }
    };
    Some(expr)
}

fn value_expr(value: &serde_json::Value) -> Expr {
    match value {
        serde_json::Value::String(s) => lit(s.clone()),
        serde_json::Value::Bool(b) => lit(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                lit(i)
            } else if let Some(f) = n.as_f64() {
                lit(f)
            } else {
                lit(n.to_string())
            }
        }
        serde_json::Value::Null => Expr::Literal(ScalarValue::Null),
        other => lit(other.to_string()),
    }
}

/// Projection and aggregation. Any aggregation makes the non-aggregated
/// select entries the implicit grouping key; aliases rename outputs.
pub fn apply_projection(frame: DataFrame, spec: &QuerySpec) -> CoreResult<DataFrame> {
    if spec.select.is_empty() {
        return Ok(frame);
    }

    if !spec.has_aggregation() {
        // Plain projection; a bare `*` keeps the full relation.
        if spec.select.iter().any(|item| item.column == "*") {
            return Ok(frame);
        }
        let exprs = spec
            .select
            .iter()
            .map(|item| {
                let expr = col(item.column.as_str());
                match &item.alias {
                    Some(alias) => expr.alias(alias),
                    None => expr,
                }
            })
            .collect();
        return frame.select(exprs).map_err(df_err);
    }

    let group_exprs: Vec<Expr> = if spec.group_by.is_empty() {
        spec.select
            .iter()
            .filter(|item| item.aggregation.is_none() && item.column != "*")
            .map(|item| col(item.column.as_str()))
            .collect()
    } else {
        spec.group_by.iter().map(|name| col(name.as_str())).collect()
    };

    let mut agg_exprs = Vec::new();
    for item in &spec.select {
        let Some(agg) = item.parsed_aggregation().map_err(CoreError::invalid_input)? else {
            continue;
        };
        agg_exprs.push(aggregate_expr(agg, item)?);
    }

    let frame = frame.aggregate(group_exprs, agg_exprs).map_err(df_err)?;

    // Re-project to apply key aliases and restore the requested order.
    let mut output = Vec::new();
    for item in &spec.select {
        if item.aggregation.is_some() {
            output.push(col(aggregate_output_name(item)));
        } else if item.column != "*" {
            let expr = col(item.column.as_str());
            output.push(match &item.alias {
                Some(alias) => expr.alias(alias),
                None => expr,
            });
        }
    }
    frame.select(output).map_err(df_err)
}

fn aggregate_expr(
    agg: Aggregation,
    item: &strata_protocol::SelectItem,
) -> CoreResult<Expr> {
    let input = if item.column == "*" {
        if agg != Aggregation::Count {
            return Err(CoreError::invalid_input(format!(
                "aggregation '{}' requires a column",
                agg
            )));
        }
        lit(1i64)
    } else {
        col(item.column.as_str())
    };
    let expr = match agg {
        Aggregation::Sum => sum(input),
        Aggregation::Avg => avg(input),
        Aggregation::Count => count(input),
        Aggregation::Min => min(input),
        Aggregation::Max => max(input),
        Aggregation::First => first_value_udaf().call(vec![input]),
        Aggregation::Last => last_value_udaf().call(vec![input]),
    };
    Ok(expr.alias(aggregate_output_name(item)))
}

/// Output name of an aggregated entry: the alias when present, otherwise a
/// deterministic `<agg>_<column>` (plain `count` for `count(*)`).
fn aggregate_output_name(item: &strata_protocol::SelectItem) -> String {
    if let Some(alias) = &item.alias {
        return alias.clone();
    }
    let agg = item.aggregation.as_deref().unwrap_or_default().to_lowercase();
    if item.column == "*" {
        agg
    } else {
        format!("{}_{}", agg, item.column)
    }
}

pub fn apply_ordering(frame: DataFrame, spec: &QuerySpec) -> CoreResult<DataFrame> {
    if spec.order_by.is_empty() {
        return Ok(frame);
    }
    let sort_exprs: Vec<SortExpr> = spec
        .order_by
        .iter()
        .map(|order| {
            let ascending = order.parsed_direction() == strata_protocol::Direction::Asc;
            col(order.column.as_str()).sort(ascending, !ascending)
        })
        .collect();
    frame.sort(sort_exprs).map_err(df_err)
}

pub fn apply_pagination(frame: DataFrame, spec: &QuerySpec) -> CoreResult<DataFrame> {
    if spec.limit.is_none() && spec.offset.is_none() {
        return Ok(frame);
    }
    let skip = spec.offset.unwrap_or(0) as usize;
    let fetch = spec.limit.map(|l| l as usize);
    frame.limit(skip, fetch).map_err(df_err)
}

// ============================================================================
// Materialization
// ============================================================================

fn write_result_file(
    path: &std::path::Path,
    schema: Arc<Schema>,
    batches: &[RecordBatch],
) -> CoreResult<()> {
    let file = std::fs::File::create(path)
        .map_err(|e| CoreError::storage_with("create result file", Box::new(e)))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))
        .map_err(|e| CoreError::execution(format!("open result writer: {}", e)))?;
    for batch in batches {
        writer
            .write(batch)
            .map_err(|e| CoreError::execution(format!("write result: {}", e)))?;
    }
    writer
        .close()
        .map_err(|e| CoreError::execution(format!("close result writer: {}", e)))?;
    Ok(())
}

/// First `min(row_count, max_rows)` rows as a JSON array of objects keyed
/// by output column name.
pub fn preview_json(batches: &[RecordBatch], max_rows: usize) -> CoreResult<serde_json::Value> {
    let mut remaining = max_rows;
    let mut head = Vec::new();
    for batch in batches {
        if remaining == 0 {
            break;
        }
        let take = batch.num_rows().min(remaining);
        if take > 0 {
            head.push(batch.slice(0, take));
            remaining -= take;
        }
    }

    let mut buf = Vec::new();
    {
        let mut writer = arrow::json::ArrayWriter::new(&mut buf);
        let refs: Vec<&RecordBatch> = head.iter().collect();
        writer
            .write_batches(&refs)
            .map_err(|e| CoreError::execution(format!("encode preview: {}", e)))?;
        writer
            .finish()
            .map_err(|e| CoreError::execution(format!("finish preview: {}", e)))?;
    }
    if buf.is_empty() {
        return Ok(serde_json::Value::Array(Vec::new()));
    }
    serde_json::from_slice(&buf)
        .map_err(|e| CoreError::execution(format!("parse preview: {}", e)))
}

/// Categorize engine failures: transport problems stay retryable, planner
/// and execution problems are deterministic.
fn df_err(err: DataFusionError) -> CoreError {
    match err {
        DataFusionError::ObjectStore(source) => {
            CoreError::catalog_with("scan object store", Box::new(source))
        }
        DataFusionError::IoError(source) => CoreError::catalog_with("scan io", Box::new(source)),
        other => CoreError::execution(other.to_string()),
    }
}
