//! Routing table: path + method → handler.

use axum::extract::{DefaultBodyLimit, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use strata_protocol::CoreResult;

use crate::state::AppState;

pub mod jobs;
pub mod query;
pub mod queue;
pub mod schema;
pub mod upload;

pub fn router(state: AppState) -> Router {
    // The multipart handler enforces the real cap with a 400 while
    // streaming; the body limit above it only guards against unbounded
    // requests.
    let body_limit = (state.config.file_max_size as usize).saturating_mul(2);

    Router::new()
        .route("/api/v1/upload", post(upload::submit_upload))
        .route("/api/v1/jobs/:id", get(jobs::get_job))
        .route("/api/v1/jobs/:id/status", post(jobs::update_status))
        .route("/api/v1/query", post(query::submit_query))
        .route("/api/v1/query/:id", get(query::get_query))
        .route("/api/v1/schema/:project/:table", get(schema::request_schema))
        .route("/api/v1/queue/stats", get(queue::queue_stats))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Liveness plus a component snapshot: each external dependency gets a
/// cheap probe so operators see which one is down, not just that something
/// is.
async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let object_store = probe(
        "object_store",
        state.gateway.ping(&state.config.uploads_bucket).await,
    );
    let job_store = probe("job_store", state.jobs.ping().await);
    let bus = probe("bus", state.bus.stats().await);

    let status = if [object_store, job_store, bus].iter().all(|s| *s == "ok") {
        "ok"
    } else {
        "degraded"
    };
    Json(json!({
        "status": status,
        "components": {
            "object_store": object_store,
            "job_store": job_store,
            "bus": bus,
        },
    }))
}

fn probe<T>(name: &str, result: CoreResult<T>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(err) => {
            warn!("health probe '{}' failed: {}", name, err);
            "unavailable"
        }
    }
}
