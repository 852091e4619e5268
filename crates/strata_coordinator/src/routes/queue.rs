//! Queue health read-through.

use axum::extract::State;
use axum::Json;
use serde_json::json;
use tracing::warn;

use crate::state::AppState;

pub async fn queue_stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    match state.bus.stats().await {
        Ok(stats) => Json(json!(stats)),
        Err(err) => {
            warn!("queue stats unavailable: {}", err);
            Json(json!({
                "queue_name": state.bus.queue_name(),
                "message_count": 0,
                "consumer_count": 0,
                "status": "disconnected",
            }))
        }
    }
}
