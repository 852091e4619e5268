//! Dispatcher: owns the consuming channel, routes deliveries by kind, and
//! converts executor errors into a terminal-state write plus an ack/nack
//! decision.
//!
//! Requeue policy: transient transport errors nack with requeue so a later
//! attempt can succeed (the job stays `processing`); deterministic input and
//! execution errors mark the job `failed` and nack without requeue. The
//! category comes from the error variant, never from message text.

use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicNackOptions};
use std::sync::Arc;
use tracing::{error, info, warn};

use strata_protocol::{CoreResult, JobMessage, JobStatus};

use crate::context::WorkerContext;
use crate::{ingest, query, schema};

pub struct Dispatcher {
    ctx: Arc<WorkerContext>,
    consumer_tag: String,
}

impl Dispatcher {
    pub fn new(ctx: Arc<WorkerContext>, consumer_tag: impl Into<String>) -> Self {
        Self {
            ctx,
            consumer_tag: consumer_tag.into(),
        }
    }

    /// Consume until the process is stopped. A broken consumer stream
    /// triggers a reconnect with backoff; unacked deliveries are redelivered
    /// by the broker.
    pub async fn run(&self) {
        loop {
            let mut consumer = match self.ctx.bus.consume(&self.consumer_tag).await {
                Ok(consumer) => consumer,
                Err(e) => {
                    warn!("cannot open consumer: {}", e);
                    self.ctx.bus.reconnect().await;
                    continue;
                }
            };
            info!("Consuming from '{}'", self.ctx.bus.queue_name());

            while let Some(delivery) = consumer.next().await {
                match delivery {
                    Ok(delivery) => self.handle_delivery(delivery).await,
                    Err(e) => {
                        warn!("consumer stream error: {}", e);
                        break;
                    }
                }
            }

            warn!("consumer stream ended, reconnecting");
            self.ctx.bus.reconnect().await;
        }
    }

    async fn handle_delivery(&self, delivery: Delivery) {
        match parse_message(&delivery.data) {
            Ok(message) => {
                let id = message.id().to_string();
                match self.execute(&message).await {
                    Ok(()) => ack(&delivery).await,
                    Err(err) if err.is_transient() => {
                        // Leave the job `processing`; a later delivery may
                        // succeed against a recovered dependency.
                        warn!("job {}: transient failure, requeueing: {}", id, err);
                        nack(&delivery, true).await;
                    }
                    Err(err) => {
                        error!("job {}: failed: {}", id, err);
                        self.mark_failed(&id, err.job_message()).await;
                        nack(&delivery, false).await;
                    }
                }
            }
            Err(parse_err) => {
                warn!("undeliverable message: {}", parse_err.reason);
                if let Some(id) = parse_err.id {
                    self.mark_failed(&id, parse_err.reason.clone()).await;
                }
                nack(&delivery, false).await;
            }
        }
    }

    async fn execute(&self, message: &JobMessage) -> CoreResult<()> {
        match message {
            JobMessage::Upload { id, payload } => ingest::run(&self.ctx, id, payload).await,
            JobMessage::Query { id, payload } => query::run(&self.ctx, id, payload).await,
            JobMessage::Schema { id, payload } => schema::run(&self.ctx, id, payload).await,
        }
    }

    async fn mark_failed(&self, id: &str, message: String) {
        if let Err(e) = self
            .ctx
            .jobs
            .update(id, JobStatus::Failed, message, None)
            .await
        {
            // The terminal write itself failed; the record will expire.
            error!("job {}: could not persist failure: {}", id, e);
        }
    }
}

async fn ack(delivery: &Delivery) {
    if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
        error!("ack failed: {}", e);
    }
}

async fn nack(delivery: &Delivery, requeue: bool) {
    let options = BasicNackOptions {
        requeue,
        ..Default::default()
    };
    if let Err(e) = delivery.nack(options).await {
        error!("nack failed: {}", e);
    }
}

// ============================================================================
// Message parsing
// ============================================================================

/// Parse failure with the best-effort extracted id, so the job can still be
/// marked `failed` before the nack.
#[derive(Debug)]
pub struct MessageError {
    pub id: Option<String>,
    pub reason: String,
}

/// Lenient decode: unknown fields are tolerated; an unknown or missing
/// `kind` is reported with whatever `id` the raw JSON carries.
pub fn parse_message(data: &[u8]) -> Result<JobMessage, MessageError> {
    match serde_json::from_slice::<JobMessage>(data) {
        Ok(message) => Ok(message),
        Err(_) => {
            let raw: serde_json::Value = serde_json::from_slice(data).map_err(|e| MessageError {
                id: None,
                reason: format!("invalid message payload: {}", e),
            })?;
            let id = raw
                .get("id")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
            let reason = match raw.get("kind").and_then(|v| v.as_str()) {
                Some(kind) if kind.parse::<strata_protocol::JobKind>().is_ok() => {
                    format!("malformed {} payload", kind)
                }
                Some(kind) => format!("unknown kind: {}", kind),
                None => "unknown kind: <missing>".to_string(),
            };
            Err(MessageError { id, reason })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_protocol::JobKind;

    #[test]
    fn parses_known_kinds() {
        let msg = parse_message(
            br#"{"kind":"upload","id":"j1","project":"p1","file_name":"a.csv","blob_path":"uploads/j1/a.csv","file_size":12}"#,
        )
        .unwrap();
        assert_eq!(msg.kind(), JobKind::Upload);
        assert_eq!(msg.id(), "j1");
    }

    #[test]
    fn unknown_kind_still_surfaces_the_id() {
        let err = parse_message(br#"{"kind":"compact","id":"j9"}"#).unwrap_err();
        assert_eq!(err.id.as_deref(), Some("j9"));
        assert!(err.reason.contains("unknown kind: compact"));
    }

    #[test]
    fn missing_kind_is_reported() {
        let err = parse_message(br#"{"id":"j9"}"#).unwrap_err();
        assert_eq!(err.id.as_deref(), Some("j9"));
        assert!(err.reason.contains("unknown kind"));
    }

    #[test]
    fn garbage_has_no_id() {
        let err = parse_message(b"not json").unwrap_err();
        assert!(err.id.is_none());
    }

    #[test]
    fn malformed_payload_with_valid_kind_keeps_the_id() {
        // Known kind but missing required payload fields.
        let err = parse_message(br#"{"kind":"upload","id":"j2"}"#).unwrap_err();
        assert_eq!(err.id.as_deref(), Some("j2"));
        assert!(err.reason.contains("malformed upload payload"));
    }
}
