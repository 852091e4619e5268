//! Message bus adapter: one durable queue on RabbitMQ.
//!
//! Contract: persistent messages, manual ack, nack with a requeue flag,
//! redelivery guaranteed by the broker. One connection per process, one
//! channel per dispatcher. Reconnection uses bounded-exponential backoff and
//! keeps trying while the broker is down; a publish only retries once so the
//! HTTP path can surface a 500 instead of hanging.

use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, ConfirmSelectOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer,
};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

use strata_protocol::defaults::BUS_RECONNECT_BACKOFF_SECONDS;
use strata_protocol::{CoreError, CoreResult};

/// Persistent delivery mode per the AMQP spec.
const DELIVERY_MODE_PERSISTENT: u8 = 2;

#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Full AMQP URI, including heartbeat/connect-timeout query params.
    pub uri: String,
    pub queue_name: String,
}

/// Queue health snapshot for the stats surface.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub queue_name: String,
    pub message_count: u32,
    pub consumer_count: u32,
    pub status: String,
}

struct BusState {
    connection: Connection,
    channel: Channel,
}

/// Durable-queue handle. Clone-free by design; share via `Arc`.
pub struct MessageBus {
    config: BusConfig,
    state: Mutex<Option<BusState>>,
}

impl MessageBus {
    /// Connect, retrying with bounded-exponential backoff until the broker
    /// answers. Declares the durable queue and enables publisher confirms.
    pub async fn connect(config: BusConfig) -> Self {
        let mut backoff = Duration::from_secs(1);
        let state = loop {
            match open(&config).await {
                Ok(state) => break state,
                Err(e) => {
                    warn!("bus connect failed ({}), retrying in {:?}", e, backoff);
                    tokio::time::sleep(backoff).await;
                    backoff =
                        (backoff * 2).min(Duration::from_secs(BUS_RECONNECT_BACKOFF_SECONDS));
                }
            }
        };
        info!("Connected to bus, queue '{}'", config.queue_name);
        Self {
            config,
            state: Mutex::new(Some(state)),
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.config.queue_name
    }

    /// Publish a persistent message and wait for the broker confirm.
    pub async fn publish(&self, payload: &[u8]) -> CoreResult<()> {
        let mut guard = self.state.lock().await;
        // One reconnect attempt; the caller decides whether to 500.
        ensure_open(&self.config, &mut guard).await?;
        let state = guard.as_ref().expect("state present after ensure_open");

        let confirm = state
            .channel
            .basic_publish(
                "",
                &self.config.queue_name,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default().with_delivery_mode(DELIVERY_MODE_PERSISTENT),
            )
            .await
            .map_err(|e| CoreError::bus_with("publish", Box::new(e)))?;
        confirm
            .await
            .map_err(|e| CoreError::bus_with("publish confirm", Box::new(e)))?;
        Ok(())
    }

    /// Open a consumer on the queue. The returned stream yields deliveries
    /// that must be acked or nacked explicitly; a dropped consumer requeues
    /// everything unacked.
    pub async fn consume(&self, consumer_tag: &str) -> CoreResult<Consumer> {
        let mut guard = self.state.lock().await;
        ensure_open(&self.config, &mut guard).await?;
        let state = guard.as_ref().expect("state present after ensure_open");
        state
            .channel
            .basic_consume(
                &self.config.queue_name,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| CoreError::bus_with("consume", Box::new(e)))
    }

    /// Reconnect with backoff until the broker answers again. Used by the
    /// dispatcher when its consumer stream ends.
    pub async fn reconnect(&self) {
        let mut guard = self.state.lock().await;
        *guard = None;
        let mut backoff = Duration::from_secs(1);
        loop {
            match open(&self.config).await {
                Ok(state) => {
                    info!("Bus reconnected");
                    *guard = Some(state);
                    return;
                }
                Err(e) => {
                    warn!("bus reconnect failed ({}), retrying in {:?}", e, backoff);
                    tokio::time::sleep(backoff).await;
                    backoff =
                        (backoff * 2).min(Duration::from_secs(BUS_RECONNECT_BACKOFF_SECONDS));
                }
            }
        }
    }

    /// Queue depth and consumer count via a passive declare.
    pub async fn stats(&self) -> CoreResult<QueueStats> {
        let guard = self.state.lock().await;
        let state = guard
            .as_ref()
            .filter(|s| s.connection.status().connected())
            .ok_or_else(|| CoreError::bus("not connected"))?;
        let queue = state
            .channel
            .queue_declare(
                &self.config.queue_name,
                QueueDeclareOptions {
                    passive: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| CoreError::bus_with("passive declare", Box::new(e)))?;
        Ok(QueueStats {
            queue_name: self.config.queue_name.clone(),
            message_count: queue.message_count(),
            consumer_count: queue.consumer_count(),
            status: "connected".to_string(),
        })
    }
}

/// Reopen the connection when it is absent or dropped.
async fn ensure_open(config: &BusConfig, state: &mut Option<BusState>) -> CoreResult<()> {
    let connected = state
        .as_ref()
        .map(|s| s.connection.status().connected())
        .unwrap_or(false);
    if !connected {
        let fresh = open(config)
            .await
            .map_err(|e| CoreError::bus_with("reconnect", Box::new(e)))?;
        *state = Some(fresh);
    }
    Ok(())
}

async fn open(config: &BusConfig) -> lapin::Result<BusState> {
    let connection = Connection::connect(&config.uri, ConnectionProperties::default()).await?;
    let channel = connection.create_channel().await?;
    channel
        .queue_declare(
            &config.queue_name,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;
    channel
        .confirm_select(ConfirmSelectOptions::default())
        .await?;
    Ok(BusState {
        connection,
        channel,
    })
}
