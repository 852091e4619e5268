//! Job store: Redis strings with per-key TTL.
//!
//! Records are JSON blobs under `job:<id>`; query jobs are mirrored under
//! `query:<id>` so the status endpoint's legacy namespace split keeps
//! working. The TTL resets on every write. There are no concurrent writers
//! per key: the coordinator writes the initial record, the worker holding
//! the delivery writes everything after, so read-merge-write is safe.

use deadpool_redis::redis::cmd;
use deadpool_redis::{Config, Pool, PoolConfig, Runtime};
use tracing::{debug, warn};

use strata_protocol::defaults::JOBSTORE_POOL_SIZE;
use strata_protocol::{CoreError, CoreResult, JobKind, JobRecord, JobResult, JobStatus};

fn job_key(id: &str) -> String {
    format!("job:{}", id)
}

fn query_key(id: &str) -> String {
    format!("query:{}", id)
}

/// Handle on the job store. Cheap to clone; the pool is shared.
#[derive(Clone)]
pub struct JobStore {
    pool: Pool,
    ttl_seconds: u64,
}

impl JobStore {
    /// Build a bounded pool against the given Redis URL.
    pub fn connect(url: &str, ttl_seconds: u64) -> CoreResult<Self> {
        let mut config = Config::from_url(url);
        config.pool = Some(PoolConfig::new(JOBSTORE_POOL_SIZE));
        let pool = config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CoreError::job_store_with("create pool", Box::new(e)))?;
        Ok(Self { pool, ttl_seconds })
    }

    /// Write the initial `queued` record. Coordinator-only.
    pub async fn create(&self, record: &JobRecord) -> CoreResult<()> {
        debug_assert_eq!(record.status, JobStatus::Queued);
        self.write(record).await?;
        debug!("job {} created ({})", record.id, record.kind);
        Ok(())
    }

    /// Fetch a record by id, checking both key namespaces.
    pub async fn get(&self, id: &str) -> CoreResult<Option<JobRecord>> {
        let mut conn = self.conn().await?;
        for key in [job_key(id), query_key(id)] {
            let raw: Option<String> = cmd("GET")
                .arg(&key)
                .query_async(&mut conn)
                .await
                .map_err(|e| CoreError::job_store_with("get", Box::new(e)))?;
            if let Some(raw) = raw {
                let record = serde_json::from_str(&raw)
                    .map_err(|e| CoreError::job_store_with("decode record", Box::new(e)))?;
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Read-merge-write a status transition, resetting the TTL. A write
    /// against an expired key is dropped with a warning (the job is gone;
    /// nobody is polling it). Backward transitions are refused the same way.
    pub async fn update(
        &self,
        id: &str,
        status: JobStatus,
        message: impl Into<String>,
        result: Option<JobResult>,
    ) -> CoreResult<()> {
        let Some(mut record) = self.get(id).await? else {
            warn!("job {} expired or unknown, dropping {} update", id, status);
            return Ok(());
        };

        if record.status.is_terminal() || record.status.rank() > status.rank() {
            warn!(
                "job {} is {}, refusing transition to {}",
                id, record.status, status
            );
            return Ok(());
        }

        record.status = status;
        record.message = message.into();
        record.updated_at = chrono::Utc::now().naive_utc();
        if result.is_some() {
            debug_assert_eq!(status, JobStatus::Completed);
            record.result = result;
        }

        self.write(&record).await?;
        debug!("job {} -> {}", id, status);
        Ok(())
    }

    async fn write(&self, record: &JobRecord) -> CoreResult<()> {
        let raw = serde_json::to_string(record)
            .map_err(|e| CoreError::job_store_with("encode record", Box::new(e)))?;
        let mut conn = self.conn().await?;

        let mut keys = vec![job_key(&record.id)];
        if record.kind == JobKind::Query {
            keys.push(query_key(&record.id));
        }
        for key in keys {
            cmd("SET")
                .arg(&key)
                .arg(&raw)
                .arg("EX")
                .arg(self.ttl_seconds)
                .query_async::<()>(&mut conn)
                .await
                .map_err(|e| CoreError::job_store_with("set", Box::new(e)))?;
        }
        Ok(())
    }

    /// Liveness probe for the health surface.
    pub async fn ping(&self) -> CoreResult<()> {
        let mut conn = self.conn().await?;
        cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| CoreError::job_store_with("ping", Box::new(e)))?;
        Ok(())
    }

    async fn conn(&self) -> CoreResult<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| CoreError::job_store_with("checkout connection", Box::new(e)))
    }
}
