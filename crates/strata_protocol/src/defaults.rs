//! Canonical default values shared across control and data plane.

/// Wire timestamp format used by the HTTP surface and the job store.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub const DEFAULT_API_PORT: u16 = 8080;
pub const DEFAULT_QUEUE_NAME: &str = "file.processing.queue";
pub const DEFAULT_FILE_MAX_SIZE: u64 = 100 * 1024 * 1024;
pub const DEFAULT_JOB_TTL_SECONDS: u64 = 3600;
pub const DEFAULT_PREVIEW_MAX_ROWS: usize = 10_000;
pub const DEFAULT_QUERY_TIMEOUT_SECONDS: u64 = 30;
/// Root prefix of table data inside the warehouse bucket.
pub const DEFAULT_WAREHOUSE_PATH: &str = "wh";
/// Table name used when a sanitized name comes out empty.
pub const DEFAULT_TABLE_NAME: &str = "default_table";

pub const BUS_CONNECT_TIMEOUT_SECONDS: u64 = 10;
pub const BUS_HEARTBEAT_SECONDS: u16 = 30;
pub const BUS_RECONNECT_BACKOFF_SECONDS: u64 = 5;

/// Bounded job-store pool size per process.
pub const JOBSTORE_POOL_SIZE: usize = 8;
