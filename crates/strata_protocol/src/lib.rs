//! Canonical types shared across the Strata control and data plane.
//!
//! Everything that crosses a process boundary lives here: job records and
//! their payloads, the structured query spec, the queue message envelope,
//! the error taxonomy, configuration, and object-store path construction.
//! Keeping one definition per concept avoids drift between the coordinator
//! and the worker.

pub mod config;
pub mod defaults;
pub mod error;
pub mod paths;
pub mod query;
pub mod types;

pub use config::SystemConfig;
pub use error::{CoreError, CoreResult};
pub use query::{Aggregation, Direction, Filter, FilterOp, OrderBy, QuerySpec, SelectItem};
pub use types::{
    ColumnSpec, ColumnType, JobKind, JobMessage, JobRecord, JobResult, JobStatus, QueryPayload,
    SchemaPayload, UploadPayload,
};
