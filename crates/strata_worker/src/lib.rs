//! Worker: consumes job messages from the durable queue and executes them.
//!
//! One dispatcher per process holds the consuming channel; executors for
//! the three job kinds do the work against the object store, catalog, and
//! job store. Scale horizontally by running more worker processes against
//! the same queue.

pub mod context;
pub mod dispatcher;
pub mod infer;
pub mod ingest;
pub mod query;
pub mod schema;

pub use context::WorkerContext;
pub use dispatcher::Dispatcher;
