//! Coordinator: the HTTP boundary of the lakehouse control plane.
//!
//! Accepts uploads, structured queries, and schema requests; persists a job
//! record and enqueues a work message for each; answers status polls. Never
//! blocks on execution.

pub mod error;
pub mod routes;
pub mod state;

pub use routes::router;
pub use state::AppState;
