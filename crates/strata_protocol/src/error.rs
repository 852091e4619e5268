//! Error taxonomy shared by the coordinator and the worker.
//!
//! The retry boundary is carried by the variant, never inferred from message
//! strings: transient transport failures requeue the message, deterministic
//! input/execution failures terminate the job. Only the dispatcher converts
//! an error into a terminal-state write plus an ack/nack decision.

use thiserror::Error;

/// Cap applied to error text persisted on a job record.
pub const MAX_JOB_MESSAGE_LEN: usize = 500;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed request, unsupported file, malformed query spec. Not retried.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Unknown job id, missing table, missing blob. Not retried.
    #[error("not found: {0}")]
    NotFound(String),

    /// Object store transport failure. Retried at the worker.
    #[error("storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Message bus transport failure. Retried at the worker.
    #[error("bus error: {message}")]
    Bus {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Catalog transport failure (metadata unreachable, commit IO). Retried.
    #[error("catalog error: {message}")]
    Catalog {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Job store transport failure. Retried at the worker.
    #[error("job store error: {message}")]
    JobStore {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Append schema incompatible with the existing table. Deterministic.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Deterministic engine failure during scan/aggregation. Not retried.
    #[error("execution error: {0}")]
    Execution(String),

    /// A stage exceeded its deadline. Terminal.
    #[error("timeout: {0}")]
    Timeout(String),
}

/// Boxed source kept out of the public variant surface.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

impl CoreError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        CoreError::InvalidInput(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        CoreError::NotFound(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        CoreError::Storage {
            message: message.into(),
            source: None,
        }
    }

    pub fn storage_with(message: impl Into<String>, source: BoxError) -> Self {
        CoreError::Storage {
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn bus(message: impl Into<String>) -> Self {
        CoreError::Bus {
            message: message.into(),
            source: None,
        }
    }

    pub fn bus_with(message: impl Into<String>, source: BoxError) -> Self {
        CoreError::Bus {
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn catalog(message: impl Into<String>) -> Self {
        CoreError::Catalog {
            message: message.into(),
            source: None,
        }
    }

    pub fn catalog_with(message: impl Into<String>, source: BoxError) -> Self {
        CoreError::Catalog {
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn job_store(message: impl Into<String>) -> Self {
        CoreError::JobStore {
            message: message.into(),
            source: None,
        }
    }

    pub fn job_store_with(message: impl Into<String>, source: BoxError) -> Self {
        CoreError::JobStore {
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        CoreError::Execution(message.into())
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        CoreError::Timeout(message.into())
    }

    /// Transient transport failures are retried by requeueing the delivery;
    /// everything else terminates the job.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoreError::Storage { .. }
                | CoreError::Bus { .. }
                | CoreError::Catalog { .. }
                | CoreError::JobStore { .. }
        )
    }

    /// Flatten the error and its immediate cause (when distinct) into the
    /// message persisted on the job, capped at [`MAX_JOB_MESSAGE_LEN`].
    pub fn job_message(&self) -> String {
        let mut text = self.to_string();
        if let Some(source) = std::error::Error::source(self) {
            let cause = source.to_string();
            if !cause.is_empty() && !text.contains(&cause) {
                text = format!("{}: {}", text, cause);
            }
        }
        truncate_message(&text)
    }
}

/// Truncate on a char boundary to the persisted-message cap.
pub fn truncate_message(text: &str) -> String {
    if text.len() <= MAX_JOB_MESSAGE_LEN {
        return text.to_string();
    }
    let mut end = MAX_JOB_MESSAGE_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_transient() {
        assert!(CoreError::storage("s3 down").is_transient());
        assert!(CoreError::bus("broker gone").is_transient());
        assert!(CoreError::catalog("commit io").is_transient());
        assert!(CoreError::job_store("redis down").is_transient());
    }

    #[test]
    fn deterministic_errors_are_terminal() {
        assert!(!CoreError::invalid_input("bad csv").is_transient());
        assert!(!CoreError::not_found("no table").is_transient());
        assert!(!CoreError::SchemaMismatch("int vs string".into()).is_transient());
        assert!(!CoreError::execution("overflow").is_transient());
        assert!(!CoreError::timeout("query").is_transient());
    }

    #[test]
    fn job_message_includes_distinct_cause_and_truncates() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "connection reset");
        let err = CoreError::storage_with("put failed", Box::new(io));
        let msg = err.job_message();
        assert!(msg.contains("put failed"));
        assert!(msg.contains("connection reset"));

        let long = CoreError::execution("x".repeat(2000));
        assert_eq!(long.job_message().len(), MAX_JOB_MESSAGE_LEN);
    }
}
