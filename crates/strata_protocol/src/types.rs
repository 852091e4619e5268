//! Job records, payloads, and the queue message envelope.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::defaults::TIMESTAMP_FORMAT;

// ============================================================================
// Job kind / status
// ============================================================================

/// Kind of asynchronous work a job describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// CSV file ingestion into a warehouse table
    Upload,
    /// Structured query execution
    Query,
    /// Table schema discovery
    Schema,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Upload => "upload",
            JobKind::Query => "query",
            JobKind::Schema => "schema",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "upload" => Ok(JobKind::Upload),
            "query" => Ok(JobKind::Query),
            "schema" => Ok(JobKind::Schema),
            _ => Err(format!("unknown job kind: '{}'", s)),
        }
    }
}

/// Lifecycle of a job. Monotone: `queued → processing → {completed, failed}`.
/// Terminal states are final; the store never moves a job backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Ordering rank used to reject backward transitions.
    pub fn rank(&self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Processing => 1,
            JobStatus::Completed | JobStatus::Failed => 2,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "queued" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(format!("unknown job status: '{}'", s)),
        }
    }
}

// ============================================================================
// Column model
// ============================================================================

/// Simple column types exposed by the catalog facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Float,
    Boolean,
    Date,
    String,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
            ColumnType::String => "string",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One column of a table schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    pub nullable: bool,
}

// ============================================================================
// Job payloads
// ============================================================================

/// Payload of an upload job. `blob_path` points into the staging bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    pub project: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    pub file_name: String,
    pub blob_path: String,
    pub file_size: u64,
}

/// Payload of a query job. The spec is persisted as an opaque JSON string
/// and re-parsed by the worker; the job store never interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPayload {
    pub source: String,
    pub query_spec_json: String,
}

/// Payload of a schema discovery job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaPayload {
    pub project: String,
    pub table: String,
}

/// Kind-specific job payload, tagged by the job kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobPayload {
    Upload(UploadPayload),
    Query(QueryPayload),
    Schema(SchemaPayload),
}

impl JobPayload {
    pub fn as_upload(&self) -> Option<&UploadPayload> {
        match self {
            JobPayload::Upload(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_query(&self) -> Option<&QueryPayload> {
        match self {
            JobPayload::Query(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_schema(&self) -> Option<&SchemaPayload> {
        match self {
            JobPayload::Schema(p) => Some(p),
            _ => None,
        }
    }
}

// ============================================================================
// Job result
// ============================================================================

/// Terminal result of a completed job. One struct covers all kinds; absent
/// fields are skipped on the wire so each kind only shows what it produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    /// Warehouse path of the materialized result blob (query jobs).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size_bytes: Option<u64>,
    /// Inline JSON preview: head of the result relation (query jobs) or the
    /// column list (schema jobs).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<ColumnSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

// ============================================================================
// Job record
// ============================================================================

/// The canonical unit of asynchronous work, persisted in the job store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub kind: JobKind,
    pub status: JobStatus,
    pub message: String,
    #[serde(with = "timestamp")]
    pub created_at: NaiveDateTime,
    #[serde(with = "timestamp")]
    pub updated_at: NaiveDateTime,
    pub payload: JobPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
}

impl JobRecord {
    /// Fresh `queued` record, as written exactly once by the coordinator.
    pub fn queued(kind: JobKind, id: impl Into<String>, payload: JobPayload) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id: id.into(),
            kind,
            status: JobStatus::Queued,
            message: "Job queued".to_string(),
            created_at: now,
            updated_at: now,
            payload,
            result: None,
        }
    }
}

/// Serde adapter for the wire timestamp format (`yyyy-MM-dd'T'HH:mm:ss`).
pub mod timestamp {
    use super::*;
    use serde::{de, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &NaiveDateTime, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&dt.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<NaiveDateTime, D::Error> {
        let s = String::deserialize(de)?;
        NaiveDateTime::parse_from_str(&s, TIMESTAMP_FORMAT).map_err(de::Error::custom)
    }
}

// ============================================================================
// Queue message envelope
// ============================================================================

/// Message published to the work queue. The payload fields are flattened so
/// the wire shape is `{id, kind, <payload fields…>}`; consumers tolerate
/// unknown fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum JobMessage {
    Upload {
        id: String,
        #[serde(flatten)]
        payload: UploadPayload,
    },
    Query {
        id: String,
        #[serde(flatten)]
        payload: QueryPayload,
    },
    Schema {
        id: String,
        #[serde(flatten)]
        payload: SchemaPayload,
    },
}

impl JobMessage {
    pub fn id(&self) -> &str {
        match self {
            JobMessage::Upload { id, .. }
            | JobMessage::Query { id, .. }
            | JobMessage::Schema { id, .. } => id,
        }
    }

    pub fn kind(&self) -> JobKind {
        match self {
            JobMessage::Upload { .. } => JobKind::Upload,
            JobMessage::Query { .. } => JobKind::Query,
            JobMessage::Schema { .. } => JobKind::Schema,
        }
    }
}

/// Generate a new opaque job id.
pub fn new_job_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_are_ranked() {
        assert!(JobStatus::Queued.rank() < JobStatus::Processing.rank());
        assert!(JobStatus::Processing.rank() < JobStatus::Completed.rank());
        assert_eq!(JobStatus::Completed.rank(), JobStatus::Failed.rank());
        assert!(JobStatus::Completed.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn job_record_round_trips_with_wire_timestamps() {
        let record = JobRecord::queued(
            JobKind::Upload,
            "abc",
            JobPayload::Upload(UploadPayload {
                user: Some("u1".into()),
                project: "p1".into(),
                table: Some("t1".into()),
                file_name: "data.csv".into(),
                blob_path: "uploads/abc/data.csv".into(),
                file_size: 42,
            }),
        );

        let json = serde_json::to_value(&record).unwrap();
        // Wire format carries seconds precision, no fraction and no zone.
        let created = json["created_at"].as_str().unwrap();
        assert_eq!(created.len(), 19);
        assert!(created.contains('T'));

        let back: JobRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back.id, record.id);
        assert_eq!(back.status, JobStatus::Queued);
        assert!(back.payload.as_upload().is_some());
    }

    #[test]
    fn queue_message_flattens_payload() {
        let msg = JobMessage::Schema {
            id: "j1".into(),
            payload: SchemaPayload {
                project: "p1".into(),
                table: "t1".into(),
            },
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["kind"], "schema");
        assert_eq!(json["id"], "j1");
        assert_eq!(json["project"], "p1");
        assert_eq!(json["table"], "t1");

        // Unknown fields on the wire are tolerated.
        let back: JobMessage = serde_json::from_str(
            r#"{"kind":"schema","id":"j1","project":"p1","table":"t1","extra":true}"#,
        )
        .unwrap();
        assert_eq!(back.id(), "j1");
        assert_eq!(back.kind(), JobKind::Schema);
    }

    #[test]
    fn result_skips_absent_fields() {
        let result = JobResult {
            row_count: Some(10),
            ..Default::default()
        };
        let json = serde_json::to_string(&result).unwrap();
        assert_eq!(json, r#"{"row_count":10}"#);
    }
}
