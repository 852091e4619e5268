//! Structured query specification.
//!
//! Created from client JSON at the coordinator, persisted on the job as an
//! opaque string, re-parsed by the worker, evaluated once. The coordinator
//! validates operators and aggregations against the allowed sets up front so
//! a malformed spec is rejected with a 400 instead of a failed job.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

// ============================================================================
// Enums
// ============================================================================

/// Aggregation functions accepted in `select` entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Sum,
    Avg,
    Count,
    Min,
    Max,
    First,
    Last,
}

impl Aggregation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Sum => "sum",
            Aggregation::Avg => "avg",
            Aggregation::Count => "count",
            Aggregation::Min => "min",
            Aggregation::Max => "max",
            Aggregation::First => "first",
            Aggregation::Last => "last",
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Filter operators. Unknown operators arriving at the worker are dropped
/// with a warning rather than failing the query, so this enum is only used
/// after validation; the raw wire value is a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Like,
    In,
    Between,
    IsNull,
    IsNotNull,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::NotEq => "!=",
            FilterOp::Lt => "<",
            FilterOp::LtEq => "<=",
            FilterOp::Gt => ">",
            FilterOp::GtEq => ">=",
            FilterOp::Like => "like",
            FilterOp::In => "in",
            FilterOp::Between => "between",
            FilterOp::IsNull => "is_null",
            FilterOp::IsNotNull => "is_not_null",
        }
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FilterOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "=" | "==" => Ok(FilterOp::Eq),
            "!=" | "<>" => Ok(FilterOp::NotEq),
            "<" => Ok(FilterOp::Lt),
            "<=" => Ok(FilterOp::LtEq),
            ">" => Ok(FilterOp::Gt),
            ">=" => Ok(FilterOp::GtEq),
            "like" => Ok(FilterOp::Like),
            "in" => Ok(FilterOp::In),
            "between" => Ok(FilterOp::Between),
            "is_null" => Ok(FilterOp::IsNull),
            "is_not_null" => Ok(FilterOp::IsNotNull),
            _ => Err(format!("unknown filter operator: '{}'", s)),
        }
    }
}

/// Sort direction. Parsed case-insensitively; ascending when absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" | "ascending" => Ok(Direction::Asc),
            "desc" | "descending" => Ok(Direction::Desc),
            _ => Err(format!("unknown sort direction: '{}'", s)),
        }
    }
}

// ============================================================================
// Spec
// ============================================================================

/// One `select` entry: a column, optionally aggregated, optionally renamed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectItem {
    pub column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "as")]
    pub alias: Option<String>,
}

impl SelectItem {
    /// Validated aggregation, if any.
    pub fn parsed_aggregation(&self) -> Result<Option<Aggregation>, String> {
        match self.aggregation.as_deref() {
            None => Ok(None),
            Some(raw) => serde_json::from_value::<Aggregation>(serde_json::Value::String(
                raw.to_lowercase(),
            ))
            .map(Some)
            .map_err(|_| format!("unknown aggregation: '{}'", raw)),
        }
    }

    /// Output column name after alias rename.
    pub fn output_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.column)
    }
}

/// One filter predicate. The operator stays a raw string on the wire; the
/// worker drops unrecognized ones instead of failing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub column: String,
    pub operator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value2: Option<serde_json::Value>,
}

impl Filter {
    pub fn parsed_op(&self) -> Result<FilterOp, String> {
        self.operator.parse()
    }
}

/// One `order_by` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    #[serde(default)]
    pub direction: Option<String>,
}

impl OrderBy {
    /// Case-insensitive direction, ascending by default.
    pub fn parsed_direction(&self) -> Direction {
        self.direction
            .as_deref()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default()
    }
}

/// The engine-agnostic query description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct QuerySpec {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub select: Vec<SelectItem>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub group_by: Vec<String>,
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    /// Opaque passthrough; never interpreted and never echoed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

impl QuerySpec {
    /// True when any select entry carries an aggregation; non-aggregated
    /// entries then form the implicit grouping key.
    pub fn has_aggregation(&self) -> bool {
        self.select.iter().any(|item| item.aggregation.is_some())
    }

    /// Coordinator-side validation: `source` present, aggregations drawn
    /// from the allowed set. Filter operators are deliberately not rejected
    /// here; the worker drops unknown ones.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.source.trim().is_empty() {
            return Err(CoreError::invalid_input("query source is required"));
        }
        for item in &self.select {
            item.parsed_aggregation().map_err(CoreError::invalid_input)?;
        }
        Ok(())
    }

    /// Split `"project.table"` into its parts. Anything without exactly one
    /// dot is not a fully-qualified table name (it may be a job id).
    pub fn split_source(source: &str) -> Option<(&str, &str)> {
        let mut parts = source.splitn(2, '.');
        let project = parts.next()?.trim();
        let table = parts.next()?.trim();
        if project.is_empty() || table.is_empty() {
            return None;
        }
        Some((project, table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(json: &str) -> QuerySpec {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn parses_full_spec() {
        let q = spec(
            r#"{
                "source": "p1.t4",
                "select": [
                    {"column": "region", "as": "r"},
                    {"column": "revenue", "aggregation": "sum", "as": "total"}
                ],
                "filters": [{"column": "region", "operator": "=", "value": "N"}],
                "group_by": ["region"],
                "order_by": [{"column": "total", "direction": "desc"}],
                "limit": 100,
                "offset": 10,
                "encoding": "utf-8"
            }"#,
        );

        assert!(q.has_aggregation());
        assert_eq!(q.select[0].output_name(), "r");
        assert_eq!(q.select[1].output_name(), "total");
        assert_eq!(q.filters[0].parsed_op().unwrap(), FilterOp::Eq);
        assert_eq!(q.order_by[0].parsed_direction(), Direction::Desc);
        assert!(q.validate().is_ok());
    }

    #[test]
    fn direction_is_case_insensitive_and_defaults_asc() {
        let order = OrderBy {
            column: "c".into(),
            direction: Some("DESC".into()),
        };
        assert_eq!(order.parsed_direction(), Direction::Desc);

        let order = OrderBy {
            column: "c".into(),
            direction: None,
        };
        assert_eq!(order.parsed_direction(), Direction::Asc);
    }

    #[test]
    fn rejects_missing_source_and_bad_aggregation() {
        let q = spec(r#"{"select": [{"column": "*"}]}"#);
        assert!(q.validate().is_err());

        let q = spec(
            r#"{"source": "p.t", "select": [{"column": "x", "aggregation": "median"}]}"#,
        );
        assert!(q.validate().is_err());
    }

    #[test]
    fn unknown_operator_does_not_fail_validation() {
        let q = spec(
            r#"{"source": "p.t", "filters": [{"column": "x", "operator": "~=", "value": 1}]}"#,
        );
        assert!(q.validate().is_ok());
        assert!(q.filters[0].parsed_op().is_err());
    }

    #[test]
    fn splits_qualified_source() {
        assert_eq!(QuerySpec::split_source("p1.t1"), Some(("p1", "t1")));
        assert_eq!(QuerySpec::split_source("p1.nested.name"), Some(("p1", "nested.name")));
        assert_eq!(QuerySpec::split_source("8f14e45f-ceea"), None);
        assert_eq!(QuerySpec::split_source("p1."), None);
    }
}
