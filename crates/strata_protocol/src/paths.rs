//! Object-store path construction and name sanitation.
//!
//! All keys use `/` as separator. Two logical buckets exist: a staging
//! bucket for raw uploads and a warehouse bucket housing table data and
//! query results.

use chrono::NaiveDateTime;

use crate::defaults::DEFAULT_TABLE_NAME;

/// Staging key for a raw upload: `uploads/<job_id>/<file_name>`.
pub fn staging_path(job_id: &str, file_name: &str) -> String {
    format!("uploads/{}/{}", job_id, file_name)
}

/// Warehouse prefix of a table: `<warehouse_path>/<project>/<table>`.
pub fn table_prefix(warehouse_path: &str, project: &str, table: &str) -> String {
    format!("{}/{}/{}", warehouse_path, project, table)
}

/// Warehouse key of a materialized query result:
/// `<warehouse_path>/<project>/queries/query_<yyyyMMdd_HHmmss>/result.parquet`.
pub fn query_result_path(warehouse_path: &str, project: &str, at: NaiveDateTime) -> String {
    format!(
        "{}/{}/queries/query_{}/result.parquet",
        warehouse_path,
        project,
        at.format("%Y%m%d_%H%M%S")
    )
}

/// Sanitize a table (or project) name for use as a warehouse identifier:
/// lowercase, `[a-z0-9_]` only, everything else collapsed to `_`. Falls back
/// to [`DEFAULT_TABLE_NAME`] when nothing survives.
pub fn sanitize_table_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_underscore = false;
    for ch in raw.trim().chars() {
        let mapped = if ch.is_ascii_alphanumeric() {
            last_underscore = false;
            ch.to_ascii_lowercase()
        } else if last_underscore {
            continue;
        } else {
            last_underscore = true;
            '_'
        };
        out.push(mapped);
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        DEFAULT_TABLE_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Table name for an upload: the explicit table when given, otherwise the
/// file stem, otherwise the default.
pub fn table_name_for_upload(table: Option<&str>, file_name: &str) -> String {
    match table {
        Some(t) if !t.trim().is_empty() => sanitize_table_name(t),
        _ => {
            let stem = file_name
                .rsplit('/')
                .next()
                .unwrap_or(file_name)
                .split('.')
                .next()
                .unwrap_or("");
            sanitize_table_name(stem)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn builds_staging_and_result_paths() {
        assert_eq!(staging_path("j1", "data.csv"), "uploads/j1/data.csv");

        let at = NaiveDate::from_ymd_opt(2026, 3, 14)
            .unwrap()
            .and_hms_opt(9, 26, 53)
            .unwrap();
        assert_eq!(
            query_result_path("wh", "p1", at),
            "wh/p1/queries/query_20260314_092653/result.parquet"
        );
    }

    #[test]
    fn sanitizes_table_names() {
        assert_eq!(sanitize_table_name("Sales Q1 (final)"), "sales_q1_final");
        assert_eq!(sanitize_table_name("already_ok"), "already_ok");
        assert_eq!(sanitize_table_name("___"), "default_table");
        assert_eq!(sanitize_table_name(""), "default_table");
    }

    #[test]
    fn upload_table_name_falls_back_to_file_stem() {
        assert_eq!(table_name_for_upload(Some("My Table"), "x.csv"), "my_table");
        assert_eq!(table_name_for_upload(None, "Orders-2026.csv"), "orders_2026");
        assert_eq!(table_name_for_upload(Some("  "), ".csv"), "default_table");
    }
}
