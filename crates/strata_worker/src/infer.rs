//! Delimited-text reading with per-column type inference.
//!
//! Inference is by elimination, not sampling: every value narrows the
//! candidate set for its column, and the surviving candidate with the
//! highest preference wins. Preference order: integer, float, date,
//! string. Boolean columns can exist in the catalog but are never
//! inferred from text; boolean-looking cells read back as strings. Empty
//! cells mark the column nullable and eliminate nothing.

use arrow::array::{
    ArrayRef, BooleanBuilder, Date32Builder, Float64Builder, Int64Builder, RecordBatch,
    StringBuilder,
};
use chrono::NaiveDate;
use std::path::Path;
use std::sync::Arc;

use strata_catalog::schema_from_columns;
use strata_protocol::{ColumnSpec, ColumnType, CoreError, CoreResult};

/// Candidate order is the preference order. Boolean is deliberately not
/// a candidate; only the catalog-facing schema mapping produces it.
const CANDIDATES: [ColumnType; 3] = [
    ColumnType::Integer,
    ColumnType::Float,
    ColumnType::Date,
];

/// Date renderings accepted during inference, tried in order.
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

/// A CSV file parsed into columns of raw cells.
#[derive(Debug)]
pub struct CsvTable {
    pub headers: Vec<String>,
    /// Column-major cells; `None` is an empty cell.
    pub columns: Vec<Vec<Option<String>>>,
    pub row_count: usize,
}

/// Read a CSV file: header row required, `,` separator, empty lines
/// skipped, UTF-8 only. Zero data rows or an unreadable header are
/// `invalid_input`.
pub fn read_csv(path: &Path) -> CoreResult<CsvTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| CoreError::invalid_input(format!("cannot open CSV: {}", e)))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| CoreError::invalid_input(format!("unreadable CSV header: {}", e)))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(CoreError::invalid_input("unreadable CSV header"));
    }

    let mut columns: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
    let mut row_count = 0usize;
    for record in reader.records() {
        let record =
            record.map_err(|e| CoreError::invalid_input(format!("malformed CSV row: {}", e)))?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        if record.len() != headers.len() {
            return Err(CoreError::invalid_input(format!(
                "row {} has {} fields, header has {}",
                row_count + 1,
                record.len(),
                headers.len()
            )));
        }
        for (idx, cell) in record.iter().enumerate() {
            let cell = cell.trim();
            columns[idx].push(if cell.is_empty() {
                None
            } else {
                Some(cell.to_string())
            });
        }
        row_count += 1;
    }

    if row_count == 0 {
        return Err(CoreError::invalid_input("CSV contains no data rows"));
    }

    Ok(CsvTable {
        headers,
        columns,
        row_count,
    })
}

/// Infer the column specs of a parsed table.
pub fn infer_columns(table: &CsvTable) -> Vec<ColumnSpec> {
    table
        .headers
        .iter()
        .zip(&table.columns)
        .map(|(name, cells)| {
            let mut candidates: Vec<ColumnType> = CANDIDATES.to_vec();
            let mut nullable = false;
            for cell in cells {
                match cell {
                    None => nullable = true,
                    Some(value) => {
                        candidates.retain(|ty| value_matches(*ty, value));
                        if candidates.is_empty() {
                            break;
                        }
                    }
                }
            }
            ColumnSpec {
                name: name.clone(),
                column_type: candidates.first().copied().unwrap_or(ColumnType::String),
                nullable,
            }
        })
        .collect()
}

/// Materialize the table as one Arrow batch using the inferred schema.
pub fn build_batch(table: &CsvTable) -> CoreResult<RecordBatch> {
    let specs = infer_columns(table);
    let arrays: Vec<ArrayRef> = specs
        .iter()
        .zip(&table.columns)
        .map(|(spec, cells)| build_array(spec, cells))
        .collect::<CoreResult<_>>()?;
    RecordBatch::try_new(schema_from_columns(&specs), arrays)
        .map_err(|e| CoreError::invalid_input(format!("assemble record batch: {}", e)))
}

fn build_array(spec: &ColumnSpec, cells: &[Option<String>]) -> CoreResult<ArrayRef> {
    let array: ArrayRef = match spec.column_type {
        ColumnType::Integer => {
            let mut builder = Int64Builder::with_capacity(cells.len());
            for cell in cells {
                builder.append_option(cell.as_deref().map(parse_integer).transpose()?);
            }
            Arc::new(builder.finish())
        }
        ColumnType::Float => {
            let mut builder = Float64Builder::with_capacity(cells.len());
            for cell in cells {
                builder.append_option(cell.as_deref().map(parse_float).transpose()?);
            }
            Arc::new(builder.finish())
        }
        ColumnType::Boolean => {
            let mut builder = BooleanBuilder::with_capacity(cells.len());
            for cell in cells {
                builder.append_option(cell.as_deref().and_then(parse_boolean));
            }
            Arc::new(builder.finish())
        }
        ColumnType::Date => {
            let mut builder = Date32Builder::with_capacity(cells.len());
            let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).expect("epoch");
            for cell in cells {
                let days = cell
                    .as_deref()
                    .and_then(parse_date)
                    .map(|d| (d - epoch).num_days() as i32);
                builder.append_option(days);
            }
            Arc::new(builder.finish())
        }
        ColumnType::String => {
            let mut builder = StringBuilder::new();
            for cell in cells {
                builder.append_option(cell.as_deref());
            }
            Arc::new(builder.finish())
        }
    };
    Ok(array)
}

fn value_matches(ty: ColumnType, value: &str) -> bool {
    match ty {
        ColumnType::Integer => value.parse::<i64>().is_ok(),
        ColumnType::Float => value.parse::<f64>().is_ok(),
        ColumnType::Boolean => parse_boolean(value).is_some(),
        ColumnType::Date => parse_date(value).is_some(),
        ColumnType::String => true,
    }
}

fn parse_integer(value: &str) -> CoreResult<i64> {
    value
        .parse()
        .map_err(|_| CoreError::invalid_input(format!("not an integer: '{}'", value)))
}

fn parse_float(value: &str) -> CoreResult<f64> {
    value
        .parse()
        .map_err(|_| CoreError::invalid_input(format!("not a number: '{}'", value)))
}

fn parse_boolean(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" => Some(true),
        "false" | "no" => Some(false),
        _ => None,
    }
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn infers_preferred_types() {
        let file = write_csv(
            "id,amount,joined,name\n\
             1,1.5,2024-01-02,ada\n\
             2,2,2024-02-03,grace\n",
        );
        let table = read_csv(file.path()).unwrap();
        let specs = infer_columns(&table);

        assert_eq!(specs[0].column_type, ColumnType::Integer);
        assert_eq!(specs[1].column_type, ColumnType::Float);
        assert_eq!(specs[2].column_type, ColumnType::Date);
        assert_eq!(specs[3].column_type, ColumnType::String);
        assert!(specs.iter().all(|s| !s.nullable));
    }

    #[test]
    fn boolean_looking_cells_stay_strings() {
        // Boolean is not in the inference chain; true/false falls through.
        let file = write_csv("active\ntrue\nfalse\nyes\n");
        let table = read_csv(file.path()).unwrap();
        assert_eq!(infer_columns(&table)[0].column_type, ColumnType::String);
    }

    #[test]
    fn integers_are_preferred_over_floats() {
        // "1" and "0" parse as both integer and float; preference order
        // must settle on integer.
        let file = write_csv("flag\n1\n0\n");
        let table = read_csv(file.path()).unwrap();
        let specs = infer_columns(&table);
        assert_eq!(specs[0].column_type, ColumnType::Integer);
    }

    #[test]
    fn mixed_numeric_column_widens_to_float() {
        let file = write_csv("x\n1\n2.5\n3\n");
        let table = read_csv(file.path()).unwrap();
        assert_eq!(infer_columns(&table)[0].column_type, ColumnType::Float);
    }

    #[test]
    fn empty_cells_mark_nullable_without_changing_type() {
        let file = write_csv("x,y\n1,a\n,b\n3,\n");
        let table = read_csv(file.path()).unwrap();
        let specs = infer_columns(&table);
        assert_eq!(specs[0].column_type, ColumnType::Integer);
        assert!(specs[0].nullable);
        assert_eq!(specs[1].column_type, ColumnType::String);
        assert!(specs[1].nullable);
    }

    #[test]
    fn empty_lines_are_skipped_and_counted_rows_match() {
        let file = write_csv("a,b\n1,2\n\n3,4\n");
        let table = read_csv(file.path()).unwrap();
        assert_eq!(table.row_count, 2);
    }

    #[test]
    fn header_only_file_is_invalid() {
        let file = write_csv("a,b\n");
        let err = read_csv(file.path()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[test]
    fn batch_carries_inferred_schema_and_nulls() {
        let file = write_csv("id,name\n1,ada\n,grace\n");
        let table = read_csv(file.path()).unwrap();
        let batch = build_batch(&table).unwrap();

        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), 2);
        assert_eq!(batch.column(0).null_count(), 1);
    }
}
