//! Table manifests: the commit log of a warehouse table.
//!
//! A table is the set of Parquet part files named by its highest-numbered
//! manifest. Writers stage a part file, then commit a new manifest version
//! with a conditional create; the object store rejects the second writer of
//! the same version, which makes each append atomic. Readers resolve the
//! highest version and see exactly one consistent file set.

use arrow::datatypes::{DataType, Field, Schema};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use strata_protocol::{ColumnSpec, ColumnType};

/// One committed Parquet part file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFile {
    /// Key relative to the bucket root.
    pub path: String,
    pub row_count: u64,
    pub size_bytes: u64,
}

/// The committed state of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableManifest {
    pub version: u64,
    pub schema: Vec<ColumnSpec>,
    pub files: Vec<DataFile>,
    pub row_count: u64,
    pub updated_at: String,
}

impl TableManifest {
    /// First version of a fresh table.
    pub fn initial(schema: Vec<ColumnSpec>) -> Self {
        Self {
            version: 1,
            schema,
            files: Vec::new(),
            row_count: 0,
            updated_at: now_rfc3339(),
        }
    }

    /// Next version with one more part file.
    pub fn with_file(&self, file: DataFile) -> Self {
        let mut files = self.files.clone();
        let row_count = self.row_count + file.row_count;
        files.push(file);
        Self {
            version: self.version + 1,
            schema: self.schema.clone(),
            files,
            row_count,
            updated_at: now_rfc3339(),
        }
    }

    /// Check an incoming relation schema against the committed one.
    /// Compatible means the same columns, in order, with the same simple
    /// type; nullability only widens. Returns the verbatim incompatibility
    /// otherwise.
    pub fn check_compatible(&self, incoming: &[ColumnSpec]) -> Result<(), String> {
        if self.schema.len() != incoming.len() {
            return Err(format!(
                "column count differs: table has {}, append has {}",
                self.schema.len(),
                incoming.len()
            ));
        }
        for (have, new) in self.schema.iter().zip(incoming) {
            if have.name != new.name {
                return Err(format!(
                    "column name differs: table has '{}', append has '{}'",
                    have.name, new.name
                ));
            }
            if have.column_type != new.column_type {
                return Err(format!(
                    "column '{}' type differs: table has {}, append has {}",
                    have.name, have.column_type, new.column_type
                ));
            }
            if new.nullable && !have.nullable {
                return Err(format!(
                    "column '{}' is non-nullable but append contains nulls",
                    have.name
                ));
            }
        }
        Ok(())
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

// ============================================================================
// Schema mapping
// ============================================================================

/// Arrow rendering of a simple column type.
pub fn column_type_to_arrow(ct: ColumnType) -> DataType {
    match ct {
        ColumnType::Integer => DataType::Int64,
        ColumnType::Float => DataType::Float64,
        ColumnType::Boolean => DataType::Boolean,
        ColumnType::Date => DataType::Date32,
        ColumnType::String => DataType::Utf8,
    }
}

/// Simple type of an Arrow field. Anything without a narrower mapping reads
/// back as a string.
pub fn column_type_from_arrow(dt: &DataType) -> ColumnType {
    match dt {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => ColumnType::Integer,
        DataType::Float16 | DataType::Float32 | DataType::Float64 => ColumnType::Float,
        DataType::Boolean => ColumnType::Boolean,
        DataType::Date32 | DataType::Date64 => ColumnType::Date,
        _ => ColumnType::String,
    }
}

/// Column specs of an Arrow schema.
pub fn columns_from_schema(schema: &Schema) -> Vec<ColumnSpec> {
    schema
        .fields()
        .iter()
        .map(|field| ColumnSpec {
            name: field.name().clone(),
            column_type: column_type_from_arrow(field.data_type()),
            nullable: field.is_nullable(),
        })
        .collect()
}

/// Arrow schema of a column spec list.
pub fn schema_from_columns(columns: &[ColumnSpec]) -> Arc<Schema> {
    Arc::new(Schema::new(
        columns
            .iter()
            .map(|c| Field::new(&c.name, column_type_to_arrow(c.column_type), c.nullable))
            .collect::<Vec<_>>(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols() -> Vec<ColumnSpec> {
        vec![
            ColumnSpec {
                name: "id".into(),
                column_type: ColumnType::Integer,
                nullable: false,
            },
            ColumnSpec {
                name: "name".into(),
                column_type: ColumnType::String,
                nullable: true,
            },
        ]
    }

    #[test]
    fn versions_advance_and_accumulate() {
        let m1 = TableManifest::initial(cols());
        assert_eq!(m1.version, 1);
        assert_eq!(m1.row_count, 0);

        let m2 = m1.with_file(DataFile {
            path: "wh/p/t/data/part-a.parquet".into(),
            row_count: 10,
            size_bytes: 1024,
        });
        assert_eq!(m2.version, 2);
        assert_eq!(m2.row_count, 10);
        assert_eq!(m2.files.len(), 1);
    }

    #[test]
    fn compatibility_checks_name_type_and_nullability() {
        let manifest = TableManifest::initial(cols());
        assert!(manifest.check_compatible(&cols()).is_ok());

        let mut renamed = cols();
        renamed[1].name = "label".into();
        assert!(manifest.check_compatible(&renamed).unwrap_err().contains("name"));

        let mut retyped = cols();
        retyped[0].column_type = ColumnType::String;
        assert!(manifest.check_compatible(&retyped).unwrap_err().contains("type"));

        // Nulls arriving for a non-nullable column are refused...
        let mut nulled = cols();
        nulled[0].nullable = true;
        assert!(manifest.check_compatible(&nulled).is_err());

        // ...but a non-null append into a nullable column is fine.
        let mut narrower = cols();
        narrower[1].nullable = false;
        assert!(manifest.check_compatible(&narrower).is_ok());
    }

    #[test]
    fn arrow_round_trip() {
        let schema = schema_from_columns(&cols());
        assert_eq!(schema.field(0).data_type(), &DataType::Int64);
        assert_eq!(columns_from_schema(&schema), cols());
    }
}
