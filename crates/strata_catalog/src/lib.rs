//! Transactional columnar table catalog.
//!
//! The warehouse bucket is the catalog: each table is a prefix of Parquet
//! part files plus a numbered manifest log, and an append commits by
//! conditionally creating the next manifest version. DataFusion provides
//! scans with predicate and projection pushdown over the committed file set.

pub mod catalog;
pub mod manifest;

pub use catalog::TableCatalog;
pub use manifest::{
    column_type_from_arrow, column_type_to_arrow, columns_from_schema, schema_from_columns,
    DataFile, TableManifest,
};
