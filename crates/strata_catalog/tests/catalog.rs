//! Catalog integration tests against an in-memory object store.

use arrow::array::{Float64Array, Int64Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use object_store::memory::InMemory;
use std::sync::Arc;
use url::Url;

use strata_catalog::TableCatalog;
use strata_protocol::{ColumnType, CoreError};

fn catalog() -> TableCatalog {
    let store = Arc::new(InMemory::new());
    let base_url = Url::parse("mem://warehouse").unwrap();
    TableCatalog::new(store, base_url, "wh")
}

fn sales_batch(rows: i64) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("region", DataType::Utf8, false),
        Field::new("revenue", DataType::Float64, false),
    ]));
    let ids: Vec<i64> = (0..rows).collect();
    let regions: Vec<&str> = (0..rows).map(|i| if i % 2 == 0 { "N" } else { "S" }).collect();
    let revenue: Vec<f64> = (0..rows).map(|i| 100.0 * (i + 1) as f64).collect();
    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int64Array::from(ids)),
            Arc::new(StringArray::from(regions)),
            Arc::new(Float64Array::from(revenue)),
        ],
    )
    .unwrap()
}

#[tokio::test]
async fn append_creates_table_and_scan_reads_it_back() {
    let catalog = catalog();
    catalog.create_namespace_if_absent("p1").await.unwrap();

    assert!(!catalog.table_exists("p1", "t1").await.unwrap());
    let appended = catalog.append("p1", "t1", &[sales_batch(10)]).await.unwrap();
    assert_eq!(appended, 10);
    assert!(catalog.table_exists("p1", "t1").await.unwrap());

    let df = catalog.scan("p1", "t1").await.unwrap();
    let batches = df.collect().await.unwrap();
    let rows: usize = batches.iter().map(|b| b.num_rows()).sum();
    assert_eq!(rows, 10);
}

#[tokio::test]
async fn multiple_appends_merge_into_one_relation() {
    let catalog = catalog();
    for rows in [15, 20, 25] {
        catalog.append("p1", "t2", &[sales_batch(rows)]).await.unwrap();
    }

    let df = catalog.scan("p1", "t2").await.unwrap();
    let batches = df.collect().await.unwrap();
    let rows: usize = batches.iter().map(|b| b.num_rows()).sum();
    assert_eq!(rows, 60);
}

#[tokio::test]
async fn scan_supports_filter_pushdown() {
    let catalog = catalog();
    catalog.append("p1", "t3", &[sales_batch(10)]).await.unwrap();

    use datafusion::prelude::{col, lit};
    let df = catalog.scan("p1", "t3").await.unwrap();
    let df = df.filter(col("region").eq(lit("N"))).unwrap();
    let batches = df.collect().await.unwrap();
    let rows: usize = batches.iter().map(|b| b.num_rows()).sum();
    assert_eq!(rows, 5);
}

#[tokio::test]
async fn schema_comes_from_metadata() {
    let catalog = catalog();
    catalog.append("p1", "t4", &[sales_batch(3)]).await.unwrap();

    let columns = catalog.schema("p1", "t4").await.unwrap();
    assert_eq!(columns.len(), 3);
    assert_eq!(columns[0].name, "id");
    assert_eq!(columns[0].column_type, ColumnType::Integer);
    assert_eq!(columns[1].column_type, ColumnType::String);
    assert_eq!(columns[2].column_type, ColumnType::Float);
}

#[tokio::test]
async fn incompatible_append_is_a_schema_mismatch() {
    let catalog = catalog();
    catalog.append("p1", "t5", &[sales_batch(5)]).await.unwrap();

    let other = RecordBatch::try_new(
        Arc::new(Schema::new(vec![Field::new("only", DataType::Utf8, false)])),
        vec![Arc::new(StringArray::from(vec!["x"]))],
    )
    .unwrap();

    let err = catalog.append("p1", "t5", &[other]).await.unwrap_err();
    assert!(matches!(err, CoreError::SchemaMismatch(_)));

    // The failed append must not become visible.
    let df = catalog.scan("p1", "t5").await.unwrap();
    let rows: usize = df.collect().await.unwrap().iter().map(|b| b.num_rows()).sum();
    assert_eq!(rows, 5);
}

#[tokio::test]
async fn missing_table_is_not_found() {
    let catalog = catalog();
    let err = catalog.scan("p1", "missing").await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
    let err = catalog.schema("p1", "missing").await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
}

#[tokio::test]
async fn namespace_creation_is_idempotent() {
    let catalog = catalog();
    catalog.create_namespace_if_absent("p1").await.unwrap();
    catalog.create_namespace_if_absent("p1").await.unwrap();
}
