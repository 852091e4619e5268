//! Ingest path tests: CSV bytes through inference into the catalog and
//! back out of a scan, including append semantics across batches.

use object_store::memory::InMemory;
use std::io::Write;
use std::sync::Arc;
use url::Url;

use strata_catalog::TableCatalog;
use strata_protocol::{ColumnType, CoreError};
use strata_worker::infer;

fn catalog() -> TableCatalog {
    let store = Arc::new(InMemory::new());
    TableCatalog::new(store, Url::parse("mem://warehouse").unwrap(), "wh")
}

fn write_csv(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn sales_csv(rows: usize) -> String {
    let mut out = String::from("id,name,amount\n");
    for i in 0..rows {
        out.push_str(&format!("{},item{},{}\n", i, i, (i + 1) * 10));
    }
    out
}

#[tokio::test]
async fn csv_lands_in_the_catalog_with_inferred_schema() {
    let catalog = catalog();
    let file = write_csv(&sales_csv(10));

    let table = infer::read_csv(file.path()).unwrap();
    let batch = infer::build_batch(&table).unwrap();

    catalog.create_namespace_if_absent("p1").await.unwrap();
    let appended = catalog.append("p1", "t1", &[batch]).await.unwrap();
    assert_eq!(appended, 10);

    let columns = catalog.schema("p1", "t1").await.unwrap();
    assert_eq!(columns.len(), 3);
    assert_eq!(columns[0].column_type, ColumnType::Integer);
    assert_eq!(columns[1].column_type, ColumnType::String);
    assert_eq!(columns[2].column_type, ColumnType::Integer);

    let df = catalog.scan("p1", "t1").await.unwrap();
    let rows: usize = df.collect().await.unwrap().iter().map(|b| b.num_rows()).sum();
    assert_eq!(rows, 10);
}

#[tokio::test]
async fn repeated_uploads_append_to_the_same_table() {
    let catalog = catalog();
    for rows in [15, 20, 25] {
        let file = write_csv(&sales_csv(rows));
        let table = infer::read_csv(file.path()).unwrap();
        let batch = infer::build_batch(&table).unwrap();
        catalog.append("p1", "t2", &[batch]).await.unwrap();
    }

    let df = catalog.scan("p1", "t2").await.unwrap();
    let rows: usize = df.collect().await.unwrap().iter().map(|b| b.num_rows()).sum();
    assert_eq!(rows, 60);
}

#[tokio::test]
async fn redelivered_upload_appends_twice() {
    // At-least-once delivery: the data layer does not deduplicate.
    let catalog = catalog();
    let file = write_csv(&sales_csv(5));
    let table = infer::read_csv(file.path()).unwrap();

    let batch = infer::build_batch(&table).unwrap();
    catalog.append("p1", "t3", &[batch.clone()]).await.unwrap();
    catalog.append("p1", "t3", &[batch]).await.unwrap();

    let df = catalog.scan("p1", "t3").await.unwrap();
    let rows: usize = df.collect().await.unwrap().iter().map(|b| b.num_rows()).sum();
    assert_eq!(rows, 10);
}

#[tokio::test]
async fn schema_drift_between_uploads_is_rejected() {
    let catalog = catalog();

    let first = write_csv("id,name\n1,a\n");
    let batch = infer::build_batch(&infer::read_csv(first.path()).unwrap()).unwrap();
    catalog.append("p1", "t4", &[batch]).await.unwrap();

    // Same column names but a different inferred type for `id`.
    let second = write_csv("id,name\nnot_a_number,b\n");
    let batch = infer::build_batch(&infer::read_csv(second.path()).unwrap()).unwrap();
    let err = catalog.append("p1", "t4", &[batch]).await.unwrap_err();
    assert!(matches!(err, CoreError::SchemaMismatch(_)));
}
