//! Query plan tests over an in-memory catalog: the fixed stage order,
//! silent filter dropping, aggregation with implicit grouping, ordering,
//! pagination, and the preview shape.

use arrow::array::{Float64Array, Int64Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use object_store::memory::InMemory;
use std::sync::Arc;
use url::Url;

use strata_catalog::TableCatalog;
use strata_protocol::QuerySpec;
use strata_worker::query::{build_plan, preview_json};

fn catalog() -> TableCatalog {
    let store = Arc::new(InMemory::new());
    TableCatalog::new(store, Url::parse("mem://warehouse").unwrap(), "wh")
}

/// 60 rows: regions A/B/C cycling, revenue cycling 100/200/300.
fn revenue_batch() -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("region", DataType::Utf8, false),
        Field::new("revenue", DataType::Float64, false),
    ]));
    let ids: Vec<i64> = (0..60).collect();
    let regions: Vec<&str> = (0..60)
        .map(|i| ["A", "B", "C"][(i % 3) as usize])
        .collect();
    let revenue: Vec<f64> = (0..60).map(|i| [100.0, 200.0, 300.0][(i % 3) as usize]).collect();
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

async fn seeded_catalog() -> TableCatalog {
    let catalog = catalog();
    catalog.append("p1", "t", &[revenue_batch()]).await.unwrap();
    catalog
}

fn spec(json: &str) -> QuerySpec {
    serde_json::from_str(json).unwrap()
}

async fn run(catalog: &TableCatalog, spec: &QuerySpec) -> Vec<RecordBatch> {
    let frame = catalog.scan("p1", "t").await.unwrap();
    build_plan(frame, spec).unwrap().collect().await.unwrap()
}

fn total_rows(batches: &[RecordBatch]) -> usize {
    batches.iter().map(|b| b.num_rows()).sum()
}

#[tokio::test]
async fn equality_filter_selects_matching_rows() {
    let catalog = seeded_catalog().await;
    let q = spec(
        r#"{"source":"p1.t","select":[{"column":"region"},{"column":"revenue"}],
            "filters":[{"column":"region","operator":"=","value":"A"}]}"#,
    );
    let batches = run(&catalog, &q).await;
    assert_eq!(total_rows(&batches), 20);

    let preview = preview_json(&batches, 10_000).unwrap();
    let rows = preview.as_array().unwrap();
    assert_eq!(rows.len(), 20);
    assert!(rows.iter().all(|r| r["region"] == "A"));
}

#[tokio::test]
async fn unknown_operator_is_dropped_and_query_succeeds() {
    let catalog = seeded_catalog().await;
    let q = spec(
        r#"{"source":"p1.t","select":[{"column":"*"}],
            "filters":[{"column":"region","operator":"~=","value":"A"}]}"#,
    );
    let batches = run(&catalog, &q).await;
    assert_eq!(total_rows(&batches), 60);
}

#[tokio::test]
async fn aggregation_groups_orders_and_renames() {
    let catalog = seeded_catalog().await;
    let q = spec(
        r#"{"source":"p1.t",
            "select":[{"column":"region","as":"r"},
                      {"column":"revenue","aggregation":"sum","as":"total"}],
            "group_by":["region"],
            "order_by":[{"column":"total","direction":"desc"}]}"#,
    );
    let batches = run(&catalog, &q).await;
    assert_eq!(total_rows(&batches), 3);

    let preview = preview_json(&batches, 10_000).unwrap();
    let rows = preview.as_array().unwrap();
    assert_eq!(rows.len(), 3);
    // Output column names follow the aliases.
    assert!(rows[0].get("r").is_some());
    assert!(rows[0].get("total").is_some());
    // Ordered by total descending: C (300×20) first, A (100×20) last.
    assert_eq!(rows[0]["r"], "C");
    assert_eq!(rows[2]["r"], "A");
    assert_eq!(rows[0]["total"], 6000.0);
}

#[tokio::test]
async fn count_star_returns_row_count() {
    let catalog = seeded_catalog().await;
    let q = spec(
        r#"{"source":"p1.t","select":[{"column":"*","aggregation":"count","as":"n"}]}"#,
    );
    let batches = run(&catalog, &q).await;
    let preview = preview_json(&batches, 10_000).unwrap();
    assert_eq!(preview[0]["n"], 60);
}

#[tokio::test]
async fn pagination_applies_offset_then_limit() {
    let catalog = seeded_catalog().await;
    let q = spec(
        r#"{"source":"p1.t","select":[{"column":"id"}],
            "order_by":[{"column":"id"}],"limit":10,"offset":5}"#,
    );
    let batches = run(&catalog, &q).await;
    assert_eq!(total_rows(&batches), 10);
    let preview = preview_json(&batches, 10_000).unwrap();
    assert_eq!(preview[0]["id"], 5);
    assert_eq!(preview[9]["id"], 14);
}

#[tokio::test]
async fn limit_zero_yields_empty_result_and_preview() {
    let catalog = seeded_catalog().await;
    let q = spec(r#"{"source":"p1.t","select":[{"column":"*"}],"limit":0}"#);
    let batches = run(&catalog, &q).await;
    assert_eq!(total_rows(&batches), 0);

    let preview = preview_json(&batches, 10_000).unwrap();
    assert_eq!(preview.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn between_and_in_filters_compose_by_conjunction() {
    let catalog = seeded_catalog().await;
    let q = spec(
        r#"{"source":"p1.t","select":[{"column":"id"},{"column":"region"}],
            "filters":[{"column":"id","operator":"between","value":0,"value2":29},
                       {"column":"region","operator":"in","value":["A","B"]}]}"#,
    );
    let batches = run(&catalog, &q).await;
    // Rows 0..=29 contain 10 each of A/B/C; A and B survive.
    assert_eq!(total_rows(&batches), 20);
}

#[tokio::test]
async fn preview_is_capped_at_max_rows() {
    let catalog = seeded_catalog().await;
    let q = spec(r#"{"source":"p1.t","select":[{"column":"id"}]}"#);
    let batches = run(&catalog, &q).await;
    assert_eq!(total_rows(&batches), 60);

    let preview = preview_json(&batches, 25).unwrap();
    assert_eq!(preview.as_array().unwrap().len(), 25);
}

#[tokio::test]
async fn identical_specs_are_deterministic() {
    let catalog = seeded_catalog().await;
    let q = spec(
        r#"{"source":"p1.t","select":[{"column":"id"},{"column":"revenue"}],
            "filters":[{"column":"revenue","operator":">","value":150}],
            "order_by":[{"column":"id","direction":"asc"}]}"#,
    );
    let first = run(&catalog, &q).await;
    let second = run(&catalog, &q).await;
    assert_eq!(total_rows(&first), total_rows(&second));
    assert_eq!(
        preview_json(&first, 10_000).unwrap(),
        preview_json(&second, 10_000).unwrap()
    );
}
