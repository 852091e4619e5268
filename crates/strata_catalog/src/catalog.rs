//! Table catalog facade.
//!
//! Create namespaces, append record batches to a table (creating it when
//! absent), scan through DataFusion with predicate/projection pushdown, and
//! read schemas from metadata alone. All state lives in the warehouse
//! bucket; see `manifest` for the commit protocol.

use arrow::array::RecordBatch;
use bytes::Bytes;
use futures::StreamExt;
use object_store::path::Path as StorePath;
use object_store::{ObjectStore, PutMode, PutPayload};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::sync::Arc;
use url::Url;

use datafusion::dataframe::DataFrame;
use datafusion::prelude::{ParquetReadOptions, SessionContext};

use strata_protocol::paths::table_prefix;
use strata_protocol::{ColumnSpec, CoreError, CoreResult};
use tracing::{debug, info, warn};

use crate::manifest::{columns_from_schema, DataFile, TableManifest};

/// Committers that lose the conditional put this many times in a row give
/// up; contention beyond that indicates a stuck writer, not racing appends.
const MAX_COMMIT_ATTEMPTS: usize = 5;

/// Facade over one warehouse bucket.
#[derive(Clone)]
pub struct TableCatalog {
    store: Arc<dyn ObjectStore>,
    /// Store URL DataFusion resolves the bucket by, e.g. `s3://warehouse`.
    base_url: Url,
    warehouse_path: String,
}

impl TableCatalog {
    pub fn new(store: Arc<dyn ObjectStore>, base_url: Url, warehouse_path: &str) -> Self {
        Self {
            store,
            base_url,
            warehouse_path: warehouse_path.trim_matches('/').to_string(),
        }
    }

    /// Production constructor: S3-compatible warehouse bucket.
    pub fn connect_s3(
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
        warehouse_path: &str,
    ) -> CoreResult<Self> {
        let store = object_store::aws::AmazonS3Builder::new()
            .with_endpoint(endpoint)
            .with_allow_http(true)
            .with_bucket_name(bucket)
            .with_access_key_id(access_key)
            .with_secret_access_key(secret_key)
            .with_region("us-east-1")
            .with_virtual_hosted_style_request(false)
            .build()
            .map_err(|e| CoreError::catalog_with("build s3 store", Box::new(e)))?;
        let base_url = Url::parse(&format!("s3://{}", bucket))
            .map_err(|e| CoreError::catalog_with("parse store url", Box::new(e)))?;
        Ok(Self::new(Arc::new(store), base_url, warehouse_path))
    }

    /// Idempotent namespace marker under `<warehouse_path>/<project>/`.
    pub async fn create_namespace_if_absent(&self, project: &str) -> CoreResult<()> {
        let marker = StorePath::from(format!("{}/{}/.project", self.warehouse_path, project));
        let payload = PutPayload::from_static(b"{}");
        match self
            .store
            .put_opts(&marker, payload, PutMode::Create.into())
            .await
        {
            Ok(_) => {
                info!("Created namespace '{}'", project);
                Ok(())
            }
            Err(object_store::Error::AlreadyExists { .. }) => Ok(()),
            Err(e) => Err(CoreError::catalog_with("create namespace", Box::new(e))),
        }
    }

    pub async fn table_exists(&self, project: &str, table: &str) -> CoreResult<bool> {
        Ok(self.load_manifest(project, table).await?.is_some())
    }

    /// Append batches to a table, creating it with the batch schema when
    /// absent. Returns the number of appended rows. Atomic: concurrent
    /// committers collide on the manifest version and retry on the reloaded
    /// state.
    pub async fn append(
        &self,
        project: &str,
        table: &str,
        batches: &[RecordBatch],
    ) -> CoreResult<u64> {
        let first = batches
            .first()
            .ok_or_else(|| CoreError::invalid_input("append with no batches"))?;
        let incoming = columns_from_schema(&first.schema());
        let row_count: u64 = batches.iter().map(|b| b.num_rows() as u64).sum();

        // Stage the part file first; it stays invisible until a manifest
        // names it, so a failed commit leaves only an orphan blob.
        let part_path = format!(
            "{}/data/part-{}.parquet",
            self.table_root(project, table),
            uuid::Uuid::new_v4()
        );
        let size_bytes = self.write_parquet(&part_path, batches).await?;
        let file = DataFile {
            path: part_path,
            row_count,
            size_bytes,
        };

        for attempt in 0..MAX_COMMIT_ATTEMPTS {
            let next = match self.load_manifest(project, table).await? {
                Some(current) => {
                    current
                        .check_compatible(&incoming)
                        .map_err(CoreError::SchemaMismatch)?;
                    current.with_file(file.clone())
                }
                None => TableManifest::initial(incoming.clone()).with_file(file.clone()),
            };

            match self.put_manifest(project, table, &next).await {
                Ok(()) => {
                    debug!(
                        "committed {}.{} v{} (+{} rows)",
                        project, table, next.version, row_count
                    );
                    return Ok(row_count);
                }
                Err(CommitError::Conflict) => {
                    warn!(
                        "manifest conflict on {}.{} (attempt {}), reloading",
                        project,
                        table,
                        attempt + 1
                    );
                    continue;
                }
                Err(CommitError::Other(e)) => return Err(e),
            }
        }
        Err(CoreError::catalog(format!(
            "append to {}.{} lost {} commit races",
            project, table, MAX_COMMIT_ATTEMPTS
        )))
    }

    /// Lazily-evaluated scan of the committed file set. Filters and
    /// projections applied to the returned frame push down into Parquet.
    pub async fn scan(&self, project: &str, table: &str) -> CoreResult<DataFrame> {
        let manifest = self
            .load_manifest(project, table)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("table {}.{}", project, table)))?;

        let ctx = SessionContext::new();
        ctx.register_object_store(&self.base_url, self.store.clone());

        if manifest.files.is_empty() {
            let schema = crate::manifest::schema_from_columns(&manifest.schema);
            let empty = RecordBatch::new_empty(schema);
            return ctx
                .read_batch(empty)
                .map_err(|e| CoreError::catalog_with("empty scan", Box::new(e)));
        }

        let urls: Vec<String> = manifest
            .files
            .iter()
            .map(|f| format!("{}/{}", self.base_url, f.path))
            .collect();
        ctx.read_parquet(urls, ParquetReadOptions::default())
            .await
            .map_err(|e| CoreError::catalog_with("open parquet scan", Box::new(e)))
    }

    /// Declared schema from table metadata; no data is read.
    pub async fn schema(&self, project: &str, table: &str) -> CoreResult<Vec<ColumnSpec>> {
        let manifest = self
            .load_manifest(project, table)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("table {}.{}", project, table)))?;
        Ok(manifest.schema)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn table_root(&self, project: &str, table: &str) -> String {
        table_prefix(&self.warehouse_path, project, table)
    }

    fn manifest_prefix(&self, project: &str, table: &str) -> StorePath {
        StorePath::from(format!("{}/_manifest", self.table_root(project, table)))
    }

    fn manifest_path(&self, project: &str, table: &str, version: u64) -> StorePath {
        StorePath::from(format!(
            "{}/_manifest/v{:06}.json",
            self.table_root(project, table),
            version
        ))
    }

    /// Highest committed manifest, or `None` for an absent table.
    async fn load_manifest(
        &self,
        project: &str,
        table: &str,
    ) -> CoreResult<Option<TableManifest>> {
        let prefix = self.manifest_prefix(project, table);
        let mut listing = self.store.list(Some(&prefix));
        let mut latest: Option<(u64, StorePath)> = None;
        while let Some(meta) = listing.next().await {
            let meta = meta.map_err(|e| CoreError::catalog_with("list manifests", Box::new(e)))?;
            if let Some(version) = parse_manifest_version(meta.location.filename()) {
                if latest.as_ref().map(|(v, _)| version > *v).unwrap_or(true) {
                    latest = Some((version, meta.location));
                }
            }
        }
        let Some((_, path)) = latest else {
            return Ok(None);
        };

        let raw = self
            .store
            .get(&path)
            .await
            .map_err(|e| CoreError::catalog_with("read manifest", Box::new(e)))?
            .bytes()
            .await
            .map_err(|e| CoreError::catalog_with("read manifest body", Box::new(e)))?;
        let manifest = serde_json::from_slice(&raw)
            .map_err(|e| CoreError::catalog_with("decode manifest", Box::new(e)))?;
        Ok(Some(manifest))
    }

    async fn put_manifest(
        &self,
        project: &str,
        table: &str,
        manifest: &TableManifest,
    ) -> Result<(), CommitError> {
        let path = self.manifest_path(project, table, manifest.version);
        let raw = serde_json::to_vec(manifest)
            .map_err(|e| CommitError::Other(CoreError::catalog_with("encode manifest", Box::new(e))))?;
        match self
            .store
            .put_opts(&path, Bytes::from(raw).into(), PutMode::Create.into())
            .await
        {
            Ok(_) => Ok(()),
            Err(object_store::Error::AlreadyExists { .. }) => Err(CommitError::Conflict),
            Err(e) => Err(CommitError::Other(CoreError::catalog_with(
                "write manifest",
                Box::new(e),
            ))),
        }
    }

    async fn write_parquet(&self, key: &str, batches: &[RecordBatch]) -> CoreResult<u64> {
        let schema = batches[0].schema();
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let mut buf = Vec::new();
        {
            let mut writer = ArrowWriter::try_new(&mut buf, schema, Some(props))
                .map_err(|e| CoreError::catalog_with("open parquet writer", Box::new(e)))?;
            for batch in batches {
                writer
                    .write(batch)
                    .map_err(|e| CoreError::catalog_with("write parquet", Box::new(e)))?;
            }
            writer
                .close()
                .map_err(|e| CoreError::catalog_with("close parquet writer", Box::new(e)))?;
        }
        let size = buf.len() as u64;
        self.store
            .put(&StorePath::from(key), Bytes::from(buf).into())
            .await
            .map_err(|e| CoreError::catalog_with("upload part file", Box::new(e)))?;
        Ok(size)
    }
}

enum CommitError {
    Conflict,
    Other(CoreError),
}

fn parse_manifest_version(filename: Option<&str>) -> Option<u64> {
    let name = filename?;
    let stem = name.strip_prefix('v')?.strip_suffix(".json")?;
    stem.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_manifest_versions() {
        assert_eq!(parse_manifest_version(Some("v000001.json")), Some(1));
        assert_eq!(parse_manifest_version(Some("v000042.json")), Some(42));
        assert_eq!(parse_manifest_version(Some("current.json")), None);
        assert_eq!(parse_manifest_version(None), None);
    }
}
