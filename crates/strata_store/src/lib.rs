//! Object store gateway.
//!
//! Thin facade over an S3-compatible service (MinIO in the default
//! deployment): put/get of opaque blobs under bucket+key, nothing else. The
//! core never lists; paths are constructed in `strata_protocol::paths`.

use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::path::Path;
use tracing::{debug, info, warn};

use strata_protocol::{CoreError, CoreResult};

/// S3 gateway with lazy bucket creation.
#[derive(Clone)]
pub struct ObjectStoreGateway {
    client: Client,
}

impl ObjectStoreGateway {
    /// Build a client against a custom endpoint with static credentials and
    /// path-style addressing (required by MinIO).
    pub fn connect(endpoint: &str, access_key: &str, secret_key: &str) -> Self {
        let credentials = Credentials::new(access_key, secret_key, None, None, "static");
        let config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .endpoint_url(endpoint)
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();
        Self {
            client: Client::from_conf(config),
        }
    }

    /// Upload a local file. Creates the bucket on first use.
    pub async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        local: &Path,
        content_type: &str,
    ) -> CoreResult<()> {
        match self.put_once(bucket, key, local, content_type).await {
            Ok(()) => Ok(()),
            Err(err) if err_code_is(&err, "NoSuchBucket") => {
                info!("Bucket '{}' absent, creating", bucket);
                self.ensure_bucket(bucket).await?;
                self.put_once(bucket, key, local, content_type)
                    .await
                    .map_err(|e| storage_err(format!("put {}/{}", bucket, key), e))
            }
            Err(err) => Err(storage_err(format!("put {}/{}", bucket, key), err)),
        }
    }

    async fn put_once(
        &self,
        bucket: &str,
        key: &str,
        local: &Path,
        content_type: &str,
    ) -> Result<(), aws_sdk_s3::error::SdkError<aws_sdk_s3::operation::put_object::PutObjectError>>
    {
        let body = ByteStream::from_path(local).await.map_err(|e| {
            aws_sdk_s3::error::SdkError::construction_failure(e)
        })?;
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(body)
            .send()
            .await?;
        debug!("put {}/{} from {}", bucket, key, local.display());
        Ok(())
    }

    /// Download a blob into a local file, returning its size in bytes.
    pub async fn get_to_file(&self, bucket: &str, key: &str, dest: &Path) -> CoreResult<u64> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                let service = err.into_service_error();
                if service.is_no_such_key() {
                    CoreError::not_found(format!("blob {}/{}", bucket, key))
                } else {
                    storage_err(format!("get {}/{}", bucket, key), service)
                }
            })?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| storage_err(format!("read {}/{}", bucket, key), e))?
            .into_bytes();
        let size = data.len() as u64;
        tokio::fs::write(dest, &data)
            .await
            .map_err(|e| storage_err(format!("write {}", dest.display()), e))?;
        debug!("got {}/{} ({} bytes)", bucket, key, size);
        Ok(size)
    }

    /// Cheap reachability probe for the health surface.
    pub async fn ping(&self, bucket: &str) -> CoreResult<()> {
        self.client
            .head_bucket()
            .bucket(bucket)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| storage_err(format!("head bucket {}", bucket), e.into_service_error()))
    }

    /// Create a bucket if it does not already exist. Idempotent.
    pub async fn ensure_bucket(&self, bucket: &str) -> CoreResult<()> {
        match self.client.create_bucket().bucket(bucket).send().await {
            Ok(_) => {
                info!("Created bucket '{}'", bucket);
                Ok(())
            }
            Err(err) => {
                let service = err.into_service_error();
                if service.is_bucket_already_owned_by_you() || service.is_bucket_already_exists() {
                    Ok(())
                } else {
                    warn!("create_bucket '{}' failed: {}", bucket, service);
                    Err(storage_err(format!("create bucket {}", bucket), service))
                }
            }
        }
    }
}

fn storage_err(
    context: String,
    source: impl std::error::Error + Send + Sync + 'static,
) -> CoreError {
    CoreError::storage_with(context, Box::new(source))
}

fn err_code_is<E: ProvideErrorMetadata, R: std::fmt::Debug>(
    err: &aws_sdk_s3::error::SdkError<E, R>,
    code: &str,
) -> bool {
    err.code() == Some(code)
}
