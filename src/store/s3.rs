//! S3 / R2 backend.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::MetadataDirective;
use aws_sdk_s3::Client;

use super::{BlobStore, Metadata, ObjectHead, StoreError};
use crate::config::{StorageProvider, StoreConfig};

pub struct S3BlobStore {
    client: Client,
    bucket: String,
}

impl S3BlobStore {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Build a client for the configured provider. R2 uses static keys and
    /// the account endpoint; AWS uses the default credential chain.
    pub async fn connect(config: &StoreConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        let mut path_style = false;

        match &config.provider {
            StorageProvider::R2 {
                account_id,
                access_key_id,
                secret_access_key,
            } => {
                loader = loader
                    .region(Region::new("auto"))
                    .endpoint_url(r2_endpoint(account_id))
                    .credentials_provider(Credentials::new(
                        access_key_id,
                        secret_access_key,
                        None,
                        None,
                        "r2-static",
                    ));
                path_style = true;
            }
            StorageProvider::Aws { region } => {
                loader = loader.region(Region::new(region.clone()));
            }
        }
        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
            path_style = true;
        }

        let sdk_config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(path_style)
            .build();
        tracing::debug!(bucket = %config.bucket, "Object store client ready");
        Self::new(Client::from_conf(s3_config), config.bucket.clone())
    }
}

pub(crate) fn r2_endpoint(account_id: &str) -> String {
    format!("https://{}.r2.cloudflarestorage.com", account_id)
}

fn backend_error<E, R>(op: &'static str, key: &str, err: SdkError<E, R>) -> StoreError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    StoreError::Backend {
        op,
        key: key.to_string(),
        message: DisplayErrorContext(&err).to_string(),
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn head(&self, key: &str) -> Result<ObjectHead, StoreError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(out) => Ok(ObjectHead {
                metadata: out.metadata().cloned().unwrap_or_default(),
                content_length: out.content_length().and_then(|n| u64::try_from(n).ok()),
            }),
            Err(err) => {
                let not_found = matches!(err.as_service_error(), Some(HeadObjectError::NotFound(_)))
                    || err.raw_response().map(|r| r.status().as_u16()) == Some(404);
                if not_found {
                    Err(StoreError::NotFound(key.to_string()))
                } else {
                    Err(backend_error("head", key, err))
                }
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let out = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(out) => out,
            Err(err) => {
                return if matches!(err.as_service_error(), Some(GetObjectError::NoSuchKey(_))) {
                    Err(StoreError::NotFound(key.to_string()))
                } else {
                    Err(backend_error("get", key, err))
                };
            }
        };
        let body = out.body.collect().await.map_err(|e| StoreError::Backend {
            op: "get",
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(body.into_bytes().to_vec())
    }

    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
        metadata: Metadata,
    ) -> Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .set_metadata(Some(metadata))
            .send()
            .await
            .map_err(|e| backend_error("put", key, e))?;
        Ok(())
    }

    async fn copy(
        &self,
        source: &str,
        dest: &str,
        content_type: &str,
        metadata: Metadata,
    ) -> Result<(), StoreError> {
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .key(dest)
            .copy_source(format!("{}/{}", self.bucket, source))
            .metadata_directive(MetadataDirective::Replace)
            .content_type(content_type)
            .set_metadata(Some(metadata))
            .send()
            .await
            .map_err(|e| {
                if matches!(&e, SdkError::ServiceError(se) if se.raw().status().as_u16() == 404) {
                    StoreError::NotFound(source.to_string())
                } else {
                    backend_error("copy", dest, e)
                }
            })?;
        Ok(())
    }
}
