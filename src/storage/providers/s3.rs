use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    Client,
    config::{Credentials, Region},
    error::DisplayErrorContext,
    primitives::ByteStream,
};
use bytes::Bytes;
use tracing::{debug, error};

use crate::storage::{ObjectEntry, ObjectStore, S3StorageConfig, StorageError};

/// S3-compatible bucket, normally Cloudflare R2.
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    public_base_url: String,
}

impl S3ObjectStore {
    pub async fn new(config: &S3StorageConfig) -> Result<Self, StorageError> {
        if config.bucket.is_empty() {
            return Err(StorageError::ConfigError(
                "S3 storage requires a bucket name".to_string(),
            ));
        }

        let mut aws_config_builder = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        // Explicit keys win; otherwise the default provider chain applies
        if let (Some(access_key), Some(secret_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            let credentials =
                Credentials::new(access_key, secret_key, None, None, "picainn-object-store");
            aws_config_builder = aws_config_builder.credentials_provider(credentials);
        }

        let shared_config = aws_config_builder.load().await;
        let mut s3_config_builder =
            aws_sdk_s3::config::Builder::from(&shared_config).force_path_style(config.force_path_style);
        if let Some(endpoint) = config.endpoint_url() {
            debug!("Using S3 endpoint {}", endpoint);
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        Ok(Self {
            client: Client::from_conf(s3_config_builder.build()),
            bucket: config.bucket.clone(),
            public_base_url: config.public_base_url(),
        })
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        allow_overwrite: bool,
    ) -> Result<String, StorageError> {
        debug!("Uploading {} ({} bytes) to bucket {}", key, data.len(), self.bucket);
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data));
        if !allow_overwrite {
            request = request.if_none_match("*");
        }

        match request.send().await {
            Ok(_) => Ok(self.public_url(key)),
            Err(e) => {
                let precondition_failed = e
                    .raw_response()
                    .map(|response| response.status().as_u16() == 412)
                    .unwrap_or(false);
                if precondition_failed {
                    return Err(StorageError::AlreadyExists(key.to_string()));
                }
                error!("Failed to upload {}: {}", key, DisplayErrorContext(&e));
                Err(StorageError::BackendError(format!(
                    "put {}: {}",
                    key,
                    DisplayErrorContext(&e)
                )))
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map(|s| s.is_no_such_key()).unwrap_or(false) {
                    StorageError::NotFound(key.to_string())
                } else {
                    StorageError::BackendError(format!("get {}: {}", key, DisplayErrorContext(&e)))
                }
            })?;

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::BackendError(format!("read {}: {}", key, e)))?;
        Ok(body.into_bytes())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                StorageError::BackendError(format!("delete {}: {}", key, DisplayErrorContext(&e)))
            })?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectEntry>, StorageError> {
        let mut entries = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .map_err(|e| {
                    StorageError::BackendError(format!(
                        "list {}: {}",
                        prefix,
                        DisplayErrorContext(&e)
                    ))
                })?;

            for object in output.contents() {
                if let Some(key) = object.key() {
                    entries.push(ObjectEntry {
                        key: key.to_string(),
                        url: self.public_url(key),
                    });
                }
            }

            match output.next_continuation_token() {
                Some(token) if output.is_truncated().unwrap_or(false) => {
                    continuation_token = Some(token.to_string());
                }
                _ => break,
            }
        }

        Ok(entries)
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().map(|s| s.is_not_found()).unwrap_or(false) => Ok(false),
            Err(e) => Err(StorageError::BackendError(format!(
                "head {}: {}",
                key,
                DisplayErrorContext(&e)
            ))),
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }

    fn name(&self) -> &str {
        "S3"
    }
}
