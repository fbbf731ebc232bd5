pub mod config;
pub mod error;
pub mod providers;

pub use config::*;
pub use error::*;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::{sync::Arc, time::Duration};

/// One listed object: its key inside the bucket and its public URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectEntry {
    pub key: String,
    pub url: String,
}

/// Bucket-style blob storage.
///
/// Listings are allowed to be eventually consistent: a key deleted a moment
/// ago may still be returned by `list` for a short window, and an overwritten
/// key keeps its URL even though its content changed.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores `data` under `key` and returns its public URL. Fails with
    /// [`StorageError::AlreadyExists`] when the key is taken and
    /// `allow_overwrite` is false.
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        allow_overwrite: bool,
    ) -> Result<String, StorageError>;

    async fn get(&self, key: &str) -> Result<Bytes, StorageError>;

    /// Idempotent: deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectEntry>, StorageError>;

    async fn exists(&self, key: &str) -> Result<bool, StorageError>;

    fn public_url(&self, key: &str) -> String;

    fn name(&self) -> &str;

    fn key_from_url(&self, url: &str) -> Option<String> {
        let base = self.public_url("");
        let without_query = url.split(['?', '#']).next().unwrap_or(url);
        let key = without_query.strip_prefix(&base)?.trim_start_matches('/');
        if key.is_empty() {
            None
        } else {
            Some(key.to_string())
        }
    }

    async fn delete_url(&self, url: &str) -> Result<(), StorageError> {
        match self.key_from_url(url) {
            Some(key) => self.delete(&key).await,
            None => {
                tracing::warn!("Could not extract object key from URL: {}", url);
                Ok(())
            }
        }
    }

    async fn exists_url(&self, url: &str) -> Result<bool, StorageError> {
        match self.key_from_url(url) {
            Some(key) => self.exists(&key).await,
            None => Ok(false),
        }
    }
}

pub type DynObjectStore = Arc<dyn ObjectStore>;

pub async fn create_object_store(config: &StorageConfig) -> Result<DynObjectStore, StorageError> {
    match config {
        StorageConfig::S3(s3_config) => Ok(Arc::new(
            providers::s3::S3ObjectStore::new(s3_config).await?,
        )),
        StorageConfig::Local(local_config) => Ok(Arc::new(
            providers::local::LocalObjectStore::new(local_config).await?,
        )),
        StorageConfig::Memory(memory_config) => Ok(Arc::new(
            providers::memory::MemoryObjectStore::new(memory_config.public_base_url.clone()),
        )),
    }
}

/// Bounds every call against the wrapped store with a timeout sized for
/// image payloads.
pub struct TimedObjectStore {
    inner: DynObjectStore,
    timeout: Duration,
}

impl TimedObjectStore {
    pub fn wrap(inner: DynObjectStore, timeout: Duration) -> DynObjectStore {
        Arc::new(Self { inner, timeout })
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        key: &str,
        call: impl Future<Output = Result<T, StorageError>>,
    ) -> Result<T, StorageError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| {
                StorageError::Timeout(format!(
                    "{} {} after {}s",
                    operation,
                    key,
                    self.timeout.as_secs()
                ))
            })?
    }
}

#[async_trait]
impl ObjectStore for TimedObjectStore {
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        allow_overwrite: bool,
    ) -> Result<String, StorageError> {
        self.bounded(
            "put",
            key,
            self.inner.put(key, data, content_type, allow_overwrite),
        )
        .await
    }

    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        self.bounded("get", key, self.inner.get(key)).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.bounded("delete", key, self.inner.delete(key)).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectEntry>, StorageError> {
        self.bounded("list", prefix, self.inner.list(prefix)).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        self.bounded("exists", key, self.inner.exists(key)).await
    }

    fn public_url(&self, key: &str) -> String {
        self.inner.public_url(key)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

pub(crate) fn is_image_file(file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    lower.ends_with(".jpg")
        || lower.ends_with(".jpeg")
        || lower.ends_with(".png")
        || lower.ends_with(".webp")
}

pub fn content_type_for(file_name: &str) -> String {
    mime_guess::from_path(file_name)
        .first_raw()
        .unwrap_or("image/jpeg")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use providers::memory::MemoryObjectStore;

    #[test]
    fn test_key_from_url_strips_base_and_query() {
        let store = MemoryObjectStore::new("https://cdn.example.com".to_string());
        assert_eq!(
            store.key_from_url("https://cdn.example.com/rooms/room1/main.jpg?v=42"),
            Some("rooms/room1/main.jpg".to_string())
        );
        assert_eq!(store.key_from_url("https://elsewhere.example.com/x.jpg"), None);
        assert_eq!(store.key_from_url("https://cdn.example.com/"), None);
    }

    #[test]
    fn test_content_type_for_extensions() {
        assert_eq!(content_type_for("main.jpg"), "image/jpeg");
        assert_eq!(content_type_for("image-2.png"), "image/png");
        assert_eq!(content_type_for("image-3.webp"), "image/webp");
        assert_eq!(content_type_for("unknown"), "image/jpeg");
    }

    #[tokio::test]
    async fn test_timed_store_passes_calls_through() {
        let inner: DynObjectStore = Arc::new(MemoryObjectStore::new("memory://b".to_string()));
        let store = TimedObjectStore::wrap(inner, Duration::from_secs(5));
        let url = store
            .put("hero/a.jpg", Bytes::from_static(b"abc"), "image/jpeg", false)
            .await
            .unwrap();
        assert_eq!(url, "memory://b/hero/a.jpg");
        assert!(store.exists_url(&url).await.unwrap());
        store.delete_url(&url).await.unwrap();
        assert!(!store.exists("hero/a.jpg").await.unwrap());
    }
}
