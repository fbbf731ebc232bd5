use crate::storage::{ObjectEntry, ObjectStore, StorageError};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOperation {
    Put,
    Get,
    Delete,
    List,
    Exists,
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_type: String,
}

struct InjectedFault {
    operation: StoreOperation,
    key_fragment: String,
    remaining: usize,
}

/// In-process bucket used for development and tests.
///
/// Failures can be injected per operation and key fragment, and deleted keys
/// can be kept visible in listings for a number of `list` calls to mimic an
/// eventually consistent object store.
pub struct MemoryObjectStore {
    public_base_url: String,
    objects: RwLock<BTreeMap<String, StoredObject>>,
    faults: Mutex<Vec<InjectedFault>>,
    stale_list_calls: usize,
    ghosts: Mutex<HashMap<String, usize>>,
    calls: AtomicUsize,
    mutations: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn new(public_base_url: String) -> Self {
        Self {
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            objects: RwLock::new(BTreeMap::new()),
            faults: Mutex::new(Vec::new()),
            stale_list_calls: 0,
            ghosts: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            mutations: AtomicUsize::new(0),
        }
    }

    /// Deleted keys keep showing up in the next `list_calls` listings.
    pub fn with_stale_listings(mut self, list_calls: usize) -> Self {
        self.stale_list_calls = list_calls;
        self
    }

    /// Makes the next `times` calls of `operation` on keys containing
    /// `key_fragment` fail with a backend error.
    pub fn fail_next(&self, operation: StoreOperation, key_fragment: impl Into<String>, times: usize) {
        let mut faults = self.faults.lock().unwrap_or_else(|e| e.into_inner());
        faults.push(InjectedFault {
            operation,
            key_fragment: key_fragment.into(),
            remaining: times,
        });
    }

    pub async fn insert(&self, key: &str, data: impl Into<Bytes>, content_type: &str) {
        self.objects.write().await.insert(
            key.to_string(),
            StoredObject {
                data: data.into(),
                content_type: content_type.to_string(),
            },
        );
    }

    pub async fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }

    /// Total number of trait calls served, including failed ones.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of successful puts and deletes.
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    fn begin(&self, operation: StoreOperation, key: &str) -> Result<(), StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut faults = self.faults.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(fault) = faults.iter_mut().find(|f| {
            f.operation == operation && f.remaining > 0 && key.contains(&f.key_fragment)
        }) {
            fault.remaining -= 1;
            debug!("Injected {:?} failure for {}", operation, key);
            return Err(StorageError::BackendError(format!(
                "injected {:?} failure for {}",
                operation, key
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        allow_overwrite: bool,
    ) -> Result<String, StorageError> {
        self.begin(StoreOperation::Put, key)?;
        let mut objects = self.objects.write().await;
        if !allow_overwrite && objects.contains_key(key) {
            return Err(StorageError::AlreadyExists(key.to_string()));
        }
        objects.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
            },
        );
        self.ghosts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(self.public_url(key))
    }

    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        self.begin(StoreOperation::Get, key)?;
        self.objects
            .read()
            .await
            .get(key)
            .map(|object| object.data.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.begin(StoreOperation::Delete, key)?;
        let removed = self.objects.write().await.remove(key);
        if removed.is_some() && self.stale_list_calls > 0 {
            self.ghosts
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(key.to_string(), self.stale_list_calls);
        }
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectEntry>, StorageError> {
        self.begin(StoreOperation::List, prefix)?;
        let mut keys: Vec<String> = self
            .objects
            .read()
            .await
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();

        {
            let mut ghosts = self.ghosts.lock().unwrap_or_else(|e| e.into_inner());
            for (key, remaining) in ghosts.iter_mut() {
                if key.starts_with(prefix) && *remaining > 0 {
                    keys.push(key.clone());
                    *remaining -= 1;
                }
            }
            ghosts.retain(|_, remaining| *remaining > 0);
        }

        keys.sort();
        keys.dedup();
        Ok(keys
            .into_iter()
            .map(|key| ObjectEntry {
                url: self.public_url(&key),
                key,
            })
            .collect())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        self.begin(StoreOperation::Exists, key)?;
        Ok(self.objects.read().await.contains_key(key))
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }

    fn name(&self) -> &str {
        "Memory Object Store"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_without_overwrite_rejects_existing_key() {
        let store = MemoryObjectStore::new("memory://b".to_string());
        store
            .put("rooms/room1/main.jpg", Bytes::from_static(b"one"), "image/jpeg", false)
            .await
            .unwrap();

        let result = store
            .put("rooms/room1/main.jpg", Bytes::from_static(b"two"), "image/jpeg", false)
            .await;
        assert!(matches!(result, Err(StorageError::AlreadyExists(_))));

        store
            .put("rooms/room1/main.jpg", Bytes::from_static(b"two"), "image/jpeg", true)
            .await
            .unwrap();
        assert_eq!(store.get("rooms/room1/main.jpg").await.unwrap(), "two");
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryObjectStore::new("memory://b".to_string());
        store.delete("missing.jpg").await.unwrap();
        store.delete("missing.jpg").await.unwrap();
    }

    #[tokio::test]
    async fn test_stale_listing_keeps_deleted_key_visible() {
        let store = MemoryObjectStore::new("memory://b".to_string()).with_stale_listings(2);
        store.insert("rooms/room1/image-1.jpg", &b"x"[..], "image/jpeg").await;
        store.delete("rooms/room1/image-1.jpg").await.unwrap();

        assert_eq!(store.list("rooms/room1/").await.unwrap().len(), 1);
        assert_eq!(store.list("rooms/room1/").await.unwrap().len(), 1);
        assert!(store.list("rooms/room1/").await.unwrap().is_empty());
        assert!(!store.exists("rooms/room1/image-1.jpg").await.unwrap());
    }

    #[tokio::test]
    async fn test_injected_failure_is_consumed() {
        let store = MemoryObjectStore::new("memory://b".to_string());
        store.insert("rooms/room1/main.jpg", &b"x"[..], "image/jpeg").await;
        store.fail_next(StoreOperation::Get, "main.jpg", 1);

        assert!(store.get("rooms/room1/main.jpg").await.is_err());
        assert!(store.get("rooms/room1/main.jpg").await.is_ok());
        assert_eq!(store.call_count(), 2);
    }
}
