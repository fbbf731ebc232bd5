pub mod config;
pub mod error;
pub mod providers;

pub use config::*;
pub use error::*;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::{collections::BTreeSet, sync::Arc};

/// Key-value document store holding room metadata, ordering and deletion
/// markers. Values are JSON documents; sets hold plain strings.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, MetadataError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), MetadataError>;

    async fn add_to_set(&self, key: &str, member: &str) -> Result<(), MetadataError>;

    async fn remove_from_set(&self, key: &str, member: &str) -> Result<(), MetadataError>;

    async fn members_of(&self, key: &str) -> Result<BTreeSet<String>, MetadataError>;

    fn name(&self) -> &str;
}

pub type DynMetadataStore = Arc<dyn MetadataStore>;

pub async fn create_metadata_store(
    config: &MetadataConfig,
) -> Result<DynMetadataStore, MetadataError> {
    match config {
        MetadataConfig::Upstash(upstash_config) => Ok(Arc::new(
            providers::upstash::UpstashMetadataStore::new(upstash_config)?,
        )),
        MetadataConfig::File(file_config) => Ok(Arc::new(
            providers::file::FileMetadataStore::open(&file_config.path).await?,
        )),
        MetadataConfig::Memory => Ok(Arc::new(providers::memory::MemoryMetadataStore::new())),
    }
}

/// Reads `key` and deserializes it, treating JSON `null` like a missing key.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn MetadataStore,
    key: &str,
) -> Result<Option<T>, MetadataError> {
    match store.get(key).await? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
    }
}

pub async fn set_json<T: Serialize + ?Sized>(
    store: &dyn MetadataStore,
    key: &str,
    value: &T,
) -> Result<(), MetadataError> {
    store.set(key, serde_json::to_value(value)?).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use providers::memory::MemoryMetadataStore;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_json_helpers_round_trip_typed_documents() {
        let store = MemoryMetadataStore::new();
        let mut order = BTreeMap::new();
        order.insert("room1".to_string(), 1u32);

        set_json(&store, "doc", &order).await.unwrap();
        let loaded: Option<BTreeMap<String, u32>> = get_json(&store, "doc").await.unwrap();
        assert_eq!(loaded, Some(order));

        let missing: Option<Vec<String>> = get_json(&store, "missing").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_null_value_reads_as_missing() {
        let store = MemoryMetadataStore::new();
        store.set("room-order", Value::Null).await.unwrap();
        let loaded: Option<Vec<String>> = get_json(&store, "room-order").await.unwrap();
        assert!(loaded.is_none());
    }
}
