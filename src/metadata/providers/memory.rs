use crate::metadata::{MetadataError, MetadataStore};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryMetadataStore {
    values: RwLock<HashMap<String, Value>>,
    sets: RwLock<HashMap<String, BTreeSet<String>>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, MetadataError> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), MetadataError> {
        self.values.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn add_to_set(&self, key: &str, member: &str) -> Result<(), MetadataError> {
        self.sets
            .write()
            .await
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn remove_from_set(&self, key: &str, member: &str) -> Result<(), MetadataError> {
        if let Some(set) = self.sets.write().await.get_mut(key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn members_of(&self, key: &str) -> Result<BTreeSet<String>, MetadataError> {
        Ok(self
            .sets
            .read()
            .await
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    fn name(&self) -> &str {
        "Memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sets_are_deduplicated() {
        let store = MemoryMetadataStore::new();
        store.add_to_set("deleted-rooms", "room3").await.unwrap();
        store.add_to_set("deleted-rooms", "room3").await.unwrap();
        store.add_to_set("deleted-rooms", "room7").await.unwrap();

        let members = store.members_of("deleted-rooms").await.unwrap();
        assert_eq!(members.len(), 2);

        store.remove_from_set("deleted-rooms", "room7").await.unwrap();
        assert!(!store.members_of("deleted-rooms").await.unwrap().contains("room7"));
        assert!(store.members_of("unknown").await.unwrap().is_empty());
    }
}
