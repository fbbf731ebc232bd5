use crate::metadata::{MetadataError, MetadataStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    values: BTreeMap<String, Value>,
    #[serde(default)]
    sets: BTreeMap<String, BTreeSet<String>>,
}

/// Single JSON document on disk, for local development without a Redis.
/// Every mutation rewrites the whole file through a temp file and rename.
pub struct FileMetadataStore {
    path: PathBuf,
    document: Mutex<Document>,
}

impl FileMetadataStore {
    pub async fn open(path: &Path) -> Result<Self, MetadataError> {
        let document = match tokio::fs::read_to_string(path).await {
            Ok(content) if content.trim().is_empty() => Document::default(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Metadata file {:?} not found, starting empty", path);
                Document::default()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path: path.to_path_buf(),
            document: Mutex::new(document),
        })
    }

    async fn persist(&self, document: &Document) -> Result<(), MetadataError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_vec_pretty(document)?;
        let temp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, content).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;
        debug!("Persisted metadata to {:?}", self.path);
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for FileMetadataStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, MetadataError> {
        Ok(self.document.lock().await.values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), MetadataError> {
        let mut document = self.document.lock().await;
        document.values.insert(key.to_string(), value);
        self.persist(&document).await
    }

    async fn add_to_set(&self, key: &str, member: &str) -> Result<(), MetadataError> {
        let mut document = self.document.lock().await;
        let inserted = document
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        if inserted {
            self.persist(&document).await?;
        }
        Ok(())
    }

    async fn remove_from_set(&self, key: &str, member: &str) -> Result<(), MetadataError> {
        let mut document = self.document.lock().await;
        let removed = document
            .sets
            .get_mut(key)
            .map(|set| set.remove(member))
            .unwrap_or(false);
        if removed {
            self.persist(&document).await?;
        }
        Ok(())
    }

    async fn members_of(&self, key: &str) -> Result<BTreeSet<String>, MetadataError> {
        Ok(self
            .document
            .lock()
            .await
            .sets
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    fn name(&self) -> &str {
        "File"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_values_and_sets_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data").join("metadata.json");

        {
            let store = FileMetadataStore::open(&path).await.unwrap();
            store
                .set("room-order", json!(["room1", "room2"]))
                .await
                .unwrap();
            store.add_to_set("deleted-rooms", "room4").await.unwrap();
        }

        let reopened = FileMetadataStore::open(&path).await.unwrap();
        assert_eq!(
            reopened.get("room-order").await.unwrap(),
            Some(json!(["room1", "room2"]))
        );
        assert!(
            reopened
                .members_of("deleted-rooms")
                .await
                .unwrap()
                .contains("room4")
        );
    }

    #[tokio::test]
    async fn test_missing_file_starts_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileMetadataStore::open(&temp_dir.path().join("none.json"))
            .await
            .unwrap();
        assert!(store.get("room-metadata").await.unwrap().is_none());
    }
}
