use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum StorageConfig {
    S3(S3StorageConfig),
    Local(LocalStorageConfig),
    Memory(MemoryStorageConfig),
}

/// S3-compatible bucket. Defaults target Cloudflare R2.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct S3StorageConfig {
    pub bucket: String,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    /// Custom public domain. Falls back to the r2.dev URL of the bucket.
    #[serde(default)]
    pub public_url: Option<String>,
    #[serde(default)]
    pub force_path_style: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LocalStorageConfig {
    pub directory: PathBuf,
    #[serde(default = "default_local_prefix")]
    pub public_url_prefix: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MemoryStorageConfig {
    #[serde(default = "default_memory_base")]
    pub public_base_url: String,
}

fn default_region() -> String {
    "auto".to_string()
}

fn default_local_prefix() -> String {
    "/media".to_string()
}

fn default_memory_base() -> String {
    "memory://bucket".to_string()
}

impl S3StorageConfig {
    pub fn endpoint_url(&self) -> Option<String> {
        self.endpoint.clone().or_else(|| {
            self.account_id
                .as_ref()
                .map(|account| format!("https://{}.r2.cloudflarestorage.com", account))
        })
    }

    pub fn public_base_url(&self) -> String {
        match &self.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!(
                "https://pub-{}.r2.dev/{}",
                self.account_id.as_deref().unwrap_or_default(),
                self.bucket
            ),
        }
    }
}

impl Default for MemoryStorageConfig {
    fn default() -> Self {
        Self {
            public_base_url: default_memory_base(),
        }
    }
}
