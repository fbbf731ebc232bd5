use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum MetadataConfig {
    Upstash(UpstashConfig),
    File(FileMetadataConfig),
    Memory,
}

/// Upstash Redis REST endpoint (what Vercel KV exposes as `KV_REST_API_URL`).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstashConfig {
    pub url: String,
    pub token: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileMetadataConfig {
    pub path: PathBuf,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        MetadataConfig::File(FileMetadataConfig {
            path: PathBuf::from("data/metadata.json"),
        })
    }
}
