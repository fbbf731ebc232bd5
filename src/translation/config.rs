use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum TranslationConfig {
    MyMemory(MyMemoryConfig),
    Null,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MyMemoryConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Raises the free daily quota when set.
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_endpoint() -> String {
    "https://api.mymemory.translated.net".to_string()
}

fn default_timeout_secs() -> u64 {
    15
}

impl Default for MyMemoryConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            contact_email: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        TranslationConfig::MyMemory(MyMemoryConfig::default())
    }
}
