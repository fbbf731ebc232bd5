use crate::translation::{MyMemoryConfig, TranslationError, Translator};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MyMemoryResponse {
    #[serde(default)]
    response_data: Option<ResponseData>,
    #[serde(default)]
    response_status: Value,
    #[serde(default)]
    response_details: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseData {
    #[serde(default)]
    translated_text: Option<String>,
}

/// MyMemory free translation API, English source.
pub struct MyMemoryTranslator {
    client: reqwest::Client,
    endpoint: String,
    contact_email: Option<String>,
}

impl MyMemoryTranslator {
    pub fn new(config: &MyMemoryConfig) -> Result<Self, TranslationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            contact_email: config.contact_email.clone(),
        })
    }

    fn request_url(&self, text: &str, target_language: &str) -> Result<url::Url, TranslationError> {
        let langpair = format!("en|{}", service_language_code(target_language));
        let mut params = vec![("q", text), ("langpair", langpair.as_str())];
        if let Some(email) = &self.contact_email {
            params.push(("de", email.as_str()));
        }
        url::Url::parse_with_params(&format!("{}/get", self.endpoint), &params)
            .map_err(|e| TranslationError::ConfigError(format!("invalid endpoint: {}", e)))
    }
}

/// The service wants a region for Simplified Chinese.
pub fn service_language_code(language: &str) -> &str {
    match language {
        "zh" => "zh-CN",
        other => other,
    }
}

#[async_trait]
impl Translator for MyMemoryTranslator {
    async fn translate(&self, text: &str, target_language: &str) -> Result<String, TranslationError> {
        let url = self.request_url(text, target_language)?;
        debug!("Translating {} chars to {}", text.len(), target_language);

        let response = self.client.get(url).send().await?;
        let http_status = response.status();
        if !http_status.is_success() {
            return Err(TranslationError::ServiceError {
                status: http_status.as_u16(),
                message: "translation request failed".to_string(),
            });
        }

        let body: MyMemoryResponse = response.json().await?;
        let status = match &body.response_status {
            Value::Number(n) => n.as_u64().unwrap_or(0) as u16,
            Value::String(s) => s.parse().unwrap_or(0),
            _ => 0,
        };
        let translated = body
            .response_data
            .and_then(|data| data.translated_text)
            .filter(|t| !t.trim().is_empty());

        match translated {
            Some(text) if status == 200 => Ok(text),
            _ => {
                let message = body
                    .response_details
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "no translation returned".to_string());
                warn!("Translation to {} failed ({}): {}", target_language, status, message);
                Err(TranslationError::ServiceError { status, message })
            }
        }
    }

    fn name(&self) -> &str {
        "MyMemory"
    }
}
