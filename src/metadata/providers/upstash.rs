use crate::metadata::{MetadataError, MetadataStore, UpstashConfig};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::{collections::BTreeSet, time::Duration};
use tracing::{debug, error, warn};

#[derive(Debug, Deserialize)]
struct CommandResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Redis over the Upstash REST API. Documents are stored as JSON strings so
/// they stay readable from any other Redis client.
pub struct UpstashMetadataStore {
    client: reqwest::Client,
    url: String,
    token: String,
}

impl UpstashMetadataStore {
    pub fn new(config: &UpstashConfig) -> Result<Self, MetadataError> {
        if config.url.is_empty() || config.token.is_empty() {
            return Err(MetadataError::ConfigError(
                "Upstash metadata store requires url and token".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    async fn command(&self, args: Value) -> Result<Option<Value>, MetadataError> {
        debug!("Upstash command: {}", args[0]);
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&args)
            .send()
            .await?;

        let status = response.status();
        let body: CommandResponse = response.json().await?;
        if let Some(message) = body.error {
            error!("Upstash returned an error ({}): {}", status, message);
            return Err(MetadataError::BackendError(message));
        }
        if !status.is_success() {
            return Err(MetadataError::BackendError(format!(
                "Upstash request failed with status {}",
                status
            )));
        }
        Ok(body.result)
    }
}

fn is_wrong_type(error: &MetadataError) -> bool {
    matches!(error, MetadataError::BackendError(message) if message.starts_with("WRONGTYPE"))
}

/// Members of a set written as a JSON array document by older deployments.
fn legacy_members(value: Option<Value>) -> BTreeSet<String> {
    match value {
        Some(Value::Array(members)) => members
            .into_iter()
            .filter_map(|member| match member {
                Value::String(s) => Some(s),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        _ => BTreeSet::new(),
    }
}

impl UpstashMetadataStore {
    /// Applies a set change to a key holding a JSON array, keeping that layout
    /// so older deployments sharing the database still read it.
    async fn update_legacy_set(
        &self,
        key: &str,
        change: impl FnOnce(&mut BTreeSet<String>),
    ) -> Result<(), MetadataError> {
        warn!(key = %key, "Set is stored as a JSON array, updating the array");
        let mut members = legacy_members(self.get(key).await?);
        change(&mut members);
        self.set(key, json!(members)).await
    }
}

#[async_trait]
impl MetadataStore for UpstashMetadataStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, MetadataError> {
        match self.command(json!(["GET", key])).await? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Ok(Some(value)),
                // Plain strings written by other clients
                Err(_) => Ok(Some(Value::String(raw))),
            },
            Some(other) => Ok(Some(other)),
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), MetadataError> {
        let encoded = serde_json::to_string(&value)?;
        self.command(json!(["SET", key, encoded])).await?;
        Ok(())
    }

    async fn add_to_set(&self, key: &str, member: &str) -> Result<(), MetadataError> {
        match self.command(json!(["SADD", key, member])).await {
            Ok(_) => Ok(()),
            Err(e) if is_wrong_type(&e) => {
                self.update_legacy_set(key, |members| {
                    members.insert(member.to_string());
                })
                .await
            }
            Err(e) => Err(e),
        }
    }

    async fn remove_from_set(&self, key: &str, member: &str) -> Result<(), MetadataError> {
        match self.command(json!(["SREM", key, member])).await {
            Ok(_) => Ok(()),
            Err(e) if is_wrong_type(&e) => {
                self.update_legacy_set(key, |members| {
                    members.remove(member);
                })
                .await
            }
            Err(e) => Err(e),
        }
    }

    async fn members_of(&self, key: &str) -> Result<BTreeSet<String>, MetadataError> {
        match self.command(json!(["SMEMBERS", key])).await {
            Ok(result) => Ok(legacy_members(result)),
            Err(e) if is_wrong_type(&e) => Ok(legacy_members(self.get(key).await?)),
            Err(e) => Err(e),
        }
    }

    fn name(&self) -> &str {
        "Upstash Redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_url_and_token() {
        let result = UpstashMetadataStore::new(&UpstashConfig {
            url: "https://example.upstash.io".to_string(),
            token: String::new(),
        });
        assert!(matches!(result, Err(MetadataError::ConfigError(_))));
    }

    #[test]
    fn test_command_response_parsing() {
        let ok: CommandResponse = serde_json::from_str(r#"{"result":"OK"}"#).unwrap();
        assert_eq!(ok.result, Some(Value::String("OK".to_string())));
        let err: CommandResponse = serde_json::from_str(r#"{"error":"WRONGTYPE"}"#).unwrap();
        assert_eq!(err.error.as_deref(), Some("WRONGTYPE"));
    }

    #[test]
    fn test_wrong_type_errors_are_recognised() {
        let wrong = MetadataError::BackendError(
            "WRONGTYPE Operation against a key holding the wrong kind of value".to_string(),
        );
        assert!(is_wrong_type(&wrong));
        assert!(!is_wrong_type(&MetadataError::BackendError("ERR timeout".to_string())));
    }

    #[test]
    fn test_members_read_from_json_array_document() {
        let members = legacy_members(Some(json!(["room2", "room5", null, 7])));
        assert_eq!(
            members,
            BTreeSet::from(["7".to_string(), "room2".to_string(), "room5".to_string()])
        );
        assert!(legacy_members(Some(json!({"room2": true}))).is_empty());
        assert!(legacy_members(None).is_empty());
    }
}
