use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmailConfig {
    pub from_address: String,
    pub from_name: Option<String>,
    /// Where booking inquiries are delivered.
    pub contact_address: String,
    #[serde(flatten)]
    pub provider: EmailProviderConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum EmailProviderConfig {
    Ses(SesConfig),
    Null,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SesConfig {
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl EmailConfig {
    pub fn format_from(&self) -> String {
        match &self.from_name {
            Some(name) => format!("{} <{}>", name, self.from_address),
            None => self.from_address.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_null_provider() {
        let config: EmailConfig = toml_edit::de::from_str(
            r#"
            provider = "null"
            from_address = "noreply@picainn.jp"
            from_name = "Pica Inn"
            contact_address = "stay@picainn.jp"
            "#,
        )
        .unwrap();
        assert!(matches!(config.provider, EmailProviderConfig::Null));
        assert_eq!(config.format_from(), "Pica Inn <noreply@picainn.jp>");
        assert_eq!(config.contact_address, "stay@picainn.jp");
    }

    #[test]
    fn test_parse_ses_provider() {
        let config: EmailConfig = toml_edit::de::from_str(
            r#"
            provider = "ses"
            region = "ap-northeast-1"
            from_address = "noreply@picainn.jp"
            contact_address = "stay@picainn.jp"
            "#,
        )
        .unwrap();
        match &config.provider {
            EmailProviderConfig::Ses(ses) => assert_eq!(ses.region.as_deref(), Some("ap-northeast-1")),
            other => panic!("unexpected provider {:?}", other),
        }
        assert_eq!(config.format_from(), "noreply@picainn.jp");
    }
}
