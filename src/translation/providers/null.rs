use crate::translation::{TranslationError, Translator};
use async_trait::async_trait;
use tracing::debug;

/// Returns the source text unchanged. For development and tests.
#[derive(Default)]
pub struct NullTranslator;

impl NullTranslator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Translator for NullTranslator {
    async fn translate(&self, text: &str, target_language: &str) -> Result<String, TranslationError> {
        debug!("NULL TRANSLATOR - leaving {} chars untranslated for {}", text.len(), target_language);
        Ok(text.to_string())
    }

    fn name(&self) -> &str {
        "Null Translator"
    }
}
