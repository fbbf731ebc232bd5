pub mod config;
pub mod error;
pub mod providers;

pub use config::*;
pub use error::*;

use async_trait::async_trait;
use axum::{
    extract::{State, rejection::JsonRejection},
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use serde_json::json;
use std::{collections::BTreeMap, sync::Arc};
use tokio::task::JoinSet;
use tracing::warn;

use crate::{
    AppState,
    i18n::{SOURCE_LANGUAGE, TRANSLATION_LANGUAGES},
    rooms::RoomError,
};

/// Machine translation from English.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, target_language: &str) -> Result<String, TranslationError>;
    fn name(&self) -> &str;
}

pub type DynTranslator = Arc<dyn Translator>;

pub fn create_translator(config: &TranslationConfig) -> Result<DynTranslator, TranslationError> {
    match config {
        TranslationConfig::MyMemory(mymemory_config) => Ok(Arc::new(
            providers::mymemory::MyMemoryTranslator::new(mymemory_config)?,
        )),
        TranslationConfig::Null => Ok(Arc::new(providers::null::NullTranslator::new())),
    }
}

/// Translates `text` into every supported language at once. A language whose
/// translation fails gets the English text. The result includes `en`.
pub async fn translate_description(
    translator: &DynTranslator,
    text: &str,
) -> BTreeMap<String, String> {
    let mut translations = BTreeMap::new();
    translations.insert(SOURCE_LANGUAGE.to_string(), text.to_string());

    let mut tasks = JoinSet::new();
    for language in TRANSLATION_LANGUAGES {
        let translator = translator.clone();
        let text = text.to_string();
        tasks.spawn(async move {
            let result = translator.translate(&text, language).await;
            (language, text, result)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((language, _, Ok(translated))) => {
                translations.insert(language.to_string(), translated);
            }
            Ok((language, text, Err(e))) => {
                warn!("Translation to {} failed, keeping English: {}", language, e);
                translations.insert(language.to_string(), text);
            }
            Err(e) => warn!("Translation task failed: {}", e),
        }
    }

    // A panicked task still leaves its language with the source text
    for language in TRANSLATION_LANGUAGES {
        translations
            .entry(language.to_string())
            .or_insert_with(|| text.to_string());
    }
    translations
}

#[derive(Debug, Deserialize)]
pub struct TranslateDescriptionRequest {
    pub text: String,
}

pub async fn translate_description_handler(
    State(app_state): State<AppState>,
    payload: Result<Json<TranslateDescriptionRequest>, JsonRejection>,
) -> Result<impl IntoResponse, RoomError> {
    let Json(request) = payload.map_err(|e| RoomError::Validation(e.body_text()))?;
    if request.text.trim().is_empty() {
        return Err(RoomError::Validation("Text is required".to_string()));
    }

    let translations = translate_description(&app_state.translator, request.text.trim()).await;
    Ok(Json(json!({
        "success": true,
        "translations": translations,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingFor(&'static str);

    #[async_trait]
    impl Translator for FailingFor {
        async fn translate(&self, text: &str, target_language: &str) -> Result<String, TranslationError> {
            if target_language == self.0 {
                Err(TranslationError::UnsupportedLanguage(target_language.to_string()))
            } else {
                Ok(format!("[{}] {}", target_language, text))
            }
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[tokio::test]
    async fn test_translate_description_falls_back_per_language() {
        let translator: DynTranslator = Arc::new(FailingFor("th"));
        let translations = translate_description(&translator, "Cozy room").await;

        assert_eq!(translations.len(), TRANSLATION_LANGUAGES.len() + 1);
        assert_eq!(translations["en"], "Cozy room");
        assert_eq!(translations["ko"], "[ko] Cozy room");
        assert_eq!(translations["th"], "Cozy room");
    }
}
