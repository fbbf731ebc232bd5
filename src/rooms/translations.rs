use super::{RoomError, RoomService, catalog::next_timestamp};
use crate::{
    i18n,
    translation::{DynTranslator, translate_description},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoTranslateOptions {
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default)]
    pub dry_run: bool,
}

/// Translations written by hand, keyed by room id then language code.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BulkTranslateRequest {
    #[serde(default)]
    pub translations: BTreeMap<String, BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BulkTranslationStatus {
    Updated,
    RoomNotFound,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkTranslationResult {
    pub room_id: String,
    pub name: String,
    pub status: BulkTranslationStatus,
    pub languages: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkTranslateReport {
    pub total_rooms: usize,
    pub updated: usize,
    pub not_found: usize,
    pub results: Vec<BulkTranslationResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TranslationStatus {
    Translated,
    WouldBeTranslated,
    SkippedHasTranslations,
    SkippedNoDescription,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomTranslationResult {
    pub room_id: String,
    pub name: String,
    pub status: TranslationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translations: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TranslationSummary {
    pub translated: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoTranslateReport {
    pub dry_run: bool,
    pub total_rooms: usize,
    pub results: Vec<RoomTranslationResult>,
    pub summary: TranslationSummary,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationPreview {
    pub room_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub room_type: String,
    pub description: String,
    pub has_translations: bool,
    pub translation_count: usize,
}

fn excerpt(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(100).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

impl RoomService {
    pub async fn translation_preview(&self) -> Result<Vec<TranslationPreview>, RoomError> {
        let rooms = self.all_metadata().await?;
        Ok(rooms
            .into_iter()
            .map(|(room_id, room)| TranslationPreview {
                name: if room.name.is_empty() { room_id.clone() } else { room.name },
                room_id,
                room_type: room.room_type,
                description: room.description,
                has_translations: !room.description_i18n.is_empty(),
                translation_count: room.description_i18n.len(),
            })
            .collect())
    }

    /// Fills in `descriptionI18n` for every room. Rooms that already have
    /// translations are skipped unless `overwrite` is set; nothing is saved on
    /// a dry run.
    pub async fn auto_translate_rooms(
        &self,
        translator: &DynTranslator,
        options: AutoTranslateOptions,
    ) -> Result<AutoTranslateReport, RoomError> {
        let rooms = self.all_metadata().await?;
        if rooms.is_empty() {
            return Err(RoomError::NotFound("No rooms found".to_string()));
        }

        let mut results = Vec::with_capacity(rooms.len());
        let mut translated_rooms = BTreeMap::new();
        for (room_id, room) in &rooms {
            let name = if room.name.is_empty() {
                room_id.clone()
            } else {
                room.name.clone()
            };

            if !options.overwrite && !room.description_i18n.is_empty() {
                results.push(RoomTranslationResult {
                    room_id: room_id.clone(),
                    name,
                    status: TranslationStatus::SkippedHasTranslations,
                    description: Some(room.description.clone()),
                    translations: None,
                });
                continue;
            }
            if room.description.trim().is_empty() {
                results.push(RoomTranslationResult {
                    room_id: room_id.clone(),
                    name,
                    status: TranslationStatus::SkippedNoDescription,
                    description: None,
                    translations: None,
                });
                continue;
            }

            let translations = translate_description(translator, &room.description).await;
            info!(room_id = %room_id, languages = translations.len(), "Room description translated");
            results.push(RoomTranslationResult {
                room_id: room_id.clone(),
                name,
                status: if options.dry_run {
                    TranslationStatus::WouldBeTranslated
                } else {
                    TranslationStatus::Translated
                },
                description: Some(excerpt(&room.description)),
                translations: options.dry_run.then(|| translations.clone()),
            });
            translated_rooms.insert(room_id.clone(), translations);
        }

        if !options.dry_run && !translated_rooms.is_empty() {
            // Re-read under the lock so edits made while translating survive
            let _guard = self.metadata_lock.lock().await;
            let mut current = self.all_metadata().await?;
            for (room_id, translations) in translated_rooms {
                if let Some(room) = current.get_mut(&room_id) {
                    room.description_i18n = translations;
                    room.last_updated = next_timestamp(room.last_updated);
                }
            }
            self.save_all_metadata(&current).await?;
        }

        let translated = results
            .iter()
            .filter(|r| {
                matches!(
                    r.status,
                    TranslationStatus::Translated | TranslationStatus::WouldBeTranslated
                )
            })
            .count();
        Ok(AutoTranslateReport {
            dry_run: options.dry_run,
            total_rooms: rooms.len(),
            summary: TranslationSummary {
                translated,
                skipped: results.len() - translated,
            },
            results,
        })
    }
}

/// Keeps non-empty texts in supported locales, minus the source language.
fn accepted_translations(texts: BTreeMap<String, String>) -> BTreeMap<String, String> {
    texts
        .into_iter()
        .map(|(language, text)| (language.trim().to_string(), text.trim().to_string()))
        .filter(|(language, text)| {
            !text.is_empty()
                && language != i18n::SOURCE_LANGUAGE
                && i18n::is_supported_locale(language)
        })
        .collect()
}

impl RoomService {
    /// Replaces `descriptionI18n` of each named room with the given texts and
    /// bumps its `lastUpdated`. Unknown room ids are reported, not fatal.
    pub async fn apply_translations(
        &self,
        request: BulkTranslateRequest,
    ) -> Result<BulkTranslateReport, RoomError> {
        if request.translations.is_empty() {
            return Err(RoomError::Validation("No translations provided".to_string()));
        }

        let _guard = self.metadata_lock.lock().await;
        let mut rooms = self.all_metadata().await?;
        if rooms.is_empty() {
            return Err(RoomError::NotFound("No rooms found".to_string()));
        }

        let mut results = Vec::with_capacity(request.translations.len());
        for (room_id, texts) in request.translations {
            let Some(room) = rooms.get_mut(&room_id) else {
                results.push(BulkTranslationResult {
                    name: room_id.clone(),
                    room_id,
                    status: BulkTranslationStatus::RoomNotFound,
                    languages: 0,
                });
                continue;
            };

            room.description_i18n = accepted_translations(texts);
            room.last_updated = next_timestamp(room.last_updated);
            results.push(BulkTranslationResult {
                name: if room.name.is_empty() { room_id.clone() } else { room.name.clone() },
                languages: room.description_i18n.len(),
                room_id,
                status: BulkTranslationStatus::Updated,
            });
        }

        let updated = results
            .iter()
            .filter(|r| r.status == BulkTranslationStatus::Updated)
            .count();
        if updated > 0 {
            self.save_all_metadata(&rooms).await?;
        }
        info!(updated, requested = results.len(), "Manual translations applied");

        Ok(BulkTranslateReport {
            total_rooms: rooms.len(),
            updated,
            not_found: results.len() - updated,
            results,
        })
    }
}
