use axum::{
    extract::{Multipart, State},
    http::header,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::{
    AppState,
    metadata::{DynMetadataStore, get_json, set_json},
    rooms::{RoomError, UploadedImage, cache_busted},
    storage::DynObjectStore,
};

pub const CMS_CONFIG_KEY: &str = "cms-config";
const HERO_OBJECT_STEM: &str = "hero/hero-background";

/// Site-wide settings edited from the admin panel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CmsConfig {
    #[serde(default)]
    pub hero_image_url: Option<String>,
    #[serde(default)]
    pub hero_last_updated: i64,
}

pub struct HeroService {
    objects: DynObjectStore,
    metadata: DynMetadataStore,
    fallback_url: String,
    lock: tokio::sync::Mutex<()>,
}

impl HeroService {
    pub fn new(objects: DynObjectStore, metadata: DynMetadataStore, fallback_url: String) -> Self {
        Self {
            objects,
            metadata,
            fallback_url,
            lock: tokio::sync::Mutex::new(()),
        }
    }

    pub async fn current(&self) -> Result<CmsConfig, RoomError> {
        Ok(get_json(self.metadata.as_ref(), CMS_CONFIG_KEY)
            .await?
            .unwrap_or_default())
    }

    /// URL to show, cache-busted with the hero timestamp.
    pub async fn display_url(&self) -> String {
        match self.current().await {
            Ok(CmsConfig {
                hero_image_url: Some(url),
                hero_last_updated,
            }) => cache_busted(&url, hero_last_updated),
            Ok(_) => self.fallback_url.clone(),
            Err(e) => {
                warn!("Could not read hero settings: {}", e);
                self.fallback_url.clone()
            }
        }
    }

    /// Uploads a new hero image over `hero/hero-background.<ext>` and removes
    /// the previous object when it lived under another URL.
    pub async fn replace(&self, image: UploadedImage) -> Result<CmsConfig, RoomError> {
        if !image.is_image() {
            return Err(RoomError::Validation("File must be an image".to_string()));
        }
        let _guard = self.lock.lock().await;
        let previous = self.current().await?;

        let key = format!("{}.{}", HERO_OBJECT_STEM, image.extension());
        let url = self
            .objects
            .put(&key, image.data, &image.content_type, true)
            .await?;

        if let Some(old_url) = previous.hero_image_url.as_deref().filter(|old| *old != url) {
            if let Err(e) = self.objects.delete_url(old_url).await {
                warn!("Could not delete previous hero image {}: {}", old_url, e);
            }
        }

        let updated = CmsConfig {
            hero_image_url: Some(url),
            hero_last_updated: crate::rooms::next_timestamp(previous.hero_last_updated),
        };
        set_json(self.metadata.as_ref(), CMS_CONFIG_KEY, &updated).await?;
        info!(url = ?updated.hero_image_url, "Hero image updated");
        Ok(updated)
    }

    /// Deletes the hero object (best-effort) and clears the stored URL.
    pub async fn remove(&self) -> Result<CmsConfig, RoomError> {
        let _guard = self.lock.lock().await;
        let previous = self.current().await?;
        if let Some(url) = &previous.hero_image_url {
            if let Err(e) = self.objects.delete_url(url).await {
                warn!("Could not delete hero image {}: {}", url, e);
            }
        }

        let updated = CmsConfig {
            hero_image_url: None,
            hero_last_updated: crate::rooms::next_timestamp(previous.hero_last_updated),
        };
        set_json(self.metadata.as_ref(), CMS_CONFIG_KEY, &updated).await?;
        info!("Hero image removed");
        Ok(updated)
    }
}

const NO_CACHE: [(header::HeaderName, &str); 1] = [(
    header::CACHE_CONTROL,
    "no-store, no-cache, must-revalidate, proxy-revalidate",
)];

/// `GET /api/cms/hero-image`
pub async fn hero_image_handler(
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, RoomError> {
    let config = app_state.hero.current().await?;
    let url = app_state.hero.display_url().await;
    Ok((
        NO_CACHE,
        Json(json!({
            "heroImageUrl": config.hero_image_url,
            "heroLastUpdated": config.hero_last_updated,
            "url": url,
        })),
    ))
}

/// `POST /api/cms/update-hero` (multipart field `image`)
pub async fn update_hero_handler(
    State(app_state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, RoomError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| RoomError::Validation(e.body_text()))?
    {
        if field.name() != Some("image") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("hero").to_string();
        let content_type = field.content_type().unwrap_or("image/jpeg").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| RoomError::Validation(e.body_text()))?;
        upload = Some(UploadedImage {
            file_name,
            content_type,
            data,
        });
    }

    let image = upload
        .filter(|image| !image.data.is_empty())
        .ok_or_else(|| RoomError::Validation("No image file provided".to_string()))?;
    let config = app_state.hero.replace(image).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Hero image updated successfully",
        "url": config.hero_image_url,
        "heroLastUpdated": config.hero_last_updated,
    })))
}

/// `DELETE /api/cms/delete-hero`
pub async fn delete_hero_handler(
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, RoomError> {
    let config = app_state.hero.remove().await?;
    Ok(Json(json!({
        "success": true,
        "message": "Hero image deleted",
        "heroLastUpdated": config.hero_last_updated,
    })))
}
