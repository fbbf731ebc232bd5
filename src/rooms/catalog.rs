use super::{
    DEFAULT_AMENITIES, DEFAULT_MAX_GUESTS, RoomError, RoomForm, RoomId, RoomMetadata,
    RoomService, RoomSummary, UploadedImage, normalize_floor_area,
};
use crate::metadata::{get_json, set_json};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{info, warn};

pub const ROOM_METADATA_KEY: &str = "room-metadata";
pub const ROOM_ORDER_KEY: &str = "room-order";
pub const DELETED_ROOMS_KEY: &str = "deleted-rooms";

pub fn deleted_images_key(room_id: RoomId) -> String {
    format!("deleted-images:{}", room_id)
}

/// `lastUpdated` never moves backwards, even when the clock does.
pub fn next_timestamp(previous: i64) -> i64 {
    chrono::Utc::now().timestamp_millis().max(previous + 1)
}

impl RoomService {
    pub async fn all_metadata(&self) -> Result<BTreeMap<String, RoomMetadata>, RoomError> {
        Ok(get_json(self.metadata.as_ref(), ROOM_METADATA_KEY)
            .await?
            .unwrap_or_default())
    }

    pub(crate) async fn save_all_metadata(
        &self,
        rooms: &BTreeMap<String, RoomMetadata>,
    ) -> Result<(), RoomError> {
        set_json(self.metadata.as_ref(), ROOM_METADATA_KEY, rooms).await?;
        Ok(())
    }

    pub async fn room_metadata(&self, room_id: RoomId) -> Result<Option<RoomMetadata>, RoomError> {
        Ok(self.all_metadata().await?.remove(&room_id.to_string()))
    }

    pub async fn deleted_rooms(&self) -> Result<BTreeSet<String>, RoomError> {
        Ok(self.metadata.members_of(DELETED_ROOMS_KEY).await?)
    }

    pub async fn room_order(&self) -> Result<Vec<String>, RoomError> {
        Ok(get_json(self.metadata.as_ref(), ROOM_ORDER_KEY)
            .await?
            .unwrap_or_default())
    }

    /// Replaces the display order. Every entry must be a room id; duplicates
    /// keep their first position.
    pub async fn set_room_order(&self, order: &[String]) -> Result<Vec<String>, RoomError> {
        let mut seen = BTreeSet::new();
        let mut validated = Vec::with_capacity(order.len());
        for entry in order {
            let room_id: RoomId = entry.parse()?;
            if seen.insert(room_id) {
                validated.push(room_id.to_string());
            }
        }

        let _guard = self.metadata_lock.lock().await;
        set_json(self.metadata.as_ref(), ROOM_ORDER_KEY, &validated).await?;
        info!(rooms = validated.len(), "Room order updated");
        Ok(validated)
    }

    /// Stores the main image URL on the room record and bumps `lastUpdated`.
    /// Rooms without a record only get a fresh timestamp back.
    pub(crate) async fn record_main_image(
        &self,
        room_id: RoomId,
        main_image_url: &str,
    ) -> Result<i64, RoomError> {
        let _guard = self.metadata_lock.lock().await;
        let mut rooms = self.all_metadata().await?;
        match rooms.get_mut(&room_id.to_string()) {
            Some(room) => {
                room.main_image_url = Some(main_image_url.to_string());
                room.last_updated = next_timestamp(room.last_updated);
                let timestamp = room.last_updated;
                self.save_all_metadata(&rooms).await?;
                Ok(timestamp)
            }
            None => Ok(next_timestamp(0)),
        }
    }

    /// Bumps `lastUpdated` so clients refetch the room's images.
    pub(crate) async fn touch_room(&self, room_id: RoomId) -> Result<i64, RoomError> {
        let _guard = self.metadata_lock.lock().await;
        let mut rooms = self.all_metadata().await?;
        match rooms.get_mut(&room_id.to_string()) {
            Some(room) => {
                room.last_updated = next_timestamp(room.last_updated);
                let timestamp = room.last_updated;
                self.save_all_metadata(&rooms).await?;
                Ok(timestamp)
            }
            None => Ok(next_timestamp(0)),
        }
    }

    /// Current `lastUpdated` for a room, 0 when it has no record.
    pub(crate) async fn last_updated(&self, room_id: RoomId) -> i64 {
        match self.room_metadata(room_id).await {
            Ok(Some(room)) => room.last_updated,
            Ok(None) => 0,
            Err(e) => {
                warn!(room_id = %room_id, "Could not read room metadata: {}", e);
                0
            }
        }
    }

    /// Next unused id: one past the highest number found in metadata, the
    /// display order and the deleted set, so deleted ids are never reused.
    pub async fn allocate_room_id(&self) -> Result<RoomId, RoomError> {
        let rooms = self.all_metadata().await?;
        let deleted = self.deleted_rooms().await?;
        let order = self.room_order().await?;

        let highest = rooms
            .keys()
            .chain(deleted.iter())
            .chain(order.iter())
            .filter_map(|id| id.parse::<RoomId>().ok())
            .max();
        Ok(highest.map(|id| id.next()).unwrap_or(RoomId::new(1)))
    }

    /// Public room list: deleted rooms dropped, display order applied, and
    /// descriptions resolved for `locale`.
    pub async fn list_rooms(&self, locale: Option<&str>) -> Result<Vec<RoomSummary>, RoomError> {
        let rooms = self.all_metadata().await?;
        let deleted = self.deleted_rooms().await?;
        let order = self.room_order().await?;
        let positions: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(index, id)| (id.as_str(), index))
            .collect();

        let mut summaries = Vec::new();
        for (key, room) in &rooms {
            if deleted.contains(key) {
                continue;
            }
            let Ok(room_id) = key.parse::<RoomId>() else {
                warn!("Skipping metadata entry with invalid room id {}", key);
                continue;
            };

            let images = match self.list_images(room_id).await {
                Ok(images) => images,
                Err(e) => {
                    warn!(room_id = %room_id, "Could not list room images: {}", e);
                    Vec::new()
                }
            };
            let main_image = images
                .iter()
                .find(|image| image.is_main)
                .map(|image| image.cache_busted_url(room.last_updated))
                .unwrap_or_else(|| self.settings.placeholder_image.clone());
            let mut additional: Vec<_> = images
                .iter()
                .filter(|image| !image.is_main && !image.is_hidden)
                .collect();
            additional.sort_by_key(|image| (image.name.number().unwrap_or(u32::MAX), image.filename.clone()));

            summaries.push(RoomSummary {
                id: room_id,
                name: room.name.clone(),
                room_type: room.room_type.clone(),
                description: room.localized_description(locale).to_string(),
                amenities: room.amenities.clone(),
                bed_info: room.bed_info.clone(),
                max_guests: room.max_guests,
                size: room.size.clone(),
                address: room.address.clone(),
                map_url: room.map_url.clone(),
                alt_text: room.localized_alt_text(locale).map(str::to_string),
                has_images: !images.is_empty(),
                main_image,
                images: additional
                    .iter()
                    .map(|image| image.cache_busted_url(room.last_updated))
                    .collect(),
                last_updated: room.last_updated,
            });
        }

        summaries.sort_by_key(|summary| {
            let position = positions
                .get(summary.id.to_string().as_str())
                .copied()
                .unwrap_or(usize::MAX);
            (position, summary.id.number())
        });
        Ok(summaries)
    }

    /// Creates a room from the admin upload form. The first image becomes
    /// `main.<ext>`, the others `image-<k>.<ext>`.
    pub async fn create_room(
        &self,
        form: RoomForm,
        images: Vec<UploadedImage>,
    ) -> Result<(RoomId, RoomMetadata), RoomError> {
        let required = [
            ("name", &form.name),
            ("type", &form.room_type),
            ("description", &form.description),
            ("bed info", &form.bed_info),
            ("max guests", &form.max_guests),
            ("size", &form.size),
            ("address", &form.address),
            ("map URL", &form.map_url),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(field, _)| *field)
            .collect();
        if !missing.is_empty() || images.is_empty() {
            return Err(RoomError::Validation(format!(
                "Name, type, description, bed info, max guests, size, address, map URL, and at least one image are required (missing: {})",
                if missing.is_empty() {
                    "images".to_string()
                } else {
                    missing.join(", ")
                }
            )));
        }
        if images.iter().any(|image| !image.is_image()) {
            return Err(RoomError::Validation("All files must be images".to_string()));
        }

        let _creation = self.creation_lock.lock().await;
        let room_id = self.allocate_room_id().await?;
        let _room_guard = self.locks.acquire(room_id).await;

        let mut uploaded_urls: Vec<String> = Vec::new();
        let mut main_image_url = None;
        for (index, image) in images.iter().enumerate() {
            let name = if index == 0 {
                super::ImageName::main(&image.extension())
            } else {
                super::ImageName::additional(index as u32, &image.extension())
            };
            let key = room_id.image_key(&name.file_name());
            match self
                .objects
                .put(&key, image.data.clone(), &image.content_type, false)
                .await
            {
                Ok(url) => {
                    if index == 0 {
                        main_image_url = Some(url.clone());
                    }
                    uploaded_urls.push(url);
                }
                Err(e) => {
                    warn!(room_id = %room_id, file = %name.file_name(), "Upload failed, removing {} uploaded images: {}", uploaded_urls.len(), e);
                    for url in &uploaded_urls {
                        if let Err(cleanup_error) = self.objects.delete_url(url).await {
                            warn!("Cleanup of {} failed: {}", url, cleanup_error);
                        }
                    }
                    return Err(e.into());
                }
            }
        }

        let metadata = RoomMetadata {
            id: room_id.to_string(),
            main_image_url,
            last_updated: next_timestamp(0),
            ..metadata_from_form(form)
        };

        {
            let _guard = self.metadata_lock.lock().await;
            let mut rooms = self.all_metadata().await?;
            rooms.insert(room_id.to_string(), metadata.clone());
            self.save_all_metadata(&rooms).await?;

            let mut order = self.room_order().await?;
            if !order.contains(&room_id.to_string()) {
                order.push(room_id.to_string());
                set_json(self.metadata.as_ref(), ROOM_ORDER_KEY, &order).await?;
            }
        }

        info!(room_id = %room_id, images = uploaded_urls.len(), "Room created");
        Ok((room_id, metadata))
    }

    /// Replaces the descriptive fields of an existing room and appends any
    /// new images after the highest image number the room has ever used.
    pub async fn update_room(
        &self,
        room_id: RoomId,
        form: RoomForm,
        images: Vec<UploadedImage>,
    ) -> Result<(RoomMetadata, Vec<String>), RoomError> {
        if form.name.trim().is_empty()
            || form.room_type.trim().is_empty()
            || form.description.trim().is_empty()
        {
            return Err(RoomError::Validation(
                "Room ID, name, type, and description are required".to_string(),
            ));
        }

        let updated = {
            let _guard = self.metadata_lock.lock().await;
            let mut rooms = self.all_metadata().await?;
            let existing = rooms
                .get(&room_id.to_string())
                .cloned()
                .ok_or_else(|| RoomError::NotFound(format!("Room {} not found", room_id)))?;

            let updated = RoomMetadata {
                id: room_id.to_string(),
                main_image_url: existing.main_image_url.clone(),
                last_updated: next_timestamp(existing.last_updated),
                ..metadata_from_form(form)
            };
            rooms.insert(room_id.to_string(), updated.clone());
            self.save_all_metadata(&rooms).await?;
            updated
        };

        let images: Vec<UploadedImage> = images
            .into_iter()
            .filter(|image| !image.data.is_empty() && image.is_image())
            .collect();
        let mut added = Vec::new();
        if !images.is_empty() {
            let _room_guard = self.locks.acquire(room_id).await;
            let mut next_number = self.highest_image_number(room_id).await? + 1;
            for image in images {
                let name = super::ImageName::additional(next_number, &image.extension());
                next_number += 1;
                let key = room_id.image_key(&name.file_name());
                // One failed upload does not undo the metadata update
                match self
                    .objects
                    .put(&key, image.data, &image.content_type, false)
                    .await
                {
                    Ok(_) => added.push(name.file_name()),
                    Err(e) => warn!(room_id = %room_id, file = %name.file_name(), "Image upload failed: {}", e),
                }
            }
        }

        info!(room_id = %room_id, added = added.len(), "Room updated");
        Ok((updated, added))
    }
}

fn metadata_from_form(form: RoomForm) -> RoomMetadata {
    let amenities: Vec<String> = form
        .amenities
        .into_iter()
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .collect();
    RoomMetadata {
        id: String::new(),
        name: form.name.trim().to_string(),
        room_type: form.room_type.trim().to_string(),
        description: form.description.trim().to_string(),
        description_i18n: form
            .description_i18n
            .into_iter()
            .map(|(lang, text)| (lang, text.trim().to_string()))
            .filter(|(_, text)| !text.is_empty())
            .collect(),
        amenities: if amenities.is_empty() {
            DEFAULT_AMENITIES.iter().map(|a| a.to_string()).collect()
        } else {
            amenities
        },
        bed_info: form.bed_info.trim().to_string(),
        max_guests: form
            .max_guests
            .trim()
            .parse()
            .ok()
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_GUESTS),
        size: normalize_floor_area(&form.size),
        address: form.address.trim().to_string(),
        map_url: form.map_url.trim().to_string(),
        alt_text: form
            .alt_text
            .into_iter()
            .filter(|(_, text)| !text.trim().is_empty())
            .collect(),
        main_image_url: None,
        last_updated: 0,
    }
}
