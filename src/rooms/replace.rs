use super::{ImageName, RoomError, RoomId, RoomImage, RoomService, UploadedImage, deleted_images_key};
use tracing::{info, warn};

impl RoomService {
    /// Replaces the bytes of one room image, keeping its filename. The old
    /// object is removed best-effort before the upload and any deletion
    /// marker for the name is cleared.
    pub async fn update_image(
        &self,
        room_id: RoomId,
        filename: &str,
        image: UploadedImage,
    ) -> Result<RoomImage, RoomError> {
        super::validate_filename(filename)?;
        let name = ImageName::parse(filename)
            .ok_or_else(|| RoomError::Validation(format!("Not a room image filename: {}", filename)))?;
        if image.data.is_empty() {
            return Err(RoomError::Validation("Image is empty".to_string()));
        }
        if !image.is_image() {
            return Err(RoomError::Validation("File must be an image".to_string()));
        }
        if self.deleted_rooms().await?.contains(&room_id.to_string()) {
            return Err(RoomError::NotFound(format!("Room {} has been deleted", room_id)));
        }

        let _guard = self.locks.acquire(room_id).await;
        let stored = self.list_stored_images(room_id).await?;
        if name.is_main()
            && stored
                .iter()
                .any(|other| other.is_main && other.filename != filename)
        {
            return Err(RoomError::Validation(
                "Room already has a main image under another name".to_string(),
            ));
        }

        let key = room_id.image_key(filename);
        if stored.iter().any(|old| old.filename == filename) {
            if let Err(e) = self.objects.delete(&key).await {
                warn!(room_id = %room_id, file = %filename, "Old image delete failed, overwriting: {}", e);
            }
        }
        let url = self
            .objects
            .put(&key, image.data, &image.content_type, true)
            .await?;

        if let Err(e) = self
            .metadata
            .remove_from_set(&deleted_images_key(room_id), filename)
            .await
        {
            warn!(room_id = %room_id, file = %filename, "Could not clear deletion marker: {}", e);
        }

        let timestamp = if name.is_main() {
            self.record_main_image(room_id, &url).await
        } else {
            self.touch_room(room_id).await
        };
        if let Err(e) = timestamp {
            warn!(room_id = %room_id, "Could not bump lastUpdated: {}", e);
        }

        info!(room_id = %room_id, file = %filename, "Image replaced");
        Ok(RoomImage {
            room_id,
            filename: filename.to_string(),
            url,
            is_main: name.is_main(),
            is_hidden: name.hidden,
            key,
            name,
        })
    }
}
