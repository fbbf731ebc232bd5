use super::{ImageKind, ImageName, RoomError, RoomId, RoomImage, RoomService};
use crate::storage::{StorageError, content_type_for};
use tracing::{info, warn};

impl RoomService {
    /// Hides or unhides one image by renaming it in or out of the `_hidden_`
    /// prefix. The main image can never be hidden.
    pub async fn set_hidden(
        &self,
        room_id: RoomId,
        filename: &str,
        hidden: bool,
    ) -> Result<RoomImage, RoomError> {
        super::validate_filename(filename)?;
        let name = ImageName::parse(filename)
            .ok_or_else(|| RoomError::Validation(format!("Not a room image filename: {}", filename)))?;
        if hidden && name.kind == ImageKind::Main {
            return Err(RoomError::Validation(
                "Cannot hide the main image. Set another image as main first.".to_string(),
            ));
        }

        let _guard = self.locks.acquire(room_id).await;
        let images = self.list_images(room_id).await?;
        let current = images
            .iter()
            .find(|image| image.filename == filename)
            .or_else(|| {
                images
                    .iter()
                    .find(|image| image.name.base_name() == name.base_name())
            })
            .cloned()
            .ok_or_else(|| {
                RoomError::NotFound(format!("Image {} not found in room {}", filename, room_id))
            })?;

        let new_name = current.name.with_hidden(hidden);
        let new_filename = new_name.file_name();
        if new_filename == current.filename {
            return Ok(current);
        }
        if new_name.is_main() && images.iter().any(|image| image.is_main) {
            return Err(RoomError::Validation(
                "Room already has a main image. Swap it instead of unhiding another one.".to_string(),
            ));
        }

        let data = self.objects.get(&current.key).await?;
        let new_key = room_id.image_key(&new_filename);
        let url = match self
            .objects
            .put(&new_key, data, &content_type_for(&new_filename), false)
            .await
        {
            Ok(url) => url,
            Err(StorageError::AlreadyExists(_)) => {
                return Err(RoomError::Validation(format!(
                    "An image named {} already exists",
                    new_filename
                )));
            }
            Err(e) => return Err(e.into()),
        };

        if let Err(e) = self.objects.delete(&current.key).await {
            warn!(room_id = %room_id, file = %current.filename, "Old image left behind after rename: {}", e);
        }

        let timestamp = if new_name.is_main() {
            self.record_main_image(room_id, &url).await
        } else {
            self.touch_room(room_id).await
        };
        if let Err(e) = timestamp {
            warn!(room_id = %room_id, "Could not bump lastUpdated: {}", e);
        }

        info!(room_id = %room_id, from = %current.filename, to = %new_filename, "Image visibility changed");
        Ok(RoomImage {
            room_id,
            filename: new_filename,
            url,
            is_main: new_name.is_main(),
            is_hidden: new_name.hidden,
            key: new_key,
            name: new_name,
        })
    }
}
