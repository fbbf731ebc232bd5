use super::{
    DELETED_ROOMS_KEY, ImageKind, ImageName, ROOM_ORDER_KEY, RoomError, RoomId, RoomService,
    deleted_images_key,
};
use crate::metadata::set_json;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRoomReport {
    pub room_id: String,
    pub images_deleted: usize,
    pub images_failed: usize,
    pub legacy_directory_removed: bool,
}

impl RoomService {
    /// Deletes one image. The main image cannot be deleted. The filename is
    /// recorded as deleted even when the object delete fails, so it never
    /// comes back in a listing.
    pub async fn delete_image(&self, room_id: RoomId, filename: &str) -> Result<(), RoomError> {
        super::validate_filename(filename)?;
        let name = ImageName::parse(filename)
            .ok_or_else(|| RoomError::Validation(format!("Not a room image filename: {}", filename)))?;
        if name.kind == ImageKind::Main && !name.hidden {
            return Err(RoomError::Validation(
                "Cannot delete the main image. Set another image as main first.".to_string(),
            ));
        }

        let _guard = self.locks.acquire(room_id).await;
        let images = self.list_images(room_id).await?;
        let image = images
            .iter()
            .find(|image| image.filename == filename)
            .ok_or_else(|| {
                RoomError::NotFound(format!("Image {} not found in room {}", filename, room_id))
            })?;

        let deleted = self.objects.delete(&image.key).await;
        if let Err(e) = &deleted {
            warn!(room_id = %room_id, file = %filename, "Object delete failed, recording marker anyway: {}", e);
        }

        let marker = self
            .metadata
            .add_to_set(&deleted_images_key(room_id), filename)
            .await;
        match (deleted, marker) {
            (Err(delete_error), Err(marker_error)) => {
                warn!(room_id = %room_id, file = %filename, "Deletion marker failed too: {}", marker_error);
                return Err(delete_error.into());
            }
            (Ok(()), Err(marker_error)) => {
                warn!(room_id = %room_id, file = %filename, "Could not record deletion marker: {}", marker_error);
            }
            _ => {}
        }

        if let Err(e) = self.touch_room(room_id).await {
            warn!(room_id = %room_id, "Could not bump lastUpdated: {}", e);
        }
        info!(room_id = %room_id, file = %filename, "Image deleted");
        Ok(())
    }

    /// Deletes a room for good: its images are removed best-effort, the id
    /// joins the deleted set (so it is never listed or reused), and the room
    /// leaves the metadata and the display order.
    pub async fn delete_room(&self, room_id: RoomId) -> Result<DeleteRoomReport, RoomError> {
        let _guard = self.locks.acquire(room_id).await;
        let mut report = DeleteRoomReport {
            room_id: room_id.to_string(),
            ..Default::default()
        };

        // Marked first so a partial failure below never brings the room back
        self.metadata
            .add_to_set(DELETED_ROOMS_KEY, &room_id.to_string())
            .await?;

        let keys = match self.objects.list(&room_id.image_prefix()).await {
            Ok(entries) => entries.into_iter().map(|entry| entry.key).collect(),
            Err(e) => {
                warn!(room_id = %room_id, "Could not list room images for deletion: {}", e);
                Vec::new()
            }
        };

        let mut deletions = JoinSet::new();
        for key in keys {
            let objects = self.objects.clone();
            deletions.spawn(async move {
                let result = objects.delete(&key).await;
                (key, result)
            });
        }
        while let Some(joined) = deletions.join_next().await {
            match joined {
                Ok((key, Ok(()))) => {
                    debug!(room_id = %room_id, key = %key, "Deleted");
                    report.images_deleted += 1;
                }
                Ok((key, Err(e))) => {
                    warn!(room_id = %room_id, key = %key, "Image delete failed: {}", e);
                    report.images_failed += 1;
                }
                Err(e) => {
                    warn!(room_id = %room_id, "Image delete task failed: {}", e);
                    report.images_failed += 1;
                }
            }
        }

        {
            let _metadata_guard = self.metadata_lock.lock().await;
            match self.all_metadata().await {
                Ok(mut rooms) => {
                    if rooms.remove(&room_id.to_string()).is_some() {
                        if let Err(e) = self.save_all_metadata(&rooms).await {
                            warn!(room_id = %room_id, "Could not remove room metadata: {}", e);
                        }
                    }
                }
                Err(e) => warn!(room_id = %room_id, "Could not load room metadata: {}", e),
            }

            match self.room_order().await {
                Ok(order) => {
                    let remaining: Vec<String> = order
                        .iter()
                        .filter(|id| **id != room_id.to_string())
                        .cloned()
                        .collect();
                    if remaining.len() != order.len() {
                        if let Err(e) = set_json(self.metadata.as_ref(), ROOM_ORDER_KEY, &remaining).await {
                            warn!(room_id = %room_id, "Could not update room order: {}", e);
                        }
                    }
                }
                Err(e) => warn!(room_id = %room_id, "Could not load room order: {}", e),
            }
        }

        if let Some(legacy) = &self.settings.legacy_directory {
            let directory = legacy.join(room_id.to_string());
            match tokio::fs::remove_dir_all(&directory).await {
                Ok(()) => report.legacy_directory_removed = true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(room_id = %room_id, "Could not remove legacy directory {:?}: {}", directory, e),
            }
        }

        info!(
            room_id = %room_id,
            deleted = report.images_deleted,
            failed = report.images_failed,
            "Room deleted"
        );
        Ok(report)
    }
}
