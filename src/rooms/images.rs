use super::{
    ImageName, ListedImage, RoomError, RoomId, RoomImage, RoomImageListing, RoomService,
    STAGING_PREFIX, deleted_images_key,
};
use crate::storage::ObjectEntry;
use std::collections::BTreeSet;
use tracing::{debug, warn};

impl RoomService {
    /// Every image object currently listed under the room, staging copies
    /// excluded. Deletion markers are not applied.
    pub(crate) async fn list_stored_images(&self, room_id: RoomId) -> Result<Vec<RoomImage>, RoomError> {
        let entries = self.objects.list(&room_id.image_prefix()).await?;
        Ok(images_from_entries(room_id, entries))
    }

    /// Lists the room's images with `isMain` and `isHidden` derived from their
    /// filenames. Images recorded as deleted are left out even when the store
    /// still lists them. Never mutates anything.
    pub async fn list_images(&self, room_id: RoomId) -> Result<Vec<RoomImage>, RoomError> {
        let images = self.list_stored_images(room_id).await?;
        let deleted = self.metadata.members_of(&deleted_images_key(room_id)).await?;
        Ok(images
            .into_iter()
            .filter(|image| !deleted.contains(&image.filename))
            .collect())
    }

    /// Admin listing: repairs a missing main image first, then returns the
    /// images main first, followed by additional images in number order.
    pub async fn room_images(&self, room_id: RoomId) -> Result<RoomImageListing, RoomError> {
        if let Err(e) = self.ensure_main_image(room_id).await {
            warn!(room_id = %room_id, "Main image check failed, listing anyway: {}", e);
        }

        let mut images = self.list_images(room_id).await?;
        images.sort_by(|a, b| {
            (!a.is_main, a.name.number().unwrap_or(u32::MAX), &a.filename).cmp(&(
                !b.is_main,
                b.name.number().unwrap_or(u32::MAX),
                &b.filename,
            ))
        });

        Ok(RoomImageListing {
            room_id,
            images: images
                .into_iter()
                .enumerate()
                .map(|(order, image)| ListedImage { image, order })
                .collect(),
            last_updated: self.last_updated(room_id).await,
        })
    }

    /// Highest `image-<k>` number the room has used, counting hidden images
    /// and images recorded as deleted.
    pub(crate) async fn highest_image_number(&self, room_id: RoomId) -> Result<u32, RoomError> {
        let stored = self.list_stored_images(room_id).await?;
        let deleted = self.metadata.members_of(&deleted_images_key(room_id)).await?;

        let highest = stored
            .iter()
            .filter_map(|image| image.name.number())
            .chain(
                deleted
                    .iter()
                    .filter_map(|name| ImageName::parse(name))
                    .filter_map(|name| name.number()),
            )
            .max()
            .unwrap_or(0);
        debug!(room_id = %room_id, highest, "Highest image number");
        Ok(highest)
    }

    /// Keys currently listed under the room, staging copies included.
    pub(crate) async fn listed_keys(&self, room_id: RoomId) -> Result<BTreeSet<String>, RoomError> {
        Ok(self
            .objects
            .list(&room_id.image_prefix())
            .await?
            .into_iter()
            .map(|entry| entry.key)
            .collect())
    }
}

/// Turns raw listing entries into room images. Only the first visible
/// `main.*` by name counts as main.
fn images_from_entries(room_id: RoomId, entries: Vec<ObjectEntry>) -> Vec<RoomImage> {
    let prefix = room_id.image_prefix();
    let mut images: Vec<RoomImage> = entries
        .into_iter()
        .filter_map(|entry| {
            let file_name = entry.key.strip_prefix(&prefix)?.to_string();
            if file_name.contains('/') || file_name.starts_with(STAGING_PREFIX) {
                return None;
            }
            let name = ImageName::parse(&file_name)?;
            Some(RoomImage {
                room_id,
                is_main: name.is_main(),
                is_hidden: name.hidden,
                filename: file_name,
                url: entry.url,
                key: entry.key,
                name,
            })
        })
        .collect();

    let first_main = images
        .iter()
        .filter(|image| image.is_main)
        .map(|image| image.filename.clone())
        .min();
    if let Some(first_main) = first_main {
        for image in images.iter_mut() {
            if image.is_main && image.filename != first_main {
                warn!(room_id = %room_id, file = %image.filename, "Extra main image ignored");
                image.is_main = false;
            }
        }
    }
    images
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str) -> ObjectEntry {
        ObjectEntry {
            key: key.to_string(),
            url: format!("memory://b/{}", key),
        }
    }

    #[test]
    fn test_images_from_entries_flags() {
        let room_id = RoomId::new(4);
        let images = images_from_entries(
            room_id,
            vec![
                entry("rooms/room4/main.jpg"),
                entry("rooms/room4/image-1.jpg"),
                entry("rooms/room4/_hidden_image-2.png"),
                entry("rooms/room4/_staging_abc-main.jpg"),
                entry("rooms/room4/notes.txt"),
                entry("rooms/room4/thumbs/image-1.jpg"),
            ],
        );

        let names: Vec<&str> = images.iter().map(|i| i.filename.as_str()).collect();
        assert_eq!(names, vec!["main.jpg", "image-1.jpg", "_hidden_image-2.png"]);
        assert!(images[0].is_main);
        assert!(!images[1].is_main && !images[1].is_hidden);
        assert!(images[2].is_hidden);
    }

    #[test]
    fn test_only_one_main_is_reported() {
        let images = images_from_entries(
            RoomId::new(1),
            vec![entry("rooms/room1/main.png"), entry("rooms/room1/main.jpg")],
        );
        let mains: Vec<&str> = images
            .iter()
            .filter(|i| i.is_main)
            .map(|i| i.filename.as_str())
            .collect();
        assert_eq!(mains, vec!["main.jpg"]);
    }
}
