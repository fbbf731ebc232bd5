use super::{ImageName, RoomError, RoomId, RoomImage, RoomService};
use crate::storage::content_type_for;
use rand::seq::IndexedRandom;
use tracing::{info, warn};

impl RoomService {
    /// Makes sure a room with visible images has a visible `main.<ext>`.
    ///
    /// When the main image is missing, a random visible image is copied to
    /// `main.<ext>`. Returns `false` only when nothing can be promoted.
    pub async fn ensure_main_image(&self, room_id: RoomId) -> Result<bool, RoomError> {
        let _guard = self.locks.acquire(room_id).await;
        self.ensure_main_image_locked(room_id).await
    }

    /// Same as [`RoomService::ensure_main_image`] for callers already holding
    /// the room lock.
    pub(crate) async fn ensure_main_image_locked(&self, room_id: RoomId) -> Result<bool, RoomError> {
        let images = self.list_images(room_id).await?;
        if images.iter().any(|image| image.is_main) {
            return Ok(true);
        }

        let candidates: Vec<&RoomImage> = images
            .iter()
            .filter(|image| !image.is_hidden && !image.name.is_main())
            .collect();
        // ThreadRng must not live across an await point
        let candidate = {
            let mut rng = rand::rng();
            candidates.choose(&mut rng).map(|image| (*image).clone())
        };
        let Some(candidate) = candidate else {
            info!(room_id = %room_id, "No visible image available to promote to main");
            return Ok(false);
        };

        let main_name = ImageName::main(&candidate.name.extension).file_name();
        info!(room_id = %room_id, candidate = %candidate.filename, main = %main_name, "Promoting image to main");

        let data = self.objects.get(&candidate.key).await?;
        let main_url = self
            .objects
            .put(
                &room_id.image_key(&main_name),
                data,
                &content_type_for(&main_name),
                true,
            )
            .await?;

        if let Err(e) = self.record_main_image(room_id, &main_url).await {
            warn!(room_id = %room_id, "Could not record promoted main image in metadata: {}", e);
        }
        Ok(true)
    }
}
