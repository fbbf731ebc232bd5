use super::{
    ImageKind, ImageName, RoomError, RoomId, RoomImage, RoomService, STAGING_PREFIX,
    deleted_images_key,
};
use crate::storage::{StorageError, content_type_for};
use bytes::Bytes;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::{collections::BTreeSet, fmt, time::Duration};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapPhase {
    Stage,
    Clear,
    Commit,
    Cleanup,
}

impl fmt::Display for SwapPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SwapPhase::Stage => "stage",
            SwapPhase::Clear => "clear",
            SwapPhase::Commit => "commit",
            SwapPhase::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SwapRecovery {
    /// Nothing observable changed.
    SafeToRetry,
    /// The original files were written back from the staging copies.
    Restored,
    /// Restoring failed; the staging copies are kept for manual recovery.
    ManualCheckRequired,
}

impl SwapRecovery {
    pub fn guidance(&self) -> &'static str {
        match self {
            SwapRecovery::SafeToRetry => {
                "No images were changed. The operation can be retried."
            }
            SwapRecovery::Restored => {
                "The original images were restored automatically. Verify the room's images before retrying."
            }
            SwapRecovery::ManualCheckRequired => {
                "Automatic restore failed. Check the room's images manually; the staging copies listed in stagingKeys hold the original image data."
            }
        }
    }
}

#[derive(Debug)]
pub struct SwapFailure {
    pub phase: SwapPhase,
    pub details: String,
    pub recovery: SwapRecovery,
    /// Staging objects left in the store, if any.
    pub staging_keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwappedNames {
    pub new_main: String,
    pub new_source: String,
    pub old_main: String,
    pub old_source: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapVerification {
    pub main_image_exists: bool,
    pub target_image_exists: bool,
    pub main_image_url: String,
    /// The store may hand back the same URL for overwritten content, so this
    /// says nothing about whether the swap worked. Use `lastUpdated` to bust
    /// caches instead.
    pub url_changed: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapReport {
    pub swapped: SwappedNames,
    pub verification: SwapVerification,
    pub main_url: String,
    pub source_url: String,
    pub last_updated: i64,
}

#[derive(Debug, Clone)]
pub enum SwapOutcome {
    AlreadyMain { filename: String },
    Swapped(SwapReport),
}

/// Keys and payloads of one swap.
struct SwapPlan {
    room_id: RoomId,
    old_main: RoomImage,
    old_target: RoomImage,
    new_main_name: String,
    new_source_name: String,
    staged_main_key: String,
    staged_target_key: String,
}

impl SwapPlan {
    fn new(room_id: RoomId, old_main: RoomImage, old_target: RoomImage) -> Self {
        let new_main_name = ImageName::main(&old_target.name.extension).file_name();
        let new_source_name = old_target
            .name
            .with_hidden(false)
            .with_extension(&old_main.name.extension)
            .file_name();
        let stage_id = uuid::Uuid::new_v4().simple().to_string();
        let staged_main_key = room_id.image_key(&format!(
            "{}{}-main.{}",
            STAGING_PREFIX, stage_id, old_main.name.extension
        ));
        let staged_target_key = room_id.image_key(&format!(
            "{}{}-target.{}",
            STAGING_PREFIX, stage_id, old_target.name.extension
        ));
        Self {
            room_id,
            old_main,
            old_target,
            new_main_name,
            new_source_name,
            staged_main_key,
            staged_target_key,
        }
    }

    fn new_main_key(&self) -> String {
        self.room_id.image_key(&self.new_main_name)
    }

    fn new_source_key(&self) -> String {
        self.room_id.image_key(&self.new_source_name)
    }

    fn staging_keys(&self) -> Vec<String> {
        vec![self.staged_main_key.clone(), self.staged_target_key.clone()]
    }

    fn names(&self) -> SwappedNames {
        SwappedNames {
            new_main: self.new_main_name.clone(),
            new_source: self.new_source_name.clone(),
            old_main: self.old_main.filename.clone(),
            old_source: self.old_target.filename.clone(),
        }
    }
}

fn digest(data: &Bytes) -> Vec<u8> {
    Sha256::digest(data).to_vec()
}

impl RoomService {
    /// Moves the main designation to `target_filename`.
    ///
    /// Runs in four phases: both images are copied to staging objects, the
    /// originals are deleted, the staged bytes are written back under their
    /// swapped names, and the staging objects are removed. Only the stage and
    /// commit phases can fail the swap; a commit failure restores the original
    /// names from the staging copies.
    pub async fn swap_main(
        &self,
        room_id: RoomId,
        target_filename: &str,
    ) -> Result<SwapOutcome, RoomError> {
        super::validate_filename(target_filename)?;
        let target_name = ImageName::parse(target_filename).ok_or_else(|| {
            RoomError::Validation(format!("Not a room image filename: {}", target_filename))
        })?;

        let _guard = self.locks.acquire(room_id).await;
        if target_name.kind == ImageKind::Main {
            let images = self.list_images(room_id).await?;
            return match images.iter().find(|image| image.is_main) {
                Some(main) if !target_name.hidden && main.filename == target_filename => {
                    Ok(SwapOutcome::AlreadyMain {
                        filename: target_filename.to_string(),
                    })
                }
                _ => Err(RoomError::NotFound(format!(
                    "Image {} not found in room {}",
                    target_filename, room_id
                ))),
            };
        }
        if !self.ensure_main_image_locked(room_id).await? {
            return Err(RoomError::NotFound(format!(
                "Room {} has no images",
                room_id
            )));
        }

        let images = self.list_images(room_id).await?;
        let old_main = images
            .iter()
            .find(|image| image.is_main)
            .cloned()
            .ok_or_else(|| RoomError::NotFound(format!("Room {} has no main image", room_id)))?;
        let target_base = target_name.base_name();
        let old_target = images
            .iter()
            .find(|image| image.filename == target_filename)
            .or_else(|| images.iter().find(|image| image.name.base_name() == target_base))
            .cloned()
            .ok_or_else(|| {
                RoomError::NotFound(format!(
                    "Image {} not found in room {}",
                    target_filename, room_id
                ))
            })?;

        let plan = SwapPlan::new(room_id, old_main, old_target);
        info!(
            room_id = %room_id,
            main = %plan.old_main.filename,
            target = %plan.old_target.filename,
            "Swapping main image"
        );

        let (main_digest, target_digest) = self.stage(&plan).await?;
        let cleared = self.clear(&plan).await;
        self.wait_until_cleared(&plan, &cleared).await;
        let (main_url, source_url) = self.commit(&plan, &main_digest, &target_digest).await?;
        self.cleanup_staging(&plan).await;
        let report = self.verify(&plan, main_url, source_url).await;

        info!(
            room_id = %room_id,
            new_main = %report.swapped.new_main,
            new_source = %report.swapped.new_source,
            main_exists = report.verification.main_image_exists,
            target_exists = report.verification.target_image_exists,
            "Main image swap complete"
        );
        Ok(SwapOutcome::Swapped(report))
    }

    /// Phase 1: copy both images to staging objects. Real filenames are not
    /// touched, so any failure here is safe to retry.
    async fn stage(&self, plan: &SwapPlan) -> Result<(Vec<u8>, Vec<u8>), RoomError> {
        let staged = async {
            let main_data = self.objects.get(&plan.old_main.key).await?;
            let target_data = self.objects.get(&plan.old_target.key).await?;
            let digests = (digest(&main_data), digest(&target_data));

            self.objects
                .put(
                    &plan.staged_main_key,
                    main_data,
                    &content_type_for(&plan.staged_main_key),
                    false,
                )
                .await?;
            self.objects
                .put(
                    &plan.staged_target_key,
                    target_data,
                    &content_type_for(&plan.staged_target_key),
                    false,
                )
                .await?;
            Ok::<_, StorageError>(digests)
        }
        .await;

        match staged {
            Ok(digests) => {
                debug!(room_id = %plan.room_id, phase = %SwapPhase::Stage, "Staging copies written");
                Ok(digests)
            }
            Err(e) => {
                error!(room_id = %plan.room_id, phase = %SwapPhase::Stage, "Staging failed: {}", e);
                self.cleanup_staging(plan).await;
                Err(SwapFailure {
                    phase: SwapPhase::Stage,
                    details: e.to_string(),
                    recovery: SwapRecovery::SafeToRetry,
                    staging_keys: Vec::new(),
                }
                .into())
            }
        }
    }

    /// Phase 2: delete the two originals. Failures are logged and left to the
    /// forced overwrite of the commit phase. Returns the keys actually deleted.
    async fn clear(&self, plan: &SwapPlan) -> Vec<String> {
        let mut cleared = Vec::new();
        for key in [&plan.old_main.key, &plan.old_target.key] {
            match self.objects.delete(key).await {
                Ok(()) => cleared.push(key.clone()),
                Err(e) => {
                    warn!(room_id = %plan.room_id, phase = %SwapPhase::Clear, key = %key, "Delete failed, continuing: {}", e)
                }
            }
        }
        cleared
    }

    /// Polls the listing until the deleted keys disappear. Gives up after the
    /// consistency timeout; the commit overwrites regardless.
    async fn wait_until_cleared(&self, plan: &SwapPlan, cleared: &[String]) {
        if cleared.is_empty() {
            return;
        }
        let settled = self
            .await_listing(plan.room_id, |keys| {
                cleared.iter().all(|key| !keys.contains(key))
            })
            .await;
        if !settled {
            warn!(
                room_id = %plan.room_id,
                phase = %SwapPhase::Clear,
                "Deleted images still listed after {:?}, committing with overwrite",
                self.settings.consistency_timeout
            );
        }
    }

    /// Phase 3: write the staged bytes under their new names, overwriting
    /// whatever the listing still shows. On failure the original names are
    /// restored from staging.
    async fn commit(
        &self,
        plan: &SwapPlan,
        main_digest: &[u8],
        target_digest: &[u8],
    ) -> Result<(String, String), RoomError> {
        let committed = async {
            let staged_main = self.objects.get(&plan.staged_main_key).await?;
            let staged_target = self.objects.get(&plan.staged_target_key).await?;
            if digest(&staged_main) != main_digest || digest(&staged_target) != target_digest {
                return Err(StorageError::BackendError(
                    "staged copy does not match the original image".to_string(),
                ));
            }

            let main_url = self
                .objects
                .put(
                    &plan.new_main_key(),
                    staged_target,
                    &content_type_for(&plan.new_main_name),
                    true,
                )
                .await?;
            let source_url = self
                .objects
                .put(
                    &plan.new_source_key(),
                    staged_main,
                    &content_type_for(&plan.new_source_name),
                    true,
                )
                .await?;
            Ok::<_, StorageError>((main_url, source_url))
        }
        .await;

        let e = match committed {
            Ok(urls) => return Ok(urls),
            Err(e) => e,
        };

        error!(room_id = %plan.room_id, phase = %SwapPhase::Commit, "Commit failed, restoring originals: {}", e);
        match self.restore_originals(plan).await {
            Ok(()) => {
                info!(room_id = %plan.room_id, "Original images restored");
                self.cleanup_staging(plan).await;
                Err(SwapFailure {
                    phase: SwapPhase::Commit,
                    details: e.to_string(),
                    recovery: SwapRecovery::Restored,
                    staging_keys: Vec::new(),
                }
                .into())
            }
            Err(restore_error) => {
                error!(
                    room_id = %plan.room_id,
                    staging_keys = ?plan.staging_keys(),
                    "Restore failed, manual check required: {}",
                    restore_error
                );
                Err(SwapFailure {
                    phase: SwapPhase::Commit,
                    details: format!("{}; restore failed: {}", e, restore_error),
                    recovery: SwapRecovery::ManualCheckRequired,
                    staging_keys: plan.staging_keys(),
                }
                .into())
            }
        }
    }

    async fn restore_originals(&self, plan: &SwapPlan) -> Result<(), StorageError> {
        let staged_main = self.objects.get(&plan.staged_main_key).await?;
        let staged_target = self.objects.get(&plan.staged_target_key).await?;
        self.objects
            .put(
                &plan.old_main.key,
                staged_main,
                &content_type_for(&plan.old_main.filename),
                true,
            )
            .await?;
        self.objects
            .put(
                &plan.old_target.key,
                staged_target,
                &content_type_for(&plan.old_target.filename),
                true,
            )
            .await?;

        // Half-committed names that differ from the originals
        let originals = [&plan.old_main.key, &plan.old_target.key];
        for key in [plan.new_main_key(), plan.new_source_key()] {
            if !originals.contains(&&key) {
                if let Err(e) = self.objects.delete(&key).await {
                    warn!(room_id = %plan.room_id, key = %key, "Could not remove partial commit: {}", e);
                }
            }
        }
        Ok(())
    }

    /// Phase 4a: staging objects are garbage once the swap has settled.
    async fn cleanup_staging(&self, plan: &SwapPlan) {
        for key in plan.staging_keys() {
            if let Err(e) = self.objects.delete(&key).await {
                warn!(room_id = %plan.room_id, phase = %SwapPhase::Cleanup, key = %key, "Staging object left behind: {}", e);
            }
        }
    }

    /// Phase 4b: confirm both new names are listed and refresh the metadata.
    async fn verify(&self, plan: &SwapPlan, main_url: String, source_url: String) -> SwapReport {
        let main_key = plan.new_main_key();
        let source_key = plan.new_source_key();
        let settled = self
            .await_listing(plan.room_id, |keys| {
                keys.contains(&main_key) && keys.contains(&source_key)
            })
            .await;

        let (main_image_exists, target_image_exists) = if settled {
            (true, true)
        } else {
            match self.listed_keys(plan.room_id).await {
                Ok(keys) => (keys.contains(&main_key), keys.contains(&source_key)),
                Err(e) => {
                    warn!(room_id = %plan.room_id, "Verification listing failed: {}", e);
                    (false, false)
                }
            }
        };

        // The new names must not be hidden by old deletion markers
        let markers = deleted_images_key(plan.room_id);
        for name in [&plan.new_main_name, &plan.new_source_name] {
            if let Err(e) = self.metadata.remove_from_set(&markers, name).await {
                warn!(room_id = %plan.room_id, file = %name, "Could not clear deletion marker: {}", e);
            }
        }

        let last_updated = match self.record_main_image(plan.room_id, &main_url).await {
            Ok(timestamp) => timestamp,
            Err(e) => {
                warn!(room_id = %plan.room_id, "Could not record new main image in metadata: {}", e);
                super::catalog::next_timestamp(0)
            }
        };

        SwapReport {
            swapped: plan.names(),
            verification: SwapVerification {
                main_image_exists,
                target_image_exists,
                main_image_url: main_url.clone(),
                url_changed: main_url != plan.old_main.url,
            },
            main_url,
            source_url,
            last_updated,
        }
    }

    /// Re-lists the room with exponential backoff until `condition` holds or
    /// the consistency timeout runs out. Listing errors count as not settled.
    pub(crate) async fn await_listing<F>(&self, room_id: RoomId, condition: F) -> bool
    where
        F: Fn(&BTreeSet<String>) -> bool,
    {
        let deadline = Instant::now() + self.settings.consistency_timeout;
        let mut delay = self.settings.poll_interval.max(Duration::from_millis(1));
        loop {
            match self.listed_keys(room_id).await {
                Ok(keys) if condition(&keys) => return true,
                Ok(_) => {}
                Err(e) => warn!(room_id = %room_id, "Listing failed while polling: {}", e),
            }

            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            tokio::time::sleep(delay.min(deadline - now)).await;
            delay = delay.saturating_mul(2);
        }
    }
}
