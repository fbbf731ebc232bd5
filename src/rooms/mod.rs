// Room catalog and room image lifecycle
mod catalog;
mod deletion;
mod error;
mod handlers;
mod images;
mod main_image;
mod replace;
mod swap;
mod translations;
mod types;
mod visibility;


pub use catalog::{
    DELETED_ROOMS_KEY, ROOM_METADATA_KEY, ROOM_ORDER_KEY, deleted_images_key, next_timestamp,
};
pub use deletion::DeleteRoomReport;
pub use error::RoomError;
pub use handlers::*;
pub use swap::{
    SwapFailure, SwapOutcome, SwapPhase, SwapRecovery, SwapReport, SwapVerification,
    SwappedNames,
};
pub use translations::{
    AutoTranslateOptions, AutoTranslateReport, BulkTranslateReport, BulkTranslateRequest,
    BulkTranslationResult, BulkTranslationStatus, RoomTranslationResult, TranslationPreview,
    TranslationStatus, TranslationSummary,
};
pub use types::*;

use crate::{metadata::DynMetadataStore, storage::DynObjectStore};
use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::sync::OwnedMutexGuard;

pub type SharedRoomService = Arc<RoomService>;

#[derive(Debug, Clone)]
pub struct RoomSettings {
    /// Upper bound for waiting on the object store listing to reflect a change.
    pub consistency_timeout: Duration,
    /// First delay of the listing poll; doubles up to the remaining budget.
    pub poll_interval: Duration,
    /// Directory holding per-room image folders from before the object store.
    pub legacy_directory: Option<PathBuf>,
    pub placeholder_image: String,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            consistency_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(100),
            legacy_directory: None,
            placeholder_image: "/static/images/placeholder.svg".to_string(),
        }
    }
}

/// One async mutex per room, handed out on demand.
#[derive(Default)]
pub(crate) struct RoomLocks {
    locks: Mutex<HashMap<RoomId, Arc<tokio::sync::Mutex<()>>>>,
}

impl RoomLocks {
    pub(crate) async fn acquire(&self, room_id: RoomId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(room_id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

pub struct RoomService {
    pub(crate) objects: DynObjectStore,
    pub(crate) metadata: DynMetadataStore,
    pub(crate) settings: RoomSettings,
    pub(crate) locks: RoomLocks,
    /// Serializes read-modify-write cycles on the shared metadata documents.
    pub(crate) metadata_lock: tokio::sync::Mutex<()>,
    /// Held from id allocation until the new room's metadata is saved.
    pub(crate) creation_lock: tokio::sync::Mutex<()>,
}

impl RoomService {
    pub fn new(objects: DynObjectStore, metadata: DynMetadataStore, settings: RoomSettings) -> Self {
        Self {
            objects,
            metadata,
            settings,
            locks: RoomLocks::default(),
            metadata_lock: tokio::sync::Mutex::new(()),
            creation_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &RoomSettings {
        &self.settings
    }

    pub fn object_store(&self) -> &DynObjectStore {
        &self.objects
    }

    pub fn metadata_store(&self) -> &DynMetadataStore {
        &self.metadata
    }
}
