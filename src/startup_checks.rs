use crate::{Config, metadata::MetadataConfig, storage::StorageConfig};
use std::path::Path;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum StartupCheckError {
    #[error("Failed to create local storage directory: {0}")]
    StorageDirectoryCreationFailed(std::io::Error),

    #[error("Failed to create metadata directory: {0}")]
    MetadataDirectoryCreationFailed(std::io::Error),

    #[error("Static files directory does not exist")]
    StaticDirectoryMissing,

    #[error("Templates directory does not exist")]
    TemplatesDirectoryMissing,

    #[error("Admin username or password is not configured")]
    AdminCredentialsMissing,
}

impl StartupCheckError {
    /// Errors the server cannot run with.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            StartupCheckError::StorageDirectoryCreationFailed(_)
                | StartupCheckError::AdminCredentialsMissing
        )
    }
}

async fn ensure_directory(dir: &Path, what: &str) -> Result<(), std::io::Error> {
    if dir.exists() {
        info!("{} exists: {:?}", what, dir);
        return Ok(());
    }
    info!("{} does not exist, creating: {:?}", what, dir);
    tokio::fs::create_dir_all(dir).await.inspect_err(|e| {
        error!("Failed to create {} {:?}: {}", what, dir, e);
    })
}

pub async fn perform_startup_checks(config: &Config) -> Result<(), Vec<StartupCheckError>> {
    let mut errors = Vec::new();

    info!("Performing startup checks...");

    if let StorageConfig::Local(local) = &config.storage
        && let Err(e) = ensure_directory(&local.directory, "Local storage directory").await
    {
        errors.push(StartupCheckError::StorageDirectoryCreationFailed(e));
    }

    if let MetadataConfig::File(file) = &config.metadata
        && let Some(parent) = file.path.parent().filter(|p| !p.as_os_str().is_empty())
        && let Err(e) = ensure_directory(parent, "Metadata directory").await
    {
        errors.push(StartupCheckError::MetadataDirectoryCreationFailed(e));
    }

    if let Some(legacy) = &config.images.legacy_directory
        && !legacy.exists()
    {
        warn!("Legacy image directory does not exist: {:?}", legacy);
    }

    if !config.static_files.directory.exists() {
        warn!(
            "Static files directory does not exist: {:?}",
            config.static_files.directory
        );
        errors.push(StartupCheckError::StaticDirectoryMissing);
    }

    if !config.templates.directory.exists() {
        warn!(
            "Templates directory does not exist: {:?}",
            config.templates.directory
        );
        warn!("This may cause issues with page rendering");
        errors.push(StartupCheckError::TemplatesDirectoryMissing);
    }

    if config.admin.username.is_empty() || config.admin.password.is_empty() {
        error!("Set [admin] username and password to use the admin panel");
        errors.push(StartupCheckError::AdminCredentialsMissing);
    }

    if errors.is_empty() {
        info!("All startup checks passed");
        Ok(())
    } else {
        error!("Startup checks failed with {} errors", errors.len());
        Err(errors)
    }
}
