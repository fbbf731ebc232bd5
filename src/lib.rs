use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

pub mod auth;
pub mod email;
pub mod hero;
pub mod i18n;
pub mod inquiry;
pub mod metadata;
pub mod rooms;
pub mod startup_checks;
pub mod storage;
pub mod templating;
pub mod translation;

use email::EmailConfig;
use metadata::MetadataConfig;
use storage::{LocalStorageConfig, StorageConfig};
use translation::TranslationConfig;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub app: AppConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    pub templates: TemplateConfig,
    pub static_files: StaticConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub images: ImagesConfig,
    #[serde(default)]
    pub translation: TranslationConfig,
    #[serde(default)]
    pub email: Option<EmailConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub name: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_locale")]
    pub default_locale: String,
    #[serde(default = "default_placeholder_image")]
    pub placeholder_image: String,
    /// Shown on the home page until a hero image is uploaded.
    #[serde(default = "default_hero_image")]
    pub hero_fallback_image: String,
}

/// The single shared admin credential checked with HTTP Basic auth.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AdminConfig {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TemplateConfig {
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StaticConfig {
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ImagesConfig {
    /// Per-call bound on object store requests.
    pub request_timeout_secs: u64,
    /// How long to wait for listings to reflect a change before moving on.
    pub consistency_timeout_ms: u64,
    pub poll_interval_ms: u64,
    /// Per-room image folders left over from the pre-object-store layout.
    pub legacy_directory: Option<PathBuf>,
    pub max_upload_bytes: usize,
}

fn default_locale() -> String {
    i18n::SOURCE_LANGUAGE.to_string()
}

fn default_placeholder_image() -> String {
    "/static/images/placeholder.svg".to_string()
}

fn default_hero_image() -> String {
    "/static/images/hero-background.svg".to_string()
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            consistency_timeout_ms: 5_000,
            poll_interval_ms: 100,
            legacy_directory: None,
            max_upload_bytes: 50 * 1024 * 1024,
        }
    }
}

impl ImagesConfig {
    pub fn room_settings(&self, app: &AppConfig) -> rooms::RoomSettings {
        rooms::RoomSettings {
            consistency_timeout: Duration::from_millis(self.consistency_timeout_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            legacy_directory: self.legacy_directory.clone(),
            placeholder_image: app.placeholder_image.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            app: AppConfig {
                name: "Pica Inn".to_string(),
                base_url: None,
                default_locale: default_locale(),
                placeholder_image: default_placeholder_image(),
                hero_fallback_image: default_hero_image(),
            },
            admin: AdminConfig::default(),
            templates: TemplateConfig {
                directory: PathBuf::from("templates"),
            },
            static_files: StaticConfig {
                directory: PathBuf::from("static"),
            },
            storage: StorageConfig::Local(LocalStorageConfig {
                directory: PathBuf::from("data/media"),
                public_url_prefix: "/media".to_string(),
            }),
            metadata: MetadataConfig::default(),
            images: ImagesConfig::default(),
            translation: TranslationConfig::default(),
            email: None,
        }
    }
}

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
};
use std::sync::Arc;
use thiserror::Error;
use tower_http::{services::ServeDir, trace::TraceLayer};

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Object store setup failed: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Metadata store setup failed: {0}")]
    Metadata(#[from] metadata::MetadataError),

    #[error("Translator setup failed: {0}")]
    Translation(#[from] translation::TranslationError),

    #[error("Email provider setup failed: {0}")]
    Email(#[from] email::EmailError),
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub rooms: rooms::SharedRoomService,
    pub hero: Arc<hero::HeroService>,
    pub translator: translation::DynTranslator,
    pub email_provider: Option<email::DynEmailProvider>,
    pub template_engine: Arc<templating::TemplateEngine>,
}

/// Collaborators the application talks to. Tests swap in memory-backed ones.
pub struct Backends {
    pub objects: storage::DynObjectStore,
    pub metadata: metadata::DynMetadataStore,
    pub translator: translation::DynTranslator,
    pub email_provider: Option<email::DynEmailProvider>,
}

impl Backends {
    pub async fn from_config(config: &Config) -> Result<Self, SetupError> {
        let objects = storage::TimedObjectStore::wrap(
            storage::create_object_store(&config.storage).await?,
            Duration::from_secs(config.images.request_timeout_secs),
        );
        let metadata = metadata::create_metadata_store(&config.metadata).await?;
        let translator = translation::create_translator(&config.translation)?;
        let email_provider = match &config.email {
            Some(email_config) => Some(email::create_provider(&email_config.provider).await?),
            None => None,
        };
        tracing::info!(
            objects = objects.name(),
            metadata = metadata.name(),
            translator = translator.name(),
            email = email_provider.as_ref().map(|p| p.name()).unwrap_or("none"),
            "Backends ready"
        );
        Ok(Self {
            objects,
            metadata,
            translator,
            email_provider,
        })
    }
}

impl AppState {
    pub fn new(config: Config, backends: Backends) -> Self {
        let settings = config.images.room_settings(&config.app);
        let rooms = Arc::new(rooms::RoomService::new(
            backends.objects.clone(),
            backends.metadata.clone(),
            settings,
        ));
        let hero = Arc::new(hero::HeroService::new(
            backends.objects,
            backends.metadata,
            config.app.hero_fallback_image.clone(),
        ));
        let template_engine = Arc::new(templating::TemplateEngine::new(
            config.templates.directory.clone(),
        ));

        Self {
            config: Arc::new(config),
            rooms,
            hero,
            translator: backends.translator,
            email_provider: backends.email_provider,
            template_engine,
        }
    }
}

pub async fn create_app(config: Config) -> Result<Router, SetupError> {
    let backends = Backends::from_config(&config).await?;
    Ok(router(AppState::new(config, backends)))
}

fn admin_routes(app_state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/admin", get(templating::admin_handler))
        .route("/api/cms/rooms-images", get(rooms::room_images_handler))
        .route("/api/cms/room-images", get(rooms::room_images_handler))
        .route("/api/cms/set-main-image", post(rooms::set_main_image_handler))
        .route(
            "/api/cms/toggle-image-visibility",
            post(rooms::toggle_image_visibility_handler),
        )
        .route("/api/cms/delete-image", delete(rooms::delete_image_handler))
        .route("/api/cms/delete-room", delete(rooms::delete_room_handler))
        .route(
            "/api/cms/room-order",
            get(rooms::room_order_handler).post(rooms::update_room_order_handler),
        )
        .route("/api/cms/deleted-rooms", get(rooms::deleted_rooms_handler))
        .route("/api/cms/upload-room", post(rooms::upload_room_handler))
        .route("/api/cms/update-room", post(rooms::update_room_handler))
        .route("/api/cms/update-image", post(rooms::update_image_handler))
        .route(
            "/api/cms/bulk-translate-rooms",
            post(rooms::bulk_translate_rooms_handler),
        )
        .route(
            "/api/cms/auto-translate-rooms",
            get(rooms::auto_translate_preview_handler).post(rooms::auto_translate_rooms_handler),
        )
        .route(
            "/api/cms/translate-description",
            post(translation::translate_description_handler),
        )
        .route("/api/cms/hero-image", get(hero::hero_image_handler))
        .route("/api/cms/update-hero", post(hero::update_hero_handler))
        .route("/api/cms/delete-hero", delete(hero::delete_hero_handler))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            auth::require_admin,
        ))
}

pub fn router(app_state: AppState) -> Router {
    let config = app_state.config.clone();

    let mut app = Router::new()
        .route("/", get(templating::index_handler))
        .route("/{locale}", get(templating::localized_index_handler))
        .route("/api/rooms", get(rooms::rooms_handler))
        .route("/api/send-inquiry", post(inquiry::send_inquiry_handler))
        .merge(admin_routes(&app_state))
        .nest_service("/static", ServeDir::new(&config.static_files.directory));

    // Locally stored images are served by this process
    if let StorageConfig::Local(local) = &config.storage
        && local.public_url_prefix.starts_with('/')
        && local.public_url_prefix != "/static"
    {
        app = app.nest_service(
            local.public_url_prefix.trim_end_matches('/'),
            ServeDir::new(&local.directory),
        );
    }

    app.layer(DefaultBodyLimit::max(config.images.max_upload_bytes))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    let matched_path = request
                        .extensions()
                        .get::<axum::extract::MatchedPath>()
                        .map(|matched_path| matched_path.as_str());

                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        matched_path,
                    )
                })
                .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
                    let uri = request.uri();
                    let user_agent = request
                        .headers()
                        .get("user-agent")
                        .and_then(|h| h.to_str().ok())
                        .unwrap_or("-");

                    tracing::info!(
                        target: "access_log",
                        method = %request.method(),
                        path = %uri.path(),
                        query = ?uri.query(),
                        user_agent = %user_agent,
                        "request"
                    );
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        let size = response
                            .headers()
                            .get("content-length")
                            .and_then(|h| h.to_str().ok())
                            .unwrap_or("-");

                        tracing::info!(
                            target: "access_log",
                            status = %response.status(),
                            size = %size,
                            latency_ms = %latency.as_millis(),
                            "response"
                        );
                    },
                ),
        )
        .with_state(app_state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_fills_defaults() {
        let config: Config = toml_edit::de::from_str(
            r#"
            [server]
            host = "0.0.0.0"
            port = 8080

            [app]
            name = "Pica Inn"

            [admin]
            username = "owner"
            password = "s3cret"

            [templates]
            directory = "templates"

            [static_files]
            directory = "static"

            [storage]
            provider = "memory"

            [metadata]
            provider = "memory"

            [translation]
            provider = "null"
            "#,
        )
        .unwrap();

        assert_eq!(config.app.default_locale, "en");
        assert!(matches!(config.storage, StorageConfig::Memory(_)));
        assert!(matches!(config.metadata, MetadataConfig::Memory));
        assert!(matches!(config.translation, TranslationConfig::Null));
        assert!(config.email.is_none());
        assert_eq!(config.images.consistency_timeout_ms, 5_000);

        let settings = config.images.room_settings(&config.app);
        assert_eq!(settings.consistency_timeout, Duration::from_secs(5));
        assert_eq!(settings.placeholder_image, "/static/images/placeholder.svg");
    }

    #[test]
    fn test_example_config_parses() {
        let config: Config =
            toml_edit::de::from_str(include_str!("../config.example.toml")).unwrap();
        assert!(matches!(config.storage, StorageConfig::Local(_)));
        assert!(matches!(config.metadata, MetadataConfig::File(_)));
        assert!(matches!(config.translation, TranslationConfig::MyMemory(_)));
        assert_eq!(config.email.unwrap().contact_address, "desk@picainn.example");
    }

    #[test]
    fn test_storage_sections_parse() {
        let storage: StorageConfig = toml_edit::de::from_str(
            r#"
            provider = "s3"
            bucket = "picainn"
            account_id = "abc123"
            "#,
        )
        .unwrap();
        let StorageConfig::S3(s3) = storage else {
            panic!("expected s3 storage");
        };
        assert_eq!(
            s3.endpoint_url().as_deref(),
            Some("https://abc123.r2.cloudflarestorage.com")
        );
        assert_eq!(s3.public_base_url(), "https://pub-abc123.r2.dev/picainn");
    }
}
