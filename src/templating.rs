use crate::{AppState, i18n};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse},
};
use std::{collections::HashMap, path::PathBuf, sync::Arc, time::SystemTime};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

pub struct TemplateEngine {
    template_dir: PathBuf,
    cache: Arc<RwLock<HashMap<String, CachedTemplate>>>,
}

struct CachedTemplate {
    content: String,
    modified: SystemTime,
}

impl TemplateEngine {
    pub fn new(template_dir: PathBuf) -> Self {
        Self {
            template_dir,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn load_template(&self, path: &str) -> Result<String, String> {
        let template_path = self.template_dir.join(path);

        let metadata = tokio::fs::metadata(&template_path)
            .await
            .map_err(|e| format!("Failed to get metadata for {}: {}", path, e))?;

        let modified = metadata
            .modified()
            .map_err(|e| format!("Failed to get modified time: {}", e))?;

        let mut cache = self.cache.write().await;

        if let Some(cached) = cache.get(path)
            && cached.modified >= modified
        {
            debug!("Using cached template for {}", path);
            return Ok(cached.content.clone());
        }

        info!("Loading template: {}", path);

        let content = tokio::fs::read_to_string(&template_path)
            .await
            .map_err(|e| format!("Failed to read template {}: {}", path, e))?;

        cache.insert(
            path.to_string(),
            CachedTemplate {
                content: content.clone(),
                modified,
            },
        );

        Ok(content)
    }

    fn parse_and_render(source: &str, globals: &liquid::Object) -> Result<String, String> {
        let parser = liquid::ParserBuilder::with_stdlib()
            .build()
            .map_err(|e| format!("Failed to create parser: {}", e))?;

        let template = parser
            .parse(source)
            .map_err(|e| format!("Failed to parse template: {}", e))?;

        template
            .render(globals)
            .map_err(|e| format!("Failed to render template: {}", e))
    }

    /// Renders a partial with the page globals; a missing or broken partial
    /// renders as nothing.
    async fn render_partial(&self, name: &str, globals: &liquid::Object) -> String {
        let source = match self.load_template(name).await {
            Ok(source) => source,
            Err(e) => {
                error!("Failed to load {}: {}", name, e);
                return String::new();
            }
        };
        Self::parse_and_render(&source, globals).unwrap_or_else(|e| {
            error!("Failed to render {}: {}", name, e);
            String::new()
        })
    }

    pub async fn render_template(
        &self,
        template_name: &str,
        globals: liquid::Object,
    ) -> Result<String, String> {
        let template_content = self.load_template(template_name).await?;

        let header = self.render_partial("_header.html.liquid", &globals).await;
        let footer = self.render_partial("_footer.html.liquid", &globals).await;

        let mut full_globals = globals;
        full_globals.insert("header".into(), liquid::model::Value::scalar(header));
        full_globals.insert("footer".into(), liquid::model::Value::scalar(footer));

        Self::parse_and_render(&template_content, &full_globals)
    }

    pub async fn render_page(
        &self,
        template_name: &str,
        globals: liquid::Object,
    ) -> Result<Html<String>, StatusCode> {
        match self.render_template(template_name, globals).await {
            Ok(html) => Ok(Html(html)),
            Err(e) => {
                error!("Template rendering error: {}", e);
                Err(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

fn to_liquid<T: serde::Serialize>(value: &T) -> liquid::model::Value {
    liquid::model::to_value(value).unwrap_or_else(|e| {
        warn!("Could not convert page data for templates: {}", e);
        liquid::model::Value::Nil
    })
}

fn page_globals(app_state: &AppState, locale: &str) -> liquid::Object {
    liquid::object!({
        "app_name": app_state.config.app.name.clone(),
        "base_url": app_state.config.app.base_url.clone().unwrap_or_default(),
        "locale": locale.to_string(),
        "dir": i18n::text_direction(locale),
        "locales": i18n::LOCALES.to_vec(),
    })
}

async fn render_home(app_state: &AppState, locale: &str) -> Result<Html<String>, StatusCode> {
    let rooms = app_state.rooms.list_rooms(Some(locale)).await.map_err(|e| {
        error!("Could not load rooms for {}: {}", locale, e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    let hero_url = app_state.hero.display_url().await;

    let mut globals = page_globals(app_state, locale);
    globals.insert("rooms".into(), to_liquid(&rooms));
    globals.insert("hero_url".into(), liquid::model::Value::scalar(hero_url));
    app_state
        .template_engine
        .render_page("index.html.liquid", globals)
        .await
}

/// `GET /`
pub async fn index_handler(State(app_state): State<AppState>) -> impl IntoResponse {
    let locale = app_state.config.app.default_locale.clone();
    render_home(&app_state, &locale).await
}

/// `GET /{locale}`
pub async fn localized_index_handler(
    State(app_state): State<AppState>,
    Path(locale): Path<String>,
) -> Result<Html<String>, StatusCode> {
    if !i18n::is_supported_locale(&locale) {
        debug!("Unknown locale requested: {}", locale);
        return Err(StatusCode::NOT_FOUND);
    }
    render_home(&app_state, &locale).await
}

/// `GET /admin`
pub async fn admin_handler(
    State(app_state): State<AppState>,
) -> Result<Html<String>, StatusCode> {
    let rooms = &app_state.rooms;
    let (summaries, deleted, hero) = tokio::join!(
        rooms.list_rooms(None),
        rooms.deleted_rooms(),
        app_state.hero.current(),
    );
    let summaries = summaries.map_err(|e| {
        error!("Could not load rooms for admin page: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    let deleted: Vec<String> = deleted
        .unwrap_or_else(|e| {
            warn!("Could not load deleted rooms: {}", e);
            Default::default()
        })
        .into_iter()
        .collect();
    let hero_url = match hero {
        Ok(config) => config.hero_image_url.unwrap_or_default(),
        Err(e) => {
            warn!("Could not load hero settings: {}", e);
            String::new()
        }
    };

    let mut globals = page_globals(&app_state, i18n::SOURCE_LANGUAGE);
    globals.insert("rooms".into(), to_liquid(&summaries));
    globals.insert("deleted_rooms".into(), to_liquid(&deleted));
    globals.insert("hero_url".into(), liquid::model::Value::scalar(hero_url));
    app_state
        .template_engine
        .render_page("admin.html.liquid", globals)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn engine_with(files: &[(&str, &str)]) -> (TempDir, TemplateEngine) {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            tokio::fs::write(dir.path().join(name), content).await.unwrap();
        }
        let engine = TemplateEngine::new(dir.path().to_path_buf());
        (dir, engine)
    }

    #[tokio::test]
    async fn test_partials_see_page_globals() {
        let (_dir, engine) = engine_with(&[
            ("_header.html.liquid", "<header>{{ app_name }}</header>"),
            ("_footer.html.liquid", "<footer>{{ locale }}</footer>"),
            ("page.html.liquid", "{{ header }}<main>{{ rooms | size }}</main>{{ footer }}"),
        ])
        .await;

        let globals = liquid::object!({
            "app_name": "Pica Inn",
            "locale": "ja",
            "rooms": vec![1, 2, 3],
        });
        let html = engine.render_template("page.html.liquid", globals).await.unwrap();
        assert_eq!(
            html,
            "<header>Pica Inn</header><main>3</main><footer>ja</footer>"
        );
    }

    #[tokio::test]
    async fn test_missing_partials_render_empty() {
        let (_dir, engine) = engine_with(&[("page.html.liquid", "[{{ header }}]ok")]).await;
        let html = engine
            .render_template("page.html.liquid", liquid::object!({}))
            .await
            .unwrap();
        assert_eq!(html, "[]ok");
    }

    #[tokio::test]
    async fn test_missing_page_is_an_error() {
        let (_dir, engine) = engine_with(&[]).await;
        let result = engine.render_page("nope.html.liquid", liquid::object!({})).await;
        assert_eq!(result.unwrap_err(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
