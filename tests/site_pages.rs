use axum::http::StatusCode;
use axum_test::TestServer;
use std::{fs, sync::Arc};
use tempfile::TempDir;

use picainn::{
    AppState, Backends, Config,
    metadata::providers::memory::MemoryMetadataStore,
    storage::providers::memory::MemoryObjectStore,
    translation::providers::null::NullTranslator,
};

async fn setup_test_server() -> (TempDir, TestServer) {
    let temp_dir = TempDir::new().unwrap();
    let templates_dir = temp_dir.path().join("templates");
    let static_dir = temp_dir.path().join("static");
    fs::create_dir_all(&templates_dir).unwrap();
    fs::create_dir_all(&static_dir).unwrap();

    fs::write(
        templates_dir.join("_header.html.liquid"),
        r#"<html lang="{{ locale }}" dir="{{ dir }}"><body><h1>{{ app_name }}</h1>"#,
    )
    .unwrap();
    fs::write(templates_dir.join("_footer.html.liquid"), "</body></html>").unwrap();
    fs::write(
        templates_dir.join("index.html.liquid"),
        r#"{{ header }}<img class="hero" src="{{ hero_url }}">
{% for room in rooms %}<article id="{{ room.id }}">{{ room.name }}</article>{% endfor %}
{% if rooms.size == 0 %}<p>No rooms yet</p>{% endif %}{{ footer }}"#,
    )
    .unwrap();
    fs::write(static_dir.join("site.css"), "body { margin: 0; }").unwrap();

    let mut config = Config::default();
    config.app.name = "Test Inn".to_string();
    config.templates.directory = templates_dir;
    config.static_files.directory = static_dir;

    let backends = Backends {
        objects: Arc::new(MemoryObjectStore::new("memory://bucket".to_string())),
        metadata: Arc::new(MemoryMetadataStore::new()),
        translator: Arc::new(NullTranslator::new()),
        email_provider: None,
    };
    let server = TestServer::new(picainn::router(AppState::new(config, backends))).unwrap();
    (temp_dir, server)
}

#[tokio::test]
async fn test_home_page_renders_with_partials() {
    let (_temp_dir, server) = setup_test_server().await;

    let response = server.get("/").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let html = response.text();
    assert!(html.contains(r#"<html lang="en" dir="ltr">"#));
    assert!(html.contains("<h1>Test Inn</h1>"));
    assert!(html.contains("No rooms yet"));
    assert!(html.contains("/static/images/hero-background.svg"));
    assert!(html.ends_with("</body></html>"));
}

#[tokio::test]
async fn test_localized_home_page() {
    let (_temp_dir, server) = setup_test_server().await;

    let response = server.get("/ar").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(response.text().contains(r#"<html lang="ar" dir="rtl">"#));

    let response = server.get("/xx").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_static_files_are_served() {
    let (_temp_dir, server) = setup_test_server().await;

    let response = server.get("/static/site.css").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.text(), "body { margin: 0; }");

    let response = server.get("/static/missing.css").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_missing_template_is_server_error() {
    let (temp_dir, server) = setup_test_server().await;
    fs::remove_file(temp_dir.path().join("templates/index.html.liquid")).unwrap();

    let response = server.get("/").await;
    assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_inquiry_without_email_config_still_succeeds() {
    let (_temp_dir, server) = setup_test_server().await;

    let response = server
        .post("/api/send-inquiry")
        .json(&serde_json::json!({
            "fullName": "Sam Lee",
            "email": "sam@example.com",
            "roomType": "room9",
            "guests": "2",
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
}
