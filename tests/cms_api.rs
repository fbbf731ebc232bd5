use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum_test::{
    TestServer,
    multipart::{MultipartForm, Part},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;

use picainn::{
    AdminConfig, AppState, Backends, Config,
    email::{EmailConfig, EmailProviderConfig, providers::null::NullProvider},
    metadata::providers::memory::MemoryMetadataStore,
    storage::{StorageConfig, providers::memory::MemoryObjectStore},
    translation::providers::null::NullTranslator,
};

struct TestSite {
    _temp_dir: TempDir,
    server: TestServer,
    objects: Arc<MemoryObjectStore>,
}

fn auth_header(username: &str, password: &str) -> (HeaderName, HeaderValue) {
    let encoded = STANDARD.encode(format!("{}:{}", username, password));
    (
        header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Basic {}", encoded)).unwrap(),
    )
}

fn admin() -> (HeaderName, HeaderValue) {
    auth_header("owner", "s3cret")
}

fn setup_test_site() -> TestSite {
    let temp_dir = TempDir::new().unwrap();

    let mut config = Config::default();
    config.admin = AdminConfig {
        username: "owner".to_string(),
        password: "s3cret".to_string(),
    };
    config.templates.directory = temp_dir.path().join("templates");
    config.static_files.directory = temp_dir.path().join("static");
    config.storage = StorageConfig::Memory(Default::default());
    config.images.consistency_timeout_ms = 200;
    config.images.poll_interval_ms = 5;
    config.email = Some(EmailConfig {
        from_address: "noreply@picainn.example".to_string(),
        from_name: Some("Pica Inn".to_string()),
        contact_address: "desk@picainn.example".to_string(),
        provider: EmailProviderConfig::Null,
    });

    let objects = Arc::new(MemoryObjectStore::new("memory://bucket".to_string()));
    let backends = Backends {
        objects: objects.clone(),
        metadata: Arc::new(MemoryMetadataStore::new()),
        translator: Arc::new(NullTranslator::new()),
        email_provider: Some(Arc::new(NullProvider::default())),
    };
    let app = picainn::router(AppState::new(config, backends));

    TestSite {
        _temp_dir: temp_dir,
        server: TestServer::new(app).unwrap(),
        objects,
    }
}

fn room_form(name: &str, images: &[(&str, &'static str)]) -> MultipartForm {
    let mut form = MultipartForm::new()
        .add_text("name", name)
        .add_text("type", "Twin")
        .add_text("description", "Quiet room two minutes from the station")
        .add_text("bedInfo", "2 single beds")
        .add_text("maxGuests", "2")
        .add_text("size", "16")
        .add_text("address", "Taito, Tokyo")
        .add_text("mapUrl", "https://maps.example/room")
        .add_text("amenities", "Wi-Fi")
        .add_text("amenities", "Kettle");
    for (file_name, content) in images {
        form = form.add_part(
            "images",
            Part::bytes(content.as_bytes().to_vec())
                .file_name(*file_name)
                .mime_type("image/jpeg"),
        );
    }
    form
}

/// Creates a room through the admin API and returns its id.
async fn create_room(site: &TestSite, name: &str, images: &[(&str, &'static str)]) -> String {
    let (name_header, value) = admin();
    let response = site
        .server
        .post("/api/cms/upload-room")
        .add_header(name_header, value)
        .multipart(room_form(name, images))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    body["roomId"].as_str().unwrap().to_string()
}

async fn object_text(site: &TestSite, key: &str) -> Option<String> {
    site.objects
        .object(key)
        .await
        .map(|object| String::from_utf8_lossy(&object.data).into_owned())
}

#[tokio::test]
async fn test_admin_api_requires_credentials() {
    let site = setup_test_site();

    let response = site.server.get("/api/cms/room-order").await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.header(header::WWW_AUTHENTICATE),
        "Basic realm=\"Admin Access\""
    );

    let (name, value) = auth_header("owner", "wrong");
    let response = site
        .server
        .get("/api/cms/room-order")
        .add_header(name, value)
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);

    let (name, value) = admin();
    let response = site
        .server
        .get("/api/cms/room-order")
        .add_header(name, value)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>(), json!({ "order": [] }));
}

#[tokio::test]
async fn test_admin_page_requires_credentials() {
    let site = setup_test_site();
    let response = site.server.get("/admin").await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_upload_then_list_public_rooms() {
    let site = setup_test_site();
    let room_id = create_room(
        &site,
        "Sakura",
        &[("front.jpg", "main-bytes"), ("bath.jpg", "bath-bytes")],
    )
    .await;
    assert_eq!(room_id, "room1");

    assert_eq!(
        object_text(&site, "rooms/room1/main.jpg").await.as_deref(),
        Some("main-bytes")
    );
    assert_eq!(
        object_text(&site, "rooms/room1/image-1.jpg").await.as_deref(),
        Some("bath-bytes")
    );

    let response = site.server.get("/api/rooms").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    let rooms = body["rooms"].as_array().unwrap();
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0]["id"], "room1");
    assert_eq!(rooms[0]["name"], "Sakura");
    assert_eq!(rooms[0]["size"], "16 m²");
    assert!(
        rooms[0]["mainImage"]
            .as_str()
            .unwrap()
            .starts_with("memory://bucket/rooms/room1/main.jpg?v=")
    );
    assert_eq!(rooms[0]["images"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_upload_room_rejects_missing_fields() {
    let site = setup_test_site();
    let (name, value) = admin();
    let form = MultipartForm::new().add_text("name", "Half done");
    let response = site
        .server
        .post("/api/cms/upload-room")
        .add_header(name, value)
        .multipart(form)
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert!(body["error"].as_str().unwrap().contains("map URL"));
    assert!(body["details"].is_string());
}

#[tokio::test]
async fn test_room_images_listing_puts_main_first() {
    let site = setup_test_site();
    create_room(
        &site,
        "Sakura",
        &[("a.jpg", "a"), ("b.jpg", "b"), ("c.jpg", "c")],
    )
    .await;

    let (name, value) = admin();
    let response = site
        .server
        .get("/api/cms/rooms-images")
        .add_query_param("roomId", "room1")
        .add_header(name, value)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    let files: Vec<&str> = body["images"]
        .as_array()
        .unwrap()
        .iter()
        .map(|image| image["filename"].as_str().unwrap())
        .collect();
    assert_eq!(files, vec!["main.jpg", "image-1.jpg", "image-2.jpg"]);
    assert_eq!(body["images"][0]["isMain"], true);
    assert!(body["lastUpdated"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn test_room_images_requires_room_id() {
    let site = setup_test_site();
    let (name, value) = admin();
    let response = site
        .server
        .get("/api/cms/rooms-images")
        .add_header(name, value)
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"], "Room ID is required");
}

#[tokio::test]
async fn test_set_main_image_swaps_bytes() {
    let site = setup_test_site();
    create_room(&site, "Sakura", &[("a.jpg", "first"), ("b.jpg", "second")]).await;

    let (name, value) = admin();
    let response = site
        .server
        .post("/api/cms/set-main-image")
        .add_header(name, value)
        .json(&json!({ "roomId": "room1", "filename": "image-1.jpg" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["verification"]["mainImageExists"], true);

    assert_eq!(
        object_text(&site, "rooms/room1/main.jpg").await.as_deref(),
        Some("second")
    );
    assert_eq!(
        object_text(&site, "rooms/room1/image-1.jpg").await.as_deref(),
        Some("first")
    );
    let staging = site
        .objects
        .keys()
        .await
        .into_iter()
        .filter(|key| key.contains("_staging_"))
        .count();
    assert_eq!(staging, 0);

    // Asking again for the image that is now main changes nothing
    let (name, value) = admin();
    let response = site
        .server
        .post("/api/cms/set-main-image")
        .add_header(name, value)
        .json(&json!({ "roomId": "room1", "filename": "main.jpg" }))
        .await;
    assert_eq!(response.json::<Value>()["alreadyMain"], true);
}

#[tokio::test]
async fn test_set_main_image_rejects_malformed_body() {
    let site = setup_test_site();
    let (name, value) = admin();
    let response = site
        .server
        .post("/api/cms/set-main-image")
        .add_header(name, value)
        .json(&json!({ "roomId": "room1" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_toggle_visibility_and_delete_image() {
    let site = setup_test_site();
    create_room(
        &site,
        "Sakura",
        &[("a.jpg", "a"), ("b.jpg", "b"), ("c.jpg", "c")],
    )
    .await;

    let (name, value) = admin();
    let response = site
        .server
        .post("/api/cms/toggle-image-visibility")
        .add_header(name, value)
        .json(&json!({ "roomId": "room1", "filename": "image-1.jpg", "hide": true }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["newFilename"], "_hidden_image-1.jpg");

    let rooms: Value = site.server.get("/api/rooms").await.json();
    let public_images = rooms["rooms"][0]["images"].as_array().unwrap();
    assert_eq!(public_images.len(), 1);
    assert!(public_images[0].as_str().unwrap().contains("image-2.jpg"));

    // The main image can be neither hidden nor deleted
    let (name, value) = admin();
    let response = site
        .server
        .post("/api/cms/toggle-image-visibility")
        .add_header(name, value)
        .json(&json!({ "roomId": "room1", "filename": "main.jpg", "hide": true }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let (name, value) = admin();
    let response = site
        .server
        .delete("/api/cms/delete-image")
        .add_query_param("roomId", "room1")
        .add_query_param("filename", "main.jpg")
        .add_header(name, value)
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let (name, value) = admin();
    let response = site
        .server
        .delete("/api/cms/delete-image")
        .add_query_param("roomId", "room1")
        .add_query_param("filename", "image-2.jpg")
        .add_header(name, value)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(object_text(&site, "rooms/room1/image-2.jpg").await.is_none());
}

#[tokio::test]
async fn test_delete_room_hides_it_and_never_reuses_id() {
    let site = setup_test_site();
    create_room(&site, "Sakura", &[("a.jpg", "a")]).await;
    create_room(&site, "Momiji", &[("b.jpg", "b")]).await;

    let (name, value) = admin();
    let response = site
        .server
        .delete("/api/cms/delete-room")
        .add_query_param("roomId", "room2")
        .add_header(name, value)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let rooms: Value = site.server.get("/api/rooms").await.json();
    let ids: Vec<&str> = rooms["rooms"]
        .as_array()
        .unwrap()
        .iter()
        .map(|room| room["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["room1"]);

    let (name, value) = admin();
    let deleted: Value = site
        .server
        .get("/api/cms/deleted-rooms")
        .add_header(name, value)
        .await
        .json();
    assert_eq!(deleted["deletedRooms"], json!(["room2"]));

    let room_id = create_room(&site, "Kaede", &[("c.jpg", "c")]).await;
    assert_eq!(room_id, "room3");
}

#[tokio::test]
async fn test_room_order_controls_public_listing() {
    let site = setup_test_site();
    create_room(&site, "Sakura", &[("a.jpg", "a")]).await;
    create_room(&site, "Momiji", &[("b.jpg", "b")]).await;

    let (name, value) = admin();
    let response = site
        .server
        .post("/api/cms/room-order")
        .add_header(name, value)
        .json(&json!({ "order": ["room2", "room1"] }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let rooms: Value = site.server.get("/api/rooms").await.json();
    assert_eq!(rooms["rooms"][0]["id"], "room2");
    assert_eq!(rooms["rooms"][1]["id"], "room1");
}

#[tokio::test]
async fn test_update_room_appends_images() {
    let site = setup_test_site();
    create_room(&site, "Sakura", &[("a.jpg", "a"), ("b.jpg", "b")]).await;

    let (name, value) = admin();
    let form = MultipartForm::new()
        .add_text("roomId", "room1")
        .add_text("name", "Sakura Deluxe")
        .add_text("type", "Twin")
        .add_text("description", "Quiet room two minutes from the station")
        .add_text("descriptionI18n-ko", "역에서 가까운 다다미방")
        .add_part(
            "images",
            Part::bytes(b"new".to_vec())
                .file_name("new.jpg")
                .mime_type("image/jpeg"),
        );
    let response = site
        .server
        .post("/api/cms/update-room")
        .add_header(name, value)
        .multipart(form)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["room"]["name"], "Sakura Deluxe");

    assert_eq!(
        object_text(&site, "rooms/room1/image-2.jpg").await.as_deref(),
        Some("new")
    );

    let rooms: Value = site
        .server
        .get("/api/rooms")
        .add_query_param("locale", "ko")
        .await
        .json();
    assert_eq!(rooms["rooms"][0]["description"], "역에서 가까운 다다미방");
}

#[tokio::test]
async fn test_hero_image_lifecycle() {
    let site = setup_test_site();

    let (name, value) = admin();
    let response = site
        .server
        .get("/api/cms/hero-image")
        .add_header(name, value)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(
        response
            .header(header::CACHE_CONTROL)
            .to_str()
            .unwrap()
            .contains("no-store")
    );
    let body: Value = response.json();
    assert_eq!(body["heroImageUrl"], Value::Null);
    assert_eq!(body["url"], "/static/images/hero-background.svg");

    let (name, value) = admin();
    let form = MultipartForm::new().add_part(
        "image",
        Part::bytes(b"hero".to_vec())
            .file_name("lobby.jpg")
            .mime_type("image/jpeg"),
    );
    let response = site
        .server
        .post("/api/cms/update-hero")
        .add_header(name, value)
        .multipart(form)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert!(body["url"].as_str().unwrap().contains("hero-background"));

    let (name, value) = admin();
    let body: Value = site
        .server
        .get("/api/cms/hero-image")
        .add_header(name, value)
        .await
        .json();
    assert!(body["url"].as_str().unwrap().contains("?v="));

    let (name, value) = admin();
    let response = site
        .server
        .delete("/api/cms/delete-hero")
        .add_header(name, value)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(
        site.objects
            .keys()
            .await
            .iter()
            .all(|key| !key.starts_with("hero/"))
    );
}

#[tokio::test]
async fn test_update_hero_without_file_is_rejected() {
    let site = setup_test_site();
    let (name, value) = admin();
    let response = site
        .server
        .post("/api/cms/update-hero")
        .add_header(name, value)
        .multipart(MultipartForm::new().add_text("caption", "none"))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"], "No image file provided");
}

#[tokio::test]
async fn test_send_inquiry() {
    let site = setup_test_site();
    create_room(&site, "Sakura", &[("a.jpg", "a")]).await;

    let response = site
        .server
        .post("/api/send-inquiry")
        .json(&json!({
            "fullName": "Aiko Tanaka",
            "email": "aiko@example.com",
            "guests": 2,
            "roomType": "room1",
            "contactApp": "LINE",
            "dateRange": { "from": "2026-11-02", "to": "2026-11-05" },
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["success"], true);

    let response = site
        .server
        .post("/api/send-inquiry")
        .json(&json!({ "fullName": "Aiko Tanaka", "email": "aiko@example.com" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["success"], false);
}

#[tokio::test]
async fn test_update_image_replaces_photo_in_place() {
    let site = setup_test_site();
    create_room(&site, "Sakura", &[("a.jpg", "first"), ("b.jpg", "second")]).await;

    let form = MultipartForm::new()
        .add_text("roomId", "room1")
        .add_text("filename", "image-1.jpg")
        .add_part(
            "image",
            Part::bytes(b"retaken".to_vec())
                .file_name("retaken.jpg")
                .mime_type("image/jpeg"),
        );
    let (name, value) = admin();
    let response = site
        .server
        .post("/api/cms/update-image")
        .add_header(name, value)
        .multipart(form)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert!(body["url"].as_str().unwrap().ends_with("rooms/room1/image-1.jpg"));
    assert_eq!(
        object_text(&site, "rooms/room1/image-1.jpg").await.as_deref(),
        Some("retaken")
    );
    assert_eq!(
        object_text(&site, "rooms/room1/main.jpg").await.as_deref(),
        Some("first")
    );
}

#[tokio::test]
async fn test_update_image_requires_all_fields() {
    let site = setup_test_site();
    create_room(&site, "Sakura", &[("a.jpg", "first")]).await;

    let form = MultipartForm::new()
        .add_text("roomId", "room1")
        .add_text("filename", "main.jpg");
    let (name, value) = admin();
    let response = site
        .server
        .post("/api/cms/update-image")
        .add_header(name, value)
        .multipart(form)
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"], "Image is required");

    let form = MultipartForm::new()
        .add_text("roomId", "room1")
        .add_text("filename", "main.jpg")
        .add_part(
            "image",
            Part::bytes(b"plain".to_vec())
                .file_name("notes.txt")
                .mime_type("text/plain"),
        );
    let (name, value) = admin();
    let response = site
        .server
        .post("/api/cms/update-image")
        .add_header(name, value)
        .multipart(form)
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"], "File must be an image");
}

#[tokio::test]
async fn test_bulk_translate_rooms_stores_given_texts() {
    let site = setup_test_site();
    create_room(&site, "Sakura", &[("a.jpg", "first")]).await;

    let (name, value) = admin();
    let response = site
        .server
        .post("/api/cms/bulk-translate-rooms")
        .add_header(name, value)
        .json(&json!({
            "translations": {
                "room1": { "ko": "역에서 2분 거리의 조용한 방" },
                "room8": { "fr": "Chambre calme" },
            }
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["updated"], 1);
    assert_eq!(body["notFound"], 1);

    let response = site
        .server
        .get("/api/rooms")
        .add_query_param("locale", "ko")
        .await;
    let body: Value = response.json();
    assert_eq!(
        body["rooms"][0]["description"],
        "역에서 2분 거리의 조용한 방"
    );
}
