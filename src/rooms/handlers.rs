use super::{
    AutoTranslateOptions, BulkTranslateRequest, RoomError, RoomForm, RoomId, SwapOutcome,
    UploadedImage,
};
use crate::{AppState, i18n};
use axum::{
    extract::{
        Multipart, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomQuery {
    pub room_id: Option<String>,
    pub filename: Option<String>,
    pub locale: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetMainImageRequest {
    pub room_id: String,
    pub filename: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleVisibilityRequest {
    pub room_id: String,
    pub filename: String,
    pub hide: bool,
}

#[derive(Debug, Deserialize)]
pub struct RoomOrderRequest {
    pub order: Vec<String>,
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, RoomError> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| RoomError::Validation(e.body_text()))
}

fn query_params(query: Result<Query<RoomQuery>, QueryRejection>) -> Result<RoomQuery, RoomError> {
    query
        .map(|Query(params)| params)
        .map_err(|e| RoomError::Validation(e.body_text()))
}

fn require_room_id(raw: Option<&str>) -> Result<RoomId, RoomError> {
    raw.map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| RoomError::Validation("Room ID is required".to_string()))?
        .parse()
}

fn require_filename(raw: Option<&str>) -> Result<&str, RoomError> {
    raw.map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| RoomError::Validation("Filename is required".to_string()))
}

/// `GET /api/rooms`
pub async fn rooms_handler(
    State(app_state): State<AppState>,
    query: Result<Query<RoomQuery>, QueryRejection>,
) -> Result<impl IntoResponse, RoomError> {
    let params = query_params(query)?;
    let locale = params
        .locale
        .as_deref()
        .filter(|locale| i18n::is_supported_locale(locale));
    let rooms = app_state.rooms.list_rooms(locale).await?;
    Ok(Json(json!({ "success": true, "rooms": rooms })))
}

/// `GET /api/cms/rooms-images?roomId=`
pub async fn room_images_handler(
    State(app_state): State<AppState>,
    query: Result<Query<RoomQuery>, QueryRejection>,
) -> Result<impl IntoResponse, RoomError> {
    let params = query_params(query)?;
    let room_id = require_room_id(params.room_id.as_deref())?;
    let listing = app_state.rooms.room_images(room_id).await?;
    debug!(room_id = %room_id, images = listing.images.len(), "Listed room images");
    Ok(Json(json!({
        "success": true,
        "roomId": listing.room_id,
        "images": listing.images,
        "lastUpdated": listing.last_updated,
    })))
}

/// `POST /api/cms/set-main-image`
pub async fn set_main_image_handler(
    State(app_state): State<AppState>,
    payload: Result<Json<SetMainImageRequest>, JsonRejection>,
) -> Result<impl IntoResponse, RoomError> {
    let request = json_body(payload)?;
    let room_id = require_room_id(Some(request.room_id.as_str()))?;
    let filename = require_filename(Some(request.filename.as_str()))?;

    match app_state.rooms.swap_main(room_id, filename).await? {
        SwapOutcome::AlreadyMain { filename } => Ok(Json(json!({
            "success": true,
            "message": format!("{} is already the main image", filename),
            "alreadyMain": true,
        }))),
        SwapOutcome::Swapped(report) => Ok(Json(json!({
            "success": true,
            "message": format!(
                "Swapped {} and {}. Append ?v={} to image URLs to see the change.",
                report.swapped.old_main, report.swapped.old_source, report.last_updated
            ),
            "swapped": report.swapped,
            "verification": report.verification,
            "mainUrl": report.main_url,
            "sourceUrl": report.source_url,
            "lastUpdated": report.last_updated,
        }))),
    }
}

/// `POST /api/cms/toggle-image-visibility`
pub async fn toggle_image_visibility_handler(
    State(app_state): State<AppState>,
    payload: Result<Json<ToggleVisibilityRequest>, JsonRejection>,
) -> Result<impl IntoResponse, RoomError> {
    let request = json_body(payload)?;
    let room_id = require_room_id(Some(request.room_id.as_str()))?;
    let filename = require_filename(Some(request.filename.as_str()))?;

    let image = app_state
        .rooms
        .set_hidden(room_id, filename, request.hide)
        .await?;
    Ok(Json(json!({
        "success": true,
        "newFilename": image.filename,
        "image": image,
    })))
}

/// `DELETE /api/cms/delete-image?roomId=&filename=`
pub async fn delete_image_handler(
    State(app_state): State<AppState>,
    query: Result<Query<RoomQuery>, QueryRejection>,
) -> Result<impl IntoResponse, RoomError> {
    let params = query_params(query)?;
    let room_id = require_room_id(params.room_id.as_deref())?;
    let filename = require_filename(params.filename.as_deref())?;

    app_state.rooms.delete_image(room_id, filename).await?;
    Ok(Json(json!({ "success": true })))
}

/// `DELETE /api/cms/delete-room?roomId=`
pub async fn delete_room_handler(
    State(app_state): State<AppState>,
    query: Result<Query<RoomQuery>, QueryRejection>,
) -> Result<impl IntoResponse, RoomError> {
    let params = query_params(query)?;
    let room_id = require_room_id(params.room_id.as_deref())?;

    let report = app_state.rooms.delete_room(room_id).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Room {} deleted", room_id),
        "report": report,
    })))
}

/// `GET /api/cms/room-order`
pub async fn room_order_handler(
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, RoomError> {
    let order = app_state.rooms.room_order().await?;
    Ok(Json(json!({ "order": order })))
}

/// `POST /api/cms/room-order`
pub async fn update_room_order_handler(
    State(app_state): State<AppState>,
    payload: Result<Json<RoomOrderRequest>, JsonRejection>,
) -> Result<impl IntoResponse, RoomError> {
    let request = json_body(payload)?;
    let order = app_state.rooms.set_room_order(&request.order).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Room order updated",
        "order": order,
    })))
}

/// `GET /api/cms/deleted-rooms`
pub async fn deleted_rooms_handler(
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, RoomError> {
    let deleted = app_state.rooms.deleted_rooms().await?;
    Ok(Json(json!({ "deletedRooms": deleted })))
}

/// Room form fields and image files of an upload or update request.
struct RoomSubmission {
    room_id: Option<String>,
    form: RoomForm,
    images: Vec<UploadedImage>,
}

async fn read_room_submission(mut multipart: Multipart) -> Result<RoomSubmission, RoomError> {
    let mut submission = RoomSubmission {
        room_id: None,
        form: RoomForm::default(),
        images: Vec::new(),
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| RoomError::Validation(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "images" {
            let file_name = field.file_name().unwrap_or("upload").to_string();
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| RoomError::Validation(e.body_text()))?;
            if !data.is_empty() {
                submission.images.push(UploadedImage {
                    file_name,
                    content_type,
                    data,
                });
            }
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| RoomError::Validation(e.body_text()))?;
        let form = &mut submission.form;
        match name.as_str() {
            "roomId" => submission.room_id = Some(value),
            "name" => form.name = value,
            "type" => form.room_type = value,
            "description" => form.description = value,
            "bedInfo" => form.bed_info = value,
            "maxGuests" => form.max_guests = value,
            "size" => form.size = value,
            "address" => form.address = value,
            "mapUrl" => form.map_url = value,
            "amenities" => form.amenities.push(value),
            "altTextEn" => {
                form.alt_text.insert("en".to_string(), value);
            }
            "altTextJa" => {
                form.alt_text.insert("ja".to_string(), value);
            }
            "altTextKo" => {
                form.alt_text.insert("ko".to_string(), value);
            }
            "altTextZh" => {
                form.alt_text.insert("zh".to_string(), value);
            }
            other => match other.strip_prefix("descriptionI18n-") {
                Some(language) if i18n::is_supported_locale(language) => {
                    form.description_i18n.insert(language.to_string(), value);
                }
                _ => debug!("Ignoring form field {}", other),
            },
        }
    }
    Ok(submission)
}

/// `POST /api/cms/upload-room` (multipart)
pub async fn upload_room_handler(
    State(app_state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, RoomError> {
    let submission = read_room_submission(multipart).await?;
    let image_count = submission.images.len();
    let (room_id, room) = app_state
        .rooms
        .create_room(submission.form, submission.images)
        .await?;
    info!(room_id = %room_id, images = image_count, "Room uploaded");
    Ok(Json(json!({
        "success": true,
        "message": format!("Room {} created with {} images", room_id, image_count),
        "roomId": room_id,
        "room": room,
    })))
}

/// `POST /api/cms/update-room` (multipart)
pub async fn update_room_handler(
    State(app_state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, RoomError> {
    let submission = read_room_submission(multipart).await?;
    let room_id = require_room_id(submission.room_id.as_deref())?;
    let (room, added) = app_state
        .rooms
        .update_room(room_id, submission.form, submission.images)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Room {} updated successfully", room_id),
        "addedImages": added,
        "timestamp": room.last_updated,
        "room": room,
    })))
}

/// `POST /api/cms/update-image` (multipart: `roomId`, `filename`, `image`)
pub async fn update_image_handler(
    State(app_state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, RoomError> {
    let mut room_id = None;
    let mut filename = None;
    let mut image = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| RoomError::Validation(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "roomId" | "filename" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| RoomError::Validation(e.body_text()))?;
                if name == "roomId" {
                    room_id = Some(value);
                } else {
                    filename = Some(value);
                }
            }
            "image" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| RoomError::Validation(e.body_text()))?;
                image = Some(UploadedImage {
                    file_name,
                    content_type,
                    data,
                });
            }
            other => debug!("Ignoring form field {}", other),
        }
    }

    let room_id = require_room_id(room_id.as_deref())?;
    let filename = require_filename(filename.as_deref())?;
    let image = image.ok_or_else(|| RoomError::Validation("Image is required".to_string()))?;
    let updated = app_state.rooms.update_image(room_id, filename, image).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Image updated successfully",
        "url": updated.url,
        "image": updated,
    })))
}

/// `POST /api/cms/bulk-translate-rooms`
pub async fn bulk_translate_rooms_handler(
    State(app_state): State<AppState>,
    payload: Result<Json<BulkTranslateRequest>, JsonRejection>,
) -> Result<impl IntoResponse, RoomError> {
    let request = json_body(payload)?;
    let report = app_state.rooms.apply_translations(request).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Updated translations for {} rooms", report.updated),
        "totalRooms": report.total_rooms,
        "updated": report.updated,
        "notFound": report.not_found,
        "results": report.results,
    })))
}

/// `GET /api/cms/auto-translate-rooms`
pub async fn auto_translate_preview_handler(
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, RoomError> {
    let rooms = app_state.rooms.translation_preview().await?;
    Ok(Json(json!({
        "success": true,
        "totalRooms": rooms.len(),
        "rooms": rooms,
    })))
}

/// `POST /api/cms/auto-translate-rooms`
pub async fn auto_translate_rooms_handler(
    State(app_state): State<AppState>,
    payload: Result<Json<AutoTranslateOptions>, JsonRejection>,
) -> Result<impl IntoResponse, RoomError> {
    // An empty body means the defaults
    let options = match payload {
        Ok(Json(options)) => options,
        Err(JsonRejection::MissingJsonContentType(_)) => AutoTranslateOptions::default(),
        Err(e) => return Err(RoomError::Validation(e.body_text())),
    };

    let report = app_state
        .rooms
        .auto_translate_rooms(&app_state.translator, options)
        .await?;
    let message = if report.dry_run {
        format!("Preview: would translate {} rooms", report.summary.translated)
    } else {
        format!("Translated {} rooms", report.summary.translated)
    };
    Ok(Json(json!({
        "success": true,
        "message": message,
        "dryRun": report.dry_run,
        "totalRooms": report.total_rooms,
        "results": report.results,
        "summary": report.summary,
    })))
}
