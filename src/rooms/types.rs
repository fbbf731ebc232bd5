use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};

use super::RoomError;

/// Filename prefix marking an image as hidden from public listings.
pub const HIDDEN_PREFIX: &str = "_hidden_";
/// Filename prefix of the temporary copies a swap writes. Never listed.
pub const STAGING_PREFIX: &str = "_staging_";

pub const DEFAULT_AMENITIES: [&str; 2] = ["Wi-Fi", "Private Bathroom"];
pub const DEFAULT_MAX_GUESTS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomId(u64);

impl RoomId {
    pub fn new(number: u64) -> Self {
        Self(number)
    }

    pub fn number(&self) -> u64 {
        self.0
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Object key prefix holding every image of the room.
    pub fn image_prefix(&self) -> String {
        format!("rooms/{}/", self)
    }

    pub fn image_key(&self, file_name: &str) -> String {
        format!("rooms/{}/{}", self, file_name)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "room{}", self.0)
    }
}

impl FromStr for RoomId {
    type Err = RoomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix("room")
            .and_then(|n| n.parse::<u64>().ok())
            .filter(|n| *n > 0)
            .map(RoomId)
            .ok_or_else(|| RoomError::Validation(format!("Invalid room id: {}", s)))
    }
}

impl Serialize for RoomId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RoomId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageKind {
    Main,
    Additional(u32),
    /// Image files that follow neither naming shape, kept from older uploads.
    Other(String),
}

/// A room image filename split into its parts:
/// `[_hidden_](main | image-<k> | <other>).<ext>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageName {
    pub hidden: bool,
    pub kind: ImageKind,
    pub extension: String,
}

impl ImageName {
    pub fn parse(file_name: &str) -> Option<Self> {
        if !crate::storage::is_image_file(file_name) {
            return None;
        }
        let (hidden, base) = match file_name.strip_prefix(HIDDEN_PREFIX) {
            Some(rest) => (true, rest),
            None => (false, file_name),
        };
        let (stem, extension) = base.rsplit_once('.')?;
        if stem.is_empty() {
            return None;
        }

        let kind = if stem == "main" {
            ImageKind::Main
        } else if let Some(number) = stem
            .strip_prefix("image-")
            .and_then(|n| n.parse::<u32>().ok())
            .filter(|n| *n > 0)
        {
            ImageKind::Additional(number)
        } else {
            ImageKind::Other(stem.to_string())
        };

        Some(Self {
            hidden,
            kind,
            extension: extension.to_string(),
        })
    }

    pub fn main(extension: &str) -> Self {
        Self {
            hidden: false,
            kind: ImageKind::Main,
            extension: extension.to_string(),
        }
    }

    pub fn additional(number: u32, extension: &str) -> Self {
        Self {
            hidden: false,
            kind: ImageKind::Additional(number),
            extension: extension.to_string(),
        }
    }

    /// Filename without the hidden prefix.
    pub fn base_name(&self) -> String {
        let stem = match &self.kind {
            ImageKind::Main => "main".to_string(),
            ImageKind::Additional(number) => format!("image-{}", number),
            ImageKind::Other(stem) => stem.clone(),
        };
        format!("{}.{}", stem, self.extension)
    }

    pub fn file_name(&self) -> String {
        if self.hidden {
            format!("{}{}", HIDDEN_PREFIX, self.base_name())
        } else {
            self.base_name()
        }
    }

    pub fn with_hidden(&self, hidden: bool) -> Self {
        Self {
            hidden,
            ..self.clone()
        }
    }

    pub fn with_extension(&self, extension: &str) -> Self {
        Self {
            extension: extension.to_string(),
            ..self.clone()
        }
    }

    pub fn is_main(&self) -> bool {
        self.kind == ImageKind::Main && !self.hidden
    }

    pub fn number(&self) -> Option<u32> {
        match self.kind {
            ImageKind::Additional(number) => Some(number),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomImage {
    pub room_id: RoomId,
    pub filename: String,
    pub url: String,
    pub is_main: bool,
    pub is_hidden: bool,
    #[serde(skip)]
    pub key: String,
    #[serde(skip)]
    pub name: ImageName,
}

impl RoomImage {
    pub fn cache_busted_url(&self, last_updated: i64) -> String {
        cache_busted(&self.url, last_updated)
    }
}

pub fn cache_busted(url: &str, last_updated: i64) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}v={}", url, separator, last_updated)
}

/// One entry of the admin image listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListedImage {
    #[serde(flatten)]
    pub image: RoomImage,
    pub order: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomImageListing {
    pub room_id: RoomId,
    pub images: Vec<ListedImage>,
    pub last_updated: i64,
}

fn default_max_guests() -> u32 {
    DEFAULT_MAX_GUESTS
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMetadata {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub room_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub description_i18n: BTreeMap<String, String>,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default)]
    pub bed_info: String,
    #[serde(default = "default_max_guests")]
    pub max_guests: u32,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub map_url: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub alt_text: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_image_url: Option<String>,
    #[serde(default)]
    pub last_updated: i64,
}

impl RoomMetadata {
    pub fn localized_description(&self, locale: Option<&str>) -> &str {
        locale
            .and_then(|l| self.description_i18n.get(l))
            .filter(|d| !d.trim().is_empty())
            .map(String::as_str)
            .unwrap_or(&self.description)
    }

    pub fn localized_alt_text(&self, locale: Option<&str>) -> Option<&str> {
        locale
            .and_then(|l| self.alt_text.get(l))
            .or_else(|| self.alt_text.get("en"))
            .map(String::as_str)
    }
}

/// Descriptive room fields as submitted by the admin forms.
#[derive(Debug, Clone, Default)]
pub struct RoomForm {
    pub name: String,
    pub room_type: String,
    pub description: String,
    pub description_i18n: BTreeMap<String, String>,
    pub amenities: Vec<String>,
    pub bed_info: String,
    pub max_guests: String,
    pub size: String,
    pub address: String,
    pub map_url: String,
    pub alt_text: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

impl UploadedImage {
    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }

    /// Extension to store the upload under.
    pub fn extension(&self) -> String {
        let from_name = self
            .file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .filter(|ext| crate::storage::is_image_file(&format!("x.{}", ext)));
        from_name.unwrap_or_else(|| {
            match self.content_type.as_str() {
                "image/png" => "png",
                "image/webp" => "webp",
                _ => "jpg",
            }
            .to_string()
        })
    }
}

/// Public room card, localized.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: RoomId,
    pub name: String,
    #[serde(rename = "type")]
    pub room_type: String,
    pub description: String,
    pub amenities: Vec<String>,
    pub bed_info: String,
    pub max_guests: u32,
    pub size: String,
    pub address: String,
    pub map_url: String,
    pub alt_text: Option<String>,
    pub main_image: String,
    pub images: Vec<String>,
    pub has_images: bool,
    pub last_updated: i64,
}

/// Rejects filenames that could address objects outside the room namespace.
pub fn validate_filename(file_name: &str) -> Result<(), RoomError> {
    if file_name.trim().is_empty() {
        return Err(RoomError::Validation("Filename is required".to_string()));
    }
    if file_name.contains('/') || file_name.contains('\\') || file_name.contains("..") {
        return Err(RoomError::Validation(format!(
            "Invalid filename: {}",
            file_name
        )));
    }
    Ok(())
}

/// Appends ` m²` unless the size already carries a unit; `m2` becomes `m²`.
pub fn normalize_floor_area(size: &str) -> String {
    let trimmed = size.trim();
    let lower = trimmed.to_lowercase();
    if trimmed.is_empty() {
        String::new()
    } else if lower.ends_with("m²") {
        trimmed.to_string()
    } else if lower.ends_with("m2") {
        format!("{}m²", &trimmed[..trimmed.len() - 2])
    } else {
        format!("{} m²", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_image_names() {
        let main = ImageName::parse("main.jpg").unwrap();
        assert!(main.is_main());
        assert_eq!(main.base_name(), "main.jpg");

        let hidden_main = ImageName::parse("_hidden_main.png").unwrap();
        assert!(!hidden_main.is_main());
        assert_eq!(hidden_main.kind, ImageKind::Main);
        assert_eq!(hidden_main.base_name(), "main.png");

        let additional = ImageName::parse("_hidden_image-12.webp").unwrap();
        assert!(additional.hidden);
        assert_eq!(additional.number(), Some(12));
        assert_eq!(additional.with_hidden(false).file_name(), "image-12.webp");

        let legacy = ImageName::parse("bedroom.jpeg").unwrap();
        assert_eq!(legacy.kind, ImageKind::Other("bedroom".to_string()));

        assert!(ImageName::parse("notes.txt").is_none());
        assert!(ImageName::parse("image-0.jpg").unwrap().number().is_none());
    }

    #[test]
    fn test_room_id_parsing() {
        let id: RoomId = "room12".parse().unwrap();
        assert_eq!(id.number(), 12);
        assert_eq!(id.to_string(), "room12");
        assert_eq!(id.image_key("main.jpg"), "rooms/room12/main.jpg");
        assert!("room0".parse::<RoomId>().is_err());
        assert!("suite4".parse::<RoomId>().is_err());
        assert!("room".parse::<RoomId>().is_err());
    }

    #[test]
    fn test_metadata_uses_camel_case_keys() {
        let json = serde_json::json!({
            "id": "room1",
            "name": "Sakura",
            "type": "Double",
            "description": "Quiet room",
            "descriptionI18n": {"ko": "조용한 방"},
            "bedInfo": "1 double bed",
            "mapUrl": "https://maps.example.com",
            "lastUpdated": 5
        });
        let metadata: RoomMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(metadata.room_type, "Double");
        assert_eq!(metadata.max_guests, DEFAULT_MAX_GUESTS);
        assert_eq!(metadata.localized_description(Some("ko")), "조용한 방");
        assert_eq!(metadata.localized_description(Some("fr")), "Quiet room");

        let value = serde_json::to_value(&metadata).unwrap();
        assert_eq!(value["bedInfo"], "1 double bed");
        assert!(value.get("mainImageUrl").is_none());
    }

    #[test]
    fn test_validate_filename() {
        assert!(validate_filename("image-1.jpg").is_ok());
        assert!(validate_filename("../main.jpg").is_err());
        assert!(validate_filename("a/b.jpg").is_err());
        assert!(validate_filename(" ").is_err());
    }

    #[test]
    fn test_normalize_floor_area() {
        assert_eq!(normalize_floor_area("18"), "18 m²");
        assert_eq!(normalize_floor_area("18 m2"), "18 m²");
        assert_eq!(normalize_floor_area("18m²"), "18m²");
    }

    #[test]
    fn test_cache_busted_url() {
        assert_eq!(cache_busted("https://x/a.jpg", 7), "https://x/a.jpg?v=7");
        assert_eq!(cache_busted("https://x/a.jpg?w=1", 7), "https://x/a.jpg?w=1&v=7");
    }

    #[test]
    fn test_upload_extension() {
        let upload = UploadedImage {
            file_name: "Photo.PNG".to_string(),
            content_type: "image/png".to_string(),
            data: Bytes::new(),
        };
        assert_eq!(upload.extension(), "png");

        let unnamed = UploadedImage {
            file_name: "blob".to_string(),
            content_type: "image/webp".to_string(),
            data: Bytes::new(),
        };
        assert_eq!(unnamed.extension(), "webp");
    }
}
