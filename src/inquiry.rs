use axum::{
    extract::{State, rejection::JsonRejection},
    response::{IntoResponse, Json},
};
use chrono::{DateTime, NaiveDate};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::{
    AppState,
    email::{DynEmailProvider, EmailConfig, EmailMessage},
    rooms::{RoomError, RoomService},
};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InquiryRequest {
    pub full_name: String,
    pub email: String,
    pub guests: serde_json::Value,
    pub room_type: String,
    pub contact_app: String,
    pub date_range: Option<DateRange>,
}

impl InquiryRequest {
    fn validate(&self) -> Result<(), RoomError> {
        if self.full_name.trim().is_empty() || self.email.trim().is_empty() {
            return Err(RoomError::Validation(
                "Full name, email, and room type are required".to_string(),
            ));
        }
        if self.room_type.trim().is_empty() {
            return Err(RoomError::Validation("Please select a room type".to_string()));
        }
        Ok(())
    }

    fn guests_text(&self) -> String {
        match &self.guests {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => "Not specified".to_string(),
            other => other.to_string(),
        }
    }
}

/// Accepts `2025-04-01` or a full RFC 3339 timestamp.
fn format_date(raw: &str) -> Option<String> {
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))?;
    Some(date.format("%Y-%m-%d").to_string())
}

fn date_range_text(range: Option<&DateRange>) -> String {
    let formatted = range.and_then(|range| {
        let from = format_date(range.from.as_deref()?)?;
        let to = format_date(range.to.as_deref()?)?;
        Some(format!("{} to {}", from, to))
    });
    formatted.unwrap_or_else(|| "Not selected".to_string())
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// `"<name> - <type>"` for a known room id, otherwise the submitted value.
async fn room_label(rooms: &RoomService, room_type: &str) -> String {
    match rooms.all_metadata().await {
        Ok(all) => match all.get(room_type) {
            Some(room) => format!("{} - {}", room.name, room.room_type),
            None => {
                warn!(room_type = %room_type, "Inquiry for unknown room, using raw value");
                room_type.to_string()
            }
        },
        Err(e) => {
            warn!("Could not load room metadata for inquiry: {}", e);
            room_type.to_string()
        }
    }
}

pub fn build_inquiry_message(
    config: &EmailConfig,
    inquiry: &InquiryRequest,
    room_label: &str,
) -> EmailMessage {
    let guests = inquiry.guests_text();
    let dates = date_range_text(inquiry.date_range.as_ref());

    let text = format!(
        "New booking inquiry received:\n\n\
         Name: {}\n\
         Email: {}\n\
         Room Type: {}\n\
         Number of Guests: {}\n\
         Preferred Contact Method: {}\n\
         Date Range: {}\n\n\
         Please contact the guest via their preferred method: {}",
        inquiry.full_name, inquiry.email, room_label, guests, inquiry.contact_app, dates,
        inquiry.contact_app
    );

    let rows = [
        ("Name", inquiry.full_name.as_str()),
        ("Email", inquiry.email.as_str()),
        ("Room Type", room_label),
        ("Number of Guests", guests.as_str()),
        ("Preferred Contact Method", inquiry.contact_app.as_str()),
        ("Date Range", dates.as_str()),
    ];
    let mut html = String::from("<h2>New Booking Inquiry</h2>\n");
    for (label, value) in rows {
        html.push_str(&format!(
            "<p><strong>{}:</strong> {}</p>\n",
            label,
            escape_html(value)
        ));
    }
    html.push_str(&format!(
        "<p>Please contact the guest via their preferred method: {}</p>\n",
        escape_html(&inquiry.contact_app)
    ));

    EmailMessage::new(
        config.contact_address.clone(),
        config.format_from(),
        format!("New Booking Inquiry from {}", inquiry.full_name),
    )
    .with_both(text, html)
    .with_reply_to(inquiry.email.trim())
}

async fn deliver(
    provider: Option<&DynEmailProvider>,
    config: Option<&EmailConfig>,
    message: impl FnOnce(&EmailConfig) -> EmailMessage,
) {
    let (Some(provider), Some(config)) = (provider, config) else {
        warn!("Email is not configured, inquiry was not sent");
        return;
    };
    match provider.send_email(message(config)).await {
        Ok(()) => info!(provider = provider.name(), "Inquiry email sent"),
        Err(e) => error!("Failed to send inquiry email: {}", e),
    }
}

/// `POST /api/send-inquiry`
pub async fn send_inquiry_handler(
    State(app_state): State<AppState>,
    payload: Result<Json<InquiryRequest>, JsonRejection>,
) -> Result<impl IntoResponse, RoomError> {
    let Json(inquiry) = payload.map_err(|e| RoomError::Validation(e.body_text()))?;
    inquiry.validate()?;
    info!(room_type = %inquiry.room_type, guests = %inquiry.guests_text(), "Received inquiry");

    let label = room_label(&app_state.rooms, inquiry.room_type.trim()).await;
    deliver(
        app_state.email_provider.as_ref(),
        app_state.config.email.as_ref(),
        |config| build_inquiry_message(config, &inquiry, &label),
    )
    .await;

    Ok(Json(json!({
        "success": true,
        "message": "Inquiry submitted successfully. We will contact you soon!",
    })))
}
