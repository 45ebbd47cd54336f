//! Helix API payload models.
//!
//! Every resource endpoint answers with a `{"data": [...]}` envelope;
//! the first element, if any, is the result. Payload fields the core
//! does not depend on carry `#[serde(default)]` so an upstream shape
//! change degrades to empty values instead of a failed lookup.

use serde::{Deserialize, Serialize};

/// The envelope wrapping every Helix resource response.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct DataEnvelope<T> {
    #[serde(default)]
    pub data: Vec<T>,
}

/// A Twitch user profile, from `GET /users`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Required: `get_last_archive_vod` keys the video lookup on it.
    pub id: String,
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(rename = "type", default)]
    pub user_type: String,
    #[serde(default)]
    pub broadcaster_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub profile_image_url: String,
    #[serde(default)]
    pub offline_image_url: String,
    #[serde(default)]
    pub created_at: String,
}

/// A live broadcast, from `GET /streams`. Absence of a stream for a
/// login is the canonical "not live" signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stream {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub user_login: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub game_id: String,
    #[serde(default)]
    pub game_name: String,
    #[serde(rename = "type", default)]
    pub stream_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub viewer_count: u64,
    #[serde(default)]
    pub started_at: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub thumbnail_url: String,
    #[serde(default)]
    pub is_mature: bool,
}

/// A video/VOD, from `GET /videos`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Video {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub user_login: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub published_at: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub thumbnail_url: String,
    #[serde(rename = "type", default)]
    pub video_type: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub view_count: u64,
}

/// The OAuth token endpoint payload. Fields are optional so the manager
/// can report precisely which one a malformed response lacked.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: Option<String>,
    pub expires_in: Option<i64>,
}
