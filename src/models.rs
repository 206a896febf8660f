//! Data models for Google Drive API responses.

use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::{Duration, PrimitiveDateTime};

use crate::error::{DriveError, Result};

/// MIME type Google Drive uses for folders.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Entry of a files.list response, projected to `id` and `name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetadata {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

fn deserialize_size<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    match opt {
        Some(s) => s.parse::<u64>().map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

/// Format bytes into human-readable size.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Response from the files.list API endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListResponse {
    #[serde(default)]
    pub files: Vec<FileMetadata>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// User information as embedded in file metadata.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub email_address: Option<String>,
    pub display_name: Option<String>,
}

/// Projection `modifiedTime, name, lastModifyingUser, mimeType, size`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFileInfo {
    pub modified_time: String,
    pub name: Option<String>,
    pub last_modifying_user: Option<User>,
    pub mime_type: Option<String>,
    #[serde(default, deserialize_with = "deserialize_size")]
    pub size: Option<u64>,
}

/// Projection `owners`.
#[derive(Debug, Deserialize)]
pub struct OwnersResponse {
    #[serde(default)]
    pub owners: Vec<User>,
}

/// Projection `id` returned by create and update.
#[derive(Debug, Deserialize)]
pub struct CreatedFile {
    pub id: String,
}

/// Modification time shifted by a flat hour offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifiedTime {
    /// `HH:MM:SS` in the shifted zone.
    pub time: String,
    /// `YYYY-MM-DD` in the shifted zone.
    pub day: String,
    /// Unix seconds of the shifted wall-clock time read as UTC.
    pub epoch_seconds: i64,
}

impl ModifiedTime {
    /// Derive the local fields from a wire timestamp like `2024-03-01T10:00:00.000Z`.
    ///
    /// The offset is a plain hour shift; daylight saving and fractional-hour
    /// zones are not modelled.
    pub fn derive(wire: &str, utc_offset_hours: i64) -> Result<Self> {
        let wire_format = format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]Z"
        );
        let parsed = PrimitiveDateTime::parse(wire, wire_format)
            .map_err(|e| DriveError::InvalidTimestamp(format!("{}: {}", wire, e)))?;

        let local = parsed
            .checked_add(Duration::hours(utc_offset_hours))
            .ok_or_else(|| DriveError::InvalidTimestamp(format!("{} out of range", wire)))?;

        let time = local
            .format(format_description!("[hour]:[minute]:[second]"))
            .map_err(|e| DriveError::InvalidTimestamp(e.to_string()))?;
        let day = local
            .format(format_description!("[year]-[month]-[day]"))
            .map_err(|e| DriveError::InvalidTimestamp(e.to_string()))?;

        Ok(Self {
            time,
            day,
            epoch_seconds: local.assume_utc().unix_timestamp(),
        })
    }
}

/// Derived, read-only view of a remote object's metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub modified_time: String,
    pub modified_day: String,
    pub modified_time_sec: i64,
    pub name: Option<String>,
    pub last_modifying_user: Option<String>,
    pub mime_type: Option<String>,
    pub size: Option<u64>,
}

impl FileInfo {
    pub fn from_raw(raw: RawFileInfo, utc_offset_hours: i64) -> Result<Self> {
        let modified = ModifiedTime::derive(&raw.modified_time, utc_offset_hours)?;
        Ok(Self {
            modified_time: modified.time,
            modified_day: modified.day,
            modified_time_sec: modified.epoch_seconds,
            name: raw.name,
            last_modifying_user: raw.last_modifying_user.and_then(|u| u.display_name),
            mime_type: raw.mime_type,
            size: raw.size,
        })
    }
}

/// Google API error response.
#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    pub code: u16,
    pub message: String,
}

/// Service account credentials from JSON file.
#[derive(Debug, Deserialize)]
pub struct ServiceAccountCredentials {
    pub client_email: String,
    pub private_key: String,
    pub token_uri: Option<String>,
}

/// OAuth client registration, the inner object of `client_secrets.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    "https://accounts.google.com/o/oauth2/auth".to_string()
}

fn default_token_uri() -> String {
    crate::credential::TOKEN_URI.to_string()
}

/// `client_secrets.json` as downloaded from the Cloud console.
#[derive(Debug, Deserialize)]
pub enum ClientSecretsFile {
    #[serde(rename = "installed")]
    Installed(ClientSecrets),
    #[serde(rename = "web")]
    Web(ClientSecrets),
}

impl ClientSecretsFile {
    pub fn into_secrets(self) -> ClientSecrets {
        match self {
            Self::Installed(secrets) | Self::Web(secrets) => secrets,
        }
    }
}

/// OAuth2 token response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}
