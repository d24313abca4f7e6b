//! Domain models for the offline store
//!
//! Resource classification, registry entries, in-flight download records and
//! the small naming helpers shared by the registry and the coordinator.

use crate::error::OfflineError;
use bridge_traits::{TransferHandle, TransferStatus};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

// =============================================================================
// Resource Type
// =============================================================================

/// Kind of offline resource. Each type owns a storage sub-directory and a
/// default file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Photo,
    Comic,
    Audio,
    Json,
}

impl ResourceType {
    /// All types in display order.
    pub const ALL: [ResourceType; 4] = [
        ResourceType::Photo,
        ResourceType::Comic,
        ResourceType::Audio,
        ResourceType::Json,
    ];

    /// Sub-directory under `Offline/`.
    pub fn folder_name(&self) -> &'static str {
        match self {
            ResourceType::Photo => "photos",
            ResourceType::Comic => "comics",
            ResourceType::Audio => "audios",
            ResourceType::Json => "json",
        }
    }

    /// Extension used when a URL carries none.
    pub fn default_extension(&self) -> &'static str {
        match self {
            ResourceType::Audio => ".mp3",
            ResourceType::Photo | ResourceType::Comic => ".jpg",
            ResourceType::Json => ".json",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ResourceType::Photo => "Photos",
            ResourceType::Comic => "Comics",
            ResourceType::Audio => "Audio",
            ResourceType::Json => "JSON",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Photo => "photo",
            ResourceType::Comic => "comic",
            ResourceType::Audio => "audio",
            ResourceType::Json => "json",
        }
    }

    /// Classify a URL by substring, for entries stored without a type.
    ///
    /// "mp3"/"audio" → Audio, "json" → Json, "comic" → Comic, otherwise Photo.
    pub fn detect(url: &str) -> Self {
        let url = url.to_lowercase();

        if url.contains("mp3") || url.contains("audio") {
            ResourceType::Audio
        } else if url.contains("json") {
            ResourceType::Json
        } else if url.contains("comic") {
            ResourceType::Comic
        } else {
            ResourceType::Photo
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = OfflineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "photo" => Ok(ResourceType::Photo),
            "comic" => Ok(ResourceType::Comic),
            "audio" => Ok(ResourceType::Audio),
            "json" => Ok(ResourceType::Json),
            other => Err(OfflineError::invalid_input(
                "resource_type",
                format!("unknown resource type '{other}'"),
            )),
        }
    }
}

// =============================================================================
// Tracked Resource
// =============================================================================

/// A registry entry: a url claimed to be backed by a local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedResource {
    pub url: String,
    pub local_path: PathBuf,
    pub resource_type: ResourceType,
    pub is_priority: bool,
    pub recorded_at: DateTime<Utc>,
}

/// Database row for `offline_resources` joined with `priority_urls`.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct ResourceRow {
    pub url: String,
    pub local_path: String,
    pub resource_type: Option<String>,
    pub recorded_at: i64,
    pub is_priority: bool,
}

impl From<ResourceRow> for TrackedResource {
    fn from(row: ResourceRow) -> Self {
        let resource_type = row
            .resource_type
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| ResourceType::detect(&row.url));

        Self {
            resource_type,
            local_path: PathBuf::from(row.local_path),
            is_priority: row.is_priority,
            recorded_at: timestamp_from_millis(row.recorded_at),
            url: row.url,
        }
    }
}

// =============================================================================
// Download Request
// =============================================================================

/// An in-flight transfer owned by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub handle: TransferHandle,
    pub url: String,
    pub title: String,
    pub resource_type: ResourceType,
    pub destination: PathBuf,
    pub started_at: DateTime<Utc>,
    pub wifi_only: bool,
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct DownloadRequestRow {
    pub handle: i64,
    pub url: String,
    pub title: String,
    pub resource_type: String,
    pub destination_path: String,
    pub started_at: i64,
    pub wifi_only: bool,
}

impl From<DownloadRequestRow> for DownloadRequest {
    fn from(row: DownloadRequestRow) -> Self {
        let resource_type = row
            .resource_type
            .parse()
            .unwrap_or_else(|_| ResourceType::detect(&row.url));

        Self {
            handle: TransferHandle(row.handle),
            resource_type,
            destination: PathBuf::from(row.destination_path),
            started_at: timestamp_from_millis(row.started_at),
            wifi_only: row.wifi_only,
            title: row.title,
            url: row.url,
        }
    }
}

// =============================================================================
// Download Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloadStatus {
    Pending,
    Downloading,
    Paused,
    Completed,
    Failed,
    Cancelled,
    Unknown,
}

impl From<&TransferStatus> for DownloadStatus {
    fn from(status: &TransferStatus) -> Self {
        match status {
            TransferStatus::Pending => DownloadStatus::Pending,
            TransferStatus::Running => DownloadStatus::Downloading,
            TransferStatus::Paused => DownloadStatus::Paused,
            TransferStatus::Successful => DownloadStatus::Completed,
            TransferStatus::Failed { .. } => DownloadStatus::Failed,
            TransferStatus::Unknown => DownloadStatus::Unknown,
        }
    }
}

// =============================================================================
// Offline Category
// =============================================================================

/// Per-type summary of what is stored offline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineCategory {
    pub name: String,
    pub item_count: usize,
    pub total_size: u64,
    pub resource_type: ResourceType,
}

// =============================================================================
// Helpers
// =============================================================================

/// Format a byte count for display: `"512 B"`, `"1.5 KB"`, `"2.0 GB"`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [char; 6] = ['K', 'M', 'G', 'T', 'P', 'E'];

    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let mut value = bytes as f64;
    let mut exp = 0;
    while value >= 1024.0 && exp < UNITS.len() {
        value /= 1024.0;
        exp += 1;
    }

    format!("{:.1} {}B", value, UNITS[exp - 1])
}

/// Trailing path segment of `url`, without query or fragment.
pub fn last_url_segment(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default()
            .to_string(),
        Err(_) => url.rsplit('/').next().unwrap_or_default().to_string(),
    }
}

/// Destination filename for a new download: the URL's trailing segment, or
/// `file_<millis><ext>` when that segment has no extension.
pub fn destination_filename(url: &str, resource_type: ResourceType, now_millis: i64) -> String {
    let segment = last_url_segment(url);

    if segment.is_empty() || !segment.contains('.') {
        format!("file_{}{}", now_millis, resource_type.default_extension())
    } else {
        segment
    }
}

/// Filename used by entries written before paths were stored.
///
/// The raw text after the last `/`, or a 32-bit string hash plus an extension
/// guessed from the URL when that text has no extension.
pub fn legacy_filename(url: &str) -> String {
    let segment = url.rsplit('/').next().unwrap_or_default();

    if !segment.is_empty() && segment.contains('.') {
        return segment.to_string();
    }

    let extension = if url.contains("jpg") || url.contains("jpeg") {
        ".jpg"
    } else if url.contains("png") {
        ".png"
    } else if url.contains("mp3") {
        ".mp3"
    } else if url.contains("json") {
        ".json"
    } else {
        ""
    };

    format!("{}{}", legacy_hash(url), extension)
}

// 31-multiplier hash over UTF-16 code units, matching the names already on disk.
fn legacy_hash(s: &str) -> i32 {
    s.encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(unit as i32))
}

pub(crate) fn timestamp_from_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_resource_type() {
        assert_eq!(ResourceType::detect("https://x/Radio/News.MP3"), ResourceType::Audio);
        assert_eq!(ResourceType::detect("https://x/audio/stream"), ResourceType::Audio);
        assert_eq!(ResourceType::detect("https://x/data/photos.json"), ResourceType::Json);
        assert_eq!(ResourceType::detect("https://x/comics/01.jpg"), ResourceType::Comic);
        assert_eq!(ResourceType::detect("https://x/img/01.jpg"), ResourceType::Photo);
        // Audio wins over later rules
        assert_eq!(ResourceType::detect("https://x/comic/theme.mp3"), ResourceType::Audio);
    }

    #[test]
    fn test_resource_type_round_trip_through_str() {
        for ty in ResourceType::ALL {
            assert_eq!(ty.as_str().parse::<ResourceType>().unwrap(), ty);
        }
        assert_eq!("AUDIO".parse::<ResourceType>().unwrap(), ResourceType::Audio);
        assert!("video".parse::<ResourceType>().is_err());
    }

    #[test]
    fn test_folder_and_extension() {
        assert_eq!(ResourceType::Audio.folder_name(), "audios");
        assert_eq!(ResourceType::Comic.default_extension(), ".jpg");
        assert_eq!(ResourceType::Json.default_extension(), ".json");
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(1023), "1023 B");
        assert_eq!(format_file_size(1024), "1.0 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_file_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn test_destination_filename() {
        assert_eq!(
            destination_filename("https://cdn.example.com/a/b/song.mp3?sig=1", ResourceType::Audio, 42),
            "song.mp3"
        );
        assert_eq!(
            destination_filename("https://cdn.example.com/stream/live", ResourceType::Audio, 42),
            "file_42.mp3"
        );
        assert_eq!(
            destination_filename("https://cdn.example.com/", ResourceType::Photo, 7),
            "file_7.jpg"
        );
    }

    #[test]
    fn test_legacy_filename() {
        assert_eq!(legacy_filename("https://x/y/cover.png"), "cover.png");
        // "a".hashCode() == 97
        assert_eq!(legacy_hash("a"), 97);
        assert_eq!(legacy_hash("ab"), 97 * 31 + 98);
        let name = legacy_filename("https://x/json/feed");
        assert!(name.ends_with(".json"));
        assert!(name.starts_with(&legacy_hash("https://x/json/feed").to_string()));
    }

    #[test]
    fn test_download_status_mapping() {
        assert_eq!(DownloadStatus::from(&TransferStatus::Running), DownloadStatus::Downloading);
        assert_eq!(
            DownloadStatus::from(&TransferStatus::Failed { reason: "HTTP 404".to_string() }),
            DownloadStatus::Failed
        );
        assert_eq!(DownloadStatus::from(&TransferStatus::Successful), DownloadStatus::Completed);
    }

    #[test]
    fn test_row_without_type_uses_detection() {
        let row = ResourceRow {
            url: "https://x/comic/1.jpg".to_string(),
            local_path: "/data/Offline/comics/1.jpg".to_string(),
            resource_type: None,
            recorded_at: 1_700_000_000_000,
            is_priority: true,
        };
        let resource = TrackedResource::from(row);
        assert_eq!(resource.resource_type, ResourceType::Comic);
        assert!(resource.is_priority);
        assert_eq!(resource.recorded_at.timestamp_millis(), 1_700_000_000_000);
    }
}
