use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::Pagination;

/// MIME types accepted by `POST /api/media/upload`.
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/svg+xml",
    "video/mp4",
    "video/webm",
    "video/ogg",
    "audio/mpeg",
    "audio/wav",
    "audio/ogg",
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "text/plain",
    "application/zip",
    "application/x-rar-compressed",
];

pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;
pub const MAX_UPLOAD_FILES: usize = 10;

pub fn is_allowed_mime(mime: &str) -> bool {
    ALLOWED_MIME_TYPES.contains(&mime)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum FileType {
    Image,
    Video,
    Audio,
    Document,
}

impl FileType {
    /// Classifies by MIME family; anything that is not image/video/audio is a document.
    pub fn from_mime(mime: &str) -> Self {
        if mime.starts_with("image/") {
            FileType::Image
        } else if mime.starts_with("video/") {
            FileType::Video
        } else if mime.starts_with("audio/") {
            FileType::Audio
        } else {
            FileType::Document
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FileType::Image => "image",
            FileType::Video => "video",
            FileType::Audio => "audio",
            FileType::Document => "document",
        }
    }
}

impl TryFrom<String> for FileType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "image" => Ok(FileType::Image),
            "video" => Ok(FileType::Video),
            "audio" => Ok(FileType::Audio),
            "document" => Ok(FileType::Document),
            other => Err(format!("unknown file type '{other}'")),
        }
    }
}

/// ThumbnailSize
///
/// Fixed thumbnail presets. Each bounds the longest side; images are never enlarged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum ThumbnailSize {
    Small,
    Medium,
    Large,
}

impl ThumbnailSize {
    pub const ALL: [ThumbnailSize; 3] = [ThumbnailSize::Small, ThumbnailSize::Medium, ThumbnailSize::Large];

    pub fn bound(self) -> u32 {
        match self {
            ThumbnailSize::Small => 150,
            ThumbnailSize::Medium => 300,
            ThumbnailSize::Large => 600,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ThumbnailSize::Small => "small",
            ThumbnailSize::Medium => "medium",
            ThumbnailSize::Large => "large",
        }
    }
}

impl TryFrom<String> for ThumbnailSize {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "small" => Ok(ThumbnailSize::Small),
            "medium" => Ok(ThumbnailSize::Medium),
            "large" => Ok(ThumbnailSize::Large),
            other => Err(format!("unknown thumbnail size '{other}'")),
        }
    }
}

/// MediaFile
///
/// A row of `media_files`. `file_path` holds the storage key, not a filesystem path.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct MediaFile {
    pub id: Uuid,
    pub filename: String,
    pub original_filename: String,
    pub file_path: String,
    pub file_size: i64,
    pub mime_type: String,
    #[sqlx(try_from = "String")]
    pub file_type: FileType,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub uploaded_by: Uuid,
    pub alt_text: Option<String>,
    pub caption: Option<String>,
    pub is_public: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// MediaFileView
///
/// A media row plus the URL clients should fetch it from.
#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct MediaFileView {
    #[serde(flatten)]
    pub file: MediaFile,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct MediaThumbnail {
    pub id: Uuid,
    pub media_file_id: Uuid,
    pub thumbnail_path: String,
    pub width: i32,
    pub height: i32,
    #[sqlx(try_from = "String")]
    pub size: ThumbnailSize,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct MediaThumbnailView {
    #[serde(flatten)]
    pub thumbnail: MediaThumbnail,
    pub url: String,
}

/// MediaStats
///
/// Aggregate library counters for `GET /api/media/stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct MediaStats {
    pub total_files: i64,
    pub total_size: i64,
    pub image_count: i64,
    pub video_count: i64,
    pub audio_count: i64,
    pub document_count: i64,
}

#[derive(Debug, Clone)]
pub struct NewMediaFile {
    pub filename: String,
    pub original_filename: String,
    pub file_path: String,
    pub file_size: i64,
    pub mime_type: String,
    pub file_type: FileType,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub uploaded_by: Uuid,
    pub alt_text: Option<String>,
    pub caption: Option<String>,
    pub is_public: bool,
}

#[derive(Debug, Clone)]
pub struct NewThumbnail {
    pub media_file_id: Uuid,
    pub thumbnail_path: String,
    pub width: i32,
    pub height: i32,
    pub size: ThumbnailSize,
}

// --- Request Payloads ---

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateMediaRequest {
    #[validate(length(max = 500))]
    pub alt_text: Option<String>,
    #[validate(length(max = 1000))]
    pub caption: Option<String>,
    pub is_public: Option<bool>,
}

/// UploadForm
///
/// Text fields of the multipart upload form, applied to every file in the batch.
#[derive(Debug, Clone, Default, Validate)]
pub struct UploadForm {
    #[validate(length(max = 500))]
    pub alt_text: Option<String>,
    #[validate(length(max = 1000))]
    pub caption: Option<String>,
    pub is_public: bool,
}

/// MediaListQuery
///
/// Query parameters for `GET /api/media`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
pub struct MediaListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub file_type: Option<FileType>,
    pub uploaded_by: Option<Uuid>,
    /// Matches the original filename, alt text or caption.
    pub search: Option<String>,
    /// `created_at` (default), `file_size` or `original_filename`.
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MediaFilter {
    pub file_type: Option<FileType>,
    pub uploaded_by: Option<Uuid>,
    pub search: Option<String>,
    /// When set, private files are only listed if uploaded by this user.
    pub visible_to: Option<Uuid>,
    /// Only public files (anonymous callers).
    pub public_only: bool,
    pub sort_by: MediaSort,
    pub sort_order: super::SortOrder,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MediaSort {
    #[default]
    CreatedAt,
    FileSize,
    OriginalFilename,
}

impl MediaSort {
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("file_size") | Some("fileSize") => MediaSort::FileSize,
            Some("original_filename") | Some("originalFilename") => MediaSort::OriginalFilename,
            _ => MediaSort::CreatedAt,
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            MediaSort::CreatedAt => "created_at",
            MediaSort::FileSize => "file_size",
            MediaSort::OriginalFilename => "original_filename",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ServeQuery {
    /// Send `Content-Disposition: attachment` when true.
    pub download: Option<bool>,
}

// --- Response Envelopes ---

#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct FilesResponse {
    pub files: Vec<MediaFileView>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct UploadResponse {
    pub files: Vec<MediaFileView>,
}

#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct FileResponse {
    pub file: MediaFileView,
}

#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct ThumbnailsResponse {
    pub thumbnails: Vec<MediaThumbnailView>,
}

#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct StatsResponse {
    pub stats: MediaStats,
}
