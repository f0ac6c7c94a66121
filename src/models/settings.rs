use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Key of the single `blog_settings` row.
pub const BLOG_SETTINGS_ID: Uuid = Uuid::from_u128(1);

pub const DEFAULT_BLOG_TITLE: &str = "My Blog";
pub const DEFAULT_BLOG_DESCRIPTION: &str = "Welcome to my blog";

/// BlogSettings
///
/// Site-wide presentation settings.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct BlogSettings {
    pub id: Uuid,
    pub blog_title: String,
    pub blog_description: Option<String>,
    pub updated_by: Option<Uuid>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateSettingsRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 200, message = "Blog title must be 1-200 characters"))]
    pub blog_title: String,
    #[validate(length(max = 1000, message = "Blog description must be at most 1000 characters"))]
    pub blog_description: Option<String>,
}

#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct SettingsResponse {
    pub settings: BlogSettings,
}

#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct SettingsUpdatedResponse {
    pub settings: BlogSettings,
    pub message: String,
}
