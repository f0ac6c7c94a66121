//! Row types, request payloads and response envelopes for every service.
//!
//! Database rows serialize with their snake_case column names; request bodies and
//! response envelopes use camelCase keys.

pub mod comment;
pub mod media;
pub mod pagination;
pub mod post;
pub mod settings;
pub mod taxonomy;
pub mod user;

pub use comment::*;
pub use media::*;
pub use pagination::*;
pub use post::*;
pub use settings::*;
pub use taxonomy::*;
pub use user::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

/// MessageResponse
///
/// Body of endpoints that only acknowledge an action.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// HealthResponse
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    #[ts(type = "string")]
    pub timestamp: DateTime<Utc>,
}

/// SortOrder
///
/// Parsed `sortOrder` query value. Anything other than `asc` sorts descending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.eq_ignore_ascii_case("asc") => SortOrder::Asc,
            _ => SortOrder::Desc,
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Deserializes an optional string, mapping `""` and whitespace-only values to `None`.
/// Forms send empty strings for cleared URL and email inputs.
pub fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.trim().is_empty()))
}
