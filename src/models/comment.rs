use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::{Pagination, empty_as_none};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum CommentStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Spam,
}

impl CommentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CommentStatus::Pending => "pending",
            CommentStatus::Approved => "approved",
            CommentStatus::Rejected => "rejected",
            CommentStatus::Spam => "spam",
        }
    }
}

impl TryFrom<String> for CommentStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "pending" => Ok(CommentStatus::Pending),
            "approved" => Ok(CommentStatus::Approved),
            "rejected" => Ok(CommentStatus::Rejected),
            "spam" => Ok(CommentStatus::Spam),
            other => Err(format!("unknown comment status '{other}'")),
        }
    }
}

/// ModerationAction
///
/// Editor decision on a comment. `Delete` removes the comment outright; the others
/// set the matching status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum ModerationAction {
    Approve,
    Reject,
    Spam,
    Delete,
}

impl ModerationAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ModerationAction::Approve => "approve",
            ModerationAction::Reject => "reject",
            ModerationAction::Spam => "spam",
            ModerationAction::Delete => "delete",
        }
    }

    /// The status a comment ends up in, or `None` when the action deletes it.
    pub fn resulting_status(self) -> Option<CommentStatus> {
        match self {
            ModerationAction::Approve => Some(CommentStatus::Approved),
            ModerationAction::Reject => Some(CommentStatus::Rejected),
            ModerationAction::Spam => Some(CommentStatus::Spam),
            ModerationAction::Delete => None,
        }
    }
}

/// Comment
///
/// A row of `comments`. The commenter's IP, user agent and email are kept for
/// moderation and like de-duplication but never serialized.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub author_id: Option<Uuid>,
    pub author_name: Option<String>,
    #[serde(skip_serializing, default)]
    #[ts(skip)]
    #[schema(ignore)]
    pub author_email: Option<String>,
    pub author_website: Option<String>,
    pub content: String,
    #[sqlx(try_from = "String")]
    pub status: CommentStatus,
    #[serde(skip_serializing, default)]
    #[ts(skip)]
    #[schema(ignore)]
    pub ip_address: Option<String>,
    #[serde(skip_serializing, default)]
    #[ts(skip)]
    #[schema(ignore)]
    pub user_agent: Option<String>,
    pub is_anonymous: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// CommentView
///
/// A comment enriched for display: author username, like count and whether the
/// caller (by user id or IP) has liked it.
#[derive(Debug, Clone, Serialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct CommentView {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub comment: Comment,
    pub author_username: Option<String>,
    pub like_count: i64,
    pub is_liked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct ModerationRecord {
    pub id: Uuid,
    pub comment_id: Uuid,
    pub moderator_id: Option<Uuid>,
    pub moderator_username: Option<String>,
    pub action: String,
    pub reason: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// NewComment
#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub author_id: Option<Uuid>,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub author_website: Option<String>,
    pub content: String,
    pub status: CommentStatus,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub is_anonymous: bool,
}

/// Liker
///
/// Identity used to toggle and report likes: a signed-in user, else the client IP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Liker {
    User(Uuid),
    Ip(String),
}

// --- Request Payloads ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreateCommentRequest {
    pub post_id: Uuid,
    #[serde(default)]
    #[validate(length(min = 1, max = 2000, message = "Comment must be 1-2000 characters"))]
    pub content: String,
    pub parent_id: Option<Uuid>,
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(length(max = 100))]
    pub author_name: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(email(message = "Invalid email"))]
    pub author_email: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(url(message = "Invalid website URL"))]
    pub author_website: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct UpdateCommentRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 2000, message = "Comment must be 1-2000 characters"))]
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct ModerateCommentRequest {
    pub action: ModerationAction,
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

/// CommentListQuery
///
/// Query parameters for `GET /api/comments`. `status` defaults to `approved`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
pub struct CommentListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub post_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
    pub status: Option<CommentStatus>,
    pub author_id: Option<Uuid>,
    /// `created_at` (default), `updated_at` or `like_count`.
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

/// CommentFilter
///
/// Repository-level listing filter.
#[derive(Debug, Clone, Default)]
pub struct CommentFilter {
    pub post_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
    pub status: CommentStatus,
    pub author_id: Option<Uuid>,
    pub sort_by: CommentSort,
    pub sort_order: super::SortOrder,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CommentSort {
    #[default]
    CreatedAt,
    UpdatedAt,
    LikeCount,
}

impl CommentSort {
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("updated_at") | Some("updatedAt") => CommentSort::UpdatedAt,
            Some("like_count") | Some("likeCount") => CommentSort::LikeCount,
            _ => CommentSort::CreatedAt,
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            CommentSort::CreatedAt => "c.created_at",
            CommentSort::UpdatedAt => "c.updated_at",
            CommentSort::LikeCount => "like_count",
        }
    }
}

// --- Response Envelopes ---

#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct CommentsResponse {
    pub comments: Vec<CommentView>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct CommentResponse {
    pub comment: CommentView,
}

#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct LikeCountResponse {
    pub like_count: i64,
}

#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct LikeToggleResponse {
    pub message: String,
    pub liked: bool,
}

#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct ModerationResponse {
    pub moderation: Vec<ModerationRecord>,
}

#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct ModerateResponse {
    pub message: String,
    pub comment: Option<Comment>,
}
